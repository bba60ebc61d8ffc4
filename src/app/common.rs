use serde::Serialize;

use crate::Result;
use crate::config::{DriverConfig, Instance, load_instance};
use crate::core::diagnostics::{Diagnostic, Severity};
use crate::core::events::Event;
use crate::core::{Driver, OperationOutput};

pub fn open_driver(config: DriverConfig) -> Result<Driver> {
    emit_config_warnings(&config.warnings);
    Driver::new(config)
}

pub fn load_instance_file(path: &std::path::Path) -> Result<Instance> {
    let instance = load_instance(path)?;
    emit_config_warnings(&instance.warnings);
    Ok(instance)
}

pub fn emit_config_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
}

pub fn emit_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        match diagnostic.severity {
            Severity::Warning => {
                eprintln!("Warning: {diagnostic}");
            }
            Severity::Info => {
                println!("{diagnostic}");
            }
        }
    }
}

/// Print diagnostics and the event trail of a lifecycle operation.
pub fn render_output<T>(output: &OperationOutput<T>) {
    render_events(&output.events);
    emit_diagnostics(&output.diagnostics);
}

pub fn render_events(events: &[Event]) {
    for event in events {
        match event {
            Event::Message { severity, text } => match severity {
                Severity::Info => println!("{text}"),
                Severity::Warning => eprintln!("Warning: {text}"),
            },
            Event::NetScriptWritten { instance, nic, path } => {
                println!("→ {instance}: wrote network script for NIC #{nic} ({}).", path.display());
            }
            Event::NetScriptRemoved { .. } => {}
            Event::LaunchRequested {
                instance, program, ..
            } => {
                println!("→ {instance}: launching {}.", program.display());
            }
            Event::InstanceLaunched { instance, pid } => {
                println!("→ {instance}: running (pid {pid}).");
            }
            Event::StalePidfileRemoved { instance, path } => {
                println!("→ {instance}: removed stale pidfile {}.", path.display());
            }
            Event::ShutdownRequested { instance, force } => {
                if *force {
                    println!("→ {instance}: forced shutdown requested.");
                } else {
                    println!("→ {instance}: shutdown requested.");
                }
            }
            Event::PowerdownSent { instance, .. } => {
                println!("→ {instance}: ACPI power-down sent to the guest.");
            }
            Event::SignalSent {
                instance,
                pid,
                signal,
            } => {
                println!("→ {instance}: sent {} to pid {pid}.", signal.describe());
            }
            Event::ShutdownComplete {
                instance,
                outcome,
                changed,
            } => {
                if *changed {
                    println!("→ {instance}: {}.", outcome.describe());
                } else {
                    println!("→ {instance}: not running; nothing to do.");
                }
            }
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(rendered) => println!("{rendered}"),
        Err(err) => eprintln!("Error: could not render JSON output: {err}"),
    }
}
