use tracing::{info, warn};

use super::diagnostics::Severity;
use super::events::Event;

/// Trait implemented by callers that wish to observe progress events as they happen.
pub trait Reporter {
    /// Receive a structured event.
    fn report(&mut self, event: Event);
}

impl Reporter for () {
    fn report(&mut self, _event: Event) {}
}

/// Forwards every event to `tracing`, for callers that only want a log trail.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, event: Event) {
        match event {
            Event::Message { severity, text } => match severity {
                Severity::Info => info!("{text}"),
                Severity::Warning => warn!("{text}"),
            },
            Event::NetScriptWritten {
                instance,
                nic,
                path,
            } => info!(%instance, nic, path = %path.display(), "network script written"),
            Event::NetScriptRemoved { instance, path } => {
                info!(%instance, path = %path.display(), "network script removed")
            }
            Event::LaunchRequested {
                instance,
                program,
                arg_count,
            } => info!(%instance, program = %program.display(), arg_count, "launching hypervisor"),
            Event::InstanceLaunched { instance, pid } => {
                info!(%instance, pid, "instance launched")
            }
            Event::StalePidfileRemoved { instance, path } => {
                warn!(%instance, path = %path.display(), "removed stale pidfile")
            }
            Event::ShutdownRequested { instance, force } => {
                info!(%instance, force, "shutdown requested")
            }
            Event::PowerdownSent { instance, socket } => {
                info!(%instance, socket = %socket.display(), "system_powerdown sent")
            }
            Event::SignalSent {
                instance,
                pid,
                signal,
            } => info!(%instance, pid, signal = signal.describe(), "signal sent"),
            Event::ShutdownComplete {
                instance,
                outcome,
                changed,
            } => info!(%instance, outcome = outcome.describe(), changed, "shutdown complete"),
        }
    }
}

/// Records every event for the operation output and forwards it to the caller's
/// reporter, if any.
pub(crate) struct ReporterProxy<'a, 'b> {
    delegate: Option<&'a mut dyn Reporter>,
    events: &'b mut Vec<Event>,
}

impl<'a, 'b> ReporterProxy<'a, 'b> {
    pub(crate) fn new(delegate: Option<&'a mut dyn Reporter>, events: &'b mut Vec<Event>) -> Self {
        Self { delegate, events }
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push(event.clone());
        if let Some(reporter) = &mut self.delegate {
            reporter.report(event);
        }
    }
}

impl Reporter for ReporterProxy<'_, '_> {
    fn report(&mut self, event: Event) {
        self.emit(event);
    }
}
