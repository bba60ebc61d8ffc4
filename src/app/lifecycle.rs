use crate::Result;
use crate::cli::{InstanceArgs, StopArgs};
use crate::config::DriverConfig;
use crate::core::events::ShutdownOutcome;
use crate::core::reporter::LogReporter;

use super::common::{load_instance_file, open_driver, render_output};

pub fn handle_start(args: InstanceArgs, config: DriverConfig) -> Result<()> {
    let instance = load_instance_file(&args.instance)?;
    let driver = open_driver(config)?;
    let output = driver.start(&instance, &instance.disks, Some(&mut LogReporter))?;
    render_output(&output);
    Ok(())
}

pub fn handle_stop(args: StopArgs, config: DriverConfig) -> Result<()> {
    let instance = load_instance_file(&args.instance)?;
    let driver = open_driver(config)?;
    let output = driver.stop(&instance, args.force, Some(&mut LogReporter))?;
    render_output(&output);

    if output.value.outcome == ShutdownOutcome::Requested {
        eprintln!(
            "Note: {} has not exited yet; poll `kvmhv info {}` or rerun with --force.",
            instance.name, instance.name
        );
    }
    Ok(())
}

pub fn handle_reboot(args: InstanceArgs, config: DriverConfig) -> Result<()> {
    let instance = load_instance_file(&args.instance)?;
    let driver = open_driver(config)?;
    let output = driver.reboot(&instance, Some(&mut LogReporter))?;
    render_output(&output);
    Ok(())
}

pub fn handle_console(args: InstanceArgs, config: DriverConfig) -> Result<()> {
    let instance = load_instance_file(&args.instance)?;
    let driver = open_driver(config)?;
    println!("{}", driver.console_command(&instance.name));
    Ok(())
}
