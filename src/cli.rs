use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

const VERSION: &str = env!("KVMHV_VERSION");

/// Top-level CLI definition for the `kvmhv` tool.
#[derive(Debug, Parser)]
#[command(
    name = "kvmhv",
    version = VERSION,
    about = "Node-local KVM hypervisor driver.",
    long_about = "kvmhv starts, stops, reboots and inspects KVM instances on this node.\n\
                  Instance state lives in pidfiles under the driver root; nothing is cached."
)]
pub struct Cli {
    /// Path to the driver configuration file.
    #[arg(
        global = true,
        short,
        long = "config",
        value_name = "PATH",
        help = "Load driver configuration from PATH instead of $KVMHV_CONFIG or built-in defaults"
    )]
    pub config: Option<PathBuf>,

    /// Render results as JSON for the orchestrator.
    #[arg(global = true, long, help = "Print query results as JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Launch an instance from its definition file.
    Start(InstanceArgs),
    /// Stop an instance. Asks the guest to power off unless --force is given or ACPI is off.
    Stop(StopArgs),
    /// Power-cycle an instance: graceful stop, wait, start.
    Reboot(InstanceArgs),
    /// Show details of a running instance.
    Info(InfoArgs),
    /// List running instances.
    List,
    /// Report host memory and CPU capacity.
    NodeInfo,
    /// Check that this node can run instances.
    Verify,
    /// Validate hypervisor parameters.
    Validate(ValidateArgs),
    /// Print the command that attaches to an instance's serial console.
    Console(InstanceArgs),
}

#[derive(Debug, Args)]
pub struct InstanceArgs {
    /// Instance definition (TOML).
    #[arg(value_name = "INSTANCE_FILE")]
    pub instance: PathBuf,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Instance definition (TOML).
    #[arg(value_name = "INSTANCE_FILE")]
    pub instance: PathBuf,

    /// Terminate the hypervisor process with signals instead of requesting power-off.
    #[arg(long, help = "Send SIGTERM, then SIGKILL, instead of an ACPI power-down request")]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    /// Instance name.
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Also check the local filesystem (kernel and initrd must exist here).
    #[arg(long, help = "Run node-local checks in addition to syntax checks")]
    pub runtime: bool,

    /// Hypervisor parameter as KEY=VALUE; repeatable.
    #[arg(
        long = "param",
        value_name = "KEY=VALUE",
        value_parser = parse_key_value,
        help = "Hypervisor parameter, e.g. --param kernel_path=/boot/vmlinuz-kvmU"
    )]
    pub params: Vec<(String, String)>,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{input}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("parameter name must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}
