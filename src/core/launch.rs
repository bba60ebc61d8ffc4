//! Hypervisor invocation: building the argument vector and running the launcher.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::config::BlockDevice;
use crate::error::{Error, Result};

use super::control::ControlPaths;
use super::params::HvParams;

/// Kernel command line for paravirtual guests booting from the first virtio disk.
pub const KERNEL_APPEND: &str = "console=ttyS0,38400 root=/dev/vda";

/// A fully built hypervisor invocation. Nothing runs until [`LaunchSpec::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// Everything the argument vector is derived from.
#[derive(Debug, Clone, Copy)]
pub struct LaunchInputs<'a> {
    pub name: &'a str,
    pub memory: u64,
    pub vcpus: u32,
    pub params: &'a HvParams,
    pub pidfile: &'a Path,
    /// One entry per NIC, in NIC order: MAC address and its wiring script.
    pub nics: &'a [(&'a str, &'a Path)],
    pub disks: &'a [BlockDevice],
    pub control: &'a ControlPaths,
}

impl LaunchSpec {
    pub fn build(program: &Path, inputs: LaunchInputs<'_>) -> Self {
        let mut args = Vec::new();

        flag_value(&mut args, "-m", inputs.memory.to_string());
        flag_value(&mut args, "-smp", inputs.vcpus.to_string());
        flag_value(&mut args, "-pidfile", inputs.pidfile.display().to_string());
        flag_value(&mut args, "-name", inputs.name.to_string());
        args.push("-daemonize".to_string());
        if !inputs.params.acpi {
            args.push("-no-acpi".to_string());
        }

        if inputs.nics.is_empty() {
            flag_value(&mut args, "-net", "none".to_string());
        }
        for (mac, script) in inputs.nics {
            flag_value(&mut args, "-net", format!("nic,macaddr={mac},model=virtio"));
            flag_value(&mut args, "-net", format!("tap,script={}", script.display()));
        }

        for (index, disk) in inputs.disks.iter().enumerate() {
            let mut drive = format!("file={},format=raw,if=virtio", disk.path.display());
            if index == 0 {
                drive.push_str(",boot=on");
            }
            flag_value(&mut args, "-drive", drive);
        }

        if let Some(kernel) = &inputs.params.kernel_path {
            flag_value(&mut args, "-kernel", kernel.display().to_string());
        }
        if let Some(initrd) = &inputs.params.initrd_path {
            flag_value(&mut args, "-initrd", initrd.display().to_string());
        }
        flag_value(&mut args, "-append", KERNEL_APPEND.to_string());
        args.push("-nographic".to_string());
        flag_value(&mut args, "-monitor", inputs.control.monitor_arg());
        flag_value(&mut args, "-serial", inputs.control.serial_arg());

        Self {
            program: program.to_path_buf(),
            args,
        }
    }

    /// Values following every occurrence of `flag`.
    pub fn values_of<'a>(&'a self, flag: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.args
            .windows(2)
            .filter(move |pair| pair[0] == flag)
            .map(|pair| pair[1].as_str())
    }

    /// Run the launcher to completion. The hypervisor daemonizes, so a zero exit
    /// only means the launcher itself was happy; the caller verifies the pidfile.
    pub fn run(&self, instance: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Error::LaunchFailed {
                instance: instance.to_string(),
                reason: format!("could not execute {}: {err}", self.program.display()),
                output: String::new(),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let reason = match output.status.code() {
            Some(code) => format!("{} exited with code {code}", self.program.display()),
            None => format!("{} was terminated by a signal", self.program.display()),
        };
        Err(Error::LaunchFailed {
            instance: instance.to_string(),
            reason,
            output: captured_output(&output),
        })
    }
}

fn flag_value(args: &mut Vec<String>, flag: &str, value: String) {
    args.push(flag.to_string());
    args.push(value);
}

fn captured_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.trim().to_string(),
        (true, false) => stderr.trim().to_string(),
        (false, false) => format!("{}\n{}", stdout.trim(), stderr.trim()),
    }
}
