//! Node-local lifecycle driver: start, stop, reboot and query KVM instances.
//!
//! All state is re-derived from the pid directory and the OS on every call. Each
//! lifecycle operation holds the instance lock for its whole duration.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use libc::pid_t;
use tracing::{debug, info, warn};

use crate::config::{BlockDevice, DriverConfig, Instance};
use crate::error::{Error, Result};

use super::control::{ControlPaths, POWERDOWN_COMMAND, send_monitor_command};
use super::diagnostics::{Diagnostic, Severity};
use super::events::{Event, ShutdownOutcome, ShutdownSignal};
use super::hostinfo::HostInspector;
use super::launch::{LaunchInputs, LaunchSpec};
use super::lock::InstanceLock;
use super::netscript::{NetScript, NetScriptWriter};
use super::outcome::{
    INSTANCE_STATE_PLACEHOLDER, InstanceInfo, NodeInfo, OperationOutput, OperationResult,
    RebootOutcome, StartOutcome, StopOutcome,
};
use super::params::HvParams;
use super::process::{
    ProcessProbe, ProcfsProbe, is_process_alive, pidfile_age, send_signal, wait_for_process_exit,
};
use super::registry::{PidState, ProcessRegistry};
use super::reporter::{Reporter, ReporterProxy};
use super::store::{FileStore, KeyedStore};

pub struct Driver<S = FileStore, P = ProcfsProbe> {
    config: DriverConfig,
    registry: ProcessRegistry<S>,
    probe: P,
    netscripts: NetScriptWriter,
    host: HostInspector,
}

impl Driver {
    /// Open the driver on the configured root, creating `pid/`, `ctrl/` and `lock/`.
    pub fn new(config: DriverConfig) -> Result<Self> {
        let store = FileStore::open(config.pid_dir())?;
        Self::with_parts(config, store, ProcfsProbe)
    }

    /// Node-independent parameter checks. Touches nothing on disk, so callers
    /// need no driver instance.
    pub fn validate_syntax(params: &HvParams) -> Result<()> {
        params.check_syntax()
    }

    /// Checks that need this node's filesystem.
    pub fn validate_runtime(params: &HvParams) -> Result<()> {
        params.check_runtime()
    }
}

impl<S: KeyedStore, P: ProcessProbe> Driver<S, P> {
    pub fn with_parts(config: DriverConfig, store: S, probe: P) -> Result<Self> {
        for dir in [config.root.clone(), config.ctrl_dir(), config.lock_dir()] {
            fs::create_dir_all(&dir).map_err(|source| Error::StateDir { path: dir, source })?;
        }

        let netscripts = NetScriptWriter::new(&config.vif_override, config.script_dir.clone());
        let host = HostInspector::new(&config.meminfo, &config.cpuinfo);
        Ok(Self {
            registry: ProcessRegistry::new(store),
            probe,
            netscripts,
            host,
            config,
        })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProcessRegistry<S> {
        &self.registry
    }

    pub fn control_paths(&self, name: &str) -> ControlPaths {
        ControlPaths::new(&self.config.ctrl_dir(), name)
    }

    /// Launch `instance` with `block_devices`, the first of which is the boot disk.
    pub fn start(
        &self,
        instance: &Instance,
        block_devices: &[BlockDevice],
        reporter: Option<&mut dyn Reporter>,
    ) -> OperationResult<StartOutcome> {
        let mut diagnostics = Vec::new();
        let mut events = Vec::new();
        let outcome = {
            let mut reporter = ReporterProxy::new(reporter, &mut events);
            let _lock = self.lock(&instance.name)?;
            self.start_locked(instance, block_devices, &mut reporter, &mut diagnostics)?
        };

        Ok(OperationOutput::new(outcome)
            .with_diagnostics(diagnostics)
            .with_events(events))
    }

    /// Stop `instance`. Without `force` (and with ACPI enabled) this only asks the
    /// guest to power off.
    pub fn stop(
        &self,
        instance: &Instance,
        force: bool,
        reporter: Option<&mut dyn Reporter>,
    ) -> OperationResult<StopOutcome> {
        let mut diagnostics = Vec::new();
        let mut events = Vec::new();
        let outcome = {
            let mut reporter = ReporterProxy::new(reporter, &mut events);
            let _lock = self.lock(&instance.name)?;
            self.stop_locked(instance, force, &mut reporter, &mut diagnostics)?
        };

        Ok(OperationOutput::new(outcome)
            .with_diagnostics(diagnostics)
            .with_events(events))
    }

    /// Graceful stop, wait for the guest to go away, then start it again with its
    /// own disks.
    pub fn reboot(
        &self,
        instance: &Instance,
        reporter: Option<&mut dyn Reporter>,
    ) -> OperationResult<RebootOutcome> {
        let mut diagnostics = Vec::new();
        let mut events = Vec::new();
        let outcome = {
            let mut reporter = ReporterProxy::new(reporter, &mut events);
            let _lock = self.lock(&instance.name)?;

            let mut stop = self.stop_locked(instance, false, &mut reporter, &mut diagnostics)?;
            if stop.outcome == ShutdownOutcome::Requested {
                stop = self.await_power_off(instance, stop, &mut reporter)?;
            }
            let start =
                self.start_locked(instance, &instance.disks, &mut reporter, &mut diagnostics)?;
            RebootOutcome { stop, start }
        };

        Ok(OperationOutput::new(outcome)
            .with_diagnostics(diagnostics)
            .with_events(events))
    }

    /// Properties of a live instance, read back from its process.
    pub fn get_info(&self, name: &str) -> Result<InstanceInfo> {
        let pid = self
            .registry
            .running_pid(name)?
            .ok_or_else(|| Error::NotFound {
                instance: name.to_string(),
            })?;

        let argv = self
            .probe
            .command_line(pid)
            .map_err(|source| Error::InfoUnavailable {
                instance: name.to_string(),
                pid,
                source,
            })?;

        let memory = flag_value(&argv, "-m").and_then(parse_memory_mib).unwrap_or(0);
        let vcpus = flag_value(&argv, "-smp").and_then(parse_smp).unwrap_or(0);
        let uptime = self
            .registry
            .pidfile_path(name)
            .ok()
            .and_then(|path| pidfile_age(&path))
            .unwrap_or_default();

        Ok(InstanceInfo {
            name: name.to_string(),
            pid,
            memory,
            vcpus,
            state: INSTANCE_STATE_PLACEHOLDER.to_string(),
            uptime,
        })
    }

    /// Info for every live instance. Instances that exit while being listed are
    /// left out.
    pub fn list_all(&self) -> Result<Vec<InstanceInfo>> {
        let mut infos = Vec::new();
        for name in self.registry.list_running()? {
            match self.get_info(&name) {
                Ok(info) => infos.push(info),
                Err(Error::NotFound { .. }) => {
                    debug!(instance = %name, "instance exited while listing");
                }
                Err(Error::InfoUnavailable { pid, source, .. }) if !is_process_alive(pid) => {
                    debug!(instance = %name, pid, error = %source, "instance exited while probing");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(infos)
    }

    pub fn node_info(&self) -> Result<NodeInfo> {
        self.host.node_info()
    }

    /// `None` when the node can run instances, otherwise what is wrong.
    pub fn verify(&self) -> Option<String> {
        if self.config.kvm_path.exists() {
            None
        } else {
            Some(format!(
                "The kvm binary ('{}') does not exist.",
                self.config.kvm_path.display()
            ))
        }
    }

    /// Shell command that attaches an operator terminal to the serial console.
    pub fn console_command(&self, name: &str) -> String {
        let serial = self.control_paths(name).serial;
        format!(
            "socat STDIO,raw,echo=0,escape=0x1d UNIX-CONNECT:{}",
            serial.display()
        )
    }

    fn lock(&self, name: &str) -> Result<InstanceLock> {
        InstanceLock::acquire(
            &self.config.lock_dir(),
            name,
            self.config.lock.retries,
            self.config.lock.interval,
        )
    }

    fn start_locked(
        &self,
        instance: &Instance,
        block_devices: &[BlockDevice],
        reporter: &mut ReporterProxy<'_, '_>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<StartOutcome> {
        let name = instance.name.as_str();
        validate_resources(instance)?;
        instance.hvparams.check_syntax()?;
        instance.hvparams.check_runtime()?;

        match self.registry.state(name)? {
            PidState::Running { .. } => {
                return Err(Error::AlreadyRunning {
                    instance: name.to_string(),
                });
            }
            PidState::Stale => self.remove_stale_pidfile(name, reporter)?,
            PidState::Absent => {}
        }

        let pidfile = self.registry.pidfile_path(name)?;
        let control = self.control_paths(name);
        remove_leftover_socket(&control.monitor);
        remove_leftover_socket(&control.serial);

        let mut scripts: Vec<NetScript> = Vec::with_capacity(instance.nics.len());
        for (index, nic) in instance.nics.iter().enumerate() {
            let script = self.netscripts.write_script(name, index, nic)?;
            reporter.emit(Event::NetScriptWritten {
                instance: name.to_string(),
                nic: index,
                path: script.path().to_path_buf(),
            });
            scripts.push(script);
        }

        let launched = {
            let nics: Vec<(&str, &Path)> = instance
                .nics
                .iter()
                .zip(&scripts)
                .map(|(nic, script)| (nic.mac.as_str(), script.path()))
                .collect();
            let spec = LaunchSpec::build(
                &self.config.kvm_path,
                LaunchInputs {
                    name,
                    memory: instance.memory,
                    vcpus: instance.vcpus,
                    params: &instance.hvparams,
                    pidfile: &pidfile,
                    nics: &nics,
                    disks: block_devices,
                    control: &control,
                },
            );
            reporter.emit(Event::LaunchRequested {
                instance: name.to_string(),
                program: spec.program.clone(),
                arg_count: spec.args.len(),
            });
            info!(instance = name, program = %spec.program.display(), "launching hypervisor");
            self.launch_and_verify(name, &spec, &pidfile)
        };

        let net_scripts = remove_scripts(name, scripts, reporter, diagnostics);
        let pid = launched?;

        reporter.emit(Event::InstanceLaunched {
            instance: name.to_string(),
            pid,
        });
        Ok(StartOutcome {
            instance: name.to_string(),
            pid,
            net_scripts,
        })
    }

    fn launch_and_verify(&self, name: &str, spec: &LaunchSpec, pidfile: &Path) -> Result<pid_t> {
        spec.run(name)?;
        self.registry
            .running_pid(name)?
            .ok_or_else(|| Error::LaunchUnverified {
                instance: name.to_string(),
                pidfile: pidfile.to_path_buf(),
            })
    }

    fn stop_locked(
        &self,
        instance: &Instance,
        force: bool,
        reporter: &mut ReporterProxy<'_, '_>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Result<StopOutcome> {
        let name = instance.name.as_str();
        reporter.emit(Event::ShutdownRequested {
            instance: name.to_string(),
            force,
        });

        let pid = match self.registry.state(name)? {
            PidState::Running { pid } => pid,
            state => {
                if state == PidState::Stale {
                    self.remove_stale_pidfile(name, reporter)?;
                }
                return Ok(self.finish_stop(name, None, ShutdownOutcome::AlreadyStopped, reporter));
            }
        };

        let outcome = if force || !instance.hvparams.acpi {
            if !force {
                diagnostics.push(
                    Diagnostic::new(
                        Severity::Info,
                        "ACPI is disabled; terminating the hypervisor process directly.",
                    )
                    .with_instance(name),
                );
            }
            self.terminate(name, pid, reporter)?;
            ShutdownOutcome::Forced
        } else {
            self.request_power_off(name, reporter)?;
            if is_process_alive(pid) {
                ShutdownOutcome::Requested
            } else {
                ShutdownOutcome::Graceful
            }
        };

        if outcome.is_stopped() {
            self.cleanup_after_exit(name)?;
        }
        Ok(self.finish_stop(name, Some(pid), outcome, reporter))
    }

    fn finish_stop(
        &self,
        name: &str,
        pid: Option<pid_t>,
        outcome: ShutdownOutcome,
        reporter: &mut ReporterProxy<'_, '_>,
    ) -> StopOutcome {
        let changed = pid.is_some();
        reporter.emit(Event::ShutdownComplete {
            instance: name.to_string(),
            outcome,
            changed,
        });
        StopOutcome {
            instance: name.to_string(),
            pid,
            outcome,
            changed,
        }
    }

    fn request_power_off(&self, name: &str, reporter: &mut ReporterProxy<'_, '_>) -> Result<()> {
        let socket = self.control_paths(name).monitor;
        send_monitor_command(&socket, POWERDOWN_COMMAND, self.config.shutdown.monitor).map_err(
            |err| {
                warn!(instance = name, socket = %socket.display(), error = %err, "monitor unreachable");
                Error::GracefulShutdownFailed {
                    instance: name.to_string(),
                    socket: socket.clone(),
                    reason: err.to_string(),
                }
            },
        )?;
        reporter.emit(Event::PowerdownSent {
            instance: name.to_string(),
            socket,
        });
        Ok(())
    }

    /// SIGTERM, bounded wait, SIGKILL, bounded wait.
    fn terminate(&self, name: &str, pid: pid_t, reporter: &mut ReporterProxy<'_, '_>) -> Result<()> {
        let timeouts = self.config.shutdown;
        let steps = [
            (ShutdownSignal::Sigterm, libc::SIGTERM, timeouts.sigterm_wait),
            (ShutdownSignal::Sigkill, libc::SIGKILL, timeouts.sigkill_wait),
        ];

        for (signal, signo, wait) in steps {
            let delivered = send_signal(pid, signo).map_err(|err| Error::KillFailed {
                instance: name.to_string(),
                pid,
                message: format!("sending {} failed: {err}", signal.describe()),
            })?;
            if !delivered {
                debug!(instance = name, pid, "process already gone");
                return Ok(());
            }
            reporter.emit(Event::SignalSent {
                instance: name.to_string(),
                pid,
                signal,
            });
            if wait_for_process_exit(pid, wait) {
                return Ok(());
            }
            warn!(instance = name, pid, signal = signal.describe(), "process survived signal");
        }

        Err(Error::KillFailed {
            instance: name.to_string(),
            pid,
            message: format!(
                "process still alive {}s after SIGKILL",
                timeouts.sigkill_wait.as_secs()
            ),
        })
    }

    /// Wait out a delivered power-down request, up to the configured graceful wait.
    fn await_power_off(
        &self,
        instance: &Instance,
        stop: StopOutcome,
        reporter: &mut ReporterProxy<'_, '_>,
    ) -> Result<StopOutcome> {
        let name = instance.name.as_str();
        let wait = self.config.shutdown.graceful_wait;
        reporter.emit(Event::Message {
            severity: Severity::Info,
            text: format!(
                "Waiting up to {}s for {name} to power off before starting it again.",
                wait.as_secs()
            ),
        });

        let exited = stop
            .pid
            .map_or(true, |pid| wait_for_process_exit(pid, wait));
        if !exited {
            return Err(Error::GracefulShutdownFailed {
                instance: name.to_string(),
                socket: self.control_paths(name).monitor,
                reason: format!("guest did not power off within {}s", wait.as_secs()),
            });
        }

        self.cleanup_after_exit(name)?;
        Ok(StopOutcome {
            outcome: ShutdownOutcome::Graceful,
            ..stop
        })
    }

    fn remove_stale_pidfile(&self, name: &str, reporter: &mut ReporterProxy<'_, '_>) -> Result<()> {
        let path = self.registry.pidfile_path(name)?;
        self.registry.remove(name)?;
        reporter.emit(Event::StalePidfileRemoved {
            instance: name.to_string(),
            path,
        });
        Ok(())
    }

    fn cleanup_after_exit(&self, name: &str) -> Result<()> {
        self.registry.remove(name)?;
        let control = self.control_paths(name);
        remove_leftover_socket(&control.monitor);
        remove_leftover_socket(&control.serial);
        Ok(())
    }
}

fn validate_resources(instance: &Instance) -> Result<()> {
    if instance.memory == 0 {
        return Err(Error::invalid_parameter(format!(
            "instance {} must have at least 1 MiB of memory",
            instance.name
        )));
    }
    if instance.vcpus == 0 {
        return Err(Error::invalid_parameter(format!(
            "instance {} must have at least one vCPU",
            instance.name
        )));
    }
    Ok(())
}

/// Delete every wiring script, returning their paths. Removal failures become
/// warnings: the instance state is already decided by now.
fn remove_scripts(
    name: &str,
    scripts: Vec<NetScript>,
    reporter: &mut ReporterProxy<'_, '_>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<PathBuf> {
    let mut removed = Vec::with_capacity(scripts.len());
    for script in scripts {
        let path = script.path().to_path_buf();
        match script.remove() {
            Ok(path) => {
                reporter.emit(Event::NetScriptRemoved {
                    instance: name.to_string(),
                    path: path.clone(),
                });
                removed.push(path);
            }
            Err(err) => {
                diagnostics.push(
                    Diagnostic::warning(format!("Could not remove network script: {err}"))
                        .with_instance(name)
                        .with_path(path)
                        .with_help("The script is only read at launch; delete it by hand."),
                );
            }
        }
    }
    removed
}

fn remove_leftover_socket(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %err, "could not remove control socket");
        }
    }
}

fn flag_value<'a>(argv: &'a [String], flag: &str) -> Option<&'a str> {
    argv.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| argv.get(idx + 1))
        .map(String::as_str)
}

/// `-m` takes MiB by default and accepts a `M`/`G` suffix.
fn parse_memory_mib(value: &str) -> Option<u64> {
    let value = value.split(',').next()?.trim();
    let value = value.strip_prefix("size=").unwrap_or(value);
    let (digits, multiplier) = match value.char_indices().last()? {
        (idx, 'M' | 'm') => (&value[..idx], 1),
        (idx, 'G' | 'g') => (&value[..idx], 1024),
        _ => (value, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(multiplier)
}

/// `-smp` is either a bare count or a list whose `cpus=` entry (or first item) is the count.
fn parse_smp(value: &str) -> Option<u32> {
    let first = value.split(',').next()?.trim();
    first
        .strip_prefix("cpus=")
        .unwrap_or(first)
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Nic;
    use tempfile::tempdir;

    #[test]
    fn memory_suffixes_normalise_to_mib() {
        assert_eq!(parse_memory_mib("512"), Some(512));
        assert_eq!(parse_memory_mib("512M"), Some(512));
        assert_eq!(parse_memory_mib("2G"), Some(2048));
        assert_eq!(parse_memory_mib("size=1G,slots=2"), Some(1024));
        assert_eq!(parse_memory_mib("lots"), None);
        assert_eq!(parse_memory_mib("18014398509481984G"), None);
    }

    #[test]
    fn smp_forms() {
        assert_eq!(parse_smp("2"), Some(2));
        assert_eq!(parse_smp("4,sockets=1"), Some(4));
        assert_eq!(parse_smp("cpus=8,cores=4"), Some(8));
        assert_eq!(parse_smp("many"), None);
    }

    #[test]
    fn flag_value_finds_following_argument() {
        let argv: Vec<String> = ["/usr/bin/kvm", "-m", "512", "-smp", "2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(flag_value(&argv, "-m"), Some("512"));
        assert_eq!(flag_value(&argv, "-smp"), Some("2"));
        assert_eq!(flag_value(&argv, "-name"), None);
    }

    #[test]
    fn zero_resources_are_rejected() {
        let instance = Instance {
            name: "web1".into(),
            memory: 0,
            vcpus: 1,
            hvparams: HvParams::default(),
            nics: Vec::new(),
            disks: Vec::new(),
            warnings: Vec::new(),
        };
        assert!(matches!(
            validate_resources(&instance),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn scripts_that_cannot_be_removed_are_warned_about_not_listed() {
        let dir = tempdir().unwrap();
        let writer = NetScriptWriter::new(dir.path().join("no-override"), Some(dir.path().into()));
        let nic = Nic {
            mac: "aa:00:00:00:00:01".into(),
            ip: None,
            bridge: "xen-br0".into(),
        };
        let vanished = writer.write_script("web1", 0, &nic).unwrap();
        let kept = writer.write_script("web1", 1, &nic).unwrap();
        let kept_path = kept.path().to_path_buf();
        fs::remove_file(vanished.path()).unwrap();

        let mut events = Vec::new();
        let mut diagnostics = Vec::new();
        let mut reporter = ReporterProxy::new(None, &mut events);
        let removed = remove_scripts("web1", vec![vanished, kept], &mut reporter, &mut diagnostics);

        assert_eq!(removed, vec![kept_path.clone()]);
        assert!(!kept_path.exists());
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(events.len(), 1);
    }
}
