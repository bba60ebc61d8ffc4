use std::error::Error;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::os::unix::fs::PermissionsExt;
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use libc::pid_t;
use tempfile::TempDir;

use kvmhv::core::lock::InstanceLock;
use kvmhv::core::{
    Driver, Event, FileStore, HvParams, ProcessProbe, Reporter, ShutdownOutcome, ShutdownSignal,
};
use kvmhv::{BlockDevice, DriverConfig, Error as DriverError, Instance, LockSettings, Nic};

type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Stand-in for the hypervisor binary. It records its argv, notes which wiring
/// scripts were executable at launch time, backgrounds a long sleep and writes
/// that pid to the `-pidfile` target. Marker files in the log directory switch
/// on failure modes.
const FAKE_KVM: &str = r#"#!/bin/sh
log="__LOG__"
pidfile=""
name=""
prev=""
for arg in "$@"; do
  case "$prev" in
    -pidfile) pidfile="$arg" ;;
    -name) name="$arg" ;;
  esac
  case "$arg" in
    tap,script=*)
      script="${arg#tap,script=}"
      if [ -x "$script" ]; then echo "$script" >> "$log/$name.scripts"; fi
      ;;
  esac
  prev="$arg"
done
printf '%s\n' "$@" > "$log/$name.argv"

if [ -e "$log/fail" ]; then
  echo "could not open disk image" >&2
  exit 1
fi
if [ -e "$log/nopid" ]; then
  exit 0
fi

if [ -e "$log/ignore-term" ]; then
  sh -c 'trap "" TERM; while :; do sleep 1; done' </dev/null >/dev/null 2>&1 &
else
  sleep 300 </dev/null >/dev/null 2>&1 &
fi
pid=$!
printf '%s\n' "$@" > "$log/$pid.argv"
echo "$pid" > "$pidfile"
exit 0
"#;

/// Serves argv recorded by the fake hypervisor, keyed by pid.
#[derive(Debug, Clone)]
struct RecordedProbe {
    log: PathBuf,
}

impl ProcessProbe for RecordedProbe {
    fn command_line(&self, pid: pid_t) -> io::Result<Vec<String>> {
        let raw = fs::read_to_string(self.log.join(format!("{pid}.argv")))?;
        Ok(raw.lines().map(str::to_string).collect())
    }
}

#[derive(Default)]
struct Collector(Vec<Event>);

impl Reporter for Collector {
    fn report(&mut self, event: Event) {
        self.0.push(event);
    }
}

struct Harness {
    _tempdir: TempDir,
    log: PathBuf,
    scripts: PathBuf,
    kernel: PathBuf,
    driver: Driver<FileStore, RecordedProbe>,
}

impl Harness {
    fn new() -> TestResult<Self> {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut DriverConfig)) -> TestResult<Self> {
        let tempdir = TempDir::new()?;
        let base = tempdir.path().to_path_buf();
        let log = base.join("log");
        let scripts = base.join("scripts");
        fs::create_dir_all(&log)?;
        fs::create_dir_all(&scripts)?;

        let kvm = base.join("fake-kvm");
        fs::write(&kvm, FAKE_KVM.replace("__LOG__", &log.display().to_string()))?;
        fs::set_permissions(&kvm, fs::Permissions::from_mode(0o755))?;

        let kernel = base.join("vmlinuz");
        fs::write(&kernel, b"kernel")?;

        let meminfo = base.join("meminfo");
        fs::write(
            &meminfo,
            "MemTotal: 4194304 kB\nMemFree: 524288 kB\nBuffers: 262144 kB\nCached: 262144 kB\nActive: 2097152 kB\n",
        )?;
        let cpuinfo = base.join("cpuinfo");
        fs::write(&cpuinfo, "processor\t: 0\nprocessor\t: 1\n")?;

        let mut config = DriverConfig::with_root(base.join("root"));
        config.kvm_path = kvm;
        config.vif_override = base.join("no-vif-override");
        config.script_dir = Some(scripts.clone());
        config.meminfo = meminfo;
        config.cpuinfo = cpuinfo;
        config.shutdown.monitor = Duration::from_secs(1);
        config.shutdown.sigterm_wait = Duration::from_secs(2);
        config.shutdown.sigkill_wait = Duration::from_secs(2);
        config.shutdown.graceful_wait = Duration::from_secs(5);
        config.lock = LockSettings {
            retries: 2,
            interval: Duration::from_millis(10),
        };
        adjust(&mut config);

        let store = FileStore::open(config.pid_dir())?;
        let driver = Driver::with_parts(config, store, RecordedProbe { log: log.clone() })?;

        Ok(Self {
            _tempdir: tempdir,
            log,
            scripts,
            kernel,
            driver,
        })
    }

    fn instance(&self, name: &str, nics: usize, acpi: bool) -> Instance {
        Instance {
            name: name.to_string(),
            memory: 512,
            vcpus: 2,
            hvparams: HvParams {
                kernel_path: Some(self.kernel.clone()),
                initrd_path: None,
                acpi,
            },
            nics: (0..nics)
                .map(|idx| Nic {
                    mac: format!("aa:00:00:00:00:{:02x}", idx + 1),
                    ip: None,
                    bridge: "xen-br0".to_string(),
                })
                .collect(),
            disks: vec![
                BlockDevice {
                    logical: "sda".into(),
                    path: format!("/dev/vg/{name}.disk0").into(),
                },
                BlockDevice {
                    logical: "sdb".into(),
                    path: format!("/dev/vg/{name}.disk1").into(),
                },
            ],
            warnings: Vec::new(),
        }
    }

    fn marker(&self, name: &str) -> TestResult {
        fs::write(self.log.join(name), b"")?;
        Ok(())
    }

    fn recorded_argv(&self, name: &str) -> Option<Vec<String>> {
        let raw = fs::read_to_string(self.log.join(format!("{name}.argv"))).ok()?;
        Some(raw.lines().map(str::to_string).collect())
    }

    fn recorded_scripts(&self, name: &str) -> Vec<PathBuf> {
        fs::read_to_string(self.log.join(format!("{name}.scripts")))
            .map(|raw| raw.lines().map(PathBuf::from).collect())
            .unwrap_or_default()
    }

    fn leftover_scripts(&self) -> usize {
        fs::read_dir(&self.scripts).map(|dir| dir.count()).unwrap_or(0)
    }

    fn pidfile(&self, name: &str) -> PathBuf {
        self.driver.config().pid_dir().join(name)
    }

    fn running(&self, name: &str) -> bool {
        self.driver.registry().is_running(name).unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        // Do not leave sleepers behind when an assertion fails mid-test.
        if let Ok(names) = self.driver.registry().list_running() {
            for name in names {
                if let Ok(Some(pid)) = self.driver.registry().running_pid(&name) {
                    unsafe {
                        libc::kill(pid, libc::SIGKILL);
                    }
                }
            }
        }
    }
}

fn dead_pid() -> pid_t {
    let mut child = std::process::Command::new("true").spawn().unwrap();
    let pid = child.id() as pid_t;
    child.wait().unwrap();
    pid
}

#[test]
fn never_started_instance_is_not_running_and_stop_is_a_noop() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);

    assert!(!h.running("web1"));
    let output = h.driver.stop(&web1, false, None)?;
    assert!(!output.value.changed);
    assert_eq!(output.value.pid, None);
    assert_eq!(output.value.outcome, ShutdownOutcome::AlreadyStopped);
    Ok(())
}

#[test]
fn start_then_second_start_is_rejected() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);

    let started = h.driver.start(&web1, &web1.disks, None)?;
    let pid = started.value.pid;
    assert!(h.running("web1"));
    assert_eq!(
        fs::read_to_string(h.pidfile("web1"))?.trim(),
        pid.to_string()
    );

    match h.driver.start(&web1, &web1.disks, None) {
        Err(DriverError::AlreadyRunning { instance }) => assert_eq!(instance, "web1"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
    assert_eq!(h.driver.registry().running_pid("web1")?, Some(pid));

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn wiring_scripts_exist_at_launch_and_are_gone_afterwards() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 2, true);

    let mut collector = Collector::default();
    let started = h.driver.start(&web1, &web1.disks, Some(&mut collector))?;

    let seen = h.recorded_scripts("web1");
    assert_eq!(seen.len(), 2);
    assert_eq!(seen, started.value.net_scripts);
    assert!(seen.iter().all(|path| !path.exists()));
    assert_eq!(h.leftover_scripts(), 0);

    let argv = h.recorded_argv("web1").expect("launcher was invoked");
    let nets: Vec<&str> = argv
        .windows(2)
        .filter(|pair| pair[0] == "-net")
        .map(|pair| pair[1].as_str())
        .collect();
    assert_eq!(nets.len(), 4);
    assert_eq!(nets[0], "nic,macaddr=aa:00:00:00:00:01,model=virtio");
    assert!(nets[1].starts_with("tap,script="));
    assert_eq!(nets[2], "nic,macaddr=aa:00:00:00:00:02,model=virtio");
    assert!(nets[3].starts_with("tap,script="));

    let drives: Vec<&String> = argv
        .windows(2)
        .filter(|pair| pair[0] == "-drive")
        .map(|pair| &pair[1])
        .collect();
    assert_eq!(drives.len(), 2);
    assert!(drives[0].ends_with(",boot=on"));
    assert!(!drives[1].contains("boot=on"));

    let removed = collector
        .0
        .iter()
        .filter(|event| matches!(event, Event::NetScriptRemoved { .. }))
        .count();
    assert_eq!(removed, 2);
    assert_eq!(collector.0, started.events);

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn force_stop_removes_pidfile_with_acpi_enabled() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);
    let pid = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    let stopped = h.driver.stop(&web1, true, None)?;
    assert!(stopped.value.changed);
    assert_eq!(stopped.value.pid, Some(pid));
    assert_eq!(stopped.value.outcome, ShutdownOutcome::Forced);
    assert!(!h.pidfile("web1").exists());
    assert!(!h.running("web1"));
    Ok(())
}

#[test]
fn acpi_disabled_stop_behaves_like_force() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, false);
    h.driver.start(&web1, &web1.disks, None)?;

    let argv = h.recorded_argv("web1").expect("launcher was invoked");
    assert!(argv.iter().any(|arg| arg == "-no-acpi"));

    let stopped = h.driver.stop(&web1, false, None)?;
    assert_eq!(stopped.value.outcome, ShutdownOutcome::Forced);
    assert!(!h.pidfile("web1").exists());
    assert!(
        stopped
            .events
            .iter()
            .all(|event| !matches!(event, Event::PowerdownSent { .. }))
    );
    Ok(())
}

#[test]
fn unreachable_monitor_is_not_downgraded_to_kill() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);
    let pid = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    let err = h.driver.stop(&web1, false, None).unwrap_err();
    assert!(matches!(err, DriverError::GracefulShutdownFailed { .. }));
    assert!(err.is_retryable_with_force());
    assert_eq!(h.driver.registry().running_pid("web1")?, Some(pid));

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn busy_monitor_fails_graceful_stop_within_the_timeout() -> TestResult {
    let h = Harness::with_config(|config| {
        config.shutdown.monitor = Duration::from_millis(200);
    })?;
    let web1 = h.instance("web1", 0, true);
    let pid = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    // A monitor that never accepts and whose queue is already full.
    let socket = h.driver.control_paths("web1").monitor;
    let listener = UnixListener::bind(&socket)?;
    assert_eq!(unsafe { libc::listen(listener.as_raw_fd(), 0) }, 0);
    let _queued = UnixStream::connect(&socket)?;

    let started = Instant::now();
    let err = h.driver.stop(&web1, false, None).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    assert!(matches!(err, DriverError::GracefulShutdownFailed { .. }));
    assert_eq!(h.driver.registry().running_pid("web1")?, Some(pid));

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

/// Accept one monitor connection, check the command and then "power off" the
/// guest by killing its process.
fn fake_monitor(socket: &Path, pid: pid_t) -> TestResult<thread::JoinHandle<String>> {
    let listener = UnixListener::bind(socket)?;
    Ok(thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        unsafe {
            libc::kill(pid, libc::SIGKILL);
        }
        line
    }))
}

#[test]
fn graceful_stop_sends_powerdown_over_monitor() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);
    let pid = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    let monitor = fake_monitor(&h.driver.control_paths("web1").monitor, pid)?;
    let stopped = h.driver.stop(&web1, false, None)?;
    assert_eq!(monitor.join().unwrap(), "system_powerdown\n");

    assert!(stopped.value.changed);
    assert!(matches!(
        stopped.value.outcome,
        ShutdownOutcome::Requested | ShutdownOutcome::Graceful
    ));
    assert!(
        stopped
            .events
            .iter()
            .any(|event| matches!(event, Event::PowerdownSent { .. }))
    );

    // A follow-up stop observes the exit and cleans up.
    thread::sleep(Duration::from_millis(200));
    h.driver.stop(&web1, false, None)?;
    assert!(!h.pidfile("web1").exists());
    Ok(())
}

#[test]
fn reboot_waits_for_power_off_and_starts_a_new_process() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 1, true);
    let first = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    let monitor = fake_monitor(&h.driver.control_paths("web1").monitor, first)?;
    let rebooted = h.driver.reboot(&web1, None)?;
    monitor.join().unwrap();

    assert_eq!(rebooted.value.stop.outcome, ShutdownOutcome::Graceful);
    assert_eq!(rebooted.value.stop.pid, Some(first));
    assert_ne!(rebooted.value.start.pid, first);
    assert!(h.running("web1"));
    assert_eq!(h.leftover_scripts(), 0);

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn reboot_with_acpi_disabled_yields_a_different_pid() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, false);
    let first = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    let rebooted = h.driver.reboot(&web1, None)?;
    assert_eq!(rebooted.value.stop.outcome, ShutdownOutcome::Forced);
    assert_ne!(rebooted.value.start.pid, first);
    assert!(h.running("web1"));

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn reboot_gives_up_when_guest_ignores_powerdown() -> TestResult {
    let h = Harness::with_config(|config| {
        config.shutdown.graceful_wait = Duration::from_millis(300);
    })?;
    let web1 = h.instance("web1", 0, true);
    let pid = h.driver.start(&web1, &web1.disks, None)?.value.pid;

    let listener = UnixListener::bind(h.driver.control_paths("web1").monitor)?;
    let monitor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut line = String::new();
        BufReader::new(stream).read_line(&mut line).unwrap();
        line
    });

    let err = h.driver.reboot(&web1, None).unwrap_err();
    monitor.join().unwrap();
    assert!(matches!(err, DriverError::GracefulShutdownFailed { .. }));
    assert_eq!(h.driver.registry().running_pid("web1")?, Some(pid));

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn sigterm_resistant_process_is_killed() -> TestResult {
    let h = Harness::with_config(|config| {
        config.shutdown.sigterm_wait = Duration::from_millis(300);
    })?;
    h.marker("ignore-term")?;
    let web1 = h.instance("web1", 0, true);
    h.driver.start(&web1, &web1.disks, None)?;

    let stopped = h.driver.stop(&web1, true, None)?;
    let signals: Vec<ShutdownSignal> = stopped
        .events
        .iter()
        .filter_map(|event| match event {
            Event::SignalSent { signal, .. } => Some(*signal),
            _ => None,
        })
        .collect();
    assert_eq!(signals, vec![ShutdownSignal::Sigterm, ShutdownSignal::Sigkill]);
    assert!(!h.running("web1"));
    Ok(())
}

#[test]
fn launcher_failure_reports_output_and_leaves_no_scripts() -> TestResult {
    let h = Harness::new()?;
    h.marker("fail")?;
    let web1 = h.instance("web1", 2, true);

    match h.driver.start(&web1, &web1.disks, None) {
        Err(DriverError::LaunchFailed { output, .. }) => {
            assert!(output.contains("could not open disk image"));
        }
        other => panic!("expected LaunchFailed, got {other:?}"),
    }
    assert_eq!(h.recorded_scripts("web1").len(), 2);
    assert_eq!(h.leftover_scripts(), 0);
    assert!(!h.running("web1"));
    Ok(())
}

#[test]
fn launcher_without_live_process_is_unverified() -> TestResult {
    let h = Harness::new()?;
    h.marker("nopid")?;
    let web1 = h.instance("web1", 1, true);

    let err = h.driver.start(&web1, &web1.disks, None).unwrap_err();
    assert!(matches!(err, DriverError::LaunchUnverified { .. }));
    assert!(err.is_launch_failure());
    assert_eq!(h.leftover_scripts(), 0);
    Ok(())
}

#[test]
fn invalid_kernel_never_reaches_the_launcher() -> TestResult {
    let h = Harness::new()?;

    let mut relative = h.instance("web1", 1, true);
    relative.hvparams.kernel_path = Some(PathBuf::from("vmlinuz"));
    assert!(matches!(
        h.driver.start(&relative, &relative.disks, None),
        Err(DriverError::InvalidParameter { .. })
    ));

    let mut missing = h.instance("web1", 1, true);
    missing.hvparams.kernel_path = Some(h.kernel.with_file_name("missing-vmlinuz"));
    assert!(<Driver>::validate_syntax(&missing.hvparams).is_ok());
    assert!(<Driver>::validate_runtime(&missing.hvparams).is_err());
    assert!(matches!(
        h.driver.start(&missing, &missing.disks, None),
        Err(DriverError::InvalidParameter { .. })
    ));

    assert!(h.recorded_argv("web1").is_none());
    assert_eq!(h.leftover_scripts(), 0);
    Ok(())
}

#[test]
fn stale_pidfile_is_ignored_by_queries_and_removed_by_stop() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);
    fs::write(h.pidfile("web1"), format!("{}\n", dead_pid()))?;

    assert!(!h.running("web1"));
    assert!(h.driver.list_all()?.is_empty());
    assert!(matches!(
        h.driver.get_info("web1"),
        Err(DriverError::NotFound { .. })
    ));
    assert!(h.pidfile("web1").exists());

    let stopped = h.driver.stop(&web1, false, None)?;
    assert!(!stopped.value.changed);
    assert!(!h.pidfile("web1").exists());
    assert!(
        stopped
            .events
            .iter()
            .any(|event| matches!(event, Event::StalePidfileRemoved { .. }))
    );
    Ok(())
}

#[test]
fn binary_pidfile_is_stale_and_cleaned_up_by_stop() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);
    let web2 = h.instance("web2", 0, true);
    fs::write(h.pidfile("web1"), [0xff, 0xfe, 0x00])?;
    h.driver.start(&web2, &web2.disks, None)?;

    assert!(!h.running("web1"));
    let listed: Vec<String> = h.driver.list_all()?.into_iter().map(|info| info.name).collect();
    assert_eq!(listed, vec!["web2"]);

    let stopped = h.driver.stop(&web1, false, None)?;
    assert!(!stopped.value.changed);
    assert!(!h.pidfile("web1").exists());

    h.driver.stop(&web2, true, None)?;
    Ok(())
}

#[test]
fn start_replaces_a_stale_pidfile() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 0, true);
    fs::write(h.pidfile("web1"), "garbage")?;

    let started = h.driver.start(&web1, &web1.disks, None)?;
    assert!(h.running("web1"));
    assert!(
        started
            .events
            .iter()
            .any(|event| matches!(event, Event::StalePidfileRemoved { .. }))
    );

    h.driver.stop(&web1, true, None)?;
    Ok(())
}

#[test]
fn info_and_listing_reflect_the_live_process() -> TestResult {
    let h = Harness::new()?;
    let web2 = h.instance("web2", 0, true);
    let mut web1 = h.instance("web1", 1, true);
    web1.memory = 1024;
    web1.vcpus = 4;
    let pid1 = h.driver.start(&web1, &web1.disks, None)?.value.pid;
    h.driver.start(&web2, &web2.disks, None)?;

    let info = h.driver.get_info("web1")?;
    assert_eq!(info.pid, pid1);
    assert_eq!(info.memory, 1024);
    assert_eq!(info.vcpus, 4);
    assert_eq!(info.state, "---b-");

    let listed: Vec<String> = h.driver.list_all()?.into_iter().map(|i| i.name).collect();
    assert_eq!(listed, vec!["web1".to_string(), "web2".to_string()]);

    h.driver.stop(&web1, true, None)?;
    let listed: Vec<String> = h.driver.list_all()?.into_iter().map(|i| i.name).collect();
    assert_eq!(listed, vec!["web2".to_string()]);

    h.driver.stop(&web2, true, None)?;
    Ok(())
}

#[test]
fn held_lock_blocks_lifecycle_operations() -> TestResult {
    let h = Harness::new()?;
    let web1 = h.instance("web1", 1, true);
    let _held = InstanceLock::acquire(
        &h.driver.config().lock_dir(),
        "web1",
        1,
        Duration::from_millis(1),
    )?;

    assert!(matches!(
        h.driver.start(&web1, &web1.disks, None),
        Err(DriverError::LockUnavailable { attempts: 2, .. })
    ));
    assert!(h.recorded_argv("web1").is_none());

    let other = h.instance("web2", 0, false);
    h.driver.start(&other, &other.disks, None)?;
    h.driver.stop(&other, true, None)?;
    Ok(())
}

#[test]
fn node_info_verify_and_console() -> TestResult {
    let h = Harness::new()?;
    let node = h.driver.node_info()?;
    assert_eq!(node.memory_total, 4096);
    assert_eq!(node.memory_free, 1024);
    assert_eq!(node.memory_used, Some(2048));
    assert_eq!(node.cpu_total, 2);

    assert_eq!(h.driver.verify(), None);
    let serial = h.driver.control_paths("web1").serial;
    assert_eq!(
        h.driver.console_command("web1"),
        format!(
            "socat STDIO,raw,echo=0,escape=0x1d UNIX-CONNECT:{}",
            serial.display()
        )
    );

    let broken = Harness::with_config(|config| {
        config.kvm_path = PathBuf::from("/nonexistent/kvm");
    })?;
    let problem = broken.driver.verify().expect("missing binary is reported");
    assert!(problem.contains("/nonexistent/kvm"));
    Ok(())
}

#[test]
fn driver_creates_state_layout() -> TestResult {
    let h = Harness::new()?;
    let config = h.driver.config();
    assert!(config.pid_dir().is_dir());
    assert!(config.ctrl_dir().is_dir());
    assert!(config.lock_dir().is_dir());
    Ok(())
}
