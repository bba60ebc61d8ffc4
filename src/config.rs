use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::core::hostinfo::{DEFAULT_CPUINFO, DEFAULT_MEMINFO};
use crate::core::params::HvParams;
use crate::core::store::validate_key;
use crate::error::{Error, Result};

/// Environment variable naming the driver configuration file.
pub const CONFIG_ENV: &str = "KVMHV_CONFIG";

pub const DEFAULT_ROOT: &str = "/var/run/kvmhv";
pub const DEFAULT_KVM_PATH: &str = env!("KVMHV_DEFAULT_KVM_PATH");
pub const DEFAULT_VIF_OVERRIDE: &str = env!("KVMHV_DEFAULT_VIF_OVERRIDE");

/// Node-wide driver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// State root holding `pid/`, `ctrl/` and `lock/`.
    pub root: PathBuf,
    pub kvm_path: PathBuf,
    pub vif_override: PathBuf,
    /// Where NIC wiring scripts are created; `None` means the system temp directory.
    pub script_dir: Option<PathBuf>,
    pub meminfo: PathBuf,
    pub cpuinfo: PathBuf,
    pub shutdown: ShutdownTimeouts,
    pub lock: LockSettings,
    /// Non-fatal findings from loading the file.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownTimeouts {
    /// Connect/read/write timeout on the monitor socket.
    pub monitor: Duration,
    /// Wait after SIGTERM before escalating.
    pub sigterm_wait: Duration,
    /// Wait after SIGKILL before giving up.
    pub sigkill_wait: Duration,
    /// How long reboot waits for the guest to power off after a graceful request.
    pub graceful_wait: Duration,
}

impl Default for ShutdownTimeouts {
    fn default() -> Self {
        Self {
            monitor: Duration::from_secs(5),
            sigterm_wait: Duration::from_secs(5),
            sigkill_wait: Duration::from_secs(5),
            graceful_wait: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub retries: u32,
    pub interval: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            retries: 15,
            interval: Duration::from_millis(200),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            kvm_path: PathBuf::from(DEFAULT_KVM_PATH),
            vif_override: PathBuf::from(DEFAULT_VIF_OVERRIDE),
            script_dir: None,
            meminfo: PathBuf::from(DEFAULT_MEMINFO),
            cpuinfo: PathBuf::from(DEFAULT_CPUINFO),
            shutdown: ShutdownTimeouts::default(),
            lock: LockSettings::default(),
            warnings: Vec::new(),
        }
    }
}

impl DriverConfig {
    /// Defaults with a different state root.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn pid_dir(&self) -> PathBuf {
        self.root.join("pid")
    }

    pub fn ctrl_dir(&self) -> PathBuf {
        self.root.join("ctrl")
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.root.join("lock")
    }
}

/// Pick the configuration source: an explicit path, then `$KVMHV_CONFIG`, then
/// built-in defaults.
pub fn resolve_driver_config(explicit: Option<&Path>) -> Result<DriverConfig> {
    if let Some(path) = explicit {
        return load_driver_config(path);
    }
    match env::var_os(CONFIG_ENV) {
        Some(value) if !value.is_empty() => load_driver_config(Path::new(&value)),
        _ => Ok(DriverConfig::default()),
    }
}

pub fn load_driver_config(path: &Path) -> Result<DriverConfig> {
    let value = read_toml(path)?;
    let mut warnings = detect_unknown_driver_fields(&value);
    let raw = RawDriverConfig::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;
    raw.into_validated(path, &mut warnings)
}

fn read_toml(path: &Path) -> Result<toml::Value> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

fn invalid_config(path: &Path, message: impl Into<String>) -> Error {
    Error::InvalidConfig {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

fn detect_unknown_driver_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let sections: [(&str, &[&str]); 4] = [
        ("driver", &["root", "kvm_path", "vif_override", "script_dir"]),
        (
            "shutdown",
            &[
                "monitor_timeout_secs",
                "sigterm_wait_secs",
                "sigkill_wait_secs",
                "graceful_wait_secs",
            ],
        ),
        ("lock", &["retries", "interval_ms"]),
        ("host", &["meminfo", "cpuinfo"]),
    ];

    if let toml::Value::Table(table) = value {
        let allowed_root: Vec<&str> = sections.iter().map(|(name, _)| *name).collect();
        warn_table(table, &allowed_root, "root", &mut warnings);

        for (name, allowed) in sections {
            match table.get(name) {
                Some(toml::Value::Table(section)) => {
                    warn_table(section, allowed, &format!("[{name}]"), &mut warnings)
                }
                Some(_) => warnings.push(format!("Expected [{name}] to be a table.")),
                None => {}
            }
        }
    }

    warnings
}

fn warn_table(
    table: &toml::map::Map<String, toml::Value>,
    allowed: &[&str],
    context: &str,
    warnings: &mut Vec<String>,
) {
    for key in table.keys() {
        if !allowed.contains(&key.as_str()) {
            warnings.push(format!(
                "Unknown field `{key}` at {context}; this value will be ignored."
            ));
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawDriverConfig {
    #[serde(default)]
    driver: RawDriver,
    #[serde(default)]
    shutdown: RawShutdown,
    #[serde(default)]
    lock: RawLock,
    #[serde(default)]
    host: RawHost,
}

#[derive(Debug, Deserialize, Default)]
struct RawDriver {
    root: Option<PathBuf>,
    kvm_path: Option<PathBuf>,
    vif_override: Option<PathBuf>,
    script_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RawShutdown {
    monitor_timeout_secs: Option<u64>,
    sigterm_wait_secs: Option<u64>,
    sigkill_wait_secs: Option<u64>,
    graceful_wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLock {
    retries: Option<u32>,
    interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct RawHost {
    meminfo: Option<PathBuf>,
    cpuinfo: Option<PathBuf>,
}

impl RawDriverConfig {
    fn into_validated(self, path: &Path, warnings: &mut Vec<String>) -> Result<DriverConfig> {
        let defaults = DriverConfig::default();

        let root = self.driver.root.unwrap_or(defaults.root);
        if !root.is_absolute() {
            return Err(invalid_config(
                path,
                format!(
                    "`driver.root` must be an absolute path, got `{}`.",
                    root.display()
                ),
            ));
        }

        let monitor_secs = self.shutdown.monitor_timeout_secs.unwrap_or(5);
        if monitor_secs == 0 {
            return Err(invalid_config(
                path,
                "`shutdown.monitor_timeout_secs` must be at least 1.",
            ));
        }

        let retries = self.lock.retries.unwrap_or(defaults.lock.retries);
        if retries == 0 {
            warnings.push(
                "`lock.retries = 0` is treated as a single attempt.".to_string(),
            );
        }

        let default_shutdown = defaults.shutdown;
        let secs = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        Ok(DriverConfig {
            root,
            kvm_path: self.driver.kvm_path.unwrap_or(defaults.kvm_path),
            vif_override: self.driver.vif_override.unwrap_or(defaults.vif_override),
            script_dir: self.driver.script_dir,
            meminfo: self.host.meminfo.unwrap_or(defaults.meminfo),
            cpuinfo: self.host.cpuinfo.unwrap_or(defaults.cpuinfo),
            shutdown: ShutdownTimeouts {
                monitor: Duration::from_secs(monitor_secs),
                sigterm_wait: secs(self.shutdown.sigterm_wait_secs, default_shutdown.sigterm_wait),
                sigkill_wait: secs(self.shutdown.sigkill_wait_secs, default_shutdown.sigkill_wait),
                graceful_wait: secs(
                    self.shutdown.graceful_wait_secs,
                    default_shutdown.graceful_wait,
                ),
            },
            lock: LockSettings {
                retries,
                interval: self
                    .lock
                    .interval_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.lock.interval),
            },
            warnings: warnings.clone(),
        })
    }
}

/// One virtual network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nic {
    pub mac: String,
    /// Informational only; exported to the wiring script.
    pub ip: Option<String>,
    pub bridge: String,
}

/// A disk handed to the guest. The first one is the boot device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDevice {
    /// Name the orchestrator knows the disk by.
    pub logical: String,
    /// Host-side device or image path.
    pub path: PathBuf,
}

/// An instance definition as the orchestrator supplies it. The driver never
/// modifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub name: String,
    /// Memory in MiB.
    pub memory: u64,
    pub vcpus: u32,
    pub hvparams: HvParams,
    pub nics: Vec<Nic>,
    pub disks: Vec<BlockDevice>,
    pub warnings: Vec<String>,
}

pub fn load_instance(path: &Path) -> Result<Instance> {
    let value = read_toml(path)?;
    let mut warnings = detect_unknown_instance_fields(&value);
    let raw = RawInstance::deserialize(value).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })?;
    raw.into_validated(path, &mut warnings)
}

fn detect_unknown_instance_fields(value: &toml::Value) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(table) = value.as_table() else {
        return warnings;
    };

    warn_table(
        table,
        &["name", "memory", "vcpus", "hvparams", "nics", "disks"],
        "root",
        &mut warnings,
    );

    for (key, allowed) in [
        ("nics", &["mac", "ip", "bridge"][..]),
        ("disks", &["logical", "path"][..]),
    ] {
        match table.get(key) {
            Some(toml::Value::Array(entries)) => {
                for (idx, entry) in entries.iter().enumerate() {
                    if let toml::Value::Table(entry) = entry {
                        warn_table(entry, allowed, &format!("[[{key}]] #{idx}"), &mut warnings);
                    }
                }
            }
            Some(_) => warnings.push(format!("`{key}` must be an array of tables.")),
            None => {}
        }
    }

    warnings
}

#[derive(Debug, Deserialize)]
struct RawInstance {
    name: Option<String>,
    memory: Option<u64>,
    vcpus: Option<u32>,
    #[serde(default)]
    hvparams: Option<toml::Table>,
    #[serde(default)]
    nics: Vec<RawNic>,
    #[serde(default)]
    disks: Vec<RawDisk>,
}

#[derive(Debug, Deserialize)]
struct RawNic {
    mac: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    bridge: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawDisk {
    logical: Option<String>,
    path: Option<PathBuf>,
}

impl RawInstance {
    fn into_validated(self, path: &Path, warnings: &mut Vec<String>) -> Result<Instance> {
        let name = self.name.ok_or_else(|| {
            invalid_config(
                path,
                "Missing required field `name`. Example: `name = \"web1\"`.",
            )
        })?;
        validate_key(&name).map_err(|err| invalid_config(path, err.to_string()))?;

        let memory = self.memory.ok_or_else(|| {
            invalid_config(path, "Missing required field `memory` (MiB). Example: `memory = 512`.")
        })?;
        if memory == 0 {
            return Err(invalid_config(path, "`memory` must be at least 1 MiB."));
        }

        let vcpus = self.vcpus.unwrap_or(1);
        if vcpus == 0 {
            return Err(invalid_config(path, "`vcpus` must be at least 1."));
        }

        let hvparams = match self.hvparams {
            Some(table) => {
                let map = stringify_params(path, table)?;
                HvParams::from_map(&map).map_err(|err| invalid_config(path, err.to_string()))?
            }
            None => HvParams::default(),
        };

        let mut nics = Vec::with_capacity(self.nics.len());
        for (idx, raw) in self.nics.into_iter().enumerate() {
            let mac = raw.mac.ok_or_else(|| {
                invalid_config(path, format!("[[nics]] #{idx} is missing `mac`."))
            })?;
            let bridge = raw.bridge.ok_or_else(|| {
                invalid_config(path, format!("[[nics]] #{idx} is missing `bridge`."))
            })?;
            nics.push(Nic {
                mac,
                ip: raw.ip.filter(|ip| !ip.trim().is_empty()),
                bridge,
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let mut disks = Vec::with_capacity(self.disks.len());
        for (idx, raw) in self.disks.into_iter().enumerate() {
            let disk_path = raw.path.ok_or_else(|| {
                invalid_config(path, format!("[[disks]] #{idx} is missing `path`."))
            })?;
            disks.push(BlockDevice {
                logical: raw.logical.unwrap_or_else(|| format!("disk{idx}")),
                path: resolve_path(base, disk_path),
            });
        }
        if disks.is_empty() {
            warnings.push(format!(
                "Instance `{name}` defines no disks; the guest will have no boot device."
            ));
        }

        Ok(Instance {
            name,
            memory,
            vcpus,
            hvparams,
            nics,
            disks,
            warnings: warnings.clone(),
        })
    }
}

/// Hypervisor parameters travel as a flat string mapping.
fn stringify_params(path: &Path, table: toml::Table) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for (key, value) in table {
        let value = match value {
            toml::Value::String(text) => text,
            toml::Value::Boolean(flag) => flag.to_string(),
            toml::Value::Integer(number) => number.to_string(),
            other => {
                return Err(invalid_config(
                    path,
                    format!("`hvparams.{key}` must be a string or boolean, got {}.", other.type_str()),
                ));
            }
        };
        map.insert(key, value);
    }
    Ok(map)
}

fn resolve_path(base: &Path, input: PathBuf) -> PathBuf {
    if input.is_absolute() {
        input
    } else {
        base.join(input)
    }
}
