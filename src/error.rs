use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to start instance {instance}: already running")]
    AlreadyRunning { instance: String },
    #[error("Failed to start instance {instance}: {reason}{}", format_output(.output))]
    LaunchFailed {
        instance: String,
        reason: String,
        output: String,
    },
    #[error(
        "Failed to start instance {instance}: launcher exited successfully but no live process \
         was found via pidfile {pidfile}. A hypervisor process may have been left behind."
    )]
    LaunchUnverified { instance: String, pidfile: PathBuf },
    #[error("Failed to write network script for NIC #{nic} of instance {instance}: {source}")]
    NetScriptFailed {
        instance: String,
        nic: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to stop instance {instance} via monitor {socket}: {reason}")]
    GracefulShutdownFailed {
        instance: String,
        socket: PathBuf,
        reason: String,
    },
    #[error("Failed to terminate process {pid} of instance {instance}: {message}")]
    KillFailed {
        instance: String,
        pid: i32,
        message: String,
    },
    #[error("Invalid hypervisor parameter: {message}")]
    InvalidParameter { message: String },
    #[error("Failed to read node info from {path}: {message}")]
    NodeInfoUnavailable { path: PathBuf, message: String },
    #[error("Instance {instance} is not running")]
    NotFound { instance: String },
    #[error("Failed to inspect instance {instance} (pid {pid}): {source}")]
    InfoUnavailable {
        instance: String,
        pid: i32,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to prepare state directory {path}: {source}")]
    StateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to access pidfile {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid registry key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("Instance {instance} is locked by another operation ({path}); gave up after {attempts} attempts")]
    LockUnavailable {
        instance: String,
        path: PathBuf,
        attempts: u32,
    },
    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to read configuration file at {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Configuration at {path} could not be parsed: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration at {path} is invalid: {message}")]
    InvalidConfig { path: PathBuf, message: String },
}

impl Error {
    /// True for both launch failure kinds: the launcher failing outright and the
    /// launcher succeeding without a live process behind the pidfile.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, Self::LaunchFailed { .. } | Self::LaunchUnverified { .. })
    }

    /// Whether the caller can reasonably retry the same stop with `force`.
    pub fn is_retryable_with_force(&self) -> bool {
        matches!(self, Self::GracefulShutdownFailed { .. })
    }

    pub(crate) fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }
}

fn format_output(output: &str) -> String {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" ({trimmed})")
    }
}
