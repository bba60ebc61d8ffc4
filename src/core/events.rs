use std::path::PathBuf;

use super::diagnostics::Severity;

/// Structured event emitted while a lifecycle operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A textual progress update with a severity level.
    Message {
        /// Severity of the message.
        severity: Severity,
        /// Human-readable text.
        text: String,
    },
    /// A NIC wiring script was written ahead of launch.
    NetScriptWritten {
        /// Name of the instance.
        instance: String,
        /// Position of the NIC in the instance's NIC list.
        nic: usize,
        /// Temporary script location handed to the hypervisor.
        path: PathBuf,
    },
    /// A NIC wiring script was deleted.
    NetScriptRemoved {
        /// Name of the instance.
        instance: String,
        /// Script location that was removed.
        path: PathBuf,
    },
    /// The hypervisor launcher is about to be executed.
    LaunchRequested {
        /// Name of the instance.
        instance: String,
        /// Hypervisor binary.
        program: PathBuf,
        /// Number of arguments passed to it.
        arg_count: usize,
    },
    /// The hypervisor process was launched and verified through its pidfile.
    InstanceLaunched {
        /// Name of the instance.
        instance: String,
        /// Operating system process identifier.
        pid: i32,
    },
    /// A pidfile that no longer referenced a live process was removed.
    StalePidfileRemoved {
        /// Name of the instance.
        instance: String,
        /// Location of the removed pidfile.
        path: PathBuf,
    },
    /// Shutdown of an instance was requested.
    ShutdownRequested {
        /// Name of the instance.
        instance: String,
        /// Whether the caller asked for forced termination.
        force: bool,
    },
    /// `system_powerdown` was delivered over the monitor socket.
    PowerdownSent {
        /// Name of the instance.
        instance: String,
        /// Monitor socket used.
        socket: PathBuf,
    },
    /// A signal was sent to the hypervisor process.
    SignalSent {
        /// Name of the instance.
        instance: String,
        /// Process that received the signal.
        pid: i32,
        /// Signal that was sent.
        signal: ShutdownSignal,
    },
    /// Shutdown sequence finished.
    ShutdownComplete {
        /// Name of the instance.
        instance: String,
        /// How the sequence ended.
        outcome: ShutdownOutcome,
        /// `false` when the instance was not running to begin with.
        changed: bool,
    },
}

/// Signals used when terminating a hypervisor process directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Sigterm,
    Sigkill,
}

impl ShutdownSignal {
    pub fn describe(self) -> &'static str {
        match self {
            ShutdownSignal::Sigterm => "SIGTERM",
            ShutdownSignal::Sigkill => "SIGKILL",
        }
    }
}

/// How a stop request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The instance was not running; at most a stale pidfile was cleaned up.
    AlreadyStopped,
    /// Power-down was delivered to the guest, which has not exited yet.
    Requested,
    /// The guest powered itself off after the request.
    Graceful,
    /// The process was terminated with signals.
    Forced,
}

impl ShutdownOutcome {
    pub fn describe(self) -> &'static str {
        match self {
            ShutdownOutcome::AlreadyStopped => "already stopped",
            ShutdownOutcome::Requested => "power-down requested",
            ShutdownOutcome::Graceful => "stopped (graceful)",
            ShutdownOutcome::Forced => "stopped (forced)",
        }
    }

    /// Whether the process is known to be gone.
    pub fn is_stopped(self) -> bool {
        !matches!(self, ShutdownOutcome::Requested)
    }
}
