use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::diagnostics::Diagnostic;
use super::events::{Event, ShutdownOutcome};

/// Result wrapper returned by lifecycle operations.
pub type OperationResult<T> = crate::error::Result<OperationOutput<T>>;

/// Envelope for successful operation outcomes.
#[derive(Debug)]
pub struct OperationOutput<T> {
    /// Primary value produced by the operation.
    pub value: T,
    /// Diagnostics collected while performing the operation.
    pub diagnostics: Vec<Diagnostic>,
    /// Structured events captured during the run.
    pub events: Vec<Event>,
}

impl<T> OperationOutput<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            diagnostics: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<Diagnostic>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_events(mut self, events: Vec<Event>) -> Self {
        self.events = events;
        self
    }
}

/// Outcome of `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub instance: String,
    pub pid: i32,
    /// Wiring scripts handed to the hypervisor and removed afterwards. A script
    /// that could not be removed is left out and reported as a warning diagnostic.
    pub net_scripts: Vec<PathBuf>,
}

/// Outcome of `stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub instance: String,
    /// Pid that was running when the stop began.
    pub pid: Option<i32>,
    pub outcome: ShutdownOutcome,
    /// `false` when nothing was running.
    pub changed: bool,
}

/// Outcome of `reboot`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebootOutcome {
    pub stop: StopOutcome,
    pub start: StartOutcome,
}

/// Placeholder reported for instance state; the hypervisor exposes no scheduler state.
pub const INSTANCE_STATE_PLACEHOLDER: &str = "---b-";

/// Properties of a running instance, re-derived from the live process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceInfo {
    pub name: String,
    pub pid: i32,
    /// Memory in MiB.
    pub memory: u64,
    pub vcpus: u32,
    pub state: String,
    #[serde(serialize_with = "serialize_secs")]
    pub uptime: Duration,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(value.as_secs())
}

/// Host capacity, memory values in MiB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub memory_total: u64,
    pub memory_free: u64,
    /// Memory the host is actively using (the kernel's `Active` counter), when reported.
    pub memory_used: Option<u64>,
    pub cpu_total: u32,
}
