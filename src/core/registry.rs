use std::path::PathBuf;

use libc::pid_t;
use tracing::debug;

use crate::error::Result;

use super::process::{is_process_alive, parse_pid};
use super::store::KeyedStore;

/// What the registry knows about one instance, re-read from disk on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PidState {
    /// No pidfile.
    Absent,
    /// Pidfile exists but is empty, malformed, or names a dead process.
    Stale,
    /// Pidfile names a live process.
    Running { pid: pid_t },
}

/// Instance name → hypervisor process, backed by pidfiles.
///
/// Nothing is cached: each query goes back to the store and the OS.
#[derive(Debug, Clone)]
pub struct ProcessRegistry<S> {
    store: S,
}

impl<S: KeyedStore> ProcessRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Where the hypervisor should write the pidfile for `name`.
    pub fn pidfile_path(&self, name: &str) -> Result<PathBuf> {
        self.store.path_of(name)
    }

    pub fn state(&self, name: &str) -> Result<PidState> {
        let Some(contents) = self.store.get(name)? else {
            return Ok(PidState::Absent);
        };
        match parse_pid(&contents) {
            Some(pid) if is_process_alive(pid) => Ok(PidState::Running { pid }),
            Some(pid) => {
                debug!(instance = name, pid, "pidfile references a dead process");
                Ok(PidState::Stale)
            }
            None => {
                debug!(instance = name, "pidfile is empty or malformed");
                Ok(PidState::Stale)
            }
        }
    }

    pub fn running_pid(&self, name: &str) -> Result<Option<pid_t>> {
        match self.state(name)? {
            PidState::Running { pid } => Ok(Some(pid)),
            PidState::Absent | PidState::Stale => Ok(None),
        }
    }

    pub fn is_running(&self, name: &str) -> Result<bool> {
        Ok(self.running_pid(name)?.is_some())
    }

    /// Names whose pidfile references a live process. Stale entries are skipped
    /// but left in place; only stop paths delete them.
    pub fn list_running(&self) -> Result<Vec<String>> {
        let mut running = Vec::new();
        for name in self.store.list()? {
            if self.is_running(&name)? {
                running.push(name);
            }
        }
        Ok(running)
    }

    /// Delete the pidfile for `name`; absent pidfiles are fine.
    pub fn remove(&self, name: &str) -> Result<()> {
        self.store.remove(name)
    }
}
