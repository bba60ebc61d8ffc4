use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::outcome::NodeInfo;

pub const DEFAULT_MEMINFO: &str = "/proc/meminfo";
pub const DEFAULT_CPUINFO: &str = "/proc/cpuinfo";

/// Reads host memory and CPU accounting.
#[derive(Debug, Clone)]
pub struct HostInspector {
    meminfo: PathBuf,
    cpuinfo: PathBuf,
}

impl Default for HostInspector {
    fn default() -> Self {
        Self::new(DEFAULT_MEMINFO, DEFAULT_CPUINFO)
    }
}

impl HostInspector {
    pub fn new(meminfo: impl Into<PathBuf>, cpuinfo: impl Into<PathBuf>) -> Self {
        Self {
            meminfo: meminfo.into(),
            cpuinfo: cpuinfo.into(),
        }
    }

    /// Any unreadable source fails the whole call; capacity is never guessed.
    pub fn node_info(&self) -> Result<NodeInfo> {
        let meminfo = read_source(&self.meminfo)?;
        let memory = parse_meminfo(&meminfo).map_err(|message| Error::NodeInfoUnavailable {
            path: self.meminfo.clone(),
            message,
        })?;
        let cpuinfo = read_source(&self.cpuinfo)?;

        Ok(NodeInfo {
            memory_total: memory.total,
            memory_free: memory.free,
            memory_used: memory.active,
            cpu_total: count_processors(&cpuinfo),
        })
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|err| Error::NodeInfoUnavailable {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MemoryCounters {
    total: u64,
    free: u64,
    active: Option<u64>,
}

/// Values are in kB on disk; each counter is converted to MiB on its own.
fn parse_meminfo(contents: &str) -> std::result::Result<MemoryCounters, String> {
    let mut total = None;
    let mut free = 0u64;
    let mut active = None;

    for line in contents.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        if !matches!(key, "MemTotal" | "MemFree" | "Buffers" | "Cached" | "Active") {
            continue;
        }
        let kib: u64 = rest
            .split_whitespace()
            .next()
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| format!("malformed `{key}` line: `{}`", line.trim()))?;
        let mib = kib / 1024;
        match key {
            "MemTotal" => total = Some(mib),
            "Active" => active = Some(mib),
            _ => free += mib,
        }
    }

    let total = total.ok_or_else(|| "no `MemTotal` entry".to_string())?;
    Ok(MemoryCounters {
        total,
        free,
        active,
    })
}

/// Counts `processor : <n>` entries, one per logical CPU.
fn count_processors(contents: &str) -> u32 {
    contents
        .lines()
        .filter(|line| {
            let Some((key, value)) = line.split_once(':') else {
                return false;
            };
            let value = value.trim();
            key.trim() == "processor"
                && !value.is_empty()
                && value.chars().all(|c| c.is_ascii_digit())
        })
        .count() as u32
}
