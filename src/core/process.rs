//! OS process helpers: liveness, pidfile parsing, termination, argv probing.

use std::fs;
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use libc::{self, pid_t};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parse pidfile contents. Empty or non-numeric contents yield `None`.
pub fn parse_pid(contents: &str) -> Option<pid_t> {
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<pid_t>().ok().filter(|pid| *pid > 0)
}

/// Whether `pid` refers to a live process. Zombies count as dead: they are
/// waiting to be reaped and will never run again.
pub fn is_process_alive(pid: pid_t) -> bool {
    if pid <= 0 {
        return false;
    }

    let res = unsafe { libc::kill(pid, 0) };
    if res != 0 {
        let errno = io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or_default();
        // EPERM means the process exists but belongs to someone else.
        if errno != libc::EPERM {
            return false;
        }
    }

    !is_zombie(pid)
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: pid_t) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The command name is parenthesised and may itself contain spaces or parens.
    stat.rfind(')')
        .and_then(|idx| stat[idx + 1..].split_whitespace().next())
        .is_some_and(|state| state == "Z")
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: pid_t) -> bool {
    false
}

/// Send `signal` to `pid`. `Ok(false)` means the process was already gone.
pub fn send_signal(pid: pid_t, signal: libc::c_int) -> io::Result<bool> {
    let res = unsafe { libc::kill(pid, signal) };
    if res == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(false)
    } else {
        Err(err)
    }
}

/// Poll until `pid` exits or `timeout` elapses. Returns whether it exited.
pub fn wait_for_process_exit(pid: pid_t, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        if !is_process_alive(pid) {
            return true;
        }
        if start.elapsed() >= timeout {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

/// Time elapsed since the pidfile was last written, a proxy for process uptime.
pub fn pidfile_age(pidfile: &Path) -> Option<Duration> {
    let modified = fs::metadata(pidfile).ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

/// Capability for inspecting a live process.
///
/// Instance properties are re-derived from the process itself on every query;
/// this seam lets a platform supply them from a cheaper source than argv.
pub trait ProcessProbe {
    /// The argument vector the process was started with.
    fn command_line(&self, pid: pid_t) -> io::Result<Vec<String>>;
}

/// Reads argument vectors from `/proc/<pid>/cmdline`.
#[derive(Debug, Clone, Default)]
pub struct ProcfsProbe;

impl ProcessProbe for ProcfsProbe {
    fn command_line(&self, pid: pid_t) -> io::Result<Vec<String>> {
        let raw = fs::read(format!("/proc/{pid}/cmdline"))?;
        Ok(split_cmdline(&raw))
    }
}

fn split_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|byte| *byte == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect()
}
