use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

use super::store::validate_key;

/// Exclusive advisory lock on one instance name, held for a single lifecycle
/// operation and released when dropped.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Try to take the lock up to `attempts` times, sleeping `interval` in between.
    pub fn acquire(lock_dir: &Path, instance: &str, attempts: u32, interval: Duration) -> Result<Self> {
        validate_key(instance)?;
        fs::create_dir_all(lock_dir).map_err(|source| Error::StateDir {
            path: lock_dir.to_path_buf(),
            source,
        })?;

        let path = lock_dir.join(instance);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| Error::Lock {
                path: path.clone(),
                source,
            })?;

        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match try_flock(&file) {
                Ok(true) => {
                    debug!(instance, attempt, "instance lock acquired");
                    return Ok(Self { file, path });
                }
                Ok(false) => {
                    if attempt < attempts {
                        thread::sleep(interval);
                    }
                }
                Err(source) => return Err(Error::Lock { path, source }),
            }
        }

        Err(Error::LockUnavailable {
            instance: instance.to_string(),
            path,
            attempts,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well; unlocking first keeps
        // the release independent of any duplicated descriptors.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

fn try_flock(file: &File) -> io::Result<bool> {
    let res = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if res == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(err)
    }
}
