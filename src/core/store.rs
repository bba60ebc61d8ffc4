//! Keyed store behind the process registry.
//!
//! Registry state is a flat map from instance name to a small text value (a pid).
//! The lifecycle code only sees [`KeyedStore`], so the directory-of-files backend
//! can be replaced without touching it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub trait KeyedStore {
    /// Write `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Read the value under `key`, `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// All keys currently present, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Delete `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<()>;

    /// Filesystem location backing `key`, for stores whose entries are written by
    /// external processes (the hypervisor writes its own pidfile).
    fn path_of(&self, key: &str) -> Result<PathBuf>;
}

/// Rejects keys that would escape the store directory or cannot be file names.
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        Some("key must not be empty")
    } else if key == "." || key == ".." {
        Some("key must not be a relative directory reference")
    } else if key.contains('/') {
        Some("key must not contain `/`")
    } else if key.contains('\0') {
        Some("key must not contain NUL bytes")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// One plain file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open the store, creating the directory when it is missing.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| Error::StateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyedStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_of(key)?;
        fs::write(&path, value).map_err(|source| Error::PidFile { path, source })
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_of(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(Error::PidFile { path, source }),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|source| Error::StateDir {
            path: self.dir.clone(),
            source,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| Error::StateDir {
                path: self.dir.clone(),
                source,
            })?;
            let is_file = entry.file_type().map(|kind| kind.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_of(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::PidFile { path, source }),
        }
    }

    fn path_of(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}
