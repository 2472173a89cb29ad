//! Durable storage for the access/refresh credential pair.
//!
//! The pair is written as one unit so a login and a refresh racing each
//! other can never leave a new access credential next to a stale refresh
//! credential. Storage failures are logged and read back as "absent".

use crate::monitor_paths;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

pub trait CredentialStore: Send + Sync {
    /// Replaces both credentials.
    fn set(&self, access: &str, refresh: &str);
    fn get(&self) -> Option<String>;
    fn get_refresh(&self) -> Option<String>;
    fn clear(&self);

    /// Compare-and-set on the refresh credential. When it still equals
    /// `expected_refresh`, stores `access` next to it (or clears the pair
    /// for `None`) and returns true; otherwise the store is left untouched.
    fn replace_if_refresh(&self, expected_refresh: &str, access: Option<&str>) -> bool;

    /// Names the underlying storage. Stores with the same scope share one
    /// refresh-in-flight marker per process.
    fn scope(&self) -> String;
}

/// On-disk shape of `credentials.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

/// JSON file store guarded by an exclusive lock on a sibling lock file.
pub struct FileCredentialStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    /// Store at `~/.shift-monitor/credentials.json`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(monitor_paths::credentials_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoredPair {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return StoredPair::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read credentials");
                return StoredPair::default();
            }
        };
        match serde_json::from_str(&content) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt credentials file");
                StoredPair::default()
            }
        }
    }

    /// Runs `op` while holding the exclusive write lock.
    fn locked<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file: {}", self.lock_path.display()))?;
        lock_file
            .lock_exclusive()
            .context("Failed to lock credentials")?;

        let result = op();
        let _ = lock_file.unlock();
        result
    }

    fn remove_pair(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove: {}", self.path.display())),
        }
    }

    fn write_pair(&self, pair: &StoredPair) -> Result<()> {
        let content =
            serde_json::to_string_pretty(pair).context("Failed to serialize credentials")?;
        let temp_path = self.path.with_extension("json.tmp");

        fs::write(&temp_path, content).with_context(|| {
            format!(
                "Failed to write temp credentials file: {}",
                temp_path.display()
            )
        })?;
        restrict_permissions(&temp_path)?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to: {}", self.path.display()))
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to restrict permissions: {}", path.display()))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl CredentialStore for FileCredentialStore {
    fn set(&self, access: &str, refresh: &str) {
        let pair = StoredPair {
            access_token: non_empty(Some(access.to_string())),
            refresh_token: non_empty(Some(refresh.to_string())),
        };
        if let Err(e) = self.locked(|| self.write_pair(&pair)) {
            warn!(error = %e, "Failed to store credentials");
        }
    }

    fn get(&self) -> Option<String> {
        non_empty(self.read().access_token)
    }

    fn get_refresh(&self) -> Option<String> {
        non_empty(self.read().refresh_token)
    }

    fn clear(&self) {
        if let Err(e) = self.locked(|| self.remove_pair()) {
            warn!(error = %e, "Failed to clear credentials");
        }
    }

    fn replace_if_refresh(&self, expected_refresh: &str, access: Option<&str>) -> bool {
        let result = self.locked(|| {
            let current = non_empty(self.read().refresh_token);
            if current.as_deref() != Some(expected_refresh) {
                return Ok(false);
            }
            match access {
                Some(access) => self.write_pair(&StoredPair {
                    access_token: non_empty(Some(access.to_string())),
                    refresh_token: current,
                })?,
                None => self.remove_pair()?,
            }
            Ok(true)
        });
        result.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to update credentials");
            false
        })
    }

    fn scope(&self) -> String {
        format!("file:{}", self.path.display())
    }
}
