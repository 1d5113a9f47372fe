//! Session persistence backends.
//!
//! The persisted shape mirrors the four keys the portal frontend keeps:
//! `access_token`, `refresh_token`, `user_role` and `user_info`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Profile;

/// On-disk/in-memory representation of a session.
///
/// Every field is optional so partially written or older files still load.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_info: Option<Value>,
}

impl PersistedSession {
    /// Returns the stored profile, or an empty one if it is missing or not an object.
    pub fn profile(&self) -> Profile {
        match &self.user_info {
            Some(Value::Object(map)) => map.clone(),
            _ => Profile::new(),
        }
    }
}

/// Storage for the session tokens.
pub trait SessionBackend: Send {
    /// Reads the persisted session. A missing store yields the default.
    ///
    /// # Errors
    /// Returns an error if the store exists but cannot be read.
    fn load(&self) -> Result<PersistedSession>;

    /// Replaces the persisted session.
    ///
    /// # Errors
    /// Returns an error if the session cannot be written.
    fn save(&mut self, session: &PersistedSession) -> Result<()>;

    /// Removes every persisted copy.
    ///
    /// # Errors
    /// Returns an error if the persisted copy cannot be removed.
    fn clear(&mut self) -> Result<()>;
}

/// Long-lived storage in a JSON file with restricted permissions (0600).
///
/// Tokens are never logged or displayed in full.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<PersistedSession> {
        if !self.path.exists() {
            return Ok(PersistedSession::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session from {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(PersistedSession::default());
        }

        // A corrupt file means the user has to log in again, not a hard failure.
        match serde_json::from_str(&contents) {
            Ok(session) => Ok(session),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "ignoring unreadable session file: {err}"
                );
                Ok(PersistedSession::default())
            }
        }
    }

    fn save(&mut self, session: &PersistedSession) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;

        // Write aside, then rename over the old file.
        let tmp_path = self.path.with_extension("json.tmp");
        let mut file = open_private(&tmp_path)
            .with_context(|| format!("Failed to open {} for writing", tmp_path.display()))?;
        file.write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .with_context(|| format!("Failed to write to {}", tmp_path.display()))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                self.path.display()
            )
        })
    }

    fn clear(&mut self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove session {}", self.path.display())),
        }
    }
}

/// Opens `path` for writing, readable by the owner only on unix.
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}

/// Session-scoped storage that lives as long as the process.
///
/// Clones share the same slot, which lets a test "reload" a store.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    slot: Arc<Mutex<Option<PersistedSession>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<PersistedSession> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(slot.clone().unwrap_or_default())
    }

    fn save(&mut self, session: &PersistedSession) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(session.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
        Ok(())
    }
}
