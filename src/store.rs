//! Control message persistence
//!
//! Remembers the identifier of the one control message so a restart
//! edits the existing message instead of posting a second one. Losing
//! the record is never fatal: the worst case is a duplicate message.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The single persisted record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceRecord {
    /// Platform identifier of the control message
    #[serde(rename = "messageId", default)]
    pub message_id: Option<String>,
}

impl SurfaceRecord {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
        }
    }
}

/// Trait for persisting the control message record
pub trait StateStore: Send + Sync {
    /// Save the record, replacing any previous one
    fn save(&self, record: &SurfaceRecord) -> Result<()>;

    /// Load the record (empty record when nothing was saved yet)
    fn load(&self) -> Result<SurfaceRecord>;
}

/// JSON file-based state store
///
/// Atomic writes via temp file + rename to prevent corruption.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    /// Create a new file state store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for FileStateStore {
    fn save(&self, record: &SurfaceRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record)?;
        let tmp_path = self.path.with_extension("tmp");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Persistence(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(&tmp_path, json).map_err(|e| {
            Error::Persistence(format!(
                "Failed to write state file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            Error::Persistence(format!(
                "Failed to rename state file {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), message_id = ?record.message_id, "State saved");
        Ok(())
    }

    fn load(&self) -> Result<SurfaceRecord> {
        if !self.path.exists() {
            return Ok(SurfaceRecord::default());
        }

        let json = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Persistence(format!(
                "Failed to read state file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let record: SurfaceRecord = serde_json::from_str(&json).map_err(|e| {
            Error::Persistence(format!(
                "Failed to parse state file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), message_id = ?record.message_id, "State loaded");
        Ok(record)
    }
}

/// In-memory state store for testing
#[derive(Default)]
pub struct MemoryStateStore {
    state: std::sync::RwLock<SurfaceRecord>,
}

impl MemoryStateStore {
    /// Create a store that already holds a record
    pub fn with_record(record: SurfaceRecord) -> Self {
        Self {
            state: std::sync::RwLock::new(record),
        }
    }
}

impl StateStore for MemoryStateStore {
    fn save(&self, record: &SurfaceRecord) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| Error::Persistence(format!("Failed to acquire state lock: {}", e)))?;
        *state = record.clone();
        Ok(())
    }

    fn load(&self) -> Result<SurfaceRecord> {
        let state = self
            .state
            .read()
            .map_err(|e| Error::Persistence(format!("Failed to acquire state lock: {}", e)))?;
        Ok(state.clone())
    }
}
