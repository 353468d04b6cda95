//! Backup Sinks
//!
//! Destructive migration steps copy the affected store aside before
//! touching it. A sink persists the snapshot and returns a receipt whose
//! timestamp predates the step that needed it. Restoring a snapshot is a
//! manual operation; the engine only guarantees the copy exists.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fichario_core::{FieldSpec, Record};

// =============================================================================
// Error
// =============================================================================

/// Errors from persisting a backup snapshot.
#[derive(Error, Debug)]
pub enum BackupError {
    /// The sink could not write the snapshot.
    #[error("backup write failed: {message}")]
    Io {
        /// What failed.
        message: String,
    },

    /// The snapshot could not be serialized.
    #[error("backup serialization failed: {message}")]
    Serialization {
        /// What failed.
        message: String,
    },
}

impl From<serde_json::Error> for BackupError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}

// =============================================================================
// Snapshot and Receipt
// =============================================================================

/// A point-in-time copy of one store: shape plus every record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSnapshot {
    /// Entity whose store was copied.
    pub entity: String,
    /// Snapshot time, RFC 3339.
    pub taken_at: String,
    /// Snapshot time in milliseconds since epoch.
    pub taken_at_ms: u64,
    /// The store's field list at snapshot time.
    pub fields: Vec<FieldSpec>,
    /// Every record, in insertion order.
    pub records: Vec<Record>,
}

/// Proof that a snapshot was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReceipt {
    /// Entity backed up.
    pub entity: String,
    /// Where the snapshot lives. A path for filesystem sinks.
    pub location: String,
    /// Snapshot time in milliseconds since epoch.
    pub taken_at_ms: u64,
    /// Records captured.
    pub record_count: usize,
}

// =============================================================================
// Sink Contract
// =============================================================================

/// Persists store snapshots ahead of destructive migration steps.
#[async_trait]
pub trait BackupSink: Send + Sync {
    /// Persist one snapshot and return its receipt.
    async fn write_snapshot(
        &self,
        snapshot: &BackupSnapshot,
    ) -> Result<BackupReceipt, BackupError>;
}

// =============================================================================
// FsBackupSink
// =============================================================================

/// Filesystem sink: one `<entity>.<ms>.json` document per snapshot.
#[derive(Debug)]
pub struct FsBackupSink {
    backup_dir: PathBuf,
}

impl FsBackupSink {
    /// Create the sink, creating `backup_dir` if needed.
    pub fn new(backup_dir: impl Into<PathBuf>) -> Result<Self, BackupError> {
        let backup_dir = backup_dir.into();
        fs::create_dir_all(&backup_dir).map_err(|e| BackupError::Io {
            message: format!("create {}: {e}", backup_dir.display()),
        })?;

        Ok(Self { backup_dir })
    }
}

#[async_trait]
impl BackupSink for FsBackupSink {
    #[tracing::instrument(skip(self, snapshot), fields(entity = %snapshot.entity))]
    async fn write_snapshot(
        &self,
        snapshot: &BackupSnapshot,
    ) -> Result<BackupReceipt, BackupError> {
        let file_name = format!("{}.{}.json", snapshot.entity, snapshot.taken_at_ms);
        let path = self.backup_dir.join(file_name);

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        fs::write(&path, bytes).map_err(|e| BackupError::Io {
            message: format!("write {}: {e}", path.display()),
        })?;

        tracing::info!(
            entity = %snapshot.entity,
            records = snapshot.records.len(),
            path = %path.display(),
            "backup snapshot written"
        );

        Ok(BackupReceipt {
            entity: snapshot.entity.clone(),
            location: path.display().to_string(),
            taken_at_ms: snapshot.taken_at_ms,
            record_count: snapshot.records.len(),
        })
    }
}

// =============================================================================
// SimBackupSink
// =============================================================================

/// In-memory sink for simulation tests. Snapshots stay inspectable.
#[derive(Debug, Default)]
pub struct SimBackupSink {
    snapshots: Mutex<Vec<BackupSnapshot>>,
}

impl SimBackupSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many snapshots have been written.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    /// Every snapshot written for `entity`, in write order.
    #[must_use]
    pub fn snapshots_for(&self, entity: &str) -> Vec<BackupSnapshot> {
        self.snapshots
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.entity == entity)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BackupSink for SimBackupSink {
    async fn write_snapshot(
        &self,
        snapshot: &BackupSnapshot,
    ) -> Result<BackupReceipt, BackupError> {
        let receipt = BackupReceipt {
            entity: snapshot.entity.clone(),
            location: format!("sim://{}/{}", snapshot.entity, snapshot.taken_at_ms),
            taken_at_ms: snapshot.taken_at_ms,
            record_count: snapshot.records.len(),
        };
        self.snapshots.lock().unwrap().push(snapshot.clone());

        Ok(receipt)
    }
}

// =============================================================================
// Tests
// =============================================================================
