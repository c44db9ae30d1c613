//! Resumable-run checkpoints
//!
//! A single JSON document on disk holding the manifest offset, batch
//! counter and run totals. A malformed or missing file means "no
//! checkpoint", never a crash; deletion happens only on explicit request.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub offset: u64,
    pub batch_num: u64,
    pub total_processed: u64,
    pub total_failed: u64,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(offset: u64, batch_num: u64, total_processed: u64, total_failed: u64) -> Self {
        Self {
            offset,
            batch_num,
            total_processed,
            total_failed,
            timestamp: Utc::now(),
        }
    }
}

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Load the checkpoint, treating a missing or malformed file as none.
    pub fn load(&self) -> Option<Checkpoint> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "checkpoint_not_found");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint_read_failed");
                return None;
            }
        };

        match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => {
                info!(
                    path = %self.path.display(),
                    offset = checkpoint.offset,
                    batch_num = checkpoint.batch_num,
                    total_processed = checkpoint.total_processed,
                    "checkpoint_loaded"
                );
                Some(checkpoint)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint_malformed");
                None
            }
        }
    }

    /// Persist the checkpoint, creating parent directories on demand.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(checkpoint)?;
        std::fs::write(&self.path, content)?;

        debug!(
            path = %self.path.display(),
            offset = checkpoint.offset,
            batch_num = checkpoint.batch_num,
            "checkpoint_saved"
        );
        Ok(())
    }

    /// Remove the checkpoint file. Failures are logged, not surfaced.
    pub fn delete(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => info!(path = %self.path.display(), "checkpoint_deleted"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "checkpoint_delete_failed"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));

        assert!(store.load().is_none());

        let checkpoint = Checkpoint::new(300, 3, 300, 2);
        store.save(&checkpoint).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested/deeper/checkpoint.json"));
        store.save(&Checkpoint::new(0, 0, 0, 0)).unwrap();
        assert!(store.load().is_some());
    }

    #[test]
    fn malformed_file_is_treated_as_no_checkpoint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = CheckpointStore::new(&path);
        assert!(store.load().is_none());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        store.delete();
        store.save(&Checkpoint::new(1, 1, 1, 0)).unwrap();
        store.delete();
        assert!(store.load().is_none());
    }
}
