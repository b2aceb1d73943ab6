//! Last-sync instant and the "dirty since last sync" flag.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::util::write_file_atomically;
use crate::{Error, Result};

/// Default on-disk name of the checkpoint.
pub const CHECKPOINT_FILE_NAME: &str = "sync-state.json";

/// Persisted reconciliation marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    /// Remote-reported time (Unix ms) of the last successful reconciliation.
    #[serde(default)]
    pub last_sync_at: Option<i64>,
    /// Set by the local store on every mutation, cleared after a sync.
    #[serde(default)]
    pub dirty: bool,
}

/// Persistence for [`SyncCheckpoint`].
///
/// Only the sync engine writes `last_sync_at`; the local store only ever calls
/// [`CheckpointStore::mark_dirty`].
pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Result<SyncCheckpoint>;
    fn save(&self, checkpoint: &SyncCheckpoint) -> Result<()>;

    fn mark_dirty(&self) -> Result<()> {
        let mut checkpoint = self.load()?;
        if !checkpoint.dirty {
            checkpoint.dirty = true;
            self.save(&checkpoint)?;
        }
        Ok(())
    }
}

/// Checkpoint persisted as a small JSON document.
#[derive(Debug, Clone)]
pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store `sync-state.json` inside the given state directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CHECKPOINT_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn load(&self) -> Result<SyncCheckpoint> {
        if !self.path.exists() {
            return Ok(SyncCheckpoint::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let serialized = serde_json::to_string_pretty(checkpoint)?;
        write_file_atomically(&self.path, serialized.as_bytes())
    }
}

/// Process-local checkpoint.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoint: Mutex<SyncCheckpoint>,
}

impl MemoryCheckpointStore {
    pub const fn new(checkpoint: SyncCheckpoint) -> Self {
        Self {
            checkpoint: Mutex::new(checkpoint),
        }
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<SyncCheckpoint> {
        self.checkpoint
            .lock()
            .map(|guard| *guard)
            .map_err(|error| Error::LocalStore(error.to_string()))
    }

    fn save(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        let mut guard = self
            .checkpoint
            .lock()
            .map_err(|error| Error::LocalStore(error.to_string()))?;
        *guard = *checkpoint;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_means_never_synced() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::in_dir(dir.path());
        assert_eq!(store.load().unwrap(), SyncCheckpoint::default());
    }

    #[test]
    fn json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonCheckpointStore::in_dir(dir.path());
        let checkpoint = SyncCheckpoint {
            last_sync_at: Some(1_700_000_000_000),
            dirty: true,
        };
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load().unwrap(), checkpoint);
    }

    #[test]
    fn mark_dirty_keeps_last_sync() {
        let store = MemoryCheckpointStore::new(SyncCheckpoint {
            last_sync_at: Some(42),
            dirty: false,
        });
        store.mark_dirty().unwrap();
        assert_eq!(
            store.load().unwrap(),
            SyncCheckpoint {
                last_sync_at: Some(42),
                dirty: true,
            }
        );
    }

    #[test]
    fn tolerates_partial_documents() {
        let parsed: SyncCheckpoint = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, SyncCheckpoint::default());
    }
}
