//! Differential hash store.
//!
//! Remembers, per remote filename, the content hash we believe the remote
//! currently holds. A shard whose freshly encoded content hashes to the stored
//! value does not need to be uploaded again.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};

use crate::util::write_file_atomically;
use crate::{Error, Result};

/// Filename → content hash.
pub type FileHashes = BTreeMap<String, String>;

/// Default on-disk name of the hash map.
pub const HASHES_FILE_NAME: &str = "file-hashes.json";

/// SHA-256 of the content, lowercase hex.
///
/// Depends on the bytes only, so identical content hashes identically no
/// matter when or where it was produced.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Check whether content needs uploading given the stored hash.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.map_or(true, |stored| stored != current_hash)
}

/// Persistence for the filename → hash map.
pub trait HashStore: Send + Sync {
    fn load(&self) -> Result<FileHashes>;
    fn save(&self, hashes: &FileHashes) -> Result<()>;
}

/// Hash map persisted as a pretty-printed JSON object.
#[derive(Debug, Clone)]
pub struct JsonHashStore {
    path: PathBuf,
}

impl JsonHashStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store `file-hashes.json` inside the given state directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HASHES_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HashStore for JsonHashStore {
    fn load(&self) -> Result<FileHashes> {
        if !self.path.exists() {
            return Ok(FileHashes::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(FileHashes::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, hashes: &FileHashes) -> Result<()> {
        let serialized = serde_json::to_string_pretty(hashes)?;
        write_file_atomically(&self.path, serialized.as_bytes())
    }
}

/// Process-local hash map, for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryHashStore {
    hashes: Mutex<FileHashes>,
}

impl MemoryHashStore {
    pub fn new(hashes: FileHashes) -> Self {
        Self {
            hashes: Mutex::new(hashes),
        }
    }
}

impl HashStore for MemoryHashStore {
    fn load(&self) -> Result<FileHashes> {
        self.hashes
            .lock()
            .map(|guard| guard.clone())
            .map_err(|error| Error::LocalStore(error.to_string()))
    }

    fn save(&self, hashes: &FileHashes) -> Result<()> {
        let mut guard = self
            .hashes
            .lock()
            .map_err(|error| Error::LocalStore(error.to_string()))?;
        guard.clone_from(hashes);
        Ok(())
    }
}
