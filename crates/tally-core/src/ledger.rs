//! The local store as seen by the sync engine.
//!
//! The engine never looks inside local storage; it reads every record, writes
//! every record back, and learns about local edits only through the dirty
//! flag in [`crate::checkpoint`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::models::{Expense, SyncedSettings};
use crate::util::write_file_atomically;
use crate::{Error, Result};

/// Collaborator contract with the local expense store.
pub trait LocalLedger: Send + Sync {
    /// Every record currently held locally.
    fn all_records(&self) -> Result<Vec<Expense>>;

    /// Replace the whole local record set.
    fn replace_all(&self, records: Vec<Expense>) -> Result<()>;

    /// Settings that travel with the records, if the store has any.
    fn settings(&self) -> Result<Option<SyncedSettings>> {
        Ok(None)
    }

    /// Apply settings pulled from the remote.
    fn apply_settings(&self, _settings: SyncedSettings) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LedgerDocument {
    #[serde(default)]
    expenses: Vec<Expense>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<SyncedSettings>,
}

/// In-memory ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    document: Mutex<LedgerDocument>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new(expenses: Vec<Expense>) -> Self {
        Self {
            document: Mutex::new(LedgerDocument {
                expenses,
                settings: None,
            }),
        }
    }

    #[must_use]
    pub fn with_settings(self, settings: SyncedSettings) -> Self {
        let mut document = self
            .document
            .into_inner()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        document.settings = Some(settings);
        Self {
            document: Mutex::new(document),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LedgerDocument>> {
        self.document
            .lock()
            .map_err(|error| Error::LocalStore(error.to_string()))
    }
}

impl LocalLedger for MemoryLedger {
    fn all_records(&self) -> Result<Vec<Expense>> {
        Ok(self.lock()?.expenses.clone())
    }

    fn replace_all(&self, records: Vec<Expense>) -> Result<()> {
        self.lock()?.expenses = records;
        Ok(())
    }

    fn settings(&self) -> Result<Option<SyncedSettings>> {
        Ok(self.lock()?.settings.clone())
    }

    fn apply_settings(&self, settings: SyncedSettings) -> Result<()> {
        self.lock()?.settings = Some(settings);
        Ok(())
    }
}

/// Ledger kept as a single JSON document on disk:
/// `{ "expenses": [...], "settings": {...} }`.
///
/// A missing file reads as an empty ledger.
#[derive(Debug, Clone)]
pub struct JsonFileLedger {
    path: PathBuf,
}

impl JsonFileLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<LedgerDocument> {
        if !self.path.exists() {
            return Ok(LedgerDocument::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(LedgerDocument::default());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write(&self, document: &LedgerDocument) -> Result<()> {
        let mut serialized = serde_json::to_string_pretty(document)?;
        serialized.push('\n');
        write_file_atomically(&self.path, serialized.as_bytes())
    }
}

impl LocalLedger for JsonFileLedger {
    fn all_records(&self) -> Result<Vec<Expense>> {
        Ok(self.read()?.expenses)
    }

    fn replace_all(&self, records: Vec<Expense>) -> Result<()> {
        let mut document = self.read()?;
        document.expenses = records;
        self.write(&document)
    }

    fn settings(&self) -> Result<Option<SyncedSettings>> {
        Ok(self.read()?.settings)
    }

    fn apply_settings(&self, settings: SyncedSettings) -> Result<()> {
        let mut document = self.read()?;
        document.settings = Some(settings);
        self.write(&document)
    }
}
