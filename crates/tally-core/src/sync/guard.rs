//! Single-flight guard around sync operations.

use std::sync::{Mutex, PoisonError};

use serde::Serialize;

use super::SyncError;

/// Observable status of the sync engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Synced,
    Error,
}

/// Admits at most one operation at a time.
///
/// A second caller is turned away with [`SyncError::Busy`] rather than queued:
/// both would read-modify-write the same hash map and checkpoint.
#[derive(Debug, Default)]
pub(crate) struct SyncGate {
    state: Mutex<SyncState>,
}

impl SyncGate {
    pub(crate) fn state(&self) -> SyncState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn begin(&self) -> Result<SyncPermit<'_>, SyncError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == SyncState::Syncing {
            return Err(SyncError::Busy);
        }
        *state = SyncState::Syncing;
        Ok(SyncPermit {
            gate: self,
            outcome: None,
        })
    }

    fn set(&self, next: SyncState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

/// Held for the duration of one operation; releases the gate on drop.
#[derive(Debug)]
pub(crate) struct SyncPermit<'a> {
    gate: &'a SyncGate,
    outcome: Option<SyncState>,
}

impl SyncPermit<'_> {
    /// Hand the gate back without recording an outcome.
    pub(crate) fn release(mut self) {
        self.outcome = Some(SyncState::Idle);
    }

    pub(crate) fn finish(mut self, succeeded: bool) {
        self.outcome = Some(if succeeded {
            SyncState::Synced
        } else {
            SyncState::Error
        });
    }
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        // A dropped, unfinished permit means the operation was cancelled.
        self.gate.set(self.outcome.unwrap_or(SyncState::Idle));
    }
}
