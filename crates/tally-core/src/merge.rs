//! Last-writer-wins reconciliation of two record sets.
//!
//! Pure functions only; the orchestrator supplies both sides and the
//! last-sync instant.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::models::{Expense, ExpenseId};

/// Result of [`merge_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Union of both sides, newest `created_at` first.
    pub merged: Vec<Expense>,
    /// Remote-only records that were taken as new.
    pub new_from_remote: usize,
    /// Records present on both sides where the remote copy won.
    pub updated_from_remote: usize,
}

/// What a merge would do, computed without applying anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConflictAnalysis {
    /// Present on both sides, remote copy strictly newer.
    pub remote_wins: usize,
    /// Present on both sides, local copy strictly newer.
    pub local_wins: usize,
    /// Present only locally; kept and pushed.
    pub local_only: usize,
    /// Present only remotely and newer than the last sync; pulled in.
    pub new_from_remote: usize,
    /// Present only remotely and older than the last sync; treated as deleted
    /// here and not resurrected.
    pub deleted_locally: usize,
}

impl ConflictAnalysis {
    /// Whether applying the merge would change the local ledger.
    #[must_use]
    pub const fn changes_local(&self) -> bool {
        self.remote_wins > 0 || self.new_from_remote > 0
    }

    /// Whether the merge would overwrite any local data.
    #[must_use]
    pub const fn overwrites_local(&self) -> bool {
        self.remote_wins > 0
    }
}

/// How a single id is resolved.
enum Resolution<'a> {
    Both {
        local: &'a Expense,
        remote: &'a Expense,
    },
    LocalOnly(&'a Expense),
    NewFromRemote(&'a Expense),
    DeletedLocally,
}

/// A remote-only record older than the last sync was seen here before and is
/// gone now, so it was deleted locally.
///
/// This cannot tell a local deletion apart from a record re-added upstream
/// with an old `updated_at`; only explicit tombstones could.
const fn deleted_since_sync(remote: &Expense, last_sync_at: Option<i64>) -> bool {
    match last_sync_at {
        Some(last_sync) => last_sync > remote.updated_at,
        None => false,
    }
}

fn resolve<'a>(
    local: &'a BTreeMap<&'a ExpenseId, &'a Expense>,
    remote: &'a BTreeMap<&'a ExpenseId, &'a Expense>,
    last_sync_at: Option<i64>,
) -> impl Iterator<Item = Resolution<'a>> + 'a {
    let ids: BTreeSet<&ExpenseId> = local.keys().chain(remote.keys()).copied().collect();
    ids.into_iter().filter_map(move |id| {
        let resolution = match (local.get(id).copied(), remote.get(id).copied()) {
            (Some(local), Some(remote)) => Resolution::Both { local, remote },
            (Some(local), None) => Resolution::LocalOnly(local),
            (None, Some(remote)) if deleted_since_sync(remote, last_sync_at) => {
                Resolution::DeletedLocally
            }
            (None, Some(remote)) => Resolution::NewFromRemote(remote),
            (None, None) => return None,
        };
        Some(resolution)
    })
}

fn index(records: &[Expense]) -> BTreeMap<&ExpenseId, &Expense> {
    records.iter().map(|record| (&record.id, record)).collect()
}

/// Merge local and remote records by id, newest `updated_at` winning.
///
/// Ties keep the local copy. Duplicate ids within one side keep the last
/// occurrence.
#[must_use]
pub fn merge_records(
    local: &[Expense],
    remote: &[Expense],
    last_sync_at: Option<i64>,
) -> MergeOutcome {
    let local = index(local);
    let remote = index(remote);

    let mut merged = Vec::with_capacity(local.len().max(remote.len()));
    let mut new_from_remote = 0;
    let mut updated_from_remote = 0;

    for resolution in resolve(&local, &remote, last_sync_at) {
        match resolution {
            Resolution::Both { local, remote } => {
                if remote.updated_at > local.updated_at {
                    updated_from_remote += 1;
                    merged.push(remote.clone());
                } else {
                    merged.push(local.clone());
                }
            }
            Resolution::LocalOnly(record) => merged.push(record.clone()),
            Resolution::NewFromRemote(record) => {
                new_from_remote += 1;
                merged.push(record.clone());
            }
            Resolution::DeletedLocally => {}
        }
    }

    sort_for_display(&mut merged);
    MergeOutcome {
        merged,
        new_from_remote,
        updated_from_remote,
    }
}

/// Count what [`merge_records`] would do with the same inputs.
#[must_use]
pub fn analyze_records(
    local: &[Expense],
    remote: &[Expense],
    last_sync_at: Option<i64>,
) -> ConflictAnalysis {
    let local = index(local);
    let remote = index(remote);

    let mut analysis = ConflictAnalysis::default();
    for resolution in resolve(&local, &remote, last_sync_at) {
        match resolution {
            Resolution::Both { local, remote } => {
                if remote.updated_at > local.updated_at {
                    analysis.remote_wins += 1;
                } else if local.updated_at > remote.updated_at {
                    analysis.local_wins += 1;
                }
            }
            Resolution::LocalOnly(_) => analysis.local_only += 1,
            Resolution::NewFromRemote(_) => analysis.new_from_remote += 1,
            Resolution::DeletedLocally => analysis.deleted_locally += 1,
        }
    }
    analysis
}

/// Newest `created_at` first, id as tiebreaker so equal inputs sort equally.
pub fn sort_for_display(records: &mut [Expense]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}
