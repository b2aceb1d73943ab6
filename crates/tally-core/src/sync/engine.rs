//! The sync engine.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use crate::checkpoint::{CheckpointStore, SyncCheckpoint};
use crate::codec::{decode_day, decode_settings, encode_day, encode_settings};
use crate::config::{normalize_directory, DEFAULT_DIRECTORY};
use crate::hash_store::{content_hash, has_changed, FileHashes, HashStore};
use crate::ledger::LocalLedger;
use crate::merge::{analyze_records, merge_records, sort_for_display, ConflictAnalysis};
use crate::models::{Expense, SyncedSettings};
use crate::remote::{
    batch_commit, AccessReport, CommitStep, FileUpload, RemoteError, RemoteErrorKind, RemoteFile,
    RemoteRepository,
};
use crate::shard::{DayKey, ShardZone, SETTINGS_FILE_NAME};

use super::guard::{SyncGate, SyncState};
use super::report::{
    DirectionReport, DownloadReport, FileFailure, MergeReport, PullReport, SyncDirection,
    SyncOutcome, SyncPolicy, UploadReport,
};
use super::{SyncError, SyncResult};

/// Encoded local state: remote file name → content.
type Snapshot = BTreeMap<String, String>;

/// Remote sync files in the configured directory, keyed by file name.
type Listing = BTreeMap<String, RemoteFile>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushMode {
    PerFile,
    Atomic,
}

struct PendingUpload {
    file_name: String,
    content: String,
    hash: String,
    /// Revision seen in this operation's listing; `None` creates the file.
    remote_sha: Option<String>,
}

/// What a push has to do.
#[derive(Default)]
struct PushPlan {
    uploads: Vec<PendingUpload>,
    deletions: Vec<RemoteFile>,
    unchanged: usize,
    /// Hash of every local file; the stored map once the push has landed.
    local_hashes: FileHashes,
}

/// Reconciles a local ledger with one remote repository.
///
/// Operations that write local state or the remote (`sync_up`,
/// `sync_up_atomic`, `smart_merge`, `pull_replace`, `sync`) are single-flight.
/// Remote calls inside an operation are issued one after another.
pub struct SyncEngine<R> {
    remote: R,
    hashes: Box<dyn HashStore>,
    checkpoint: Box<dyn CheckpointStore>,
    directory: String,
    zone: ShardZone,
    gate: SyncGate,
}

impl<R: RemoteRepository> SyncEngine<R> {
    pub fn new(
        remote: R,
        hashes: impl HashStore + 'static,
        checkpoint: impl CheckpointStore + 'static,
    ) -> Self {
        Self {
            remote,
            hashes: Box::new(hashes),
            checkpoint: Box::new(checkpoint),
            directory: DEFAULT_DIRECTORY.to_string(),
            zone: ShardZone::default(),
            gate: SyncGate::default(),
        }
    }

    /// Repository directory holding the shards (`""` for the root).
    #[must_use]
    pub fn with_directory(mut self, directory: &str) -> Self {
        self.directory = normalize_directory(directory);
        self
    }

    /// Time zone deciding which day a record belongs to.
    #[must_use]
    pub fn with_zone(mut self, zone: ShardZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn state(&self) -> SyncState {
        self.gate.state()
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub fn checkpoint(&self) -> SyncResult<SyncCheckpoint> {
        Ok(self.checkpoint.load()?)
    }

    /// Record that the local ledger changed since the last sync.
    pub fn mark_dirty(&self) -> SyncResult<()> {
        Ok(self.checkpoint.mark_dirty()?)
    }

    pub async fn verify_access(&self) -> SyncResult<AccessReport> {
        Ok(self.remote.verify_access().await?)
    }

    fn remote_path(&self, file_name: &str) -> String {
        if self.directory.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{file_name}", self.directory)
        }
    }

    async fn guarded<T>(&self, operation: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        let permit = self.gate.begin()?;
        let result = operation.await;
        permit.finish(result.is_ok());
        result
    }

    fn snapshot(
        &self,
        records: &[Expense],
        settings: Option<&SyncedSettings>,
    ) -> SyncResult<Snapshot> {
        let mut snapshot = Snapshot::new();
        for (day, records) in self.zone.shard(records)? {
            snapshot.insert(day.filename(), encode_day(&records)?);
        }
        if let Some(settings) = settings {
            snapshot.insert(SETTINGS_FILE_NAME.to_string(), encode_settings(settings)?);
        }
        Ok(snapshot)
    }

    fn local_snapshot(&self, ledger: &dyn LocalLedger) -> SyncResult<Snapshot> {
        let records = ledger.all_records()?;
        let settings = ledger.settings()?;
        self.snapshot(&records, settings.as_ref())
    }

    /// Whether the ledger holds anything the remote has not seen.
    ///
    /// True when the dirty flag is set, when any local file hashes
    /// differently from the stored map, or when the map remembers a file that
    /// no longer exists locally.
    pub fn has_local_changes(&self, ledger: &dyn LocalLedger) -> SyncResult<bool> {
        if self.checkpoint.load()?.dirty {
            return Ok(true);
        }
        let snapshot = self.local_snapshot(ledger)?;
        let stored = self.hashes.load()?;

        let changed = snapshot.iter().any(|(file_name, content)| {
            has_changed(
                &content_hash(content),
                stored.get(file_name).map(String::as_str),
            )
        });
        let removed = stored.keys().any(|file_name| !snapshot.contains_key(file_name));
        Ok(changed || removed)
    }

    /// Compare the last sync against the remote's newest commit.
    pub async fn determine_sync_direction(
        &self,
        has_local_changes: bool,
    ) -> SyncResult<DirectionReport> {
        let remote_time = self.remote.latest_commit_timestamp().await?;
        let last_sync_at = self.checkpoint.load()?.last_sync_at;
        let direction = decide_direction(remote_time, last_sync_at, has_local_changes);
        tracing::debug!(
            "Direction {} (remote {:?}, last sync {:?}, local changes {})",
            direction,
            remote_time,
            last_sync_at,
            has_local_changes
        );
        Ok(DirectionReport {
            direction,
            remote_time,
            last_sync_at,
            has_local_changes,
        })
    }

    /// Push changed day files one write at a time.
    ///
    /// Individual failures are counted and reported; the call only fails when
    /// every attempted write failed.
    pub async fn sync_up(&self, ledger: &dyn LocalLedger) -> SyncResult<UploadReport> {
        self.guarded(self.push(ledger, PushMode::PerFile)).await
    }

    /// Push changed day files as a single commit: all of them land or none do.
    pub async fn sync_up_atomic(&self, ledger: &dyn LocalLedger) -> SyncResult<UploadReport> {
        self.guarded(self.push(ledger, PushMode::Atomic)).await
    }

    /// Fetch the newest `days` day files (all when `None`) without touching
    /// local state.
    pub async fn sync_down(&self, days: Option<usize>) -> SyncResult<DownloadReport> {
        self.download(days).await
    }

    /// Count what [`smart_merge`](Self::smart_merge) would change.
    pub async fn analyze_conflicts(
        &self,
        ledger: &dyn LocalLedger,
    ) -> SyncResult<ConflictAnalysis> {
        let remote = self.download(None).await?;
        let local = ledger.all_records()?;
        let last_sync_at = self.checkpoint.load()?.last_sync_at;
        Ok(analyze_records(&local, &remote.records, last_sync_at))
    }

    /// Merge remote into local, then push the merged set back.
    pub async fn smart_merge(&self, ledger: &dyn LocalLedger) -> SyncResult<MergeReport> {
        self.guarded(self.merge(ledger)).await
    }

    /// Replace the local ledger with the remote copy.
    pub async fn pull_replace(&self, ledger: &dyn LocalLedger) -> SyncResult<PullReport> {
        self.guarded(self.replace_local(ledger)).await
    }

    /// Determine the direction and do whatever it calls for.
    pub async fn sync(
        &self,
        ledger: &dyn LocalLedger,
        policy: SyncPolicy,
    ) -> SyncResult<SyncOutcome> {
        let permit = self.gate.begin()?;
        let result = self.run(ledger, policy).await;
        match &result {
            // Nothing was reconciled.
            Ok(SyncOutcome::ConflictDetected(_)) => permit.release(),
            _ => permit.finish(result.is_ok()),
        }
        result
    }

    async fn run(&self, ledger: &dyn LocalLedger, policy: SyncPolicy) -> SyncResult<SyncOutcome> {
        let has_local_changes = self.has_local_changes(ledger)?;
        let report = self.determine_sync_direction(has_local_changes).await?;
        tracing::info!("Sync direction: {}", report.direction);

        match report.direction {
            SyncDirection::InSync => Ok(SyncOutcome::InSync {
                last_sync_at: report.last_sync_at,
            }),
            SyncDirection::Push => self
                .push(ledger, PushMode::Atomic)
                .await
                .map(SyncOutcome::Pushed),
            SyncDirection::Pull => self.merge(ledger).await.map(SyncOutcome::Merged),
            SyncDirection::Conflict if policy.merge_on_conflict => {
                self.merge(ledger).await.map(SyncOutcome::Merged)
            }
            SyncDirection::Conflict => self
                .analyze_conflicts(ledger)
                .await
                .map(SyncOutcome::ConflictDetected),
        }
    }

    async fn push(&self, ledger: &dyn LocalLedger, mode: PushMode) -> SyncResult<UploadReport> {
        let snapshot = self.local_snapshot(ledger)?;
        let mut report = self.push_snapshot(snapshot, mode).await?;
        report.last_sync_at = self.record_sync(report.failed == 0).await?;
        Ok(report)
    }

    async fn push_snapshot(&self, snapshot: Snapshot, mode: PushMode) -> SyncResult<UploadReport> {
        let listing = self.remote_listing().await?;
        let plan = self.plan_push(snapshot, &listing)?;
        tracing::info!(
            "Pushing {} file(s) and {} deletion(s); {} unchanged",
            plan.uploads.len(),
            plan.deletions.len(),
            plan.unchanged
        );

        match mode {
            PushMode::PerFile => self.push_per_file(plan).await,
            PushMode::Atomic => self.push_atomic(plan).await,
        }
    }

    async fn remote_listing(&self) -> SyncResult<Listing> {
        let files = self.remote.list_files(&self.directory).await?;
        Ok(files
            .into_iter()
            .filter(|file| is_sync_file(&file.name))
            .map(|file| (file.name.clone(), file))
            .collect())
    }

    /// Upload what changed or went missing remotely; delete remote days that
    /// have no local records left.
    fn plan_push(&self, snapshot: Snapshot, listing: &Listing) -> SyncResult<PushPlan> {
        let stored = self.hashes.load()?;
        let mut plan = PushPlan::default();

        for (file_name, content) in snapshot {
            let hash = content_hash(&content);
            let stored_hash = stored.get(&file_name).map(String::as_str);
            let on_remote = listing.get(&file_name);

            if on_remote.is_some() && !has_changed(&hash, stored_hash) {
                plan.unchanged += 1;
            } else {
                plan.uploads.push(PendingUpload {
                    file_name: file_name.clone(),
                    content,
                    hash: hash.clone(),
                    remote_sha: on_remote.map(|file| file.sha.clone()),
                });
            }
            plan.local_hashes.insert(file_name, hash);
        }

        plan.deletions = listing
            .values()
            .filter(|file| {
                DayKey::from_filename(&file.name).is_some()
                    && !plan.local_hashes.contains_key(&file.name)
            })
            .cloned()
            .collect();

        Ok(plan)
    }

    async fn push_per_file(&self, plan: PushPlan) -> SyncResult<UploadReport> {
        let mut hashes = self.hashes.load()?;
        let mut report = UploadReport {
            unchanged: plan.unchanged,
            ..UploadReport::default()
        };
        let mut first_error: Option<RemoteError> = None;

        for upload in plan.uploads {
            let path = self.remote_path(&upload.file_name);
            let message = format!("Update {}", upload.file_name);
            match self
                .remote
                .write_file(&path, &upload.content, upload.remote_sha.as_deref(), &message)
                .await
            {
                Ok(_) => {
                    hashes.insert(upload.file_name, upload.hash);
                    report.uploaded += 1;
                }
                Err(error) => {
                    tracing::warn!("Failed to upload {}: {}", path, error);
                    record_failure(&mut report, path, &error);
                    first_error.get_or_insert(error);
                }
            }
        }

        let mut still_remote = BTreeSet::new();
        for file in plan.deletions {
            let message = format!("Delete {}", file.name);
            match self.remote.delete_file(&file.path, &file.sha, &message).await {
                Ok(()) => {
                    hashes.remove(&file.name);
                    report.deleted += 1;
                }
                Err(error) => {
                    tracing::warn!("Failed to delete {}: {}", file.path, error);
                    record_failure(&mut report, file.path, &error);
                    first_error.get_or_insert(error);
                    still_remote.insert(file.name);
                }
            }
        }

        // Entries for days that failed to delete stay: the file is still there.
        hashes.retain(|file_name, _| {
            plan.local_hashes.contains_key(file_name) || still_remote.contains(file_name)
        });
        self.hashes.save(&hashes)?;
        if report.failed > 0 {
            self.checkpoint.mark_dirty()?;
        }

        if report.uploaded + report.deleted == 0 {
            if let Some(error) = first_error {
                return Err(error.into());
            }
        }
        Ok(report)
    }

    async fn push_atomic(&self, plan: PushPlan) -> SyncResult<UploadReport> {
        if plan.uploads.is_empty() && plan.deletions.is_empty() {
            self.hashes.save(&plan.local_hashes)?;
            return Ok(UploadReport {
                unchanged: plan.unchanged,
                ..UploadReport::default()
            });
        }

        let uploads: Vec<FileUpload> = plan
            .uploads
            .iter()
            .map(|upload| FileUpload {
                path: self.remote_path(&upload.file_name),
                content: upload.content.clone(),
            })
            .collect();
        let deletions: Vec<String> = plan.deletions.iter().map(|file| file.path.clone()).collect();
        let message = commit_message(uploads.len(), deletions.len());

        let result = batch_commit(&self.remote, &uploads, &deletions, &message).await;
        if is_empty_repository(result.failed_step, result.error_kind) {
            // The object API needs a first commit to build on.
            tracing::info!("Remote repository is empty; writing files individually");
            return self.push_per_file(plan).await;
        }

        let commit = result.into_result()?;
        self.hashes.save(&plan.local_hashes)?;
        Ok(UploadReport {
            uploaded: plan.uploads.len(),
            deleted: plan.deletions.len(),
            unchanged: plan.unchanged,
            commit,
            ..UploadReport::default()
        })
    }

    async fn download(&self, days: Option<usize>) -> SyncResult<DownloadReport> {
        let listing = self.remote_listing().await?;

        let mut shards: Vec<(DayKey, &RemoteFile)> = listing
            .values()
            .filter_map(|file| DayKey::from_filename(&file.name).map(|day| (day, file)))
            .collect();
        shards.sort_by(|a, b| b.0.cmp(&a.0));
        let limit = days.unwrap_or(shards.len());
        let has_more = shards.len() > limit;
        shards.truncate(limit);

        let mut report = DownloadReport {
            has_more,
            ..DownloadReport::default()
        };
        for (day, file) in shards {
            let Some(remote) = self.remote.read_file(&file.path).await? else {
                tracing::warn!("{} disappeared while downloading", file.path);
                continue;
            };
            let records = decode_day(&remote.content).map_err(|source| SyncError::Corrupt {
                path: file.path.clone(),
                source,
            })?;
            report
                .file_hashes
                .insert(file.name.clone(), content_hash(&remote.content));
            report.records.extend(records);
            report.days.push(day);
        }

        if let Some(file) = listing.get(SETTINGS_FILE_NAME) {
            if let Some(remote) = self.remote.read_file(&file.path).await? {
                let settings =
                    decode_settings(&remote.content).map_err(|source| SyncError::Corrupt {
                        path: file.path.clone(),
                        source,
                    })?;
                report
                    .file_hashes
                    .insert(file.name.clone(), content_hash(&remote.content));
                report.settings = Some(settings);
            }
        }

        tracing::info!(
            "Downloaded {} record(s) from {} day file(s)",
            report.records.len(),
            report.days.len()
        );
        Ok(report)
    }

    async fn merge(&self, ledger: &dyn LocalLedger) -> SyncResult<MergeReport> {
        let remote = self.download(None).await?;
        let local = ledger.all_records()?;
        let last_sync_at = self.checkpoint.load()?.last_sync_at;

        let outcome = merge_records(&local, &remote.records, last_sync_at);
        tracing::info!(
            "Merged {} local and {} remote record(s): {} new, {} updated from remote",
            local.len(),
            remote.records.len(),
            outcome.new_from_remote,
            outcome.updated_from_remote
        );
        ledger.replace_all(outcome.merged.clone())?;
        self.reconcile_settings(ledger, remote.settings)?;

        // What was just downloaded is exactly what the remote holds, so files
        // the merge left untouched are not pushed back.
        let mut stored = self.hashes.load()?;
        stored.extend(remote.file_hashes);
        self.hashes.save(&stored)?;

        let settings = ledger.settings()?;
        let snapshot = self.snapshot(&outcome.merged, settings.as_ref())?;
        let upload = self.push_snapshot(snapshot, PushMode::Atomic).await?;
        let last_sync_at = self.record_sync(upload.failed == 0).await?;

        Ok(MergeReport {
            new_from_remote: outcome.new_from_remote,
            updated_from_remote: outcome.updated_from_remote,
            total_records: outcome.merged.len(),
            upload,
            last_sync_at,
        })
    }

    /// Take remote settings unless local settings changed since the last sync.
    fn reconcile_settings(
        &self,
        ledger: &dyn LocalLedger,
        remote: Option<SyncedSettings>,
    ) -> SyncResult<()> {
        let Some(remote) = remote else {
            return Ok(());
        };
        let local = ledger.settings()?;
        let local_unchanged = match &local {
            None => true,
            Some(local) => {
                let stored = self.hashes.load()?;
                !has_changed(
                    &content_hash(&encode_settings(local)?),
                    stored.get(SETTINGS_FILE_NAME).map(String::as_str),
                )
            }
        };
        if local_unchanged && local.as_ref() != Some(&remote) {
            ledger.apply_settings(remote)?;
        }
        Ok(())
    }

    async fn replace_local(&self, ledger: &dyn LocalLedger) -> SyncResult<PullReport> {
        let remote = self.download(None).await?;
        let files = remote.days.len();
        let mut records = remote.records;
        sort_for_display(&mut records);

        let settings_applied = remote.settings.is_some();
        if let Some(settings) = remote.settings {
            ledger.apply_settings(settings)?;
        }
        let settings = ledger.settings()?;
        let snapshot = self.snapshot(&records, settings.as_ref())?;
        let count = records.len();
        ledger.replace_all(records)?;

        let hashes: FileHashes = snapshot
            .iter()
            .map(|(file_name, content)| (file_name.clone(), content_hash(content)))
            .collect();
        self.hashes.save(&hashes)?;
        let last_sync_at = self.record_sync(true).await?;

        tracing::info!("Replaced local ledger with {} remote record(s)", count);
        Ok(PullReport {
            records: count,
            files,
            settings_applied,
            last_sync_at,
        })
    }

    /// Store the remote's own clock as the last sync, never the local one.
    async fn record_sync(&self, clear_dirty: bool) -> SyncResult<Option<i64>> {
        let remote_time = self.remote.latest_commit_timestamp().await?;
        let mut checkpoint = self.checkpoint.load()?;
        if remote_time.is_some() {
            checkpoint.last_sync_at = remote_time;
        }
        if clear_dirty {
            checkpoint.dirty = false;
        }
        self.checkpoint.save(&checkpoint)?;
        Ok(checkpoint.last_sync_at)
    }
}

const fn decide_direction(
    remote_time: Option<i64>,
    last_sync_at: Option<i64>,
    has_local_changes: bool,
) -> SyncDirection {
    let remote_moved = match (remote_time, last_sync_at) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(remote), Some(last_sync)) => remote > last_sync,
    };
    match (remote_moved, has_local_changes) {
        (false, false) => SyncDirection::InSync,
        (false, true) => SyncDirection::Push,
        (true, false) => SyncDirection::Pull,
        (true, true) => SyncDirection::Conflict,
    }
}

fn is_sync_file(name: &str) -> bool {
    name == SETTINGS_FILE_NAME || DayKey::from_filename(name).is_some()
}

fn is_empty_repository(step: Option<CommitStep>, kind: Option<RemoteErrorKind>) -> bool {
    step == Some(CommitStep::ResolveHead) && kind == Some(RemoteErrorKind::Conflict)
}

fn record_failure(report: &mut UploadReport, path: String, error: &RemoteError) {
    report.failed += 1;
    report.failures.push(FileFailure {
        path,
        kind: error.kind,
        message: error.message.clone(),
    });
}

fn commit_message(uploads: usize, deletions: usize) -> String {
    match (uploads, deletions) {
        (uploads, 0) => format!("Sync expenses: update {uploads} file(s)"),
        (0, deletions) => format!("Sync expenses: delete {deletions} file(s)"),
        (uploads, deletions) => {
            format!("Sync expenses: update {uploads} file(s), delete {deletions} file(s)")
        }
    }
}
