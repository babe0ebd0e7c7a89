//! Roundtrip transaction manager.
//!
//! A manifest captures SHA-256 fingerprints of a set of project files at
//! `roundtrip_start`.  `preview` and `commit` re-read the files they touch
//! and compare against that baseline, so a write that landed underneath the
//! caller is detected without holding file locks across the whole roundtrip.
//!
//! Manifests live in a map of `Arc<tokio::sync::Mutex<Manifest>>`: the outer
//! map lock is only held to look up or insert an entry, the per-manifest
//! mutex is held across the file I/O of a single operation.  Operations on
//! different manifests never contend.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use fg_domain::command::{Change, CommitMode};
use fg_domain::config::FilesConfig;
use fg_domain::error::{Error, Result};
use fg_domain::trace::TraceEvent;

use crate::file_ops::{normalize_path, FileStore, ProjectFiles};
use crate::patch;

/// Hex SHA-256 of a file's full content.
pub fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manifest
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestState {
    Started,
    Previewed,
    Committed,
    Aborted,
    Expired,
}

impl ManifestState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ManifestState::Committed | ManifestState::Aborted | ManifestState::Expired
        )
    }
}

#[derive(Debug)]
struct Manifest {
    id: String,
    project_id: String,
    paths: Vec<String>,
    /// Captured once at start, never updated.
    baseline: HashMap<String, String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    deadline: Instant,
    closed_at: Option<Instant>,
    state: ManifestState,
}

impl Manifest {
    /// Flip a live manifest to `Expired` once its TTL has elapsed.
    fn refresh_expiry(&mut self, now: Instant) {
        if !self.state.is_terminal() && now >= self.deadline {
            self.close(ManifestState::Expired, "expired");
        }
    }

    fn close(&mut self, state: ManifestState, reason: &str) {
        self.state = state;
        self.closed_at = Some(Instant::now());
        if state != ManifestState::Committed {
            TraceEvent::RoundtripAborted {
                manifest_id: self.id.clone(),
                reason: reason.to_owned(),
            }
            .emit();
        }
    }

    /// Closed manifests answer exactly like missing ones.
    fn require_open(&self) -> Result<()> {
        if self.state.is_terminal() {
            Err(manifest_not_found(&self.id))
        } else {
            Ok(())
        }
    }

    fn view(&self) -> ManifestView {
        ManifestView {
            manifest_id: self.id.clone(),
            project_id: self.project_id.clone(),
            paths: self.paths.clone(),
            baseline_fingerprints: self
                .baseline
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            created_at: self.created_at.to_rfc3339(),
            expires_at: self.expires_at.to_rfc3339(),
            state: self.state,
        }
    }
}

fn manifest_not_found(id: &str) -> Error {
    Error::not_found(format!("manifest '{id}' not found"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reports
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestView {
    pub manifest_id: String,
    pub project_id: String,
    pub paths: Vec<String>,
    pub baseline_fingerprints: BTreeMap<String, String>,
    pub created_at: String,
    pub expires_at: String,
    pub state: ManifestState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSummary {
    pub path: String,
    pub operation: &'static str,
    pub bytes_before: usize,
    pub bytes_after: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    pub manifest_id: String,
    pub state: ManifestState,
    /// `false` when any touched file changed since the manifest started.
    pub clean: bool,
    pub conflicts: Vec<String>,
    pub changes: Vec<ChangeSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitReport {
    pub manifest_id: String,
    pub state: ManifestState,
    pub written: Vec<String>,
    pub deleted: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub expired: usize,
    pub evicted: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Change planning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A change resolved against the file's current bytes.
struct PlannedChange {
    path: String,
    operation: &'static str,
    before: Vec<u8>,
    /// `None` deletes the file.
    after: Option<Vec<u8>>,
}

impl PlannedChange {
    fn summary(&self) -> ChangeSummary {
        let before = String::from_utf8_lossy(&self.before);
        let after = self
            .after
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let (lines_added, lines_removed) = patch::line_stats(&before, &after);
        ChangeSummary {
            path: self.path.clone(),
            operation: self.operation,
            bytes_before: self.before.len(),
            bytes_after: self.after.as_ref().map_or(0, Vec::len),
            lines_added,
            lines_removed,
        }
    }
}

struct Plan {
    changes: Vec<PlannedChange>,
    conflicts: Vec<String>,
}

/// Re-read every changed path, compare against the baseline and compute the
/// new content for the paths that still match.
async fn plan_changes(
    store: &dyn FileStore,
    manifest: &Manifest,
    changes: &[Change],
) -> Result<Plan> {
    if changes.is_empty() {
        return Err(Error::invalid("changes must not be empty"));
    }

    let mut seen = HashSet::new();
    let mut plan = Plan {
        changes: Vec::with_capacity(changes.len()),
        conflicts: Vec::new(),
    };

    for change in changes {
        let path = normalize_path(change.path())?;
        if !seen.insert(path.clone()) {
            return Err(Error::invalid(format!("'{path}' appears more than once in changes")));
        }
        let Some(baseline) = manifest.baseline.get(&path) else {
            return Err(Error::invalid(format!(
                "'{path}' is not part of manifest '{}'",
                manifest.id
            )));
        };

        // A file deleted underneath the caller is a conflict too.
        let current = match store.read(&path).await {
            Ok(bytes) => Some(bytes),
            Err(Error::NotFound(_)) => None,
            Err(e) => return Err(e),
        };
        let Some(before) = current.filter(|b| fingerprint(b) == *baseline) else {
            plan.conflicts.push(path);
            continue;
        };

        let after = match change {
            Change::Replace { content, .. } => Some(content.clone().into_bytes()),
            Change::Patch { diff, .. } => {
                let text = std::str::from_utf8(&before)
                    .map_err(|_| Error::invalid(format!("cannot patch non-UTF-8 file '{path}'")))?;
                let patched = patch::apply(text, diff).map_err(|e| match e {
                    Error::InvalidInput(msg) => Error::invalid(format!("{path}: {msg}")),
                    other => other,
                })?;
                Some(patched.into_bytes())
            }
            Change::Delete { .. } => None,
        };

        plan.changes.push(PlannedChange {
            path,
            operation: change.operation(),
            before,
            after,
        });
    }

    Ok(plan)
}

/// Put back every already-applied change, newest first.
async fn rollback(store: &dyn FileStore, applied: &[&PlannedChange]) {
    for change in applied.iter().rev() {
        if let Err(e) = store.write(&change.path, &change.before).await {
            tracing::error!(
                path = %change.path,
                error = %e,
                "failed to restore original content during rollback"
            );
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TransactionManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
pub struct RoundtripSettings {
    pub ttl: Duration,
    pub max_paths: usize,
}

impl From<&FilesConfig> for RoundtripSettings {
    fn from(cfg: &FilesConfig) -> Self {
        Self {
            ttl: Duration::from_secs(cfg.manifest_ttl_secs),
            max_paths: cfg.max_paths_per_manifest,
        }
    }
}

/// Write locks keyed by `(project, path)`, shared across manifests.
///
/// Entries are weak: a lock lives while some commit holds or awaits it.
#[derive(Default)]
struct PathLocks {
    locks: Mutex<HashMap<(String, String), Weak<AsyncMutex<()>>>>,
}

impl PathLocks {
    fn lock_for(&self, project_id: &str, path: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| lock.strong_count() > 0);
        let key = (project_id.to_owned(), path.to_owned());
        if let Some(lock) = locks.get(&key).and_then(Weak::upgrade) {
            return lock;
        }
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(key, Arc::downgrade(&lock));
        lock
    }

    /// Lock every path of `manifest`, always in sorted order.
    async fn acquire(&self, manifest: &Manifest) -> Vec<OwnedMutexGuard<()>> {
        let mut paths: Vec<&String> = manifest.paths.iter().collect();
        paths.sort();
        let mut guards = Vec::with_capacity(paths.len());
        for path in paths {
            let lock = self.lock_for(&manifest.project_id, path);
            guards.push(lock.lock_owned().await);
        }
        guards
    }

    fn len(&self) -> usize {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| lock.strong_count() > 0);
        locks.len()
    }
}

pub struct TransactionManager {
    projects: Arc<dyn ProjectFiles>,
    manifests: Mutex<HashMap<String, Arc<AsyncMutex<Manifest>>>>,
    path_locks: Arc<PathLocks>,
    settings: RoundtripSettings,
}

impl TransactionManager {
    pub fn new(projects: Arc<dyn ProjectFiles>, settings: RoundtripSettings) -> Self {
        Self {
            projects,
            manifests: Mutex::new(HashMap::new()),
            path_locks: Arc::new(PathLocks::default()),
            settings,
        }
    }

    pub fn projects(&self) -> &Arc<dyn ProjectFiles> {
        &self.projects
    }

    /// Number of tracked manifests, live or closed (for monitoring).
    pub fn manifest_count(&self) -> usize {
        self.manifests.lock().len()
    }

    /// Number of paths currently locked or awaited by a commit.
    pub fn locked_path_count(&self) -> usize {
        self.path_locks.len()
    }

    fn entry(&self, manifest_id: &str) -> Result<Arc<AsyncMutex<Manifest>>> {
        self.manifests
            .lock()
            .get(manifest_id)
            .cloned()
            .ok_or_else(|| manifest_not_found(manifest_id))
    }

    /// Fingerprint `paths` and open a new manifest over them.
    pub async fn start(&self, project_id: &str, paths: &[String]) -> Result<ManifestView> {
        if paths.is_empty() {
            return Err(Error::invalid("paths must not be empty"));
        }
        if paths.len() > self.settings.max_paths {
            return Err(Error::invalid(format!(
                "too many paths ({} > {})",
                paths.len(),
                self.settings.max_paths
            )));
        }

        let mut normalized: Vec<String> = Vec::with_capacity(paths.len());
        for raw in paths {
            let path = normalize_path(raw)?;
            if !normalized.contains(&path) {
                normalized.push(path);
            }
        }

        let store = self.projects.open(project_id)?;
        let mut baseline = HashMap::with_capacity(normalized.len());
        for path in &normalized {
            let bytes = store.read(path).await?;
            baseline.insert(path.clone(), fingerprint(&bytes));
        }

        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.settings.ttl)
            .map_err(|e| Error::internal(format!("manifest TTL out of range: {e}")))?;
        let manifest = Manifest {
            id: format!("rt_{}", uuid::Uuid::new_v4().simple()),
            project_id: project_id.to_owned(),
            paths: normalized,
            baseline,
            created_at,
            expires_at: created_at + ttl,
            deadline: Instant::now() + self.settings.ttl,
            closed_at: None,
            state: ManifestState::Started,
        };
        let view = manifest.view();

        TraceEvent::RoundtripStarted {
            manifest_id: view.manifest_id.clone(),
            project_id: view.project_id.clone(),
            paths: view.paths.len(),
        }
        .emit();

        self.manifests
            .lock()
            .insert(view.manifest_id.clone(), Arc::new(AsyncMutex::new(manifest)));
        Ok(view)
    }

    /// Dry-run `changes`: report conflicts and per-change stats, write nothing.
    pub async fn preview(&self, manifest_id: &str, changes: &[Change]) -> Result<PreviewReport> {
        let entry = self.entry(manifest_id)?;
        let mut manifest = entry.lock().await;
        manifest.refresh_expiry(Instant::now());
        manifest.require_open()?;

        let store = self.projects.open(&manifest.project_id)?;
        let plan = plan_changes(store.as_ref(), &manifest, changes).await?;

        let clean = plan.conflicts.is_empty();
        if clean && manifest.state == ManifestState::Started {
            manifest.state = ManifestState::Previewed;
        }

        TraceEvent::RoundtripPreviewed {
            manifest_id: manifest.id.clone(),
            changes: changes.len(),
            conflicts: plan.conflicts.len(),
        }
        .emit();

        Ok(PreviewReport {
            manifest_id: manifest.id.clone(),
            state: manifest.state,
            clean,
            conflicts: plan.conflicts,
            changes: plan.changes.iter().map(PlannedChange::summary).collect(),
        })
    }

    /// Apply `changes` all-or-nothing.
    ///
    /// The critical section runs on its own task: once the manifest lock is
    /// held, dropping the caller's future cannot stop the write phase halfway.
    /// Manifests sharing a path serialize on it from planning to the last write.
    pub async fn commit(
        &self,
        manifest_id: &str,
        changes: Vec<Change>,
        mode: CommitMode,
    ) -> Result<CommitReport> {
        let entry = self.entry(manifest_id)?;
        let guard = entry.lock_owned().await;
        let projects = self.projects.clone();
        let path_locks = self.path_locks.clone();

        tokio::spawn(commit_locked(projects, path_locks, guard, changes, mode))
            .await
            .map_err(|e| Error::internal(format!("commit task failed: {e}")))?
    }

    pub async fn status(&self, manifest_id: &str) -> Result<ManifestView> {
        let entry = self.entry(manifest_id)?;
        let mut manifest = entry.lock().await;
        manifest.refresh_expiry(Instant::now());
        if manifest.state == ManifestState::Expired {
            return Err(manifest_not_found(manifest_id));
        }
        Ok(manifest.view())
    }

    pub async fn abort(&self, manifest_id: &str) -> Result<ManifestView> {
        let entry = self.entry(manifest_id)?;
        let mut manifest = entry.lock().await;
        manifest.refresh_expiry(Instant::now());
        manifest.require_open()?;
        manifest.close(ManifestState::Aborted, "aborted by caller");
        Ok(manifest.view())
    }

    /// Expire overdue manifests and evict closed ones.
    ///
    /// Expired manifests are dropped right away.  Committed and aborted ones
    /// stay visible to `status` for one TTL after closing.  Manifests whose
    /// lock is held are skipped until the next sweep.
    pub fn sweep(&self) -> SweepStats {
        let now = Instant::now();
        let mut stats = SweepStats::default();
        let mut manifests = self.manifests.lock();

        manifests.retain(|_, entry| {
            let Ok(mut manifest) = entry.try_lock() else {
                return true;
            };
            let was_live = !manifest.state.is_terminal();
            manifest.refresh_expiry(now);
            match manifest.state {
                ManifestState::Expired => {
                    if was_live {
                        stats.expired += 1;
                    }
                    stats.evicted += 1;
                    false
                }
                state if state.is_terminal() => {
                    let retire = manifest
                        .closed_at
                        .map_or(true, |closed| now.duration_since(closed) >= self.settings.ttl);
                    if retire {
                        stats.evicted += 1;
                    }
                    !retire
                }
                _ => true,
            }
        });

        if stats.evicted > 0 {
            tracing::debug!(
                expired = stats.expired,
                evicted = stats.evicted,
                remaining = manifests.len(),
                "manifest sweep"
            );
        }
        stats
    }

    /// Run [`sweep`](Self::sweep) every `every` until the manager is dropped.
    pub fn spawn_sweeper(manager: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(manager);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(manager) => {
                        manager.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}

async fn commit_locked(
    projects: Arc<dyn ProjectFiles>,
    path_locks: Arc<PathLocks>,
    mut manifest: OwnedMutexGuard<Manifest>,
    changes: Vec<Change>,
    mode: CommitMode,
) -> Result<CommitReport> {
    manifest.refresh_expiry(Instant::now());
    manifest.require_open()?;
    match mode {
        CommitMode::Replace => {}
    }

    // Held until return, covering plan, writes and rollback.
    let _path_guards = path_locks.acquire(&manifest).await;
    manifest.refresh_expiry(Instant::now());
    manifest.require_open()?;

    let plan = match projects.open(&manifest.project_id) {
        Ok(store) => plan_changes(store.as_ref(), &manifest, &changes)
            .await
            .map(|plan| (store, plan)),
        Err(e) => Err(e),
    };
    let (store, plan) = match plan {
        Ok(ok) => ok,
        Err(e) => {
            let reason = format!("commit rejected: {}", e.code().as_str());
            manifest.close(ManifestState::Aborted, &reason);
            return Err(e);
        }
    };

    if !plan.conflicts.is_empty() {
        manifest.close(ManifestState::Aborted, "fingerprint conflict");
        return Err(Error::Conflict {
            paths: plan.conflicts,
        });
    }

    let mut applied: Vec<&PlannedChange> = Vec::with_capacity(plan.changes.len());
    for change in &plan.changes {
        let result = match &change.after {
            Some(bytes) => store.write(&change.path, bytes).await,
            None => store.delete(&change.path).await,
        };
        if let Err(e) = result {
            tracing::error!(
                manifest_id = %manifest.id,
                path = %change.path,
                error = %e,
                "commit write failed, rolling back"
            );
            rollback(store.as_ref(), &applied).await;
            manifest.close(ManifestState::Aborted, "write failure");
            return Err(Error::internal(format!(
                "commit of manifest '{}' failed while writing '{}': {e}",
                manifest.id, change.path
            )));
        }
        applied.push(change);
    }

    let (deleted, written): (Vec<_>, Vec<_>) = plan.changes.iter().partition(|c| c.after.is_none());
    let report = CommitReport {
        manifest_id: manifest.id.clone(),
        state: ManifestState::Committed,
        written: written.into_iter().map(|c| c.path.clone()).collect(),
        deleted: deleted.into_iter().map(|c| c.path.clone()).collect(),
    };
    manifest.close(ManifestState::Committed, "committed");

    TraceEvent::RoundtripCommitted {
        manifest_id: report.manifest_id.clone(),
        files_written: report.written.len(),
        files_deleted: report.deleted.len(),
    }
    .emit();

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_hex_sha256() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }

    #[test]
    fn terminal_states() {
        assert!(!ManifestState::Started.is_terminal());
        assert!(!ManifestState::Previewed.is_terminal());
        assert!(ManifestState::Committed.is_terminal());
        assert!(ManifestState::Aborted.is_terminal());
        assert!(ManifestState::Expired.is_terminal());
    }

    #[test]
    fn settings_from_files_config() {
        let settings = RoundtripSettings::from(&FilesConfig::default());
        assert_eq!(settings.ttl, Duration::from_secs(900));
        assert_eq!(settings.max_paths, 100);
    }
}
