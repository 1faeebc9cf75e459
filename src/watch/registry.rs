// src/watch/registry.rs

//! Book-keeping of live native registrations.
//!
//! The registry is the only component that talks to the native adapter.
//! It applies watch-set diffs at build start, releases registrations whose
//! directory was deleted, adopts new directories in flat mode, and keeps the
//! snapshot cache's notion of "observed" in sync with what is registered.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::{Result, VfsWatchError};
use crate::types::WatchMode;
use crate::vfs::SnapshotCache;
use crate::watch::adapter::SharedWatcher;
use crate::watch::calculator::{diff_watch_sets, WatchSet, WatchTarget};
use crate::watch::path_utils::is_same_or_descendant;

/// A directory that could not be registered this build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// What applying one watch set did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub registered: Vec<PathBuf>,
    pub unregistered: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub failed: Vec<RegistrationFailure>,
}

/// Operator-visible state of the watching subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Directories whose registration failed, with the last reason. Paths
    /// under these always miss in the snapshot cache.
    pub unwatched: BTreeMap<PathBuf, String>,
    /// Overflow count per enclosing watch target.
    pub overflows: BTreeMap<PathBuf, u64>,
    /// Raw events received from the native adapter.
    pub events_received: u64,
    /// Events applied to the cache after coalescing.
    pub events_applied: u64,
    /// Cache entries dropped by applied events.
    pub entries_invalidated: u64,
    /// Registrations released because their directory was deleted.
    pub released: u64,
    /// Directories registered on the fly (flat mode).
    pub adopted: u64,
    /// Set once watching is disabled for the rest of the session.
    pub disabled_reason: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    registered: BTreeMap<PathBuf, WatchTarget>,
    /// Directories whose failure has already been warned about.
    reported: HashSet<PathBuf>,
    /// Latest registration attempt per directory. A late success only
    /// releases its handle while it is still the latest attempt.
    attempts: HashMap<PathBuf, u64>,
    next_attempt: u64,
    diagnostics: Diagnostics,
}

/// Poll interval while waiting for a stalled native call to return.
const BUSY_POLL: Duration = Duration::from_millis(5);

/// Cheap-clone handle shared by the session and the consumer task.
#[derive(Debug, Clone)]
pub struct WatchRegistry {
    watcher: SharedWatcher,
    cache: SnapshotCache,
    registration_timeout: Duration,
    state: Arc<Mutex<RegistryState>>,
}

impl WatchRegistry {
    pub fn new(watcher: SharedWatcher, cache: SnapshotCache, registration_timeout: Duration) -> Self {
        Self {
            watcher,
            cache,
            registration_timeout,
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capability(&self) -> WatchMode {
        self.watcher.capability()
    }

    pub fn is_disabled(&self) -> bool {
        self.lock().diagnostics.disabled_reason.is_some()
    }

    /// Move the native registrations from whatever is registered now to
    /// `next`.
    ///
    /// New directories are registered before stale ones are released so an
    /// ancestor replacing a descendant never leaves a gap. Directories in
    /// both sets are not touched.
    pub async fn apply(&self, next: &WatchSet) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        if self.is_disabled() {
            return outcome;
        }

        let diff = {
            let mut state = self.lock();
            let registered: BTreeSet<PathBuf> = state.registered.keys().cloned().collect();
            let diff = diff_watch_sets(&registered, next);
            for path in &diff.unchanged {
                if let (Some(current), Some(wanted)) = (state.registered.get_mut(path), next.get(path)) {
                    current.merge_owners(wanted.owners());
                }
            }
            diff
        };
        outcome.unchanged = diff.unchanged;

        let deferred = self.register_batch(diff.to_register, &mut outcome).await;
        if !deferred.is_empty() {
            let idle = self.wait_until_idle(self.registration_timeout).await;
            let still_deferred = if idle {
                self.register_batch(deferred.into_iter().map(|(t, _)| t).collect(), &mut outcome)
                    .await
            } else {
                deferred
            };
            for (target, stalled) in still_deferred {
                let err = VfsWatchError::WatcherBusy { stalled };
                self.record_failure(target.path().to_path_buf(), &err, &mut outcome);
            }
        }

        if !diff.to_unregister.is_empty() {
            let watcher = self.watcher.clone();
            let paths = diff.to_unregister.clone();
            let released = tokio::task::spawn_blocking(move || {
                for path in &paths {
                    if let Err(err) = watcher.stop_watching(path) {
                        debug!(dir = ?path, error = %err, "failed to release native watch");
                    }
                }
            })
            .await;
            if let Err(err) = released {
                warn!(error = %err, "releasing stale watches panicked");
            }

            let mut state = self.lock();
            for path in &diff.to_unregister {
                state.registered.remove(path);
            }
            outcome.unregistered = diff.to_unregister;
        }

        {
            let mut state = self.lock();
            state.diagnostics.unwatched.retain(|path, _| next.contains(path));
        }
        self.publish_coverage();
        outcome
    }

    /// Register `targets` one by one. Once a registration times out its
    /// native call still holds the adapter, so the rest are handed back
    /// (paired with the stalled directory) instead of each waiting out its
    /// own timeout behind it.
    async fn register_batch(
        &self,
        targets: Vec<WatchTarget>,
        outcome: &mut ApplyOutcome,
    ) -> Vec<(WatchTarget, PathBuf)> {
        let mut deferred = Vec::new();
        let mut stalled: Option<PathBuf> = None;

        for target in targets {
            if let Some(stalled_on) = &stalled {
                if self.watcher.is_busy() {
                    debug!(dir = ?target.path(), stalled = ?stalled_on, "deferring registration");
                    deferred.push((target, stalled_on.clone()));
                    continue;
                }
                stalled = None;
            }

            let path = target.path().to_path_buf();
            match self.register_one(&target).await {
                Ok(()) => {
                    let mut state = self.lock();
                    state.diagnostics.unwatched.remove(&path);
                    state.registered.insert(path.clone(), target);
                    outcome.registered.push(path);
                }
                Err(err) => {
                    if matches!(err, VfsWatchError::RegistrationTimedOut { .. }) {
                        stalled = Some(path.clone());
                    }
                    self.record_failure(path, &err, outcome);
                }
            }
        }
        deferred
    }

    fn record_failure(&self, path: PathBuf, err: &VfsWatchError, outcome: &mut ApplyOutcome) {
        let reason = err.to_string();
        let mut state = self.lock();
        if state.reported.insert(path.clone()) {
            warn!(
                dir = ?path,
                error = %reason,
                "failed to watch directory; its contents will be re-read on every build"
            );
        } else {
            debug!(dir = ?path, error = %reason, "directory still cannot be watched");
        }
        state.diagnostics.unwatched.insert(path.clone(), reason.clone());
        outcome.failed.push(RegistrationFailure { path, reason });
    }

    /// Wait at most `budget` for the adapter to come free.
    async fn wait_until_idle(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        while self.watcher.is_busy() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(BUSY_POLL).await;
        }
        true
    }

    fn begin_attempt(&self, path: &Path) -> u64 {
        let mut state = self.lock();
        state.next_attempt += 1;
        let attempt = state.next_attempt;
        state.attempts.insert(path.to_path_buf(), attempt);
        attempt
    }

    async fn register_one(&self, target: &WatchTarget) -> Result<()> {
        let watcher = self.watcher.clone();
        let path = target.path().to_path_buf();
        let mode = target.mode();
        let attempt = self.begin_attempt(&path);
        let mut task = {
            let path = path.clone();
            tokio::task::spawn_blocking(move || watcher.start_watching(&path, mode))
        };

        match tokio::time::timeout(self.registration_timeout, &mut task).await {
            Ok(Ok(res)) => res,
            Ok(Err(join_err)) => Err(VfsWatchError::Other(anyhow::anyhow!(
                "registration task failed: {join_err}"
            ))),
            Err(_) => {
                self.release_if_late(task, path.clone(), attempt);
                Err(VfsWatchError::RegistrationTimedOut {
                    path,
                    timeout: self.registration_timeout,
                })
            }
        }
    }

    /// A timed-out registration may still succeed natively. Drop the handle
    /// when it does, unless the directory was registered again since.
    ///
    /// The check and the release happen under the registry lock, so a new
    /// attempt cannot slip in between them.
    fn release_if_late(&self, task: JoinHandle<Result<()>>, path: PathBuf, attempt: u64) {
        let registry = self.clone();
        tokio::spawn(async move {
            if !matches!(task.await, Ok(Ok(()))) {
                return;
            }
            let released = tokio::task::spawn_blocking(move || {
                let mut state = registry.lock();
                if state.attempts.get(&path) != Some(&attempt)
                    || state.registered.contains_key(&path)
                {
                    return Ok(());
                }
                state.attempts.remove(&path);
                debug!(dir = ?path, "releasing registration that completed after its timeout");
                registry.watcher.stop_watching(&path)
            })
            .await;
            if let Ok(Err(err)) = released {
                debug!(error = %err, "failed to release late registration");
            }
        });
    }

    fn publish_coverage(&self) {
        let watched: BTreeSet<PathBuf> = self.lock().registered.keys().cloned().collect();
        self.cache.set_watched(watched);
    }

    /// The registered directory at `dir` went away; drop its native handle
    /// right now so the OS is not kept holding it. Registered directories
    /// below it (flat mode) went with it and are released too.
    ///
    /// Returns `true` if anything was registered at or below `dir`.
    pub fn release(&self, dir: &Path) -> bool {
        let removed: Vec<PathBuf> = {
            let mut state = self.lock();
            let gone: Vec<PathBuf> = state
                .registered
                .keys()
                .filter(|path| is_same_or_descendant(path, dir))
                .cloned()
                .collect();
            for path in &gone {
                state.registered.remove(path);
            }
            state.diagnostics.released += gone.len() as u64;
            gone
        };
        if removed.is_empty() {
            return false;
        }

        for path in &removed {
            if let Err(err) = self.watcher.stop_watching(path) {
                // The OS usually drops the handle itself when the directory goes.
                debug!(dir = ?path, error = %err, "native watch already gone");
            }
            self.cache.release(path);
        }
        info!(dir = ?dir, released = removed.len(), "watched directory deleted; released its watch");
        true
    }

    /// Register a freshly created directory below a flat-watched directory.
    ///
    /// Returns `true` if a new registration was made.
    pub fn adopt(&self, dir: &Path) -> bool {
        let owners = {
            let state = self.lock();
            if state.diagnostics.disabled_reason.is_some() || state.registered.contains_key(dir) {
                return false;
            }
            let Some(parent) = dir.parent().and_then(|p| state.registered.get(p)) else {
                return false;
            };
            if parent.mode() != WatchMode::Flat {
                return false;
            }
            parent.owners().clone()
        };

        self.begin_attempt(dir);
        if let Err(err) = self.watcher.start_watching(dir, WatchMode::Flat) {
            debug!(dir = ?dir, error = %err, "could not adopt new directory");
            return false;
        }

        {
            let mut state = self.lock();
            state.registered.insert(
                dir.to_path_buf(),
                WatchTarget::with_owners(dir, WatchMode::Flat, owners),
            );
            state.diagnostics.adopted += 1;
        }

        self.cache.adopt(dir);
        debug!(dir = ?dir, "adopted new directory");
        true
    }

    pub fn is_registered(&self, dir: &Path) -> bool {
        self.lock().registered.contains_key(dir)
    }

    pub fn registered(&self) -> Vec<PathBuf> {
        self.lock().registered.keys().cloned().collect()
    }

    /// Nearest registered directory at or above `path`.
    pub fn enclosing_target(&self, path: &Path) -> Option<PathBuf> {
        let state = self.lock();
        path.ancestors()
            .find(|a| state.registered.contains_key(*a))
            .map(Path::to_path_buf)
    }

    pub fn record_overflow(&self, path: &Path) {
        let key = self.enclosing_target(path).unwrap_or_else(|| path.to_path_buf());
        let mut state = self.lock();
        *state.diagnostics.overflows.entry(key).or_insert(0) += 1;
    }

    pub fn note_received(&self, count: u64) {
        self.lock().diagnostics.events_received += count;
    }

    pub fn note_applied(&self, invalidated: u64) {
        let mut state = self.lock();
        state.diagnostics.events_applied += 1;
        state.diagnostics.entries_invalidated += invalidated;
    }

    /// Release every registration. Safe to call repeatedly.
    pub fn release_all(&self) {
        let registered: Vec<PathBuf> = {
            let mut state = self.lock();
            let paths = state.registered.keys().cloned().collect();
            state.registered.clear();
            paths
        };
        for path in &registered {
            if let Err(err) = self.watcher.stop_watching(path) {
                debug!(dir = ?path, error = %err, "failed to release native watch");
            }
        }
        if !registered.is_empty() {
            info!(released = registered.len(), "released all native watches");
        }
        self.cache.set_watched(BTreeSet::new());
    }

    /// The native facility is gone: stop trusting anything for the rest of
    /// the session.
    pub fn disable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut state = self.lock();
            if state.diagnostics.disabled_reason.is_some() {
                return;
            }
            state.diagnostics.disabled_reason = Some(reason.clone());
        }
        self.release_all();
        self.cache.disable();
        tracing::error!(reason = %reason, "file system watching disabled for this session");
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.lock().diagnostics.clone()
    }
}
