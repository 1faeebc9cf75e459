// src/engine/session.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::{Result, VfsWatchError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::roots::{
    BuildRootDirectory, ExclusionReason, GlobalCacheBoundary, RootDirectorySet, Watchability,
    WatchabilityFilter,
};
use crate::types::{BuildId, WatchMode};
use crate::vfs::SnapshotCache;
use crate::watch::{
    ApplyOutcome, Coalescer, Diagnostics, NativeEventReceiver, NativeWatcher, NotifyWatcher,
    SharedWatcher, WatchRegistry, WatchSet, WatchSetCalculator,
};

use super::core::InvalidationProcessor;
use super::runtime::WatchConsumer;
use super::WatchOptions;

/// What one recomputation of the watch set decided and did.
#[derive(Debug, Clone)]
pub struct WatchSetReport {
    pub mode: WatchMode,
    pub watch_set: WatchSet,
    pub outcome: ApplyOutcome,
    /// Roots that were not handed to the calculator, and why.
    pub excluded: Vec<(PathBuf, ExclusionReason)>,
    /// Roots that do not exist yet.
    pub missing: Vec<PathBuf>,
    /// Watching is off (by configuration or because the native facility
    /// died); nothing was registered.
    pub disabled: bool,
}

impl WatchSetReport {
    fn disabled(mode: WatchMode) -> Self {
        Self {
            mode,
            watch_set: WatchSet::empty(mode),
            outcome: ApplyOutcome::default(),
            excluded: Vec::new(),
            missing: Vec::new(),
            disabled: true,
        }
    }

    /// Directories registered natively after this recomputation, minus any
    /// whose registration failed.
    pub fn watched(&self) -> Vec<PathBuf> {
        let failed: BTreeSet<&Path> = self
            .outcome
            .failed
            .iter()
            .map(|f| f.path.as_path())
            .collect();
        self.watch_set
            .targets()
            .map(|t| t.path())
            .filter(|p| !failed.contains(p))
            .map(Path::to_path_buf)
            .collect()
    }
}

/// One watching session: lives as long as the daemon process.
///
/// Build invocations call [`WatchSession::build_started`] with the roots of
/// every participating build; the build engine reads snapshots through
/// [`WatchSession::cache`].
pub struct WatchSession {
    options: WatchOptions,
    mode: WatchMode,
    fs: Arc<dyn FileSystem>,
    boundary: GlobalCacheBoundary,
    cache: SnapshotCache,
    registry: WatchRegistry,
    consumer: WatchConsumer,
    /// Roots per build. A build's entry is replaced whenever it takes part
    /// in an invocation and dropped only by [`WatchSession::remove_build`].
    known_roots: BTreeMap<BuildId, BTreeSet<PathBuf>>,
    stopped: bool,
}

impl std::fmt::Debug for WatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSession")
            .field("mode", &self.mode)
            .field("builds", &self.known_roots.len())
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

impl WatchSession {
    /// Start a session on top of an existing adapter and its event stream.
    ///
    /// Must be called from within a tokio runtime: the consumer task is
    /// spawned here.
    pub fn start(
        options: WatchOptions,
        fs: Arc<dyn FileSystem>,
        watcher: Box<dyn NativeWatcher>,
        events: NativeEventReceiver,
    ) -> Self {
        let watcher = SharedWatcher::new(watcher);
        let mode = options.mode.resolve(watcher.capability());
        let boundary = GlobalCacheBoundary::new(&options.global_cache_dirs);

        let cache = SnapshotCache::new(mode, boundary.clone())
            .with_unwatchable(options.unwatchable.clone());
        if !options.enabled {
            info!("file system watching disabled by configuration");
            cache.disable();
        }

        let registry = WatchRegistry::new(watcher, cache.clone(), options.registration_timeout);
        let consumer = WatchConsumer::spawn(
            events,
            Coalescer::new(options.debounce),
            InvalidationProcessor::new(cache.clone(), mode),
            registry.clone(),
            Arc::clone(&fs),
        );

        info!(%mode, enabled = options.enabled, "watch session started");

        Self {
            options,
            mode,
            fs,
            boundary,
            cache,
            registry,
            consumer,
            known_roots: BTreeMap::new(),
            stopped: false,
        }
    }

    /// Start a session backed by the platform's native facility and the
    /// real filesystem.
    pub fn start_native(options: WatchOptions) -> Result<Self> {
        let (watcher, events) = NotifyWatcher::new()?;
        Ok(Self::start(
            options,
            Arc::new(RealFileSystem),
            Box::new(watcher),
            events,
        ))
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// The snapshot cache the build engine reads through.
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.registry.diagnostics()
    }

    /// Roots currently known for each build.
    pub fn known_roots(&self) -> &BTreeMap<BuildId, BTreeSet<PathBuf>> {
        &self.known_roots
    }

    /// A build invocation starts: record the roots of every participating
    /// build, recompute the watch set and bring the native registrations in
    /// line with it before returning.
    ///
    /// Builds not mentioned in `roots` keep the roots they declared before.
    pub async fn build_started(&mut self, roots: RootDirectorySet) -> Result<WatchSetReport> {
        self.ensure_running()?;

        for build in roots.builds() {
            let paths: BTreeSet<PathBuf> =
                roots.paths_for(&build).map(Path::to_path_buf).collect();
            self.known_roots.insert(build, paths);
        }

        self.recompute().await
    }

    /// Forget every root of `build` and recompute the watch set.
    pub async fn remove_build(&mut self, build: &BuildId) -> Result<WatchSetReport> {
        self.ensure_running()?;

        if self.known_roots.remove(build).is_none() {
            debug!(%build, "remove_build for unknown build");
        }
        self.recompute().await
    }

    /// Extend the global cache boundary. Cached entries inside `dir` are
    /// dropped right away; registrations inside it go at the next
    /// recomputation.
    pub fn add_global_cache_dir(&mut self, dir: impl AsRef<Path>) -> bool {
        let added = self.boundary.add(dir.as_ref());
        if added {
            info!(dir = ?dir.as_ref(), "added global cache directory");
            self.cache.set_boundary(self.boundary.clone());
        }
        added
    }

    /// Stop the consumer and release every native registration. Safe to
    /// call repeatedly.
    pub async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.consumer.stop().await;
        info!("watch session stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped {
            return Err(VfsWatchError::WatchingDisabled(
                "watch session has been stopped".to_string(),
            ));
        }
        Ok(())
    }

    async fn recompute(&mut self) -> Result<WatchSetReport> {
        if !self.options.enabled || self.registry.is_disabled() {
            debug!("watching disabled; skipping watch set recomputation");
            return Ok(WatchSetReport::disabled(self.mode));
        }

        let (watch_set, excluded, missing) = self.classify_and_compute();
        let outcome = self.registry.apply(&watch_set).await;

        let watched: Vec<PathBuf> = watch_set.target_paths();
        info!(
            mode = %self.mode,
            roots = ?watched,
            registered = outcome.registered.len(),
            unregistered = outcome.unregistered.len(),
            failed = outcome.failed.len(),
            "watching {} {} director{}",
            watched.len(),
            self.mode,
            if watched.len() == 1 { "y" } else { "ies" }
        );
        if !missing.is_empty() {
            debug!(?missing, "roots that do not exist yet");
        }

        Ok(WatchSetReport {
            mode: self.mode,
            watch_set,
            outcome,
            excluded,
            missing,
            disabled: self.registry.is_disabled(),
        })
    }

    fn classify_and_compute(&self) -> (WatchSet, Vec<(PathBuf, ExclusionReason)>, Vec<PathBuf>) {
        let filter =
            WatchabilityFilter::new(self.fs.as_ref(), &self.boundary, &self.options.unwatchable);
        let roots = self
            .known_roots
            .iter()
            .flat_map(|(build, paths)| paths.iter().map(move |p| (build, p.as_path())));
        classify_and_compute(self.mode, &filter, roots)
    }
}

/// Compute the report a session would produce for `roots` without
/// registering anything (used by `--dry-run`).
pub fn preview_watch_set(
    options: &WatchOptions,
    mode: WatchMode,
    fs: &dyn FileSystem,
    roots: &RootDirectorySet,
) -> WatchSetReport {
    let boundary = GlobalCacheBoundary::new(&options.global_cache_dirs);
    let filter = WatchabilityFilter::new(fs, &boundary, &options.unwatchable);
    let (watch_set, excluded, missing) = classify_and_compute(
        mode,
        &filter,
        roots.iter().map(|r| (r.build(), r.path())),
    );
    WatchSetReport {
        mode,
        watch_set,
        outcome: ApplyOutcome::default(),
        excluded,
        missing,
        disabled: !options.enabled,
    }
}

fn classify_and_compute<'r>(
    mode: WatchMode,
    filter: &WatchabilityFilter<'_>,
    roots: impl Iterator<Item = (&'r BuildId, &'r Path)>,
) -> (WatchSet, Vec<(PathBuf, ExclusionReason)>, Vec<PathBuf>) {
    let mut watchable = Vec::new();
    let mut excluded = Vec::new();
    let mut missing = Vec::new();
    let mut any_root = false;

    for (build, path) in roots {
        any_root = true;
        match filter.classify(path) {
            Watchability::Watchable(path) => {
                watchable.push(BuildRootDirectory::new(build.clone(), path));
            }
            Watchability::Excluded(reason) => {
                debug!(root = ?path, %build, %reason, "root excluded from watching");
                excluded.push((path.to_path_buf(), reason));
            }
            Watchability::Missing => {
                missing.push(path.to_path_buf());
            }
        }
    }

    let watch_set = WatchSetCalculator::new(mode).compute(&watchable, filter);
    if watch_set.is_empty() && any_root {
        warn!("no build root can be watched; every lookup will read from disk");
    }
    (watch_set, excluded, missing)
}
