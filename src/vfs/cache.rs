// src/vfs/cache.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use tracing::{debug, info};

use crate::fs::FileSystem;
use crate::roots::{GlobalCacheBoundary, UnwatchablePatterns};
use crate::types::WatchMode;
use crate::vfs::snapshot::{read_snapshot, Snapshot};
use crate::vfs::trie::SnapshotTrie;
use crate::watch::path_utils::normalize;

/// Which paths the cache may hold entries for.
///
/// An entry is only trustworthy while some live registration delivers
/// events for it. Everything else is a forced miss.
#[derive(Debug, Clone)]
struct Coverage {
    mode: WatchMode,
    watched: BTreeSet<PathBuf>,
    boundary: GlobalCacheBoundary,
    /// The host delivers no events below these, even inside a watched root.
    unwatchable: UnwatchablePatterns,
    enabled: bool,
}

impl Coverage {
    fn observes(&self, path: &Path) -> bool {
        match self.mode {
            WatchMode::Hierarchical => path.ancestors().any(|a| self.watched.contains(a)),
            WatchMode::Flat => {
                self.watched.contains(path)
                    || path.parent().is_some_and(|p| self.watched.contains(p))
            }
        }
    }

    fn excludes(&self, path: &Path) -> bool {
        self.boundary.contains(path) || self.unwatchable.matching_pattern(path).is_some()
    }

    fn trusts(&self, path: &Path) -> bool {
        self.enabled && !self.excludes(path) && self.observes(path)
    }
}

/// Counters exposed to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub recorded: u64,
    pub invalidated: u64,
}

#[derive(Debug, Default)]
struct StatCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    recorded: AtomicU64,
    invalidated: AtomicU64,
}

impl StatCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

#[derive(Debug)]
struct CacheInner {
    trie: SnapshotTrie,
    coverage: Coverage,
    /// Bumped on every invalidation; guards read-through against racing
    /// with an event applied between the disk read and the record.
    generation: u64,
    stats: StatCounters,
}

/// In-memory mapping from absolute path to last known [`Snapshot`].
///
/// Cheap to clone; all clones share the same state. Reads take a shared
/// lock, writes are serialized. Callers only ever get copies of snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    inner: Arc<RwLock<CacheInner>>,
}

impl SnapshotCache {
    /// A cache with nothing watched yet: every lookup misses until the first
    /// watch set is published with [`SnapshotCache::set_watched`].
    pub fn new(mode: WatchMode, boundary: GlobalCacheBoundary) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                trie: SnapshotTrie::new(),
                coverage: Coverage {
                    mode,
                    watched: BTreeSet::new(),
                    boundary,
                    unwatchable: UnwatchablePatterns::default(),
                    enabled: true,
                },
                generation: 0,
                stats: StatCounters::default(),
            })),
        }
    }

    /// Never trust paths matching `patterns`, even inside a watched root.
    pub fn with_unwatchable(self, patterns: UnwatchablePatterns) -> Self {
        self.write().coverage.unwatchable = patterns;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Last recorded snapshot for `path`, or `None` meaning "unknown: read
    /// from disk".
    pub fn get(&self, path: &Path) -> Option<Snapshot> {
        let path = normalize(path);
        let inner = self.read();
        let found = if inner.coverage.trusts(&path) {
            inner.trie.get(&path).cloned()
        } else {
            None
        };
        match found {
            Some(_) => StatCounters::bump(&inner.stats.hits, 1),
            None => StatCounters::bump(&inner.stats.misses, 1),
        }
        found
    }

    /// Store `snapshot` for `path`.
    ///
    /// Returns `false` (and stores nothing) when the path is not covered by
    /// a live watch, lies in a global cache, or watching is disabled.
    pub fn record(&self, path: &Path, snapshot: Snapshot) -> bool {
        let path = normalize(path);
        let mut inner = self.write();
        Self::record_locked(&mut inner, &path, snapshot)
    }

    fn record_locked(inner: &mut CacheInner, path: &Path, snapshot: Snapshot) -> bool {
        if !inner.coverage.trusts(path) {
            debug!(path = ?path, "refusing to record snapshot for unobserved path");
            return false;
        }
        inner.trie.insert(path, snapshot);
        StatCounters::bump(&inner.stats.recorded, 1);
        true
    }

    /// Drop the entry for exactly `path`; it is re-derived on next read.
    pub fn invalidate(&self, path: &Path) -> bool {
        let path = normalize(path);
        let mut inner = self.write();
        if inner.coverage.boundary.contains(&path) {
            return false;
        }
        inner.generation += 1;
        let removed = inner.trie.remove(&path).is_some();
        if removed {
            StatCounters::bump(&inner.stats.invalidated, 1);
        }
        removed
    }

    /// Drop `prefix` and every entry below it. Returns how many were dropped.
    pub fn invalidate_subtree(&self, prefix: &Path) -> usize {
        let prefix = normalize(prefix);
        let mut inner = self.write();
        if inner.coverage.boundary.contains(&prefix) {
            return 0;
        }
        inner.generation += 1;
        let removed = inner.trie.remove_subtree(&prefix);
        StatCounters::bump(&inner.stats.invalidated, removed as u64);
        removed
    }

    /// Cached snapshot, or a fresh one read through `fs` (and recorded when
    /// the path is observed).
    pub fn get_or_read(&self, fs: &dyn FileSystem, path: &Path) -> Result<Snapshot> {
        if let Some(snapshot) = self.get(path) {
            return Ok(snapshot);
        }

        let generation = self.read().generation;
        let snapshot = read_snapshot(fs, path)?;

        let path = normalize(path);
        let mut inner = self.write();
        if inner.generation == generation {
            Self::record_locked(&mut inner, &path, snapshot.clone());
        } else {
            debug!(path = ?path, "change observed during read-through; not caching");
        }
        Ok(snapshot)
    }

    /// Publish the set of directories with a live registration.
    ///
    /// Entries below directories that lose coverage are purged: nobody
    /// delivered their events in the meantime.
    pub fn set_watched(&self, watched: BTreeSet<PathBuf>) {
        let mut inner = self.write();
        let previous = std::mem::replace(&mut inner.coverage.watched, watched);
        let lost: Vec<PathBuf> = previous
            .into_iter()
            .filter(|dir| !inner.coverage.watched.contains(dir))
            .collect();
        for dir in lost {
            Self::purge_unobserved_locked(&mut inner, &dir);
        }
    }

    /// A single registration went away (e.g. its directory was deleted).
    pub fn release(&self, dir: &Path) {
        let dir = normalize(dir);
        let mut inner = self.write();
        if inner.coverage.watched.remove(&dir) {
            Self::purge_unobserved_locked(&mut inner, &dir);
        }
    }

    /// A new directory was registered outside a build's diff (flat mode
    /// adoption of freshly created directories).
    pub fn adopt(&self, dir: &Path) {
        let dir = normalize(dir);
        self.write().coverage.watched.insert(dir);
    }

    fn purge_unobserved_locked(inner: &mut CacheInner, dir: &Path) {
        inner.generation += 1;
        let still_observed =
            inner.coverage.mode == WatchMode::Hierarchical && inner.coverage.observes(dir);
        let removed = if still_observed {
            0
        } else {
            inner.trie.remove_subtree(dir)
        };
        if removed > 0 {
            debug!(dir = ?dir, removed, "purged entries that lost watch coverage");
        }
        StatCounters::bump(&inner.stats.invalidated, removed as u64);
    }

    /// Replace the global cache boundary, dropping entries that fall inside
    /// any new prefix.
    pub fn set_boundary(&self, boundary: GlobalCacheBoundary) {
        let mut inner = self.write();
        let prefixes: Vec<PathBuf> = boundary.prefixes().map(Path::to_path_buf).collect();
        for prefix in prefixes {
            inner.trie.remove_subtree(&prefix);
        }
        inner.coverage.boundary = boundary;
    }

    /// Watching is gone for the rest of the session: drop everything and
    /// miss on every lookup from now on.
    pub fn disable(&self) {
        let mut inner = self.write();
        if !inner.coverage.enabled {
            return;
        }
        inner.coverage.enabled = false;
        inner.coverage.watched.clear();
        inner.generation += 1;
        let dropped = inner.trie.len();
        inner.trie.clear();
        info!(dropped, "snapshot cache disabled");
    }

    pub fn is_enabled(&self) -> bool {
        self.read().coverage.enabled
    }

    /// Whether `path` lies in an append-only global cache directory.
    pub fn is_inside_boundary(&self, path: &Path) -> bool {
        self.read().coverage.boundary.contains(&normalize(path))
    }

    /// Whether `path` is never observed: inside a global cache or below a
    /// directory matching an `unwatchable` pattern.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.read().coverage.excludes(&normalize(path))
    }

    /// Whether a lookup for `path` can ever hit right now.
    pub fn is_trusted(&self, path: &Path) -> bool {
        self.read().coverage.trusts(&normalize(path))
    }

    pub fn len(&self) -> usize {
        self.read().trie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().trie.is_empty()
    }

    /// Every recorded path (including ones not currently trusted).
    pub fn recorded_paths(&self) -> Vec<PathBuf> {
        self.read().trie.paths()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.read();
        CacheStats {
            hits: inner.stats.hits.load(Ordering::Relaxed),
            misses: inner.stats.misses.load(Ordering::Relaxed),
            recorded: inner.stats.recorded.load(Ordering::Relaxed),
            invalidated: inner.stats.invalidated.load(Ordering::Relaxed),
        }
    }
}
