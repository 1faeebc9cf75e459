// src/watch/calculator.rs

//! Reduction of build root directories to the set of directories that are
//! registered with the native watcher, and the diff against the previously
//! registered set.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::fs::FsKind;
use crate::roots::{BuildRootDirectory, WatchabilityFilter};
use crate::types::{BuildId, WatchMode};
use crate::watch::path_utils::{is_same_or_descendant, is_strict_descendant};

/// A directory registered (or to be registered) with the native watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    path: PathBuf,
    mode: WatchMode,
    /// Every build whose root resolved to exactly this directory.
    owners: BTreeSet<BuildId>,
}

impl WatchTarget {
    pub fn new(path: impl Into<PathBuf>, mode: WatchMode, owner: BuildId) -> Self {
        Self {
            path: path.into(),
            mode,
            owners: BTreeSet::from([owner]),
        }
    }

    pub(crate) fn with_owners(
        path: impl Into<PathBuf>,
        mode: WatchMode,
        owners: BTreeSet<BuildId>,
    ) -> Self {
        Self {
            path: path.into(),
            mode,
            owners,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn owners(&self) -> &BTreeSet<BuildId> {
        &self.owners
    }

    pub(crate) fn merge_owners(&mut self, owners: &BTreeSet<BuildId>) {
        self.owners.extend(owners.iter().cloned());
    }

    /// Whether events for `path` are delivered through this registration.
    pub fn observes(&self, path: &Path) -> bool {
        match self.mode {
            WatchMode::Hierarchical => is_same_or_descendant(path, &self.path),
            WatchMode::Flat => path == self.path || path.parent() == Some(self.path.as_path()),
        }
    }
}

/// Result of a watch-set computation.
///
/// This is the structured form of the "watching N hierarchies" operator log
/// line: tests and diagnostics query it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchSet {
    mode: WatchMode,
    targets: BTreeMap<PathBuf, WatchTarget>,
    /// Input root → the target directory that covers it.
    covered_by: BTreeMap<PathBuf, PathBuf>,
}

impl WatchSet {
    pub fn empty(mode: WatchMode) -> Self {
        Self {
            mode,
            targets: BTreeMap::new(),
            covered_by: BTreeMap::new(),
        }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn targets(&self) -> impl Iterator<Item = &WatchTarget> {
        self.targets.values()
    }

    pub fn target_paths(&self) -> Vec<PathBuf> {
        self.targets.keys().cloned().collect()
    }

    pub fn get(&self, path: &Path) -> Option<&WatchTarget> {
        self.targets.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.targets.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// The target covering input root `root`, if `root` was part of the input.
    pub fn covering_target(&self, root: &Path) -> Option<&Path> {
        self.covered_by.get(root).map(PathBuf::as_path)
    }
}

/// Pure computation of the minimal set of directories to register.
///
/// The mode is a capability of the platform adapter, chosen once at session
/// start and passed in here; the calculator never queries the platform.
#[derive(Debug, Clone, Copy)]
pub struct WatchSetCalculator {
    mode: WatchMode,
}

impl WatchSetCalculator {
    pub fn new(mode: WatchMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    /// Compute the watch set for `roots`, which must already be classified
    /// as watchable.
    ///
    /// `filter` is only consulted in flat mode, where the tree below every
    /// root is walked to find each directory that needs its own registration.
    pub fn compute(
        &self,
        roots: &[BuildRootDirectory],
        filter: &WatchabilityFilter<'_>,
    ) -> WatchSet {
        match self.mode {
            WatchMode::Hierarchical => hierarchical_watch_set(roots),
            WatchMode::Flat => flat_watch_set(roots, filter),
        }
    }
}

/// Hierarchical reduction.
///
/// Candidates are sorted by path and folded left to right:
/// - equal to a chosen target → the owners are merged into that target;
/// - below a chosen target → skipped, the ancestor already observes it;
/// - otherwise it becomes a target, replacing any chosen descendants.
pub fn hierarchical_watch_set(roots: &[BuildRootDirectory]) -> WatchSet {
    let mut candidates: Vec<&BuildRootDirectory> = roots.iter().collect();
    candidates.sort_by(|a, b| a.path().cmp(b.path()));

    let mut chosen: BTreeMap<PathBuf, WatchTarget> = BTreeMap::new();

    for root in candidates {
        let path = root.path();

        if let Some(existing) = chosen.get_mut(path) {
            existing.owners.insert(root.build().clone());
            continue;
        }

        if chosen.keys().any(|target| is_strict_descendant(path, target)) {
            debug!(root = ?path, "root already covered by an ancestor target");
            continue;
        }

        // Sorted input never hits this, but the invariant must not depend on
        // the caller's ordering.
        chosen.retain(|target, _| !is_strict_descendant(target, path));

        chosen.insert(
            path.to_path_buf(),
            WatchTarget::new(path, WatchMode::Hierarchical, root.build().clone()),
        );
    }

    let covered_by = roots
        .iter()
        .filter_map(|root| {
            chosen
                .keys()
                .find(|target| is_same_or_descendant(root.path(), target))
                .map(|target| (root.path().to_path_buf(), target.clone()))
        })
        .collect();

    WatchSet {
        mode: WatchMode::Hierarchical,
        targets: chosen,
        covered_by,
    }
}

/// Flat expansion: every root and every real (non-symlink) directory below
/// it becomes a target, except subtrees the filter excludes.
pub fn flat_watch_set(roots: &[BuildRootDirectory], filter: &WatchabilityFilter<'_>) -> WatchSet {
    let fs = filter.fs();
    let mut targets: BTreeMap<PathBuf, WatchTarget> = BTreeMap::new();

    let mut sorted: Vec<&BuildRootDirectory> = roots.iter().collect();
    sorted.sort_by(|a, b| a.path().cmp(b.path()));

    for root in sorted {
        let mut stack: Vec<PathBuf> = vec![root.path().to_path_buf()];

        while let Some(dir) = stack.pop() {
            if let Some(existing) = targets.get_mut(&dir) {
                // Reached through another (nested or identical) root; its
                // children have already been walked.
                existing.owners.insert(root.build().clone());
                continue;
            }

            targets.insert(
                dir.clone(),
                WatchTarget::new(&dir, WatchMode::Flat, root.build().clone()),
            );

            let children = match fs.read_dir(&dir) {
                Ok(children) => children,
                Err(err) => {
                    warn!(dir = ?dir, error = %err, "failed to list directory for flat watching");
                    continue;
                }
            };

            for child in children {
                if filter.is_excluded(&child) {
                    continue;
                }
                match fs.symlink_metadata(&child) {
                    Ok(Some(meta)) if meta.kind == FsKind::Dir => stack.push(child),
                    Ok(_) => {}
                    Err(err) => {
                        debug!(path = ?child, error = %err, "skipping unreadable entry");
                    }
                }
            }
        }
    }

    let covered_by = roots
        .iter()
        .map(|root| (root.path().to_path_buf(), root.path().to_path_buf()))
        .collect();

    WatchSet {
        mode: WatchMode::Flat,
        targets,
        covered_by,
    }
}

/// Register/unregister work needed to move from one watch set to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSetDiff {
    pub to_register: Vec<WatchTarget>,
    pub to_unregister: Vec<PathBuf>,
    /// Present before and after; must be left alone.
    pub unchanged: Vec<PathBuf>,
}

impl WatchSetDiff {
    pub fn is_empty(&self) -> bool {
        self.to_register.is_empty() && self.to_unregister.is_empty()
    }
}

/// Diff the currently registered directories against the next watch set.
///
/// Directories in both are reported as unchanged and never appear in either
/// the register or the unregister list, so coverage has no gap.
pub fn diff_watch_sets(registered: &BTreeSet<PathBuf>, next: &WatchSet) -> WatchSetDiff {
    let to_unregister = registered
        .iter()
        .filter(|path| !next.contains(path))
        .cloned()
        .collect();

    let mut to_register = Vec::new();
    let mut unchanged = Vec::new();
    for target in next.targets() {
        if registered.contains(target.path()) {
            unchanged.push(target.path().to_path_buf());
        } else {
            to_register.push(target.clone());
        }
    }

    WatchSetDiff {
        to_register,
        to_unregister,
        unchanged,
    }
}
