// src/roots/filter.rs

//! Classification of candidate directories before they reach the watch-set
//! calculator.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::debug;

use crate::fs::FileSystem;
use crate::roots::boundary::GlobalCacheBoundary;

/// Outcome of classifying one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watchability {
    Watchable(PathBuf),
    Excluded(ExclusionReason),
    /// Does not exist right now; retried on the next build invocation.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// Lies inside an append-only global cache.
    InsideGlobalCache { prefix: PathBuf },
    /// The host environment cannot watch it (e.g. a network mount).
    Unwatchable { pattern: String },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::InsideGlobalCache { prefix } => {
                write!(f, "inside global cache {}", prefix.display())
            }
            ExclusionReason::Unwatchable { pattern } => {
                write!(f, "matches unwatchable pattern {pattern:?}")
            }
        }
    }
}

/// Compiled `unwatchable` glob patterns from the `[watch]` config section.
#[derive(Clone)]
pub struct UnwatchablePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for UnwatchablePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnwatchablePatterns")
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl Default for UnwatchablePatterns {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

impl UnwatchablePatterns {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pat in patterns {
            let glob = Glob::new(pat)
                .with_context(|| format!("invalid unwatchable glob pattern: {pat}"))?;
            builder.add(glob);
        }
        let set = builder.build().context("building unwatchable glob set")?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    /// The first pattern matching `path` or any of its ancestors.
    pub fn matching_pattern(&self, path: &Path) -> Option<&str> {
        if self.patterns.is_empty() {
            return None;
        }
        path.ancestors()
            .find_map(|candidate| self.set.matches(candidate).first().copied())
            .map(|idx| self.patterns[idx].as_str())
    }
}

/// Pure classification of directories into watchable / excluded / missing.
#[derive(Debug, Clone, Copy)]
pub struct WatchabilityFilter<'a> {
    fs: &'a dyn FileSystem,
    boundary: &'a GlobalCacheBoundary,
    unwatchable: &'a UnwatchablePatterns,
}

impl<'a> WatchabilityFilter<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        boundary: &'a GlobalCacheBoundary,
        unwatchable: &'a UnwatchablePatterns,
    ) -> Self {
        Self {
            fs,
            boundary,
            unwatchable,
        }
    }

    pub fn fs(&self) -> &'a dyn FileSystem {
        self.fs
    }

    /// Classify a root. Watchable roots come back canonical, symlinks
    /// resolved, since native events report the resolved location.
    pub fn classify(&self, path: &Path) -> Watchability {
        if let Some(reason) = self.exclusion(path) {
            return Watchability::Excluded(reason);
        }

        if !self.fs.is_dir(path) {
            return Watchability::Missing;
        }

        let canonical = match self.fs.canonicalize(path) {
            Ok(canonical) => canonical,
            Err(err) => {
                debug!(root = ?path, error = %err, "cannot canonicalize root; using it as given");
                return Watchability::Watchable(path.to_path_buf());
            }
        };
        if canonical != path {
            if let Some(reason) = self.exclusion(&canonical) {
                return Watchability::Excluded(reason);
            }
            debug!(root = ?path, canonical = ?canonical, "root resolved through a symlink");
        }
        Watchability::Watchable(canonical)
    }

    fn exclusion(&self, path: &Path) -> Option<ExclusionReason> {
        if let Some(prefix) = self.boundary.enclosing_prefix(path) {
            return Some(ExclusionReason::InsideGlobalCache {
                prefix: prefix.to_path_buf(),
            });
        }
        self.unwatchable
            .matching_pattern(path)
            .map(|pattern| ExclusionReason::Unwatchable {
                pattern: pattern.to_string(),
            })
    }

    /// Cheaper check used while walking directory trees: excluded by the
    /// boundary or a pattern, without touching the filesystem.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.boundary.contains(path) || self.unwatchable.matching_pattern(path).is_some()
    }
}
