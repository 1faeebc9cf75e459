// src/roots/boundary.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::watch::path_utils::{is_same_or_descendant, normalize};

/// Path prefixes of append-only, content-addressed storage (artifact caches,
/// transform caches, ...).
///
/// Nothing at or below one of these prefixes is ever registered with the
/// native watcher, recorded in the snapshot cache, or invalidated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalCacheBoundary {
    prefixes: BTreeSet<PathBuf>,
}

impl GlobalCacheBoundary {
    pub fn new<I, P>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            prefixes: prefixes.into_iter().map(|p| normalize(p.as_ref())).collect(),
        }
    }

    /// Add another prefix. Returns `false` if it was already present.
    pub fn add(&mut self, prefix: impl AsRef<Path>) -> bool {
        self.prefixes.insert(normalize(prefix.as_ref()))
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.enclosing_prefix(path).is_some()
    }

    /// The boundary prefix `path` lies in, if any.
    pub fn enclosing_prefix(&self, path: &Path) -> Option<&Path> {
        self.prefixes
            .iter()
            .find(|prefix| is_same_or_descendant(path, prefix))
            .map(PathBuf::as_path)
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &Path> {
        self.prefixes.iter().map(PathBuf::as_path)
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }
}
