// src/roots/set.rs

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::errors::{Result, VfsWatchError};
use crate::fs::FileSystem;
use crate::types::BuildId;
use crate::watch::path_utils::normalize;

/// A root directory of one build participating in the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BuildRootDirectory {
    path: PathBuf,
    build: BuildId,
}

impl BuildRootDirectory {
    /// Construct without validation; [`RootDirectorySet::add`] is the checked
    /// entry point used for build configuration input.
    pub fn new(build: BuildId, path: impl AsRef<Path>) -> Self {
        Self {
            path: normalize(path.as_ref()),
            build,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn build(&self) -> &BuildId {
        &self.build
    }
}

/// Root directories of every build taking part in one build invocation.
///
/// Rebuilt from the build configuration at the start of each invocation,
/// never mutated across invocations. Roots may be nested or identical across
/// builds (e.g. composite builds sharing a parent checkout).
#[derive(Debug, Clone, Default)]
pub struct RootDirectorySet {
    roots: BTreeSet<BuildRootDirectory>,
}

impl RootDirectorySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root directory for `build`.
    ///
    /// - The path must be absolute.
    /// - If something exists at the path it must be a directory.
    /// - A path that does not exist yet (e.g. an output directory before the
    ///   first build) is accepted; the watchability filter reports it as
    ///   missing and it is retried on the next invocation.
    pub fn add(
        &mut self,
        fs: &dyn FileSystem,
        build: BuildId,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(VfsWatchError::RootNotAbsolute(path.to_path_buf()));
        }

        let path = normalize(path);
        if fs.exists(&path) && !fs.is_dir(&path) {
            return Err(VfsWatchError::RootNotADirectory(path));
        }

        self.roots.insert(BuildRootDirectory { path, build });
        Ok(())
    }

    /// Builder-style variant of [`RootDirectorySet::add`].
    pub fn with_root(
        mut self,
        fs: &dyn FileSystem,
        build: BuildId,
        path: impl AsRef<Path>,
    ) -> Result<Self> {
        self.add(fs, build, path)?;
        Ok(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildRootDirectory> {
        self.roots.iter()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Every build that contributes at least one root.
    pub fn builds(&self) -> BTreeSet<BuildId> {
        self.roots.iter().map(|r| r.build.clone()).collect()
    }

    /// Root paths contributed by `build`.
    pub fn paths_for<'a>(&'a self, build: &'a BuildId) -> impl Iterator<Item = &'a Path> + 'a {
        self.roots
            .iter()
            .filter(move |r| &r.build == build)
            .map(|r| r.path.as_path())
    }
}
