// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Component, Path, PathBuf};

/// Lexically normalise an absolute path: drop `.` segments and trailing
/// separators, resolve `..` against the preceding segment.
///
/// This never touches the filesystem, so it works for paths that have
/// already been deleted (which is exactly when removal events arrive).
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// True if `path` is `ancestor` itself or lies somewhere below it.
///
/// Comparison is per component, so `/a/bc` is *not* inside `/a/b`.
pub fn is_same_or_descendant(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// True if `path` lies strictly below `ancestor`.
pub fn is_strict_descendant(path: &Path, ancestor: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}
