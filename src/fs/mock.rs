// src/fs/mock.rs

use super::{FileSystem, FsKind, FsMetadata};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File(Vec<u8>),
    Dir(Vec<String>), // List of child names
    Symlink(PathBuf),
}

/// In-memory directory tree keyed by absolute path.
///
/// Cloning shares the underlying tree, so a test can keep one handle to
/// mutate the "disk" while the session under test holds another.
#[derive(Debug, Clone)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(PathBuf::from("/"), MockEntry::Dir(Vec::new()));

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        // A panic while holding the lock only happens inside a failing test.
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        self.insert(path.as_ref(), MockEntry::File(content.into()));
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.lock();
        Self::ensure_dir_entry(&mut files, path);
    }

    pub fn add_symlink(&self, path: impl AsRef<Path>, target: impl Into<PathBuf>) {
        self.insert(path.as_ref(), MockEntry::Symlink(target.into()));
    }

    /// Remove `path` and, for directories, everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut files = self.lock();
        files.retain(|p, _| !p.starts_with(path));

        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
                let name = name.to_string_lossy();
                children.retain(|c| *c != name);
            }
        }
    }

    fn insert(&self, path: &Path, entry: MockEntry) {
        let mut files = self.lock();
        files.insert(path.to_path_buf(), entry);

        // Parent directories exist implicitly for simplicity in this mock.
        if let Some(parent) = path.parent() {
            Self::ensure_dir_entry(&mut files, parent);
            Self::link_child(&mut files, parent, path);
        }
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        if files.contains_key(path) {
            return;
        }
        files.insert(path.to_path_buf(), MockEntry::Dir(Vec::new()));
        if let Some(parent) = path.parent() {
            Self::ensure_dir_entry(files, parent);
            Self::link_child(files, parent, path);
        }
    }

    fn link_child(files: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
        if let Some(MockEntry::Dir(children)) = files.get_mut(parent) {
            if let Some(name) = child.file_name().and_then(|n| n.to_str()) {
                if !children.iter().any(|c| c == name) {
                    children.push(name.to_string());
                }
            }
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// Symlink hops followed before a path is treated as a loop.
const MAX_SYMLINK_HOPS: usize = 40;

/// Resolve symlinks in every component of `path`, the last one only when
/// `follow_last` is set. Relative targets are taken from the link's parent.
fn resolve(files: &HashMap<PathBuf, MockEntry>, path: &Path, follow_last: bool) -> PathBuf {
    let components: Vec<_> = path.components().collect();
    let last = components.len().saturating_sub(1);
    let mut out = PathBuf::new();
    for (idx, component) in components.into_iter().enumerate() {
        out.push(component.as_os_str());
        if idx == last && !follow_last {
            break;
        }
        let mut hops = 0;
        while let Some(MockEntry::Symlink(target)) = files.get(&out) {
            hops += 1;
            if hops > MAX_SYMLINK_HOPS {
                break;
            }
            out = match out.parent() {
                Some(parent) if target.is_relative() => parent.join(target),
                _ => target.clone(),
            };
        }
    }
    out
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        let files = self.lock();
        files.contains_key(&resolve(&files, path, true))
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.lock();
        matches!(files.get(&resolve(&files, path, true)), Some(MockEntry::Dir(_)))
    }

    fn symlink_metadata(&self, path: &Path) -> Result<Option<FsMetadata>> {
        let files = self.lock();
        Ok(files.get(&resolve(&files, path, false)).map(|entry| match entry {
            MockEntry::File(content) => FsMetadata {
                kind: FsKind::File,
                len: content.len() as u64,
                modified: None,
            },
            MockEntry::Dir(_) => FsMetadata {
                kind: FsKind::Dir,
                len: 0,
                modified: None,
            },
            MockEntry::Symlink(target) => FsMetadata {
                kind: FsKind::Symlink,
                len: target.as_os_str().len() as u64,
                modified: None,
            },
        }))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let files = self.lock();
        match files.get(&resolve(&files, path, true)) {
            Some(MockEntry::File(content)) => Ok(Box::new(Cursor::new(content.clone()))),
            Some(_) => Err(anyhow!("Not a regular file: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        let files = self.lock();
        let resolved = resolve(&files, path, true);
        match files.get(&resolved) {
            Some(MockEntry::Symlink(_)) => Err(anyhow!("Too many levels of symbolic links: {:?}", path)),
            Some(_) => Ok(resolved),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.lock();
        match files.get(&resolve(&files, path, true)) {
            Some(MockEntry::Dir(children)) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }
}
