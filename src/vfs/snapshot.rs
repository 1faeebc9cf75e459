// src/vfs/snapshot.rs

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use blake3::Hasher;
use tracing::debug;

use crate::fs::{FileSystem, FsKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    RegularFile,
    Directory,
    Missing,
    Symlink,
}

/// Identity of a regular file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint {
    /// blake3 of the content, hex encoded.
    pub hash: String,
    pub len: u64,
    pub modified: Option<SystemTime>,
}

/// Last known state of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub file_type: FileType,
    pub fingerprint: Option<ContentFingerprint>,
    pub last_verified: SystemTime,
}

impl Snapshot {
    pub fn new(path: impl Into<PathBuf>, file_type: FileType) -> Self {
        Self {
            path: path.into(),
            file_type,
            fingerprint: None,
            last_verified: SystemTime::now(),
        }
    }

    pub fn regular_file(path: impl Into<PathBuf>, fingerprint: ContentFingerprint) -> Self {
        Self::new(path, FileType::RegularFile).with_fingerprint(fingerprint)
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileType::Directory)
    }

    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Self::new(path, FileType::Missing)
    }

    pub fn with_fingerprint(mut self, fingerprint: ContentFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn is_missing(&self) -> bool {
        self.file_type == FileType::Missing
    }
}

/// Compute the blake3 hash of a single file.
pub fn compute_file_hash(fs: &dyn FileSystem, path: &Path) -> Result<String> {
    let mut hasher = Hasher::new();
    let mut file = fs
        .open_read(path)
        .with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Read the current state of `path` from disk.
///
/// Regular files get a content fingerprint; directories, symlinks and
/// missing paths do not.
pub fn read_snapshot(fs: &dyn FileSystem, path: &Path) -> Result<Snapshot> {
    let Some(meta) = fs.symlink_metadata(path)? else {
        return Ok(Snapshot::missing(path));
    };

    let snapshot = match meta.kind {
        FsKind::Dir => Snapshot::directory(path),
        FsKind::Symlink => Snapshot::new(path, FileType::Symlink),
        FsKind::File => {
            debug!("hashing file {:?}", path);
            let hash = compute_file_hash(fs, path)?;
            Snapshot::regular_file(
                path,
                ContentFingerprint {
                    hash,
                    len: meta.len,
                    modified: meta.modified,
                },
            )
        }
    };
    Ok(snapshot)
}
