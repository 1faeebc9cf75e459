// src/vfs/mod.rs

//! Virtual file system: the snapshot cache the build engine reads instead
//! of touching the disk.

pub mod cache;
pub mod snapshot;
pub mod trie;

pub use cache::{CacheStats, SnapshotCache};
pub use snapshot::{compute_file_hash, read_snapshot, ContentFingerprint, FileType, Snapshot};
pub use trie::SnapshotTrie;
