// src/watch/adapter.rs

//! The seam between the platform watch primitive and the rest of the crate.
//!
//! Everything downstream of this module sees only [`ChangeEvent`]s with one
//! of four kinds, regardless of which OS facility produced them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::SystemTime;

use tokio::sync::mpsc;

use crate::errors::Result;
use crate::types::WatchMode;

/// Normalised kind of a filesystem change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    /// Events for the subtree were dropped; its state is unknown.
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            timestamp: SystemTime::now(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Modified)
    }

    pub fn removed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Removed)
    }

    pub fn overflow(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Overflow)
    }
}

/// One item of the adapter's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    Change(ChangeEvent),
    /// The native facility reported a problem. Events may have been lost
    /// for `paths` (or for everything watched, when `paths` is empty).
    Error { paths: Vec<PathBuf>, message: String },
}

pub type NativeEventSender = mpsc::UnboundedSender<NativeEvent>;
pub type NativeEventReceiver = mpsc::UnboundedReceiver<NativeEvent>;

/// Platform watch primitive.
///
/// Implementations deliver events on the [`NativeEventReceiver`] handed out
/// when they are constructed. The stream closing while the session is still
/// running means the facility is gone for good.
pub trait NativeWatcher: Send {
    /// Whether this platform can observe a whole subtree with one
    /// registration. Fixed for the lifetime of the adapter.
    fn capability(&self) -> WatchMode;

    fn start_watching(&mut self, dir: &Path, mode: WatchMode) -> Result<()>;

    fn stop_watching(&mut self, dir: &Path) -> Result<()>;
}

/// Adapter shared between the build-invocation side (registration diffs)
/// and the consumer task (releasing deleted targets, adopting new
/// directories in flat mode).
#[derive(Clone)]
pub struct SharedWatcher {
    inner: Arc<Mutex<Box<dyn NativeWatcher>>>,
    capability: WatchMode,
}

impl fmt::Debug for SharedWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedWatcher")
            .field("capability", &self.capability)
            .finish_non_exhaustive()
    }
}

impl SharedWatcher {
    pub fn new(watcher: Box<dyn NativeWatcher>) -> Self {
        let capability = watcher.capability();
        Self {
            inner: Arc::new(Mutex::new(watcher)),
            capability,
        }
    }

    pub fn capability(&self) -> WatchMode {
        self.capability
    }

    /// Blocking: may wait on OS I/O. Callers on the async side go through
    /// `spawn_blocking`.
    pub fn start_watching(&self, dir: &Path, mode: WatchMode) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.start_watching(dir, mode)
    }

    /// Whether some thread is inside a native call right now.
    pub fn is_busy(&self) -> bool {
        matches!(self.inner.try_lock(), Err(TryLockError::WouldBlock))
    }

    pub fn stop_watching(&self, dir: &Path) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.stop_watching(dir)
    }
}
