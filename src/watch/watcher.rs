// src/watch/watcher.rs

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::Result;
use crate::types::WatchMode;
use crate::watch::adapter::{NativeEventReceiver, NativeWatcher};
use crate::watch::normalize::{normalize_error, normalize_event};

/// Watch capability of the platform's native facility.
///
/// inotify (Linux) and kqueue (BSD) register one directory at a time;
/// FSEvents (macOS) and `ReadDirectoryChangesW` (Windows) report a whole
/// subtree per registration.
pub fn platform_capability() -> WatchMode {
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        WatchMode::Hierarchical
    } else {
        WatchMode::Flat
    }
}

/// [`NativeWatcher`] backed by `notify`'s `RecommendedWatcher`.
///
/// Dropping this stops file watching and closes the event stream.
pub struct NotifyWatcher {
    inner: RecommendedWatcher,
    capability: WatchMode,
    watched: HashSet<PathBuf>,
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("capability", &self.capability)
            .field("watched", &self.watched.len())
            .finish()
    }
}

impl NotifyWatcher {
    /// Create the watcher and the stream its events are delivered on.
    pub fn new() -> Result<(Self, NativeEventReceiver)> {
        Self::with_capability(platform_capability())
    }

    /// Same as [`NotifyWatcher::new`] but with an explicit capability, for
    /// platforms where `notify` emulates recursive watching.
    pub fn with_capability(capability: WatchMode) -> Result<(Self, NativeEventReceiver)> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Closure called synchronously by notify whenever an event arrives.
        let inner = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let events = match res {
                    Ok(event) => normalize_event(event, SystemTime::now()),
                    Err(err) => vec![normalize_error(err)],
                };
                for event in events {
                    if event_tx.send(event).is_err() {
                        // Receiver gone: the session is shutting down.
                        return;
                    }
                }
            },
            Config::default(),
        )?;

        Ok((
            Self {
                inner,
                capability,
                watched: HashSet::new(),
            },
            event_rx,
        ))
    }
}

impl NativeWatcher for NotifyWatcher {
    fn capability(&self) -> WatchMode {
        self.capability
    }

    fn start_watching(&mut self, dir: &Path, mode: WatchMode) -> Result<()> {
        let recursive = match mode {
            WatchMode::Hierarchical => RecursiveMode::Recursive,
            WatchMode::Flat => RecursiveMode::NonRecursive,
        };
        self.inner.watch(dir, recursive)?;
        self.watched.insert(dir.to_path_buf());
        debug!(dir = ?dir, %mode, "native watch registered");
        Ok(())
    }

    fn stop_watching(&mut self, dir: &Path) -> Result<()> {
        if !self.watched.remove(dir) {
            return Ok(());
        }
        self.inner.unwatch(dir)?;
        debug!(dir = ?dir, "native watch released");
        Ok(())
    }
}
