use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use vfswatch::errors::{Result, VfsWatchError};
use vfswatch::types::WatchMode;
use vfswatch::watch::{ChangeEvent, NativeEvent, NativeEventReceiver, NativeEventSender, NativeWatcher};

/// One call made on the fake adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCall {
    Start(PathBuf, WatchMode),
    Stop(PathBuf),
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<WatchCall>,
    active: BTreeSet<PathBuf>,
    failures: HashMap<PathBuf, String>,
    delays: HashMap<PathBuf, Duration>,
}

/// A fake native adapter that:
/// - records every start/stop call
/// - fails or stalls registrations for chosen directories
/// - never produces events on its own; tests push them through the
///   [`FakeWatcherHandle`].
#[derive(Debug)]
pub struct FakeWatcher {
    capability: WatchMode,
    state: Arc<Mutex<FakeState>>,
}

/// Test-side control of a [`FakeWatcher`].
///
/// The handle owns the only event sender: dropping it (or calling
/// [`FakeWatcherHandle::crash`]) closes the event stream.
#[derive(Debug)]
pub struct FakeWatcherHandle {
    state: Arc<Mutex<FakeState>>,
    sender: Option<NativeEventSender>,
}

fn lock(state: &Mutex<FakeState>) -> MutexGuard<'_, FakeState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl FakeWatcher {
    pub fn new(capability: WatchMode) -> (Self, FakeWatcherHandle, NativeEventReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(FakeState::default()));
        let watcher = Self {
            capability,
            state: Arc::clone(&state),
        };
        let handle = FakeWatcherHandle {
            state,
            sender: Some(tx),
        };
        (watcher, handle, rx)
    }
}

impl NativeWatcher for FakeWatcher {
    fn capability(&self) -> WatchMode {
        self.capability
    }

    fn start_watching(&mut self, dir: &Path, mode: WatchMode) -> Result<()> {
        let (delay, failure) = {
            let mut state = lock(&self.state);
            state.calls.push(WatchCall::Start(dir.to_path_buf(), mode));
            (state.delays.get(dir).copied(), state.failures.get(dir).cloned())
        };

        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if let Some(reason) = failure {
            return Err(VfsWatchError::Other(anyhow::anyhow!(reason)));
        }

        lock(&self.state).active.insert(dir.to_path_buf());
        Ok(())
    }

    fn stop_watching(&mut self, dir: &Path) -> Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(WatchCall::Stop(dir.to_path_buf()));
        state.active.remove(dir);
        Ok(())
    }
}

impl FakeWatcherHandle {
    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<WatchCall> {
        lock(&self.state).calls.clone()
    }

    pub fn start_calls(&self) -> Vec<PathBuf> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|c| match c {
                WatchCall::Start(path, _) => Some(path.clone()),
                WatchCall::Stop(_) => None,
            })
            .collect()
    }

    pub fn stop_calls(&self) -> Vec<PathBuf> {
        lock(&self.state)
            .calls
            .iter()
            .filter_map(|c| match c {
                WatchCall::Stop(path) => Some(path.clone()),
                WatchCall::Start(..) => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Directories currently registered with the fake.
    pub fn active(&self) -> BTreeSet<PathBuf> {
        lock(&self.state).active.clone()
    }

    /// Make every registration of `dir` fail with `reason`.
    pub fn fail_on(&self, dir: impl Into<PathBuf>, reason: &str) {
        lock(&self.state)
            .failures
            .insert(dir.into(), reason.to_string());
    }

    pub fn clear_failure(&self, dir: impl AsRef<Path>) {
        lock(&self.state).failures.remove(dir.as_ref());
    }

    /// Make every registration of `dir` block for `delay` first.
    pub fn delay_on(&self, dir: impl Into<PathBuf>, delay: Duration) {
        lock(&self.state).delays.insert(dir.into(), delay);
    }

    pub fn clear_delay(&self, dir: impl AsRef<Path>) {
        lock(&self.state).delays.remove(dir.as_ref());
    }

    /// Deliver a change event as if the OS had reported it.
    pub fn emit(&self, event: ChangeEvent) {
        self.send(NativeEvent::Change(event));
    }

    /// Deliver a native error (an empty `paths` means every target).
    pub fn emit_error(&self, paths: Vec<PathBuf>, message: &str) {
        self.send(NativeEvent::Error {
            paths,
            message: message.to_string(),
        });
    }

    /// Simulate the native facility dying: the event stream closes.
    pub fn crash(&mut self) {
        self.sender = None;
    }

    fn send(&self, event: NativeEvent) {
        if let Some(tx) = &self.sender {
            // A closed receiver means the session under test already stopped.
            let _ = tx.send(event);
        }
    }
}
