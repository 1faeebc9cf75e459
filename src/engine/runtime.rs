// src/engine/runtime.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::fs::{FileSystem, FsKind};
use crate::types::WatchMode;
use crate::watch::{ChangeEvent, Coalescer, NativeEvent, NativeEventReceiver, WatchRegistry};

use super::core::InvalidationProcessor;
use super::ProcessorCommand;

/// Handle to the task that owns the native event stream.
///
/// The task feeds raw events through the [`Coalescer`] into the
/// [`InvalidationProcessor`] and executes the commands it returns against the
/// [`WatchRegistry`]. It is the only writer applying events to the cache.
pub struct WatchConsumer {
    registry: WatchRegistry,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for WatchConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchConsumer")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl WatchConsumer {
    /// Spawn the consumer task on the current tokio runtime.
    pub fn spawn(
        events: NativeEventReceiver,
        coalescer: Coalescer,
        processor: InvalidationProcessor,
        registry: WatchRegistry,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let event_loop = EventLoop {
            events,
            coalescer,
            processor,
            registry: registry.clone(),
            fs,
        };
        let handle = tokio::spawn(event_loop.run(shutdown_rx));

        Self {
            registry,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the task, wait for it to flush pending events, then release
    /// every native registration. Safe to call repeatedly.
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // Err means the task already exited on its own.
            let _ = shutdown.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "watch consumer task ended abnormally");
            }
        }
        self.registry.release_all();
    }
}

struct EventLoop {
    events: NativeEventReceiver,
    coalescer: Coalescer,
    processor: InvalidationProcessor,
    registry: WatchRegistry,
    fs: Arc<dyn FileSystem>,
}

impl EventLoop {
    /// Main event loop.
    ///
    /// - Consumes [`NativeEvent`]s from the adapter.
    /// - Delivers coalesced events when their window closes.
    /// - Exits on shutdown, or disables watching if the stream closes first.
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        info!(
            mode = %self.processor.mode(),
            debounce = ?self.coalescer.window(),
            "watch consumer started"
        );

        loop {
            let deadline = self.coalescer.next_deadline().map(Instant::from_std);

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    debug!("watch consumer shutdown requested");
                    break;
                }

                event = self.events.recv() => match event {
                    Some(event) => self.on_native_event(event),
                    None => {
                        let pending = self.coalescer.flush();
                        self.deliver_all(pending);
                        self.registry.disable("native event stream closed unexpectedly");
                        info!("watch consumer exiting");
                        return;
                    }
                },

                _ = sleep_until_deadline(deadline), if deadline.is_some() => {
                    let due = self.coalescer.drain_due(std::time::Instant::now());
                    self.deliver_all(due);
                }
            }
        }

        let pending = self.coalescer.flush();
        self.deliver_all(pending);
        info!("watch consumer exiting");
    }

    fn on_native_event(&mut self, event: NativeEvent) {
        self.registry.note_received(1);

        match event {
            NativeEvent::Change(change) => {
                let ready = self.coalescer.push(change, std::time::Instant::now());
                self.deliver_all(ready);
            }
            NativeEvent::Error { paths, message } => {
                warn!(?paths, error = %message, "native watcher reported an error");
                let targets = if paths.is_empty() {
                    self.registry.registered()
                } else {
                    paths
                };
                let now = std::time::Instant::now();
                for path in targets {
                    let ready = self.coalescer.push(ChangeEvent::overflow(path), now);
                    self.deliver_all(ready);
                }
            }
        }
    }

    fn deliver_all(&mut self, events: Vec<ChangeEvent>) {
        for event in events {
            self.deliver(&event);
        }
    }

    fn deliver(&mut self, event: &ChangeEvent) {
        let step = self.processor.apply(event);
        if step.ignored {
            return;
        }
        self.registry.note_applied(step.invalidated as u64);

        for command in step.commands {
            self.execute_command(command);
        }
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: ProcessorCommand) {
        match command {
            ProcessorCommand::ReleaseWatch(path) => {
                self.registry.release(&path);
            }
            ProcessorCommand::AdoptDirectory(path) => {
                if self.processor.mode() == WatchMode::Flat {
                    self.adopt_tree(&path);
                }
            }
            ProcessorCommand::FlagOverflow(path) => {
                self.registry.record_overflow(&path);
            }
        }
    }

    /// Register `dir` and any directories already created below it before
    /// its own registration took effect.
    fn adopt_tree(&self, dir: &Path) {
        let mut stack: Vec<PathBuf> = vec![dir.to_path_buf()];
        while let Some(dir) = stack.pop() {
            if self.is_excluded(&dir) || !self.is_real_dir(&dir) || !self.registry.adopt(&dir) {
                continue;
            }
            match self.fs.read_dir(&dir) {
                Ok(children) => stack.extend(children),
                Err(err) => debug!(dir = ?dir, error = %err, "failed to list adopted directory"),
            }
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        self.processor.cache().is_excluded(path)
    }

    fn is_real_dir(&self, path: &Path) -> bool {
        matches!(
            self.fs.symlink_metadata(path),
            Ok(Some(meta)) if meta.kind == FsKind::Dir
        )
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
