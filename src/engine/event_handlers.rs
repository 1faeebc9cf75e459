// src/engine/event_handlers.rs

//! Per-kind handling of change events for the invalidation core.

use std::path::PathBuf;

use tracing::{debug, warn};

use crate::types::WatchMode;
use crate::vfs::SnapshotCache;
use crate::watch::ChangeEvent;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorCommand {
    /// The path was removed; if it (or anything below it) is a registered
    /// watch target, release the native handle now.
    ReleaseWatch(PathBuf),
    /// The path was created below a flat-watched directory; if it is a
    /// directory, register it so its children are observed.
    AdoptDirectory(PathBuf),
    /// Events were lost for the subtree; count it against the enclosing
    /// watch target.
    FlagOverflow(PathBuf),
}

/// Decision returned by the core after handling a single [`ChangeEvent`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<ProcessorCommand>,
    /// Cache entries dropped while applying the event.
    pub invalidated: usize,
    /// The event fell inside a global cache and was not applied.
    pub ignored: bool,
}

impl ProcessorStep {
    pub(crate) fn ignored() -> Self {
        Self {
            ignored: true,
            ..Self::default()
        }
    }
}

/// Handle a created or modified path.
///
/// The entry is dropped, not recomputed: the next read goes to disk. The
/// parent directory's listing changed as well when the path was created.
pub fn handle_content_change(
    cache: &SnapshotCache,
    mode: WatchMode,
    event: &ChangeEvent,
    created: bool,
) -> ProcessorStep {
    let mut invalidated = usize::from(cache.invalidate(&event.path));
    let mut commands = Vec::new();

    if created {
        if let Some(parent) = event.path.parent() {
            invalidated += usize::from(cache.invalidate(parent));
        }
        if mode == WatchMode::Flat {
            commands.push(ProcessorCommand::AdoptDirectory(event.path.clone()));
        }
    }

    debug!(path = ?event.path, kind = ?event.kind, invalidated, "applied change");
    ProcessorStep {
        commands,
        invalidated,
        ignored: false,
    }
}

/// Handle a removed path: the path and everything below it are gone.
pub fn handle_removal(cache: &SnapshotCache, event: &ChangeEvent) -> ProcessorStep {
    let mut invalidated = cache.invalidate_subtree(&event.path);
    if let Some(parent) = event.path.parent() {
        invalidated += usize::from(cache.invalidate(parent));
    }

    debug!(path = ?event.path, invalidated, "applied removal");
    ProcessorStep {
        commands: vec![ProcessorCommand::ReleaseWatch(event.path.clone())],
        invalidated,
        ignored: false,
    }
}

/// Handle an overflow: nothing under the path can be trusted any more.
pub fn handle_overflow(cache: &SnapshotCache, event: &ChangeEvent) -> ProcessorStep {
    let invalidated = cache.invalidate_subtree(&event.path);

    warn!(
        path = ?event.path,
        invalidated,
        "native event queue overflowed; cached state below this path was dropped"
    );
    ProcessorStep {
        commands: vec![ProcessorCommand::FlagOverflow(event.path.clone())],
        invalidated,
        ignored: false,
    }
}
