// src/engine/core.rs

//! Pure invalidation state machine.
//!
//! This module contains a synchronous, deterministic "core" that consumes
//! [`ChangeEvent`]s and produces:
//! - updates to the snapshot cache
//! - a list of commands describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::WatchConsumer`) is
//! responsible for:
//! - reading events from the native stream
//! - coalescing bursts
//! - executing commands against the watch registry
//!
//! The core is intended to be unit tested without any Tokio, channels, or
//! native watcher.

use tracing::trace;

use crate::engine::event_handlers::{
    handle_content_change, handle_overflow, handle_removal, ProcessorStep,
};
use crate::types::WatchMode;
use crate::vfs::SnapshotCache;
use crate::watch::{ChangeEvent, ChangeKind};

/// Applies change events to the snapshot cache.
///
/// There is exactly one of these per session, owned by the consumer task:
/// it is the only writer applying events to the cache.
#[derive(Debug, Clone)]
pub struct InvalidationProcessor {
    cache: SnapshotCache,
    mode: WatchMode,
}

impl InvalidationProcessor {
    pub fn new(cache: SnapshotCache, mode: WatchMode) -> Self {
        Self { cache, mode }
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Handle a single change event, updating the cache and returning the
    /// resulting commands for the IO shell.
    pub fn apply(&mut self, event: &ChangeEvent) -> ProcessorStep {
        if self.cache.is_excluded(&event.path) {
            trace!(path = ?event.path, "ignoring event for an excluded path");
            return ProcessorStep::ignored();
        }

        match event.kind {
            ChangeKind::Created => handle_content_change(&self.cache, self.mode, event, true),
            ChangeKind::Modified => handle_content_change(&self.cache, self.mode, event, false),
            ChangeKind::Removed => handle_removal(&self.cache, event),
            ChangeKind::Overflow => handle_overflow(&self.cache, event),
        }
    }
}
