// src/engine/mod.rs

//! Orchestration of a watching session.
//!
//! This module ties together:
//! - the watch registry (which directories are registered natively)
//! - the snapshot cache
//! - the consumer task that reacts to:
//!   - native change events (after coalescing)
//!   - native errors and overflows
//!   - the event stream closing
//!   - shutdown requests
//!
//! The pure invalidation state machine lives in [`core`]; the async/IO shell
//! is implemented in [`runtime`]. [`session`] is the entry point used by a
//! daemon: one [`WatchSession`] per process, one `build_started` call per
//! build invocation.

use std::path::PathBuf;
use std::time::Duration;

use crate::roots::UnwatchablePatterns;
use crate::types::WatchModePreference;

/// Default debounce window for create/modify bursts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(25);

/// Default upper bound on a single native registration.
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Runtime knobs of a watching session.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// When false, nothing is registered and every cache lookup misses.
    pub enabled: bool,
    pub mode: WatchModePreference,
    pub debounce: Duration,
    pub registration_timeout: Duration,
    pub unwatchable: UnwatchablePatterns,
    /// Append-only global cache directories, never watched.
    pub global_cache_dirs: Vec<PathBuf>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: WatchModePreference::Auto,
            debounce: DEFAULT_DEBOUNCE,
            registration_timeout: DEFAULT_REGISTRATION_TIMEOUT,
            unwatchable: UnwatchablePatterns::default(),
            global_cache_dirs: Vec::new(),
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod runtime;
pub mod session;

pub use self::core::InvalidationProcessor;
pub use event_handlers::{ProcessorCommand, ProcessorStep};
pub use runtime::WatchConsumer;
pub use session::{preview_watch_set, WatchSession, WatchSetReport};
