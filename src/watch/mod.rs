// src/watch/mod.rs

//! Native file watching.
//!
//! This module is responsible for:
//! - Reducing build roots to the directories that need a native registration
//!   ([`calculator`]).
//! - Wrapping the OS facility (`notify`) behind the [`NativeWatcher`] seam and
//!   normalising its events into four change kinds.
//! - Debouncing create/modify bursts ([`coalesce`]).
//! - Tracking which directories are actually registered ([`registry`]).
//!
//! It does **not** touch snapshot contents; applying events to the cache is
//! the job of `engine::core`.

pub mod adapter;
pub mod calculator;
pub mod coalesce;
pub mod normalize;
pub mod path_utils;
pub mod registry;
pub mod watcher;

pub use adapter::{
    ChangeEvent, ChangeKind, NativeEvent, NativeEventReceiver, NativeEventSender, NativeWatcher,
    SharedWatcher,
};
pub use calculator::{
    diff_watch_sets, flat_watch_set, hierarchical_watch_set, WatchSet, WatchSetCalculator,
    WatchSetDiff, WatchTarget,
};
pub use coalesce::Coalescer;
pub use registry::{ApplyOutcome, Diagnostics, RegistrationFailure, WatchRegistry};
pub use watcher::{platform_capability, NotifyWatcher};
