// src/roots/mod.rs

//! Build root directories and their classification.
//!
//! - [`set`] holds the per-invocation [`RootDirectorySet`].
//! - [`boundary`] describes immutable global caches that are never watched.
//! - [`filter`] decides which roots can be handed to the watch-set calculator.

pub mod boundary;
pub mod filter;
pub mod set;

pub use boundary::GlobalCacheBoundary;
pub use filter::{ExclusionReason, UnwatchablePatterns, Watchability, WatchabilityFilter};
pub use set::{BuildRootDirectory, RootDirectorySet};
