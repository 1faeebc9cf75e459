// src/config/mod.rs

//! Configuration loading and validation for vfswatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it and turn it into session options and build roots
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, parse_str};
pub use model::{BuildRoots, BuildSection, CacheSection, ConfigFile, RawConfigFile, WatchSection};
