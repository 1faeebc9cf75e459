// src/errors.rs

//! Crate-wide error type and result alias.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VfsWatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("build root must be an absolute path: {0:?}")]
    RootNotAbsolute(PathBuf),

    #[error("build root exists but is not a directory: {0:?}")]
    RootNotADirectory(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("native watcher error: {0}")]
    NotifyError(#[from] notify::Error),

    #[error("registering {path:?} timed out after {timeout:?}")]
    RegistrationTimedOut { path: PathBuf, timeout: Duration },

    #[error("native watcher busy with a stalled registration of {stalled:?}")]
    WatcherBusy { stalled: PathBuf },

    #[error("file system watching is disabled: {0}")]
    WatchingDisabled(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, VfsWatchError>;
