// src/config/validate.rs

use std::path::Path;
use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::WatchOptions;
use crate::errors::{Result, VfsWatchError};
use crate::fs::FileSystem;
use crate::roots::{RootDirectorySet, UnwatchablePatterns};
use crate::types::BuildId;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::VfsWatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.watch, raw.cache, raw.build))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_roots(cfg)?;
    validate_watch_section(cfg)?;
    validate_root_paths(cfg)?;
    validate_cache_dirs(cfg)?;
    Ok(())
}

fn ensure_has_roots(cfg: &RawConfigFile) -> Result<()> {
    let main = cfg.build.main.iter().flat_map(|b| b.roots.iter());
    let included = cfg.build.included.values().flat_map(|b| b.roots.iter());
    if main.chain(included).next().is_none() {
        return Err(VfsWatchError::ConfigError(
            "config must declare at least one root in [build.main] or [build.included.<name>]"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_watch_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.registration_timeout_ms == 0 {
        return Err(VfsWatchError::ConfigError(
            "[watch].registration_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    UnwatchablePatterns::compile(&cfg.watch.unwatchable)
        .map_err(|e| VfsWatchError::ConfigError(format!("[watch].unwatchable: {e:#}")))?;

    Ok(())
}

fn validate_root_paths(cfg: &RawConfigFile) -> Result<()> {
    if let Some(main) = &cfg.build.main {
        for root in &main.roots {
            ensure_absolute(root)?;
        }
    }
    for (name, build) in &cfg.build.included {
        if name.trim().is_empty() {
            return Err(VfsWatchError::ConfigError(
                "[build.included] entries must have a non-empty name".to_string(),
            ));
        }
        for root in &build.roots {
            ensure_absolute(root)?;
        }
    }
    Ok(())
}

fn validate_cache_dirs(cfg: &RawConfigFile) -> Result<()> {
    for dir in &cfg.cache.global_cache_dirs {
        if !dir.is_absolute() {
            return Err(VfsWatchError::ConfigError(format!(
                "[cache].global_cache_dirs entries must be absolute (got {dir:?})"
            )));
        }
    }
    Ok(())
}

fn ensure_absolute(root: &Path) -> Result<()> {
    if !root.is_absolute() {
        return Err(VfsWatchError::RootNotAbsolute(root.to_path_buf()));
    }
    Ok(())
}

impl ConfigFile {
    /// Runtime knobs for a [`crate::engine::WatchSession`].
    pub fn watch_options(&self) -> Result<WatchOptions> {
        let unwatchable = UnwatchablePatterns::compile(&self.watch.unwatchable)?;
        Ok(WatchOptions {
            enabled: self.watch.enabled,
            mode: self.watch.mode,
            debounce: Duration::from_millis(self.watch.debounce_ms),
            registration_timeout: Duration::from_millis(self.watch.registration_timeout_ms),
            unwatchable,
            global_cache_dirs: self.cache.global_cache_dirs.clone(),
        })
    }

    /// Root directories of every configured build, checked against `fs`.
    pub fn to_root_set(&self, fs: &dyn FileSystem) -> Result<RootDirectorySet> {
        let mut set = RootDirectorySet::new();
        if let Some(main) = &self.build.main {
            for root in &main.roots {
                set.add(fs, BuildId::Main, root)?;
            }
        }
        for (name, build) in &self.build.included {
            for root in &build.roots {
                set.add(fs, BuildId::included(name.clone()), root)?;
            }
        }
        Ok(set)
    }
}
