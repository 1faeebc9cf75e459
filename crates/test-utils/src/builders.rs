#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vfswatch::config::{BuildRoots, ConfigFile, RawConfigFile};
use vfswatch::engine::{WatchOptions, WatchSession};
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::fs::FileSystem;
use vfswatch::roots::{BuildRootDirectory, RootDirectorySet};
use vfswatch::types::{BuildId, WatchMode, WatchModePreference};

use crate::fake_watcher::{FakeWatcher, FakeWatcherHandle};

/// Builder for `RootDirectorySet` to simplify test setup.
#[derive(Debug, Default)]
pub struct RootSetBuilder {
    roots: Vec<(BuildId, PathBuf)>,
}

impl RootSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn main(mut self, path: &str) -> Self {
        self.roots.push((BuildId::Main, PathBuf::from(path)));
        self
    }

    pub fn included(mut self, build: &str, path: &str) -> Self {
        self.roots.push((BuildId::included(build), PathBuf::from(path)));
        self
    }

    /// Checked construction through `RootDirectorySet::add`.
    pub fn build(self, fs: &dyn FileSystem) -> RootDirectorySet {
        let mut set = RootDirectorySet::new();
        for (build, path) in self.roots {
            set.add(fs, build, &path)
                .expect("Failed to build valid root set from builder");
        }
        set
    }

    /// Unchecked roots, as fed to the calculator.
    pub fn build_roots(self) -> Vec<BuildRootDirectory> {
        self.roots
            .into_iter()
            .map(|(build, path)| BuildRootDirectory::new(build, path))
            .collect()
    }
}

/// Builder for `ConfigFile`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                watch: Default::default(),
                cache: Default::default(),
                build: Default::default(),
            },
        }
    }

    pub fn main_root(mut self, path: &str) -> Self {
        self.config
            .build
            .main
            .get_or_insert_with(BuildRoots::default)
            .roots
            .push(PathBuf::from(path));
        self
    }

    pub fn included_root(mut self, build: &str, path: &str) -> Self {
        self.config
            .build
            .included
            .entry(build.to_string())
            .or_default()
            .roots
            .push(PathBuf::from(path));
        self
    }

    pub fn global_cache_dir(mut self, path: &str) -> Self {
        self.config.cache.global_cache_dirs.push(PathBuf::from(path));
        self
    }

    pub fn unwatchable(mut self, pattern: &str) -> Self {
        self.config.watch.unwatchable.push(pattern.to_string());
        self
    }

    pub fn mode(mut self, mode: WatchModePreference) -> Self {
        self.config.watch.mode = mode;
        self
    }

    pub fn debounce_ms(mut self, ms: u64) -> Self {
        self.config.watch.debounce_ms = ms;
        self
    }

    pub fn registration_timeout_ms(mut self, ms: u64) -> Self {
        self.config.watch.registration_timeout_ms = ms;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for sessions driven by a fake adapter: no debounce, a short
/// registration timeout.
pub fn test_options() -> WatchOptions {
    WatchOptions {
        debounce: Duration::ZERO,
        registration_timeout: Duration::from_millis(200),
        ..WatchOptions::default()
    }
}

/// A session over `fs` and a fresh [`FakeWatcher`] with `capability`.
pub fn fake_session(
    options: WatchOptions,
    fs: &MockFileSystem,
    capability: WatchMode,
) -> (WatchSession, FakeWatcherHandle) {
    let (watcher, handle, events) = FakeWatcher::new(capability);
    let session = WatchSession::start(options, Arc::new(fs.clone()), Box::new(watcher), events);
    (session, handle)
}
