// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::WatchModePreference;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [watch]
/// mode = "auto"
/// debounce_ms = 25
/// unwatchable = ["/net/**"]
///
/// [cache]
/// global_cache_dirs = ["/home/me/.gradle/caches"]
///
/// [build.main]
/// roots = ["/work/app"]
///
/// [build.included.shared-lib]
/// roots = ["/work/shared-lib"]
/// ```
///
/// Only `[build]` is required; the other sections have defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub build: BuildSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub watch: WatchSection,
    pub cache: CacheSection,
    pub build: BuildSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        watch: WatchSection,
        cache: CacheSection,
        build: BuildSection,
    ) -> Self {
        Self {
            watch,
            cache,
            build,
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// When false the session starts, but nothing is ever registered.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// `"auto"`, `"hierarchical"` or `"flat"`.
    #[serde(default)]
    pub mode: WatchModePreference,

    /// Debounce window for create/modify bursts. `0` disables coalescing.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Upper bound on one native registration.
    #[serde(default = "default_registration_timeout_ms")]
    pub registration_timeout_ms: u64,

    /// Glob patterns of directories the host cannot watch (network mounts,
    /// virtual filesystems). Matching roots are never registered.
    #[serde(default)]
    pub unwatchable: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    25
}

fn default_registration_timeout_ms() -> u64 {
    2000
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mode: WatchModePreference::default(),
            debounce_ms: default_debounce_ms(),
            registration_timeout_ms: default_registration_timeout_ms(),
            unwatchable: Vec::new(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Append-only global cache directories. Never watched, never cached.
    #[serde(default)]
    pub global_cache_dirs: Vec<PathBuf>,
}

/// `[build]` section: the main build plus any included builds.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    #[serde(default)]
    pub main: Option<BuildRoots>,

    /// `[build.included.<name>]`, keyed by build name.
    #[serde(default)]
    pub included: BTreeMap<String, BuildRoots>,
}

/// Root directories of one build.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct BuildRoots {
    #[serde(default)]
    pub roots: Vec<PathBuf>,
}
