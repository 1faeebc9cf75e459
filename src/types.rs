use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a native registration observes a directory.
///
/// - `Hierarchical`: events bubble up from every descendant of the registered
///   directory.
/// - `Flat`: only the registered directory and its direct children report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WatchMode {
    Hierarchical,
    Flat,
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMode::Hierarchical => f.write_str("hierarchical"),
            WatchMode::Flat => f.write_str("flat"),
        }
    }
}

/// Watch mode as requested in the `[watch]` section of the config.
///
/// `Auto` defers to the capability reported by the native adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchModePreference {
    #[default]
    Auto,
    Hierarchical,
    Flat,
}

impl WatchModePreference {
    /// Resolve the preference against what the platform adapter supports.
    ///
    /// Hierarchical watching can never be forced onto an adapter that only
    /// supports flat registrations; flat watching can always be emulated.
    pub fn resolve(self, capability: WatchMode) -> WatchMode {
        match (self, capability) {
            (WatchModePreference::Auto, cap) => cap,
            (WatchModePreference::Flat, _) => WatchMode::Flat,
            (WatchModePreference::Hierarchical, WatchMode::Hierarchical) => {
                WatchMode::Hierarchical
            }
            (WatchModePreference::Hierarchical, WatchMode::Flat) => WatchMode::Flat,
        }
    }
}

impl FromStr for WatchModePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(WatchModePreference::Auto),
            "hierarchical" => Ok(WatchModePreference::Hierarchical),
            "flat" => Ok(WatchModePreference::Flat),
            other => Err(format!(
                "invalid watch mode: {other} (expected \"auto\", \"hierarchical\" or \"flat\")"
            )),
        }
    }
}

/// Identifies the build that owns a root directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuildId {
    /// The build the daemon was invoked for.
    Main,
    /// An included (composite) build, by name.
    Included(String),
}

impl BuildId {
    pub fn included(name: impl Into<String>) -> Self {
        BuildId::Included(name.into())
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildId::Main => f.write_str(":"),
            BuildId::Included(name) => write!(f, ":{name}"),
        }
    }
}
