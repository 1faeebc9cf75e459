// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::WatchModePreference;

/// Command-line arguments for `vfswatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "vfswatch",
    version,
    about = "Watch build root directories and keep a file snapshot cache in sync.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `vfswatch.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "vfswatch.toml")]
    pub config: String,

    /// Register the watch set, print the report, then stop.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `VFSWATCH_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Override `[watch].mode` from the config (auto, hierarchical, flat).
    #[arg(long, value_name = "MODE")]
    pub mode: Option<WatchModePreference>,

    /// Parse + validate, print the computed watch set, but don't register
    /// anything with the OS.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

/// Parse an explicit argument list (the first item is the binary name).
pub fn parse_from<I, T>(args: I) -> Result<CliArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    CliArgs::try_parse_from(args)
}
