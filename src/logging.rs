// src/logging.rs

//! Subscriber for the `vfswatch` binary.
//!
//! `--log-level` applies one level to every target. Without it,
//! `VFSWATCH_LOG` is read as a list of `tracing` filter directives, so one
//! subsystem can be turned up on its own:
//!
//! ```text
//! VFSWATCH_LOG=info,vfswatch::watch::registry=debug vfswatch --once
//! ```
//!
//! An unset or unparsable value means `info`. Output goes to stderr; stdout
//! carries the watch-set report.

use anyhow::{anyhow, Result};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "VFSWATCH_LOG";

const DEFAULT_DIRECTIVES: &str = "info";

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install the global subscriber. Call once, before the session starts.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    fmt()
        .with_env_filter(log_filter(cli_level, env.as_deref()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("installing tracing subscriber: {err}"))
}

/// The flag wins over the environment.
pub fn log_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(LevelFilter::from(level).to_string());
    }

    env.map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}
