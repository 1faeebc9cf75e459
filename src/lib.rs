// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod roots;
pub mod types;
pub mod vfs;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::engine::{preview_watch_set, WatchSession, WatchSetReport};
use crate::fs::RealFileSystem;
use crate::types::WatchMode;
use crate::watch::platform_capability;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the watch session (registry, cache, consumer task)
/// - one build invocation for the configured roots
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let fs = RealFileSystem;
    let mut options = cfg.watch_options()?;
    if let Some(mode) = args.mode {
        debug!(
            configured = ?options.mode,
            requested = ?mode,
            "watch mode overridden on the command line"
        );
        options.mode = mode;
    }
    let roots = cfg.to_root_set(&fs)?;

    if args.dry_run {
        let mode = options.mode.resolve(platform_capability());
        let report = preview_watch_set(&options, mode, &fs, &roots);
        print_dry_run(&cfg, mode, &report);
        return Ok(());
    }

    let mut session = WatchSession::start_native(options)?;
    let report = session.build_started(roots).await?;
    print_report(&report);

    if !args.once {
        info!("watching for changes; press Ctrl-C to stop");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
        info!("shutdown requested");
    }

    let diagnostics = session.diagnostics();
    let stats = session.cache().stats();
    session.stop().await;

    debug!(?diagnostics, ?stats, "session summary");
    info!(
        events_received = diagnostics.events_received,
        events_applied = diagnostics.events_applied,
        invalidated = diagnostics.entries_invalidated,
        overflows = diagnostics.overflows.values().sum::<u64>(),
        "session finished"
    );
    Ok(())
}

/// Print the structured watch-set report on stdout.
fn print_report(report: &WatchSetReport) {
    if report.disabled {
        println!("watching disabled");
        return;
    }

    println!("mode: {}", report.mode);
    println!("watch roots ({}):", report.watch_set.len());
    for target in report.watch_set.targets() {
        let owners: Vec<String> = target.owners().iter().map(ToString::to_string).collect();
        println!("  - {} [{}]", target.path().display(), owners.join(", "));
    }

    if !report.outcome.failed.is_empty() {
        println!("unwatched ({}):", report.outcome.failed.len());
        for failure in &report.outcome.failed {
            println!("  - {}: {}", failure.path.display(), failure.reason);
        }
    }
    if !report.excluded.is_empty() {
        println!("excluded ({}):", report.excluded.len());
        for (path, reason) in &report.excluded {
            println!("  - {}: {reason}", path.display());
        }
    }
    if !report.missing.is_empty() {
        println!("missing ({}):", report.missing.len());
        for path in &report.missing {
            println!("  - {}", path.display());
        }
    }
}

/// Simple dry-run output: print the config knobs and the watch set that
/// would be registered.
fn print_dry_run(cfg: &ConfigFile, mode: WatchMode, report: &WatchSetReport) {
    println!("vfswatch dry-run");
    println!("  watch.enabled = {}", cfg.watch.enabled);
    println!("  watch.mode = {:?} (resolved: {mode})", cfg.watch.mode);
    println!("  watch.debounce_ms = {}", cfg.watch.debounce_ms);
    println!(
        "  watch.registration_timeout_ms = {}",
        cfg.watch.registration_timeout_ms
    );
    if !cfg.watch.unwatchable.is_empty() {
        println!("  watch.unwatchable = {:?}", cfg.watch.unwatchable);
    }
    if !cfg.cache.global_cache_dirs.is_empty() {
        println!("  cache.global_cache_dirs = {:?}", cfg.cache.global_cache_dirs);
    }
    println!();

    print_report(report);

    debug!("dry-run complete (nothing registered)");
}
