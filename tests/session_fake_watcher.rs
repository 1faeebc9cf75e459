// tests/session_fake_watcher.rs

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vfswatch::engine::WatchOptions;
use vfswatch::errors::VfsWatchError;
use vfswatch::fs::mock::MockFileSystem;
use vfswatch::roots::UnwatchablePatterns;
use vfswatch::types::{BuildId, WatchMode};
use vfswatch::watch::ChangeEvent;
use vfswatch_test_utils::builders::{fake_session, test_options, RootSetBuilder};
use vfswatch_test_utils::{eventually, init_tracing, with_timeout, WatchCall};

type TestResult = Result<(), Box<dyn Error>>;

fn p(s: &str) -> PathBuf {
    PathBuf::from(s)
}

fn project_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_dir("/a/src");
    fs.add_dir("/a/tmp/sub");
    fs.add_file("/a/tmp/file", b"scratch");
    fs.add_file("/a/keep", b"keep me");
    fs.add_dir("/x/lib");
    fs
}

#[tokio::test]
async fn unchanged_targets_see_no_calls_across_builds() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);

    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    assert_eq!(handle.start_calls(), vec![p("/a")]);
    handle.clear_calls();

    let report = session
        .build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("lib", "/x")
                .build(&fs),
        )
        .await?;

    assert_eq!(
        handle.calls(),
        vec![WatchCall::Start(p("/x"), WatchMode::Hierarchical)]
    );
    assert_eq!(report.outcome.registered, vec![p("/x")]);
    assert_eq!(report.outcome.unchanged, vec![p("/a")]);
    handle.clear_calls();

    session
        .build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("lib", "/x")
                .build(&fs),
        )
        .await?;
    assert!(handle.calls().is_empty());

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn new_ancestor_is_registered_before_descendant_is_released() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);

    session
        .build_started(RootSetBuilder::new().main("/a/src").build(&fs))
        .await?;
    handle.clear_calls();

    let report = session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;

    assert_eq!(
        handle.calls(),
        vec![
            WatchCall::Start(p("/a"), WatchMode::Hierarchical),
            WatchCall::Stop(p("/a/src")),
        ]
    );
    assert_eq!(report.watched(), vec![p("/a")]);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn deleting_a_directory_purges_its_cached_subtree() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;

    let cache = session.cache().clone();
    cache.get_or_read(&fs, Path::new("/a/tmp/file"))?;
    cache.get_or_read(&fs, Path::new("/a/tmp/sub"))?;
    cache.get_or_read(&fs, Path::new("/a/keep"))?;
    assert!(cache.get(Path::new("/a/tmp/file")).is_some());

    fs.remove("/a/tmp");
    handle.emit(ChangeEvent::removed("/a/tmp"));

    eventually(|| cache.get(Path::new("/a/tmp/file")).is_none()).await;
    assert_eq!(cache.get(Path::new("/a/tmp/sub")), None);
    assert!(cache.get(Path::new("/a/keep")).is_some());
    // The target itself is untouched.
    assert!(handle.stop_calls().is_empty());

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn deleted_watch_target_is_released_and_re_registered_later() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    let roots = || {
        RootSetBuilder::new()
            .main("/a")
            .included("lib", "/x")
            .build(&fs)
    };
    session.build_started(roots()).await?;

    fs.remove("/x");
    handle.emit(ChangeEvent::removed("/x"));

    eventually(|| handle.stop_calls() == vec![p("/x")]).await;
    assert_eq!(session.diagnostics().released, 1);
    assert!(!session.cache().is_trusted(Path::new("/x/lib/f")));
    assert!(session.cache().is_trusted(Path::new("/a/f")));

    // Gone at the next build: reported missing, nothing registered.
    let report = session.build_started(roots()).await?;
    assert_eq!(report.missing, vec![p("/x")]);
    assert!(report.outcome.registered.is_empty());

    // Back again: registered anew.
    fs.add_dir("/x/lib");
    let report = session.build_started(roots()).await?;
    assert_eq!(report.outcome.registered, vec![p("/x")]);
    assert!(session.cache().is_trusted(Path::new("/x/lib/f")));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_everything_once() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("lib", "/x")
                .build(&fs),
        )
        .await?;

    with_timeout(session.stop()).await;
    with_timeout(session.stop()).await;

    assert_eq!(handle.stop_calls(), vec![p("/a"), p("/x")]);
    assert!(handle.active().is_empty());
    assert!(session.is_stopped());

    let err = session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await
        .unwrap_err();
    assert!(matches!(err, VfsWatchError::WatchingDisabled(_)));
    Ok(())
}

#[tokio::test]
async fn registration_failure_is_local_and_retried() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    handle.fail_on("/x", "permission denied");
    let roots = || {
        RootSetBuilder::new()
            .main("/a")
            .included("lib", "/x")
            .build(&fs)
    };

    let report = session.build_started(roots()).await?;

    assert_eq!(report.outcome.registered, vec![p("/a")]);
    assert_eq!(report.outcome.failed.len(), 1);
    assert_eq!(report.outcome.failed[0].path, p("/x"));
    assert!(report.outcome.failed[0].reason.contains("permission denied"));
    assert_eq!(report.watched(), vec![p("/a")]);
    assert!(session.diagnostics().unwatched.contains_key(Path::new("/x")));
    assert!(!session.cache().is_trusted(Path::new("/x/lib/f")));
    assert!(session.cache().is_trusted(Path::new("/a/f")));

    // Still failing: retried every build.
    session.build_started(roots()).await?;
    assert_eq!(
        handle
            .start_calls()
            .iter()
            .filter(|d| d.as_path() == Path::new("/x"))
            .count(),
        2
    );

    handle.clear_failure("/x");
    let report = session.build_started(roots()).await?;
    assert_eq!(report.outcome.registered, vec![p("/x")]);
    assert!(session.diagnostics().unwatched.is_empty());
    assert!(session.cache().is_trusted(Path::new("/x/lib/f")));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn slow_registration_times_out_without_blocking_the_build() -> TestResult {
    init_tracing();
    let fs = project_fs();
    fs.add_dir("/z/slow");
    let options = WatchOptions {
        registration_timeout: Duration::from_millis(50),
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    handle.delay_on("/z", Duration::from_millis(400));

    let report = with_timeout(
        session.build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("slow", "/z")
                .build(&fs),
        ),
    )
    .await?;

    assert_eq!(report.outcome.registered, vec![p("/a")]);
    assert_eq!(report.outcome.failed.len(), 1);
    assert_eq!(report.outcome.failed[0].path, p("/z"));
    assert!(report.outcome.failed[0].reason.contains("timed out"));
    assert!(!session.cache().is_trusted(Path::new("/z/slow")));

    with_timeout(session.stop()).await;
    Ok(())
}

#[tokio::test]
async fn stalled_registration_does_not_fail_the_directories_after_it() -> TestResult {
    init_tracing();
    let fs = project_fs();
    fs.add_dir("/b");
    fs.add_dir("/c");
    let options = WatchOptions {
        registration_timeout: Duration::from_millis(100),
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    handle.delay_on("/a", Duration::from_millis(150));

    let report = with_timeout(
        session.build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("b", "/b")
                .included("c", "/c")
                .build(&fs),
        ),
    )
    .await?;

    assert_eq!(report.outcome.registered, vec![p("/b"), p("/c")]);
    assert_eq!(report.outcome.failed.len(), 1);
    assert_eq!(report.outcome.failed[0].path, p("/a"));
    assert!(report.outcome.failed[0].reason.contains("timed out"));
    assert!(session.cache().is_trusted(Path::new("/b/f")));

    // The stalled call completes natively and is dropped again.
    eventually(|| handle.stop_calls().contains(&p("/a"))).await;
    assert!(!handle.active().contains(Path::new("/a")));

    with_timeout(session.stop()).await;
    Ok(())
}

#[tokio::test]
async fn long_stall_fails_the_rest_fast_as_busy() -> TestResult {
    init_tracing();
    let fs = project_fs();
    fs.add_dir("/b");
    fs.add_dir("/c");
    let options = WatchOptions {
        registration_timeout: Duration::from_millis(50),
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    handle.delay_on("/a", Duration::from_secs(1));

    let started = std::time::Instant::now();
    let report = with_timeout(
        session.build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("b", "/b")
                .included("c", "/c")
                .build(&fs),
        ),
    )
    .await?;

    assert!(started.elapsed() < Duration::from_millis(600));
    assert!(report.outcome.registered.is_empty());
    let failed: Vec<_> = report.outcome.failed.iter().map(|f| f.path.clone()).collect();
    assert_eq!(failed, vec![p("/a"), p("/b"), p("/c")]);
    assert!(report.outcome.failed[0].reason.contains("timed out"));
    for failure in &report.outcome.failed[1..] {
        assert!(failure.reason.contains("busy"), "{}", failure.reason);
    }
    assert_eq!(handle.start_calls(), vec![p("/a")]);

    // Retried on the next build once the adapter is free again.
    handle.clear_delay("/a");
    eventually(|| !handle.active().contains(Path::new("/a")) && handle.stop_calls().len() == 1)
        .await;
    let report = with_timeout(
        session.build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("b", "/b")
                .included("c", "/c")
                .build(&fs),
        ),
    )
    .await?;
    assert_eq!(report.outcome.registered, vec![p("/a"), p("/b"), p("/c")]);
    assert!(report.outcome.failed.is_empty());

    with_timeout(session.stop()).await;
    Ok(())
}

#[tokio::test]
async fn late_completion_does_not_release_a_newer_registration() -> TestResult {
    init_tracing();
    let fs = project_fs();
    fs.add_dir("/z/slow");
    let options = WatchOptions {
        registration_timeout: Duration::from_millis(100),
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    handle.delay_on("/z", Duration::from_millis(150));
    let roots = || {
        RootSetBuilder::new()
            .main("/a")
            .included("slow", "/z")
            .build(&fs)
    };

    let report = with_timeout(session.build_started(roots())).await?;
    assert_eq!(report.outcome.failed.len(), 1);
    assert_eq!(report.outcome.failed[0].path, p("/z"));

    // The next build starts while the first call to /z is still in flight.
    handle.clear_delay("/z");
    let report = with_timeout(session.build_started(roots())).await?;
    assert_eq!(report.outcome.registered, vec![p("/z")]);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.active().contains(Path::new("/z")));
    assert!(!handle.stop_calls().contains(&p("/z")));
    assert!(session.cache().is_trusted(Path::new("/z/slow")));

    with_timeout(session.stop()).await;
    Ok(())
}

#[tokio::test]
async fn closed_event_stream_disables_watching() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, mut handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    let cache = session.cache().clone();
    cache.get_or_read(&fs, Path::new("/a/keep"))?;

    handle.crash();

    eventually(|| !cache.is_enabled()).await;
    assert!(session.diagnostics().disabled_reason.is_some());
    assert_eq!(cache.get(Path::new("/a/keep")), None);
    assert!(!cache.record(Path::new("/a/keep"), vfswatch::vfs::Snapshot::missing("/a/keep")));
    assert_eq!(handle.stop_calls(), vec![p("/a")]);

    // The daemon keeps going; builds just read from disk.
    let report = session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    assert!(report.disabled);
    assert_eq!(handle.start_calls(), vec![p("/a")]);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn overflow_drops_subtree_and_is_counted_against_its_target() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    let cache = session.cache().clone();
    cache.get_or_read(&fs, Path::new("/a/tmp/file"))?;
    cache.get_or_read(&fs, Path::new("/a/keep"))?;

    handle.emit(ChangeEvent::overflow("/a/tmp"));

    eventually(|| session.diagnostics().overflows.get(Path::new("/a")) == Some(&1)).await;
    assert_eq!(cache.get(Path::new("/a/tmp/file")), None);
    assert!(cache.get(Path::new("/a/keep")).is_some());

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn pathless_native_error_overflows_every_target() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("lib", "/x")
                .build(&fs),
        )
        .await?;
    let cache = session.cache().clone();
    cache.get_or_read(&fs, Path::new("/a/keep"))?;
    cache.get_or_read(&fs, Path::new("/x/lib"))?;

    handle.emit_error(Vec::new(), "event queue overflow");

    eventually(|| session.diagnostics().overflows.contains_key(Path::new("/x"))).await;
    assert!(cache.is_empty());
    let overflows = session.diagnostics().overflows;
    assert_eq!(overflows.get(Path::new("/a")), Some(&1));
    assert_eq!(overflows.get(Path::new("/x")), Some(&1));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn flat_mode_adopts_new_directories() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Flat);
    let report = session
        .build_started(RootSetBuilder::new().main("/x").build(&fs))
        .await?;
    assert_eq!(report.watched(), vec![p("/x"), p("/x/lib")]);
    assert!(!session.cache().is_trusted(Path::new("/x/gen/out/f")));

    fs.add_dir("/x/gen/out");
    handle.emit(ChangeEvent::created("/x/gen"));

    eventually(|| session.diagnostics().adopted == 2).await;
    assert!(handle.active().contains(Path::new("/x/gen")));
    assert!(handle.active().contains(Path::new("/x/gen/out")));
    assert!(session.cache().is_trusted(Path::new("/x/gen/out/f")));

    // A created file is not adopted.
    fs.add_file("/x/lib/A.java", b"class A {}");
    handle.emit(ChangeEvent::created("/x/lib/A.java"));
    eventually(|| session.diagnostics().events_applied == 2).await;
    assert_eq!(session.diagnostics().adopted, 2);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn flat_mode_releases_deleted_subdirectories() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Flat);
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    assert!(handle.active().contains(Path::new("/a/tmp/sub")));

    fs.remove("/a/tmp");
    handle.emit(ChangeEvent::removed("/a/tmp"));

    eventually(|| {
        let active = handle.active();
        !active.contains(Path::new("/a/tmp")) && !active.contains(Path::new("/a/tmp/sub"))
    })
    .await;
    assert!(handle.active().contains(Path::new("/a")));
    assert_eq!(session.diagnostics().released, 2);

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn removing_a_build_unregisters_its_roots() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("lib", "/x")
                .build(&fs),
        )
        .await?;

    // A later invocation that only mentions the main build keeps lib's roots.
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    assert!(handle.stop_calls().is_empty());

    let report = session.remove_build(&BuildId::included("lib")).await?;

    assert_eq!(handle.stop_calls(), vec![p("/x")]);
    assert_eq!(report.watch_set.target_paths(), vec![p("/a")]);
    assert!(!session.known_roots().contains_key(&BuildId::included("lib")));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn global_caches_missing_roots_and_disabled_config() -> TestResult {
    init_tracing();
    let fs = project_fs();
    fs.add_dir("/gc/modules");

    let options = WatchOptions {
        global_cache_dirs: vec![p("/gc")],
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    let report = session
        .build_started(
            RootSetBuilder::new()
                .main("/a")
                .included("cache", "/gc/modules")
                .included("later", "/out")
                .build(&fs),
        )
        .await?;

    assert_eq!(handle.start_calls(), vec![p("/a")]);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].0, p("/gc/modules"));
    assert_eq!(report.missing, vec![p("/out")]);
    session.stop().await;

    let options = WatchOptions {
        enabled: false,
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    let report = session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    assert!(report.disabled);
    assert!(handle.calls().is_empty());
    assert!(!session.cache().is_trusted(Path::new("/a/keep")));
    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn unwatchable_root_nested_in_a_watched_root_is_never_trusted() -> TestResult {
    init_tracing();
    let fs = project_fs();
    fs.add_file("/a/net/share", b"remote");

    let options = WatchOptions {
        unwatchable: UnwatchablePatterns::compile(&["/a/net".to_string()])?,
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    let report = session
        .build_started(RootSetBuilder::new().main("/a").main("/a/net").build(&fs))
        .await?;

    assert_eq!(handle.start_calls(), vec![p("/a")]);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].0, p("/a/net"));

    let share = Path::new("/a/net/share");
    assert!(!session.cache().is_trusted(share));
    session.cache().get_or_read(&fs, share)?;
    assert_eq!(session.cache().get(share), None);
    assert!(session.cache().is_trusted(Path::new("/a/keep")));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn symlinked_root_is_registered_and_trusted_at_its_canonical_path() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_dir("/private/var/w/src");
    fs.add_symlink("/var", "/private/var");
    let (mut session, handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);

    let report = session
        .build_started(RootSetBuilder::new().main("/var/w").build(&fs))
        .await?;

    assert_eq!(handle.start_calls(), vec![p("/private/var/w")]);
    assert_eq!(report.outcome.registered, vec![p("/private/var/w")]);
    assert!(session.cache().is_trusted(Path::new("/private/var/w/src")));
    // Lookups through the link are never served from the cache.
    assert!(!session.cache().is_trusted(Path::new("/var/w/src")));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn adding_a_global_cache_dir_drops_cached_entries_inside_it() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let (mut session, _handle) = fake_session(test_options(), &fs, WatchMode::Hierarchical);
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;
    session.cache().get_or_read(&fs, Path::new("/a/tmp/file"))?;

    assert!(session.add_global_cache_dir("/a/tmp"));
    assert!(!session.add_global_cache_dir("/a/tmp"));

    assert_eq!(session.cache().get(Path::new("/a/tmp/file")), None);
    assert!(!session.cache().is_trusted(Path::new("/a/tmp/file")));

    session.stop().await;
    Ok(())
}

#[tokio::test]
async fn bursts_are_coalesced_per_window() -> TestResult {
    init_tracing();
    let fs = project_fs();
    let options = WatchOptions {
        debounce: Duration::from_millis(25),
        ..test_options()
    };
    let (mut session, handle) = fake_session(options, &fs, WatchMode::Hierarchical);
    session
        .build_started(RootSetBuilder::new().main("/a").build(&fs))
        .await?;

    for _ in 0..3 {
        handle.emit(ChangeEvent::modified("/a/keep"));
    }

    eventually(|| session.diagnostics().events_applied == 1).await;
    assert_eq!(session.diagnostics().events_received, 3);

    session.stop().await;
    Ok(())
}
