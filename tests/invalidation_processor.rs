use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};

use vfswatch::engine::{InvalidationProcessor, ProcessorCommand};
use vfswatch::roots::{GlobalCacheBoundary, UnwatchablePatterns};
use vfswatch::types::WatchMode;
use vfswatch::vfs::{Snapshot, SnapshotCache};
use vfswatch::watch::ChangeEvent;

type TestResult = Result<(), Box<dyn Error>>;

fn setup(mode: WatchMode, boundary: &[&str]) -> (SnapshotCache, InvalidationProcessor) {
    let cache = SnapshotCache::new(mode, GlobalCacheBoundary::new(boundary.iter().copied()));
    cache.set_watched(BTreeSet::from([PathBuf::from("/a")]));
    let processor = InvalidationProcessor::new(cache.clone(), mode);
    (cache, processor)
}

fn record(cache: &SnapshotCache, paths: &[&str]) {
    for path in paths {
        assert!(cache.record(Path::new(path), Snapshot::missing(*path)));
    }
}

#[test]
fn modification_drops_the_entry_without_recomputing() {
    let (cache, mut processor) = setup(WatchMode::Hierarchical, &[]);
    record(&cache, &["/a/f", "/a/g"]);

    let step = processor.apply(&ChangeEvent::modified("/a/f"));

    assert_eq!(step.invalidated, 1);
    assert!(step.commands.is_empty());
    assert_eq!(cache.get(Path::new("/a/f")), None);
    assert!(cache.get(Path::new("/a/g")).is_some());
}

#[test]
fn creation_also_drops_the_parent_listing() {
    let (cache, mut processor) = setup(WatchMode::Hierarchical, &[]);
    record(&cache, &["/a/dir", "/a/dir/new"]);

    let step = processor.apply(&ChangeEvent::created("/a/dir/new"));

    assert_eq!(step.invalidated, 2);
    assert!(step.commands.is_empty());
    assert!(cache.is_empty());
}

#[test]
fn creation_in_flat_mode_asks_for_adoption() {
    let (_cache, mut processor) = setup(WatchMode::Flat, &[]);

    let step = processor.apply(&ChangeEvent::created("/a/new"));

    assert_eq!(
        step.commands,
        vec![ProcessorCommand::AdoptDirectory(PathBuf::from("/a/new"))]
    );
}

#[test]
fn removal_drops_the_whole_subtree_and_releases_the_watch() {
    let (cache, mut processor) = setup(WatchMode::Hierarchical, &[]);
    record(&cache, &["/a/tmp", "/a/tmp/file", "/a/tmp/sub/g", "/a/keep"]);

    let step = processor.apply(&ChangeEvent::removed("/a/tmp"));

    assert_eq!(step.invalidated, 3);
    assert_eq!(
        step.commands,
        vec![ProcessorCommand::ReleaseWatch(PathBuf::from("/a/tmp"))]
    );
    assert_eq!(cache.get(Path::new("/a/tmp/file")), None);
    assert_eq!(cache.get(Path::new("/a/tmp/sub/g")), None);
    assert!(cache.get(Path::new("/a/keep")).is_some());
}

#[test]
fn overflow_drops_the_subtree_and_flags_it() {
    let (cache, mut processor) = setup(WatchMode::Hierarchical, &[]);
    record(&cache, &["/a/sub/f1", "/a/sub/deep/f2", "/a/other"]);

    let step = processor.apply(&ChangeEvent::overflow("/a/sub"));

    assert_eq!(step.invalidated, 2);
    assert_eq!(
        step.commands,
        vec![ProcessorCommand::FlagOverflow(PathBuf::from("/a/sub"))]
    );
    assert!(cache.get(Path::new("/a/other")).is_some());
}

#[test]
fn events_inside_global_caches_are_ignored() {
    let (_cache, mut processor) = setup(WatchMode::Flat, &["/a/caches"]);

    for event in [
        ChangeEvent::created("/a/caches/new"),
        ChangeEvent::removed("/a/caches/old"),
        ChangeEvent::overflow("/a/caches"),
    ] {
        let step = processor.apply(&event);
        assert!(step.ignored);
        assert!(step.commands.is_empty());
        assert_eq!(step.invalidated, 0);
    }
}

#[test]
fn events_below_unwatchable_directories_are_ignored() -> TestResult {
    let cache = SnapshotCache::new(WatchMode::Flat, GlobalCacheBoundary::default())
        .with_unwatchable(UnwatchablePatterns::compile(&["/a/net".to_string()])?);
    cache.set_watched(BTreeSet::from([PathBuf::from("/a")]));
    let mut processor = InvalidationProcessor::new(cache.clone(), WatchMode::Flat);

    let step = processor.apply(&ChangeEvent::created("/a/net/share"));

    assert!(step.ignored);
    assert!(step.commands.is_empty());
    assert_eq!(step.invalidated, 0);
    Ok(())
}
