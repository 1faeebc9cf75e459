// src/watch/normalize.rs

//! Translation of `notify` events into the four-way [`ChangeKind`] model.

use std::time::SystemTime;

use notify::event::{AccessKind, AccessMode, ModifyKind, RenameMode};
use notify::{Event, EventKind};

use crate::watch::adapter::{ChangeEvent, ChangeKind, NativeEvent};
use crate::watch::path_utils::normalize;

/// Convert one raw `notify` event into zero or more native events.
pub fn normalize_event(event: Event, timestamp: SystemTime) -> Vec<NativeEvent> {
    if event.need_rescan() {
        if event.paths.is_empty() {
            return vec![NativeEvent::Error {
                paths: Vec::new(),
                message: "native watcher requested a rescan".to_string(),
            }];
        }
        return change_events(&event.paths, ChangeKind::Overflow, timestamp);
    }

    match event.kind {
        EventKind::Create(_) => change_events(&event.paths, ChangeKind::Created, timestamp),
        EventKind::Remove(_) => change_events(&event.paths, ChangeKind::Removed, timestamp),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => change_events(&event.paths, ChangeKind::Removed, timestamp),
            RenameMode::To => change_events(&event.paths, ChangeKind::Created, timestamp),
            RenameMode::Both if event.paths.len() == 2 => {
                let mut out = change_events(&event.paths[..1], ChangeKind::Removed, timestamp);
                out.extend(change_events(&event.paths[1..], ChangeKind::Created, timestamp));
                out
            }
            // Without knowing which side a path is on, treat every path as gone;
            // the removal subsumes a modification for the cache.
            RenameMode::Both | RenameMode::Any | RenameMode::Other => {
                change_events(&event.paths, ChangeKind::Removed, timestamp)
            }
        },
        EventKind::Modify(_) => change_events(&event.paths, ChangeKind::Modified, timestamp),
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            change_events(&event.paths, ChangeKind::Modified, timestamp)
        }
        EventKind::Access(_) => Vec::new(),
        EventKind::Any | EventKind::Other => {
            change_events(&event.paths, ChangeKind::Modified, timestamp)
        }
    }
}

/// Convert a `notify` error into a native error event.
pub fn normalize_error(err: notify::Error) -> NativeEvent {
    let paths = err.paths.iter().map(|p| normalize(p)).collect();
    NativeEvent::Error {
        paths,
        message: err.to_string(),
    }
}

fn change_events(
    paths: &[std::path::PathBuf],
    kind: ChangeKind,
    timestamp: SystemTime,
) -> Vec<NativeEvent> {
    paths
        .iter()
        .map(|path| {
            NativeEvent::Change(ChangeEvent {
                path: normalize(path),
                kind,
                timestamp,
            })
        })
        .collect()
}
