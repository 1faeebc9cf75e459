// src/watch/coalesce.rs

//! Debouncing of create/modify bursts.
//!
//! Pure and clock-free: callers pass `now` in, which keeps the behaviour
//! deterministic under test.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::watch::adapter::{ChangeEvent, ChangeKind};

#[derive(Debug)]
struct Pending {
    event: ChangeEvent,
    first_seen: Instant,
    merged: usize,
}

/// Merges created/modified events per path within a debounce window.
///
/// Rules:
/// - The first created/modified event for a path opens a window; any further
///   created/modified events for that path inside the window are folded into
///   it and the result is delivered as `Modified` once the window elapses.
/// - `Removed` and `Overflow` are never held back or dropped. A pending event
///   for the same path is emitted first so per-path order is preserved.
/// - A zero window passes everything straight through.
#[derive(Debug)]
pub struct Coalescer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
    /// Window openings in arrival order. Entries whose path was flushed early
    /// are stale and skipped on drain.
    order: VecDeque<(Instant, PathBuf)>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one event; returns whatever must be delivered right away.
    pub fn push(&mut self, event: ChangeEvent, now: Instant) -> Vec<ChangeEvent> {
        if self.window.is_zero() {
            return vec![event];
        }

        match event.kind {
            ChangeKind::Created | ChangeKind::Modified => {
                if let Some(pending) = self.pending.get_mut(&event.path) {
                    pending.event.kind = ChangeKind::Modified;
                    pending.event.timestamp = event.timestamp;
                    pending.merged += 1;
                    trace!(path = ?event.path, merged = pending.merged, "coalesced event");
                } else {
                    self.order.push_back((now, event.path.clone()));
                    self.pending.insert(
                        event.path.clone(),
                        Pending {
                            event,
                            first_seen: now,
                            merged: 1,
                        },
                    );
                }
                Vec::new()
            }
            ChangeKind::Removed | ChangeKind::Overflow => {
                let mut out = Vec::with_capacity(2);
                if let Some(pending) = self.pending.remove(&event.path) {
                    out.push(pending.event);
                }
                out.push(event);
                out
            }
        }
    }

    /// Events whose window has elapsed by `now`, in the order their windows
    /// opened.
    pub fn drain_due(&mut self, now: Instant) -> Vec<ChangeEvent> {
        let mut out = Vec::new();
        while let Some((seen, _)) = self.order.front() {
            if now.saturating_duration_since(*seen) < self.window {
                break;
            }
            let Some((seen, path)) = self.order.pop_front() else {
                break;
            };
            if let Some(event) = self.take_if_opened_at(&path, seen) {
                out.push(event);
            }
        }
        out
    }

    /// When the next window closes, if anything is pending.
    ///
    /// May point at a stale entry; waking for it simply drains nothing.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.order.front().map(|(seen, _)| *seen + self.window)
    }

    /// Deliver everything still pending regardless of the window.
    pub fn flush(&mut self) -> Vec<ChangeEvent> {
        let mut out = Vec::with_capacity(self.pending.len());
        while let Some((seen, path)) = self.order.pop_front() {
            if let Some(event) = self.take_if_opened_at(&path, seen) {
                out.push(event);
            }
        }
        self.pending.clear();
        out
    }

    fn take_if_opened_at(&mut self, path: &PathBuf, seen: Instant) -> Option<ChangeEvent> {
        match self.pending.get(path) {
            Some(pending) if pending.first_seen == seen => {
                self.pending.remove(path).map(|p| p.event)
            }
            _ => None,
        }
    }
}
