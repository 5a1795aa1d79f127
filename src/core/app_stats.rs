//! Per-application traffic accounting using DashMap for concurrent access.
//!
//! The capture pipeline is the only writer; UI and reporting read through
//! [`AppStatsTracker::snapshot`]. Each update runs while holding the entry's
//! shard lock, so a snapshot never sees half of an event applied.

use dashmap::DashMap;
use serde::Serialize;

use crate::core::connection::Uid;

/// Running counters for a single application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppStats {
    uid: Uid,
    pub sent_bytes: u64,
    pub rcvd_bytes: u64,
    pub num_connections: u32,
    pub num_blocked_connections: u32,
}

impl AppStats {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            sent_bytes: 0,
            rcvd_bytes: 0,
            num_connections: 0,
            num_blocked_connections: 0,
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn total_bytes(&self) -> u64 {
        self.sent_bytes.saturating_add(self.rcvd_bytes)
    }

    fn apply(&mut self, delta: &AppStatsDelta) {
        self.sent_bytes = self.sent_bytes.saturating_add(delta.sent_bytes);
        self.rcvd_bytes = self.rcvd_bytes.saturating_add(delta.rcvd_bytes);
        self.num_connections = self.num_connections.saturating_add(delta.connections);
        self.num_blocked_connections = self
            .num_blocked_connections
            .saturating_add(delta.blocked_connections);
    }
}

/// Counter increments belonging to one pipeline event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppStatsDelta {
    pub sent_bytes: u64,
    pub rcvd_bytes: u64,
    pub connections: u32,
    pub blocked_connections: u32,
}

/// Thread-safe stats tracker. Keyed by application uid.
#[derive(Debug, Default)]
pub struct AppStatsTracker {
    stats: DashMap<Uid, AppStats>,
}

impl AppStatsTracker {
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    /// Apply all increments of an event at once.
    pub fn record(&self, uid: Uid, delta: AppStatsDelta) {
        self.stats
            .entry(uid)
            .or_insert_with(|| AppStats::new(uid))
            .apply(&delta);
    }

    pub fn record_connection(&self, uid: Uid) {
        self.record(
            uid,
            AppStatsDelta {
                connections: 1,
                ..Default::default()
            },
        );
    }

    /// Record bytes for an application. Called from the capture loop.
    pub fn record_bytes(&self, uid: Uid, sent: u64, rcvd: u64) {
        self.record(
            uid,
            AppStatsDelta {
                sent_bytes: sent,
                rcvd_bytes: rcvd,
                ..Default::default()
            },
        );
    }

    pub fn record_blocked(&self, uid: Uid) {
        self.record(
            uid,
            AppStatsDelta {
                blocked_connections: 1,
                ..Default::default()
            },
        );
    }

    /// Independent copy of an application's counters, `None` if never seen.
    pub fn snapshot(&self, uid: Uid) -> Option<AppStats> {
        self.stats.get(&uid).map(|entry| entry.value().clone())
    }

    /// Like [`snapshot`](Self::snapshot), zeroed for unseen applications.
    pub fn snapshot_or_default(&self, uid: Uid) -> AppStats {
        self.snapshot(uid).unwrap_or_else(|| AppStats::new(uid))
    }

    /// Copies of all tracked applications, heaviest consumers first.
    pub fn snapshot_all(&self) -> Vec<AppStats> {
        let mut all: Vec<AppStats> = self.stats.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| {
            b.total_bytes()
                .cmp(&a.total_bytes())
                .then_with(|| a.uid.cmp(&b.uid))
        });
        all
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    /// Drop all counters (capture session reset).
    pub fn reset(&self) {
        let dropped = self.stats.len();
        self.stats.clear();
        tracing::info!("Reset app stats ({dropped} apps)");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;

    fn uid(raw: i32) -> Uid {
        Uid::new(raw).unwrap()
    }

    #[test]
    fn test_unseen_uid_has_no_snapshot() {
        let tracker = AppStatsTracker::new();
        assert!(tracker.snapshot(uid(1)).is_none());
        assert_eq!(tracker.snapshot_or_default(uid(1)), AppStats::new(uid(1)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_counts_match_number_of_calls() {
        let tracker = AppStatsTracker::new();
        for _ in 0..7 {
            tracker.record_connection(uid(10001));
        }
        for _ in 0..3 {
            tracker.record_blocked(uid(10001));
        }
        tracker.record_bytes(uid(10001), 100, 250);
        tracker.record_bytes(uid(10001), 1, 0);

        let s = tracker.snapshot(uid(10001)).unwrap();
        assert_eq!(s.uid(), uid(10001));
        assert_eq!(s.num_connections, 7);
        assert_eq!(s.num_blocked_connections, 3);
        assert_eq!(s.sent_bytes, 101);
        assert_eq!(s.rcvd_bytes, 250);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let tracker = AppStatsTracker::new();
        tracker.record_bytes(uid(5), 10, 10);
        let before = tracker.snapshot(uid(5)).unwrap();
        tracker.record_bytes(uid(5), 10, 10);
        assert_eq!(before.sent_bytes, 10);
        assert_eq!(tracker.snapshot(uid(5)).unwrap().sent_bytes, 20);
    }

    #[test]
    fn test_counters_saturate() {
        let tracker = AppStatsTracker::new();
        tracker.record_bytes(uid(1), u64::MAX, 0);
        tracker.record_bytes(uid(1), 5, 0);
        assert_eq!(tracker.snapshot(uid(1)).unwrap().sent_bytes, u64::MAX);
    }

    #[test]
    fn test_snapshot_all_sorted_by_total() {
        let tracker = AppStatsTracker::new();
        tracker.record_bytes(uid(1), 10, 0);
        tracker.record_bytes(uid(2), 500, 500);
        tracker.record_bytes(uid(3), 100, 0);

        let order: Vec<i32> = tracker.snapshot_all().iter().map(|s| s.uid().get()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_reset_discards_everything() {
        let tracker = AppStatsTracker::new();
        tracker.record_connection(uid(1));
        tracker.record_connection(uid(2));
        assert_eq!(tracker.len(), 2);
        tracker.reset();
        assert!(tracker.is_empty());
        assert!(tracker.snapshot(uid(1)).is_none());
    }

    #[test]
    fn test_concurrent_snapshots_never_torn_or_decreasing() {
        let tracker = Arc::new(AppStatsTracker::new());
        let done = Arc::new(AtomicBool::new(false));
        let app = uid(42);

        let reader = {
            let tracker = Arc::clone(&tracker);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut last = 0;
                while !done.load(Ordering::Acquire) {
                    if let Some(s) = tracker.snapshot(app) {
                        // every event adds one connection and 100 sent bytes
                        assert_eq!(s.sent_bytes, u64::from(s.num_connections) * 100);
                        assert!(s.num_connections >= last);
                        last = s.num_connections;
                    }
                }
            })
        };

        for _ in 0..10_000 {
            tracker.record(
                app,
                AppStatsDelta {
                    sent_bytes: 100,
                    connections: 1,
                    ..Default::default()
                },
            );
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap();

        assert_eq!(tracker.snapshot(app).unwrap().num_connections, 10_000);
    }
}
