//! Stats Ring Buffer (spec §4.K): a fixed-capacity in-memory window of
//! request outcomes, reset on process start. Grounded on the same
//! mutex-around-a-plain-struct treatment the teacher gives small shared-state
//! singletons that do no I/O (no actor, no external ring-buffer crate).

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;

use crate::domain::RouteTag;

const CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct RequestEntry {
    pub route: RouteTag,
    pub status: u16,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct StatsSnapshot {
    pub total_requests: u64,
    pub requests_by_route: Vec<(String, u64)>,
    pub count_429: u64,
    pub average_duration_ms: f64,
    pub uptime_ms: u64,
}

struct Inner {
    entries: VecDeque<RequestEntry>,
    total_count: u64,
}

pub struct StatsRing {
    inner: Mutex<Inner>,
    started_at: Instant,
}

impl StatsRing {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(CAPACITY),
                total_count: 0,
            }),
            started_at: Instant::now(),
        }
    }

    /// Append `entry`, overwriting the oldest slot once the ring is full.
    pub fn record(&self, entry: RequestEntry) {
        let mut inner = self.inner.lock().expect("stats mutex poisoned");
        if inner.entries.len() == CAPACITY {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
        inner.total_count += 1;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock().expect("stats mutex poisoned");

        let mut by_route: Vec<(String, u64)> = Vec::new();
        let mut count_429: u64 = 0;
        let mut total_duration: u64 = 0;

        for entry in &inner.entries {
            total_duration += entry.duration_ms;
            if entry.status == 429 {
                count_429 += 1;
            }
            match by_route.iter_mut().find(|(tag, _)| tag == entry.route.as_str()) {
                Some((_, count)) => *count += 1,
                None => by_route.push((entry.route.as_str().to_string(), 1)),
            }
        }

        let average_duration_ms = if inner.entries.is_empty() {
            0.0
        } else {
            total_duration as f64 / inner.entries.len() as f64
        };

        StatsSnapshot {
            total_requests: inner.total_count,
            requests_by_route: by_route,
            count_429,
            average_duration_ms,
            uptime_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }

    /// Last `min(n, len)` entries in insertion order.
    pub fn recent_requests(&self, n: usize) -> Vec<RequestEntry> {
        let inner = self.inner.lock().expect("stats mutex poisoned");
        let skip = inner.entries.len().saturating_sub(n);
        inner.entries.iter().skip(skip).cloned().collect()
    }
}

impl Default for StatsRing {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(route: RouteTag, status: u16) -> RequestEntry {
        RequestEntry { route, status, duration_ms: 10 }
    }

    #[test]
    fn overwrites_oldest_once_full() {
        let ring = StatsRing::new();
        for _ in 0..CAPACITY + 10 {
            ring.record(entry(RouteTag::LocalClaude, 200));
        }
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.total_requests, (CAPACITY + 10) as u64);
        assert_eq!(ring.recent_requests(CAPACITY + 10).len(), CAPACITY);
    }

    #[test]
    fn snapshot_counts_429s_and_groups_by_route() {
        let ring = StatsRing::new();
        ring.record(entry(RouteTag::LocalCodex, 429));
        ring.record(entry(RouteTag::LocalCodex, 200));
        ring.record(entry(RouteTag::AmpUpstream, 200));
        let snapshot = ring.snapshot();
        assert_eq!(snapshot.count_429, 1);
        let codex_count = snapshot
            .requests_by_route
            .iter()
            .find(|(tag, _)| tag == "LOCAL_CODEX")
            .map(|(_, c)| *c);
        assert_eq!(codex_count, Some(2));
    }

    #[test]
    fn recent_requests_returns_insertion_order() {
        let ring = StatsRing::new();
        ring.record(entry(RouteTag::LocalClaude, 200));
        ring.record(entry(RouteTag::LocalGemini, 200));
        let recent = ring.recent_requests(5);
        assert_eq!(recent.len(), 2);
        assert!(matches!(recent[0].route, RouteTag::LocalClaude));
        assert!(matches!(recent[1].route, RouteTag::LocalGemini));
    }
}
