//! Cooldown Tracker (spec §4.C): per-(pool, account) burst/exhaustion state.

use std::time::Duration;

use moka::sync::Cache;

use crate::clock::now_ms;
use crate::domain::{Account, Pool};

const BURST_MIN_WAIT_MS: i64 = 30_000;
const BURST_EXHAUSTION_RETRY_AFTER_S: i64 = 300;
const BURST_EXHAUSTION_CONSECUTIVE: u32 = 3;
const EXHAUSTION_WAIT_MS: i64 = 2 * 60 * 60 * 1000;
const FORBIDDEN_WAIT_MS: i64 = 24 * 60 * 60 * 1000;

/// Absolute-time-bound, since moka's own TTL sweep only approximates eviction
/// and spec requires evicting exactly at `until` on read.
const MAX_ENTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
struct CooldownEntry {
    until_ms: i64,
    exhausted: bool,
    consecutive_429: u32,
}

#[derive(Clone)]
pub struct CooldownTracker {
    entries: Cache<(Pool, Account), CooldownEntry>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().time_to_live(MAX_ENTRY_TTL).build(),
        }
    }

    pub fn record_429(&self, pool: Pool, account: Account, retry_after_s: Option<i64>) {
        let key = (pool, account);
        let prior_consecutive = self
            .entries
            .get(&key)
            .map_or(0, |e| e.consecutive_429);
        let consecutive = prior_consecutive + 1;

        let (exhausted, until_ms) = if retry_after_s.is_some_and(|s| s > BURST_EXHAUSTION_RETRY_AFTER_S)
            || consecutive >= BURST_EXHAUSTION_CONSECUTIVE
        {
            (true, now_ms() + EXHAUSTION_WAIT_MS)
        } else {
            let wait_ms = (retry_after_s.unwrap_or(0) * 1000).max(BURST_MIN_WAIT_MS);
            (false, now_ms() + wait_ms)
        };

        self.entries.insert(
            key,
            CooldownEntry {
                until_ms,
                exhausted,
                consecutive_429: consecutive,
            },
        );
    }

    pub fn record_403(&self, pool: Pool, account: Account) {
        self.entries.insert(
            (pool, account),
            CooldownEntry {
                until_ms: now_ms() + FORBIDDEN_WAIT_MS,
                exhausted: true,
                consecutive_429: 0,
            },
        );
    }

    pub fn record_success(&self, pool: Pool, account: Account) {
        self.entries.invalidate(&(pool, account));
    }

    pub fn is_cooling_down(&self, pool: Pool, account: Account) -> bool {
        self.read_live(pool, account).is_some()
    }

    pub fn is_exhausted(&self, pool: Pool, account: Account) -> bool {
        self.read_live(pool, account).is_some_and(|e| e.exhausted)
    }

    /// Returns the live entry, evicting it first if it has already expired.
    fn read_live(&self, pool: Pool, account: Account) -> Option<CooldownEntry> {
        let key = (pool, account);
        let entry = self.entries.get(&key)?;
        if now_ms() >= entry.until_ms {
            self.entries.invalidate(&key);
            return None;
        }
        Some(entry)
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts integer seconds or an HTTP-date; anything else is "unknown"
/// (callers apply the 30s default).
pub fn parse_retry_after(header: &str) -> Option<i64> {
    if let Ok(secs) = header.trim().parse::<i64>() {
        return Some(secs.max(0));
    }
    let date = chrono::DateTime::parse_from_rfc2822(header.trim()).ok()?;
    let delta_ms = date.timestamp_millis() - now_ms();
    Some((delta_ms / 1000).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_retry_after_uses_30s_floor() {
        let tracker = CooldownTracker::new();
        tracker.record_429(Pool::Codex, 0, Some(5));
        assert!(tracker.is_cooling_down(Pool::Codex, 0));
        assert!(!tracker.is_exhausted(Pool::Codex, 0));
    }

    #[test]
    fn long_retry_after_exhausts() {
        let tracker = CooldownTracker::new();
        tracker.record_429(Pool::Codex, 0, Some(400));
        assert!(tracker.is_exhausted(Pool::Codex, 0));
    }

    #[test]
    fn three_consecutive_429s_exhausts_even_without_retry_after() {
        let tracker = CooldownTracker::new();
        tracker.record_429(Pool::Gemini, 1, None);
        tracker.record_429(Pool::Gemini, 1, None);
        assert!(!tracker.is_exhausted(Pool::Gemini, 1));
        tracker.record_429(Pool::Gemini, 1, None);
        assert!(tracker.is_exhausted(Pool::Gemini, 1));
    }

    #[test]
    fn record_403_exhausts_for_24h_and_resets_consecutive() {
        let tracker = CooldownTracker::new();
        tracker.record_403(Pool::Anthropic, 0);
        assert!(tracker.is_exhausted(Pool::Anthropic, 0));
    }

    #[test]
    fn success_clears_entry() {
        let tracker = CooldownTracker::new();
        tracker.record_429(Pool::Codex, 0, Some(400));
        tracker.record_success(Pool::Codex, 0);
        assert!(!tracker.is_cooling_down(Pool::Codex, 0));
    }

    #[test]
    fn parse_retry_after_accepts_seconds_and_rejects_garbage() {
        assert_eq!(parse_retry_after("120"), Some(120));
        assert_eq!(parse_retry_after("not-a-date"), None);
    }
}
