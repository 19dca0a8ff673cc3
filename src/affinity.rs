//! Affinity Map (spec §4.D): thread-to-(pool, account) pinning with a
//! least-connections secondary index.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use ahash::AHashMap;
use moka::sync::Cache;

use crate::clock::now_ms;
use crate::domain::{Account, ClientProvider, Pool, ThreadId};

const TTI: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct AffinityEntry {
    pub pool: Pool,
    pub account: Account,
    pub assigned_at_ms: i64,
}

type Key = (ThreadId, ClientProvider);

/// Cheap to `Clone` (an `Arc` clone of both the primary cache and the counts
/// index), so the same map can be shared between the router and the
/// background cleanup sweep.
#[derive(Clone)]
pub struct AffinityMap {
    primary: Cache<Key, AffinityEntry>,
    counts: Arc<Mutex<AHashMap<(Pool, Account), u64>>>,
}

impl AffinityMap {
    pub fn new() -> Self {
        Self {
            primary: Cache::builder().time_to_idle(TTI).build(),
            counts: Arc::new(Mutex::new(AHashMap::new())),
        }
    }

    /// Read-and-touch: a successful `get` bumps TTI naturally via moka.
    pub fn get(&self, thread: &str, provider: ClientProvider) -> Option<AffinityEntry> {
        self.primary.get(&(thread.to_string(), provider))
    }

    /// No-touch read. `Cache::get` always refreshes time-to-idle, so this
    /// scans via `iter()` instead — the same approach `sweep_expired` uses —
    /// which does not count as a read for TTI purposes.
    pub fn peek(&self, thread: &str, provider: ClientProvider) -> Option<AffinityEntry> {
        let key = (thread.to_string(), provider);
        self.primary.iter().find_map(|(k, v)| (*k == key).then_some(v))
    }

    pub fn set(&self, thread: &str, provider: ClientProvider, pool: Pool, account: Account) {
        let key = (thread.to_string(), provider);
        let mut counts = self.counts.lock().expect("affinity counts mutex poisoned");

        if let Some(prior) = self.primary.get(&key) {
            if prior.pool == pool && prior.account == account {
                self.primary.insert(
                    key,
                    AffinityEntry {
                        pool,
                        account,
                        assigned_at_ms: now_ms(),
                    },
                );
                return;
            }
            decrement(&mut counts, prior.pool, prior.account);
        }

        increment(&mut counts, pool, account);
        self.primary.insert(
            key,
            AffinityEntry {
                pool,
                account,
                assigned_at_ms: now_ms(),
            },
        );
    }

    pub fn clear(&self, thread: &str, provider: ClientProvider) {
        let key = (thread.to_string(), provider);
        let mut counts = self.counts.lock().expect("affinity counts mutex poisoned");
        if let Some(entry) = self.primary.get(&key) {
            decrement(&mut counts, entry.pool, entry.account);
        }
        self.primary.invalidate(&key);
    }

    pub fn active_count(&self, pool: Pool, account: Account) -> u64 {
        self.counts
            .lock()
            .expect("affinity counts mutex poisoned")
            .get(&(pool, account))
            .copied()
            .unwrap_or(0)
    }

    /// Evict entries idle past the TTL, keeping the counts index consistent.
    /// Moka's own TTI sweep already does this lazily; this is the explicit
    /// 10-minute sweep the background task drives.
    pub fn sweep_expired(&self) {
        self.primary.run_pending_tasks();
        let now = now_ms();
        let stale: Vec<Key> = self
            .primary
            .iter()
            .filter(|(_, e)| now - e.assigned_at_ms >= TTI.as_millis() as i64)
            .map(|(k, _)| (*k).clone())
            .collect();
        for key in stale {
            self.clear(&key.0, key.1);
        }
    }
}

impl Default for AffinityMap {
    fn default() -> Self {
        Self::new()
    }
}

fn increment(counts: &mut AHashMap<(Pool, Account), u64>, pool: Pool, account: Account) {
    *counts.entry((pool, account)).or_insert(0) += 1;
}

fn decrement(counts: &mut AHashMap<(Pool, Account), u64>, pool: Pool, account: Account) {
    if let Some(v) = counts.get_mut(&(pool, account)) {
        *v = v.saturating_sub(1);
        if *v == 0 {
            counts.remove(&(pool, account));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_returns_pin() {
        let map = AffinityMap::new();
        map.set("t1", ClientProvider::Openai, Pool::Codex, 0);
        let entry = map.get("t1", ClientProvider::Openai).unwrap();
        assert_eq!(entry.pool, Pool::Codex);
        assert_eq!(entry.account, 0);
        assert_eq!(map.active_count(Pool::Codex, 0), 1);
    }

    #[test]
    fn changing_pin_moves_the_count() {
        let map = AffinityMap::new();
        map.set("t1", ClientProvider::Google, Pool::Gemini, 0);
        map.set("t1", ClientProvider::Google, Pool::Gemini, 1);
        assert_eq!(map.active_count(Pool::Gemini, 0), 0);
        assert_eq!(map.active_count(Pool::Gemini, 1), 1);
    }

    #[test]
    fn clear_removes_pin_and_count() {
        let map = AffinityMap::new();
        map.set("t1", ClientProvider::Anthropic, Pool::Anthropic, 2);
        map.clear("t1", ClientProvider::Anthropic);
        assert!(map.get("t1", ClientProvider::Anthropic).is_none());
        assert_eq!(map.active_count(Pool::Anthropic, 2), 0);
    }

    #[test]
    fn peek_returns_the_same_pin_as_get_without_requiring_mutation() {
        let map = AffinityMap::new();
        assert!(map.peek("t1", ClientProvider::Openai).is_none());

        map.set("t1", ClientProvider::Openai, Pool::Codex, 0);
        let peeked = map.peek("t1", ClientProvider::Openai).unwrap();
        assert_eq!(peeked.pool, Pool::Codex);
        assert_eq!(peeked.account, 0);
    }

    #[test]
    fn distinct_providers_on_same_thread_are_independent() {
        let map = AffinityMap::new();
        map.set("t1", ClientProvider::Anthropic, Pool::Anthropic, 0);
        map.set("t1", ClientProvider::Openai, Pool::Codex, 0);
        assert!(map.get("t1", ClientProvider::Anthropic).is_some());
        assert!(map.get("t1", ClientProvider::Openai).is_some());
    }
}
