//! Router (spec §4.E): thread affinity → filter → least-connections.

use crate::affinity::AffinityMap;
use crate::cooldown::CooldownTracker;
use crate::db::CredentialActorHandle;
use crate::domain::{Account, ClientProvider, Pool, RouteTag};

/// Static candidate registry: which pools serve a client-facing provider.
/// Kept as plain data per spec §9's "keep externally visible as data" note.
const CANDIDATES: &[(ClientProvider, &[Pool])] = &[
    (ClientProvider::Anthropic, &[Pool::Anthropic]),
    (ClientProvider::Openai, &[Pool::Codex]),
    (ClientProvider::Google, &[Pool::Gemini, Pool::Antigravity]),
];

fn candidate_pools(provider: ClientProvider) -> &'static [Pool] {
    CANDIDATES
        .iter()
        .find(|(p, _)| *p == provider)
        .map_or(&[], |(_, pools)| *pools)
}

#[derive(Debug, Clone)]
pub struct RouteResult {
    pub decision: RouteTag,
    pub pool: Option<Pool>,
    pub account: Option<Account>,
}

impl RouteResult {
    fn upstream() -> Self {
        Self {
            decision: RouteTag::AmpUpstream,
            pool: None,
            account: None,
        }
    }

    fn local(pool: Pool, account: Account) -> Self {
        Self {
            decision: RouteTag::for_pool(pool),
            pool: Some(pool),
            account: Some(account),
        }
    }
}

#[derive(Clone)]
pub struct Router {
    db: CredentialActorHandle,
    cooldown: CooldownTracker,
    affinity: AffinityMap,
}

impl Router {
    pub fn new(db: CredentialActorHandle, cooldown: CooldownTracker, affinity: AffinityMap) -> Self {
        Self { db, cooldown, affinity }
    }

    pub async fn route(&self, provider: ClientProvider, thread_id: Option<&str>) -> RouteResult {
        if let Some(thread) = thread_id {
            if let Some(pin) = self.affinity.get(thread, provider) {
                let available = !self.cooldown.is_exhausted(pin.pool, pin.account)
                    && self.account_has_refresh_token(pin.pool, pin.account).await;

                if available {
                    if !self.cooldown.is_cooling_down(pin.pool, pin.account) {
                        return RouteResult::local(pin.pool, pin.account);
                    }
                    // Burst cooldown: fall through to candidate selection
                    // without breaking the pin (select_candidate will
                    // naturally exclude this pair until it clears).
                } else {
                    self.affinity.clear(thread, provider);
                }
            }
        }

        let Some(chosen) = self.select_candidate(provider).await else {
            return RouteResult::upstream();
        };

        if let Some(thread) = thread_id {
            self.affinity.set(thread, provider, chosen.0, chosen.1);
        }
        RouteResult::local(chosen.0, chosen.1)
    }

    /// Breaks the pin on the failed pair if it is now exhausted, then re-runs
    /// candidate selection. The caller is responsible for having already
    /// recorded the failure on the cooldown tracker (`record_429`/
    /// `record_403`) before calling this — recording here too would
    /// double-count the same failure and could overwrite a 403's 24h ban
    /// with a fresh 30s burst cooldown.
    pub async fn reroute_after_429(
        &self,
        provider: ClientProvider,
        failed_pool: Pool,
        failed_account: Account,
        thread_id: Option<&str>,
    ) -> RouteResult {
        if self.cooldown.is_exhausted(failed_pool, failed_account) {
            if let Some(thread) = thread_id {
                self.affinity.clear(thread, provider);
            }
        }

        let Some(chosen) = self.select_candidate(provider).await else {
            return RouteResult::upstream();
        };

        if let Some(thread) = thread_id {
            self.affinity.set(thread, provider, chosen.0, chosen.1);
        }
        RouteResult::local(chosen.0, chosen.1)
    }

    async fn account_has_refresh_token(&self, pool: Pool, account: Account) -> bool {
        self.db
            .get(pool, account)
            .await
            .ok()
            .flatten()
            .is_some_and(|c| c.is_usable())
    }

    async fn select_candidate(&self, provider: ClientProvider) -> Option<(Pool, Account)> {
        let mut candidates = Vec::new();
        for &pool in candidate_pools(provider) {
            let accounts = self.db.get_all(pool).await.ok()?;
            for (account, creds) in accounts {
                if creds.is_usable() {
                    candidates.push((pool, account));
                }
            }
        }

        let filtered: Vec<(Pool, Account)> = candidates
            .into_iter()
            .filter(|(pool, account)| !self.cooldown.is_cooling_down(*pool, *account))
            .collect();

        filtered
            .into_iter()
            .min_by_key(|(pool, account)| self.affinity.active_count(*pool, *account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_candidate_set_falls_back_to_upstream() {
        let db = crate::db::spawn("sqlite::memory:").await;
        let router = Router::new(db, CooldownTracker::new(), AffinityMap::new());
        let result = router.route(ClientProvider::Openai, None).await;
        assert!(matches!(result.decision, RouteTag::AmpUpstream));
    }

    #[tokio::test]
    async fn routes_to_the_only_usable_account() {
        let db = crate::db::spawn("sqlite::memory:").await;
        db.save(
            Pool::Codex,
            0,
            crate::db::Credentials {
                access_token: Some("at".to_string()),
                refresh_token: "rt".to_string(),
                expires_at: i64::MAX,
                project_id: None,
                email: None,
                account_id: None,
            },
        )
        .await
        .unwrap();
        let router = Router::new(db, CooldownTracker::new(), AffinityMap::new());
        let result = router.route(ClientProvider::Openai, Some("thread-1")).await;
        assert_eq!(result.pool, Some(Pool::Codex));
        assert_eq!(result.account, Some(0));
    }
}
