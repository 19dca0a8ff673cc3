//! OAuth Engine (spec §4.B): the public operations consumed by the router and
//! background refresh sweep.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use super::config::OauthProviderConfig;
use super::flow;
use crate::db::{CredentialActorHandle, Credentials};
use crate::domain::{Account, Pool};
use crate::error::OauthError;

/// Per-provider single-flight login lock, mirroring spec §5's "map from
/// provider-name to an in-progress completion handle". A second caller awaits
/// the same `Notify` rather than starting its own browser flow.
#[derive(Clone)]
pub struct OauthEngine {
    db: CredentialActorHandle,
    http: reqwest::Client,
    login_locks: Arc<Mutex<HashMap<Pool, Arc<Notify>>>>,
}

/// Releases this login's slot in `login_locks` on drop, whether `login`
/// succeeded, failed, or panicked.
struct LoginGuard {
    pool: Pool,
    locks: Arc<Mutex<HashMap<Pool, Arc<Notify>>>>,
    notify: Arc<Notify>,
}

impl Drop for LoginGuard {
    fn drop(&mut self) {
        let pool = self.pool;
        let locks = self.locks.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            let mut guard = locks.lock().await;
            if Arc::ptr_eq(guard.get(&pool).unwrap_or(&notify), &notify) {
                guard.remove(&pool);
            }
            notify.notify_waiters();
        });
    }
}

impl OauthEngine {
    pub fn new(db: CredentialActorHandle, http: reqwest::Client) -> Self {
        Self {
            db,
            http,
            login_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `login(config) -> Credentials`, single-flighted per pool.
    pub async fn login(&self, pool: Pool) -> Result<Credentials, OauthError> {
        let cfg = OauthProviderConfig::for_pool(pool);

        let (notify, is_leader) = {
            let mut guard = self.login_locks.lock().await;
            if let Some(existing) = guard.get(&pool) {
                (existing.clone(), false)
            } else {
                let notify = Arc::new(Notify::new());
                guard.insert(pool, notify.clone());
                (notify, true)
            }
        };

        if !is_leader {
            notify.notified().await;
            return self.latest_credentials(pool).await;
        }

        let _guard = LoginGuard {
            pool,
            locks: self.login_locks.clone(),
            notify: notify.clone(),
        };

        flow::login(cfg, &self.db, &self.http).await
    }

    async fn latest_credentials(&self, pool: Pool) -> Result<Credentials, OauthError> {
        let all = self
            .db
            .get_all(pool)
            .await
            .map_err(|e| OauthError::Identity(e.to_string()))?;
        all.into_iter()
            .next_back()
            .map(|(_, c)| c)
            .ok_or_else(|| OauthError::Identity("no credential recorded after login".to_string()))
    }

    /// `token(config, account) -> accessToken?` — cached if fresh, else refreshed.
    pub async fn token(&self, pool: Pool, account: Account) -> Result<Option<String>, OauthError> {
        let Some(creds) = self
            .db
            .get(pool, account)
            .await
            .map_err(|e| OauthError::Identity(e.to_string()))?
        else {
            return Ok(None);
        };

        if creds.is_fresh(crate::clock::now_ms()) {
            return Ok(creds.access_token);
        }

        let refreshed = self.refresh(pool, account, &creds).await?;
        Ok(refreshed.access_token)
    }

    /// `tokenFromAny(config) -> (accessToken, account)?` — first fresh, else
    /// try refresh per account in order.
    pub async fn token_from_any(&self, pool: Pool) -> Result<(String, Account), OauthError> {
        let all = self
            .db
            .get_all(pool)
            .await
            .map_err(|e| OauthError::Identity(e.to_string()))?;

        let now = crate::clock::now_ms();
        if let Some((account, creds)) = all.iter().find(|(_, c)| c.is_fresh(now)) {
            if let Some(token) = &creds.access_token {
                return Ok((token.clone(), *account));
            }
        }

        for (account, creds) in &all {
            if !creds.is_usable() {
                continue;
            }
            if let Ok(refreshed) = self.refresh(pool, *account, creds).await {
                if let Some(token) = refreshed.access_token {
                    return Ok((token, *account));
                }
            }
        }

        Err(OauthError::Identity(format!("no usable account for pool {pool}")))
    }

    /// Background-sweep hook (spec §4.J): refresh this account if it's
    /// within 5 minutes of expiry. No-op if the row is gone or not due yet.
    pub async fn refresh_if_near_expiry(&self, pool: Pool, account: Account) -> Result<bool, OauthError> {
        const REFRESH_WINDOW_MS: i64 = 5 * 60 * 1000;

        let Some(creds) = self
            .db
            .get(pool, account)
            .await
            .map_err(|e| OauthError::Identity(e.to_string()))?
        else {
            return Ok(false);
        };

        if !creds.is_usable() || creds.expires_at - crate::clock::now_ms() > REFRESH_WINDOW_MS {
            return Ok(false);
        }

        self.refresh(pool, account, &creds).await?;
        Ok(true)
    }

    /// `ready(config)` — at least one account with a refresh token.
    pub async fn ready(&self, pool: Pool) -> bool {
        self.db.exists(pool).await.unwrap_or(false)
    }

    /// `accountCount(config)`.
    pub async fn account_count(&self, pool: Pool) -> i64 {
        self.db.count(pool).await.unwrap_or(0)
    }

    /// Refresh with exactly one retry after ~1s, per spec §4.B.
    async fn refresh(
        &self,
        pool: Pool,
        account: Account,
        prior: &Credentials,
    ) -> Result<Credentials, OauthError> {
        let cfg = OauthProviderConfig::for_pool(pool);
        match flow::refresh(cfg, prior, &self.http).await {
            Ok(refreshed) => {
                self.db
                    .save(pool, account, refreshed.clone())
                    .await
                    .map_err(|e| OauthError::Identity(e.to_string()))?;
                Ok(refreshed)
            }
            Err(first_err) => {
                warn!(%pool, account, error = %first_err, "refresh failed, retrying once after 1s");
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                let refreshed = flow::refresh(cfg, prior, &self.http).await?;
                self.db
                    .save(pool, account, refreshed.clone())
                    .await
                    .map_err(|e| OauthError::Identity(e.to_string()))?;
                Ok(refreshed)
            }
        }
    }
}
