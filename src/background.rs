//! Background Refresh (spec §4.J): the token-refresh sweep and affinity
//! cleanup timer, both cancellable at shutdown. Grounded on
//! `google_oauth/refresh_job.rs`'s background-worker shape, simplified to a
//! plain `tokio::time::interval` loop since the sweep here has no per-call
//! rate-limiting concern (each tick does a handful of refreshes at most).

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::affinity::AffinityMap;
use crate::db::CredentialActorHandle;
use crate::domain::Pool;
use crate::oauth::OauthEngine;

const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
const AFFINITY_CLEANUP_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Spawns the two periodic tasks and returns immediately; both stop when
/// `cancel` fires.
pub fn spawn(
    db: CredentialActorHandle,
    oauth: OauthEngine,
    affinity: AffinityMap,
    cancel: CancellationToken,
) {
    tokio::spawn(token_refresh_sweep(db, oauth, cancel.clone()));
    tokio::spawn(affinity_cleanup_sweep(affinity, cancel));
}

async fn token_refresh_sweep(db: CredentialActorHandle, oauth: OauthEngine, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(TOKEN_REFRESH_INTERVAL);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("token refresh sweep stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        for pool in Pool::ALL {
            let accounts = match db.get_all(pool).await {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!(%pool, error = %e, "token refresh sweep: could not list accounts");
                    continue;
                }
            };

            for (account, _) in accounts {
                if let Err(e) = oauth.refresh_if_near_expiry(pool, account).await {
                    warn!(%pool, account, error = %e, "token refresh sweep: refresh failed");
                }
            }
        }
    }
}

async fn affinity_cleanup_sweep(affinity: AffinityMap, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(AFFINITY_CLEANUP_INTERVAL);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("affinity cleanup sweep stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        affinity.sweep_expired();
    }
}
