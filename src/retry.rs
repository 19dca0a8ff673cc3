//! Retry / Reroute Engine (spec §4.F): cache-preserving wait, then a bounded
//! reroute loop over alternative accounts/pools.

use std::future::Future;
use std::time::Duration;

use axum::response::Response;
use tokio_util::sync::CancellationToken;

use crate::cooldown::CooldownTracker;
use crate::domain::{Account, ClientProvider, Pool};
use crate::error::ProxyError;
use crate::routing::Router;

pub const CACHE_PRESERVE_WAIT_MAX: Duration = Duration::from_secs(10);
pub const MAX_REROUTE_ATTEMPTS: u32 = 4;

/// What a single forward attempt against a routed `(pool, account)` resulted in.
pub enum ForwardOutcome {
    Success(Response),
    RateLimited { retry_after_s: Option<i64> },
    /// 403: record a 24h disable and reroute, same as exhaustion but with no
    /// cache-preserve wait (there is no `Retry-After` to honour).
    Forbidden,
    Unauthorized,
}

/// Sleep for `duration`, honouring cancellation so a client hangup releases
/// resources promptly (spec §5).
async fn cancellable_sleep(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

/// Run the full retry/reroute state machine for one routed request. Returns
/// `Ok(None)` when every local option was exhausted and the caller should
/// fall back to the paid upstream.
pub async fn run<F, Fut>(
    router: &Router,
    cooldown: &CooldownTracker,
    provider: ClientProvider,
    thread_id: Option<&str>,
    pool: Pool,
    account: Account,
    cancel: &CancellationToken,
    forward: F,
) -> Result<Option<Response>, ProxyError>
where
    F: Fn(Pool, Account) -> Fut,
    Fut: Future<Output = Result<ForwardOutcome, ProxyError>>,
{
    // Each branch records the outcome on `cooldown` exactly once, at the point the
    // outcome actually happened; `Router::reroute_after_429` only reads that state
    // back, it never records — recording it twice would double-count a single 429
    // toward the 3-consecutive exhaustion threshold and would let a 403's 24h ban
    // get overwritten by the reroute call's own (non-existent, now) recording.
    let (mut failed_pool, mut failed_account) = match forward(pool, account).await? {
        ForwardOutcome::Success(resp) => {
            cooldown.record_success(pool, account);
            return Ok(Some(resp));
        }
        ForwardOutcome::Unauthorized => return Ok(None),
        ForwardOutcome::Forbidden => {
            cooldown.record_403(pool, account);
            (pool, account)
        }
        ForwardOutcome::RateLimited { retry_after_s } => {
            if let Some(s) = retry_after_s {
                if s <= CACHE_PRESERVE_WAIT_MAX.as_secs() as i64 {
                    if !cancellable_sleep(Duration::from_secs(s.max(0) as u64), cancel).await {
                        return Ok(None);
                    }
                    match forward(pool, account).await? {
                        ForwardOutcome::Success(resp) => {
                            cooldown.record_success(pool, account);
                            return Ok(Some(resp));
                        }
                        ForwardOutcome::Unauthorized => return Ok(None),
                        ForwardOutcome::Forbidden => cooldown.record_403(pool, account),
                        ForwardOutcome::RateLimited { retry_after_s } => {
                            cooldown.record_429(pool, account, retry_after_s);
                        }
                    }
                } else {
                    cooldown.record_429(pool, account, retry_after_s);
                }
            } else {
                cooldown.record_429(pool, account, None);
            }
            (pool, account)
        }
    };

    for _ in 0..MAX_REROUTE_ATTEMPTS {
        let route = router.reroute_after_429(provider, failed_pool, failed_account, thread_id).await;

        let Some(next_pool) = route.pool else {
            return Ok(None);
        };
        let next_account = route.account.expect("pool implies account");

        match forward(next_pool, next_account).await? {
            ForwardOutcome::Success(resp) => {
                cooldown.record_success(next_pool, next_account);
                return Ok(Some(resp));
            }
            ForwardOutcome::Unauthorized => return Ok(None),
            ForwardOutcome::Forbidden => {
                cooldown.record_403(next_pool, next_account);
                failed_pool = next_pool;
                failed_account = next_account;
            }
            ForwardOutcome::RateLimited { retry_after_s } => {
                cooldown.record_429(next_pool, next_account, retry_after_s);
                failed_pool = next_pool;
                failed_account = next_account;
            }
        }
    }

    Ok(None)
}
