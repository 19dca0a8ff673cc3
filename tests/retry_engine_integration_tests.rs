use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use amprelay::affinity::AffinityMap;
use amprelay::cooldown::CooldownTracker;
use amprelay::db::Credentials;
use amprelay::domain::{Account, ClientProvider, Pool};
use amprelay::error::ProxyError;
use amprelay::retry::{self, ForwardOutcome};
use amprelay::routing::Router;
use axum::response::Response;
use tokio_util::sync::CancellationToken;

fn usable_credentials() -> Credentials {
    Credentials {
        access_token: Some("at".to_string()),
        refresh_token: "rt".to_string(),
        expires_at: i64::MAX,
        project_id: None,
        email: None,
        account_id: None,
    }
}

async fn router_with_accounts(pool: Pool, accounts: &[i64], cooldown: CooldownTracker) -> Router {
    let db = amprelay::db::spawn("sqlite::memory:").await;
    for &account in accounts {
        db.save(pool, account, usable_credentials()).await.unwrap();
    }
    Router::new(db, cooldown, AffinityMap::new())
}

#[tokio::test]
async fn forbidden_on_first_account_reroutes_to_the_second() {
    let cooldown = CooldownTracker::new();
    let router = router_with_accounts(Pool::Codex, &[0, 1], cooldown.clone()).await;
    let calls: Arc<Mutex<Vec<Account>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = calls.clone();

    let forward = move |_pool: Pool, account: Account| {
        let calls = calls_clone.clone();
        async move {
            calls.lock().unwrap().push(account);
            if account == 0 {
                Ok(ForwardOutcome::Forbidden)
            } else {
                Ok(ForwardOutcome::Success(Response::new(axum::body::Body::empty())))
            }
        }
    };

    let outcome = retry::run(
        &router,
        &cooldown,
        ClientProvider::Openai,
        Some("thread-a"),
        Pool::Codex,
        0,
        &CancellationToken::new(),
        forward,
    )
    .await
    .unwrap();

    assert!(outcome.is_some());
    assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    assert!(cooldown.is_cooling_down(Pool::Codex, 0));
}

#[tokio::test]
async fn unauthorized_short_circuits_without_reroute() {
    let cooldown = CooldownTracker::new();
    let router = router_with_accounts(Pool::Codex, &[0, 1], cooldown.clone()).await;
    let calls: Arc<Mutex<Vec<Account>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = calls.clone();

    let forward = move |_pool: Pool, account: Account| {
        let calls = calls_clone.clone();
        async move {
            calls.lock().unwrap().push(account);
            Ok::<_, ProxyError>(ForwardOutcome::Unauthorized)
        }
    };

    let outcome = retry::run(
        &router,
        &cooldown,
        ClientProvider::Openai,
        None,
        Pool::Codex,
        0,
        &CancellationToken::new(),
        forward,
    )
    .await
    .unwrap();

    assert!(outcome.is_none());
    assert_eq!(*calls.lock().unwrap(), vec![0]);
}

#[tokio::test]
async fn exhausting_every_candidate_falls_back_to_upstream_sentinel() {
    let cooldown = CooldownTracker::new();
    let router = router_with_accounts(Pool::Codex, &[0], cooldown.clone()).await;
    let attempts = AtomicUsize::new(0);

    let forward = |_pool: Pool, _account: Account| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, ProxyError>(ForwardOutcome::RateLimited { retry_after_s: Some(3600) }) }
    };

    let outcome = retry::run(
        &router,
        &cooldown,
        ClientProvider::Openai,
        Some("thread-a"),
        Pool::Codex,
        0,
        &CancellationToken::new(),
        forward,
    )
    .await
    .unwrap();

    assert!(outcome.is_none());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn short_retry_after_waits_then_retries_the_same_account() {
    let cooldown = CooldownTracker::new();
    let router = router_with_accounts(Pool::Codex, &[0], cooldown.clone()).await;
    let calls: Arc<Mutex<Vec<Account>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = calls.clone();

    let forward = move |_pool: Pool, account: Account| {
        let calls = calls_clone.clone();
        async move {
            let attempt = {
                let mut guard = calls.lock().unwrap();
                guard.push(account);
                guard.len()
            };
            if attempt == 1 {
                Ok(ForwardOutcome::RateLimited { retry_after_s: Some(0) })
            } else {
                Ok(ForwardOutcome::Success(Response::new(axum::body::Body::empty())))
            }
        }
    };

    let outcome = retry::run(
        &router,
        &cooldown,
        ClientProvider::Openai,
        None,
        Pool::Codex,
        0,
        &CancellationToken::new(),
        forward,
    )
    .await
    .unwrap();

    assert!(outcome.is_some());
    assert_eq!(*calls.lock().unwrap(), vec![0, 0]);
}
