use amprelay::affinity::AffinityMap;
use amprelay::cooldown::CooldownTracker;
use amprelay::db::Credentials;
use amprelay::domain::{ClientProvider, Pool};
use amprelay::routing::Router;

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

async fn router_with_accounts(pool: Pool, accounts: &[i64]) -> Router {
    let (router, _) = router_with_accounts_and_cooldown(pool, accounts).await;
    router
}

async fn router_with_accounts_and_cooldown(pool: Pool, accounts: &[i64]) -> (Router, CooldownTracker) {
    let db = amprelay::db::spawn("sqlite::memory:").await;
    for &account in accounts {
        db.save(pool, account, usable_credentials()).await.unwrap();
    }
    let cooldown = CooldownTracker::new();
    let router = Router::new(db, cooldown.clone(), AffinityMap::new());
    (router, cooldown)
}

#[tokio::test]
async fn same_thread_sticks_to_the_same_account_across_calls() {
    let router = router_with_accounts(Pool::Codex, &[0, 1, 2]).await;

    let first = router.route(ClientProvider::Openai, Some("thread-a")).await;
    let second = router.route(ClientProvider::Openai, Some("thread-a")).await;

    assert_eq!(first.pool, Some(Pool::Codex));
    assert_eq!(first.account, second.account);
}

#[tokio::test]
async fn distinct_threads_spread_across_least_connections() {
    let router = router_with_accounts(Pool::Codex, &[0, 1]).await;

    let a = router.route(ClientProvider::Openai, Some("thread-a")).await;
    let b = router.route(ClientProvider::Openai, Some("thread-b")).await;

    assert_eq!(a.pool, Some(Pool::Codex));
    assert_eq!(b.pool, Some(Pool::Codex));
    assert_ne!(a.account, b.account);
}

#[tokio::test]
async fn reroute_after_429_breaks_the_pin_once_exhausted() {
    let (router, cooldown) = router_with_accounts_and_cooldown(Pool::Codex, &[0, 1]).await;

    let initial = router.route(ClientProvider::Openai, Some("thread-a")).await;
    let failed_account = initial.account.unwrap();

    // A retry-after well above the burst-exhaustion threshold exhausts the
    // account outright, so the pin must break and reroute to the sibling.
    // The caller is expected to have already recorded this on the cooldown
    // tracker before calling `reroute_after_429`.
    cooldown.record_429(Pool::Codex, failed_account, Some(3600));
    let rerouted = router
        .reroute_after_429(ClientProvider::Openai, Pool::Codex, failed_account, Some("thread-a"))
        .await;

    assert_eq!(rerouted.pool, Some(Pool::Codex));
    assert_ne!(rerouted.account, Some(failed_account));

    // The pin now points at the new account.
    let again = router.route(ClientProvider::Openai, Some("thread-a")).await;
    assert_eq!(again.account, rerouted.account);
}

#[tokio::test]
async fn exhausting_every_account_falls_back_to_upstream() {
    let (router, cooldown) = router_with_accounts_and_cooldown(Pool::Codex, &[0]).await;

    let initial = router.route(ClientProvider::Openai, Some("thread-a")).await;
    let account = initial.account.unwrap();

    cooldown.record_429(Pool::Codex, account, Some(3600));
    let rerouted = router
        .reroute_after_429(ClientProvider::Openai, Pool::Codex, account, Some("thread-a"))
        .await;

    assert_eq!(rerouted.pool, None);
    assert!(matches!(rerouted.decision, amprelay::domain::RouteTag::AmpUpstream));
}

#[tokio::test]
async fn google_provider_considers_both_gemini_and_antigravity_pools() {
    let db = amprelay::db::spawn("sqlite::memory:").await;
    db.save(Pool::Antigravity, 0, usable_credentials()).await.unwrap();
    let router = Router::new(db, CooldownTracker::new(), AffinityMap::new());

    let routed = router.route(ClientProvider::Google, None).await;
    assert_eq!(routed.pool, Some(Pool::Antigravity));
}
