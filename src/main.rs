use std::net::SocketAddr;
use std::sync::Arc;

use mimalloc::MiMalloc;
use tokio::{net::TcpListener, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use amprelay::affinity::AffinityMap;
use amprelay::config::Config;
use amprelay::cooldown::CooldownTracker;
use amprelay::domain::Pool;
use amprelay::oauth::OauthEngine;
use amprelay::pipeline::{PipelineState, ProviderClients};
use amprelay::routing::Router;
use amprelay::stats::StatsRing;
use amprelay::{background, db, server};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn parse_provider_arg(name: &str) -> Option<Pool> {
    match name {
        "anthropic" | "claude" => Some(Pool::Anthropic),
        "codex" | "openai" => Some(Pool::Codex),
        "gemini" | "google" => Some(Pool::Gemini),
        "antigravity" => Some(Pool::Antigravity),
        _ => None,
    }
}

fn print_help() {
    println!("amprelay - local reverse proxy for the client's AI backends");
    println!();
    println!("USAGE:");
    println!("    amprelay                 start the proxy server");
    println!("    amprelay login <provider>  run the OAuth login flow for a provider");
    println!("    amprelay setup            one-time environment setup (delegated to the CLI wrapper)");
    println!("    amprelay help             print this message");
}

fn init_logging(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_level(true).with_target(false))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.first().map(String::as_str) {
        Some("help" | "--help" | "-h") => {
            print_help();
            return Ok(());
        }
        Some("setup") => {
            let cfg = Config::load();
            init_logging(&cfg);
            info!("setup is performed by the CLI wrapper; nothing to do here");
            return Ok(());
        }
        Some("login") => {
            let cfg = Config::load();
            init_logging(&cfg);
            let Some(provider) = args.get(1).and_then(|p| parse_provider_arg(p)) else {
                eprintln!("unknown provider: {}", args.get(1).map_or("<none>", String::as_str));
                std::process::exit(1);
            };
            let db = db::spawn(cfg.basic.database_url.as_str()).await;
            let http = reqwest::Client::builder().build()?;
            let oauth = OauthEngine::new(db, http);
            oauth.login(provider).await?;
            info!(%provider, "login succeeded");
            return Ok(());
        }
        _ => {}
    }

    let cfg = Config::load();
    init_logging(&cfg);

    let db = db::spawn(cfg.basic.database_url.as_str()).await;
    let http = reqwest::Client::builder().build()?;
    let oauth = OauthEngine::new(db.clone(), http);
    let cooldown = CooldownTracker::new();
    let affinity = AffinityMap::new();
    let router = Router::new(db.clone(), cooldown.clone(), affinity.clone());
    let clients = ProviderClients::new(&cfg);
    let stats = Arc::new(StatsRing::new());

    let cancel = CancellationToken::new();
    background::spawn(db.clone(), oauth.clone(), affinity.clone(), cancel.clone());

    let state = PipelineState {
        db,
        oauth,
        router,
        cooldown,
        stats,
        clients,
        config: Arc::new(cfg.clone()),
    };
    let app = server::build_router(state);

    let addr = SocketAddr::from((cfg.basic.listen_addr, cfg.basic.listen_port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(cancel)).await?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    cancel.cancel();
}
