//! HTTP server wiring (spec §4.I, §6): the single fallback route plus the
//! access-log middleware, adapted from `server/router.rs`'s `pollux_router`.
//! No auth guard layer — spec §6 states "no custom client authentication".

use std::time::Instant;

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderName, Version, header::USER_AGENT};
use axum::middleware::{self, Next};
use axum::response::Response;
use base64::Engine as _;
use rand::RngCore;
use reqwest::header::HeaderValue;
use tracing::{error, info, warn};

use crate::pipeline::{self, PipelineState};

const MAX_REQUEST_ID_LEN: usize = 128;
const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

fn generate_request_id() -> String {
    let mut bytes = [0u8; 12];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn format_http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP/?",
    }
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let request_id = req
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);

    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();

    let start = Instant::now();
    let mut resp = next.run(req).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        resp.headers_mut().insert(X_REQUEST_ID, value);
    }

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;
    let path = uri.path();
    let protocol = format_http_version(version);

    // For SSE/streaming responses, latency_ms is time-to-first-byte, not the
    // full stream duration.
    if status.is_server_error() {
        error!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(), request_id, method.as_str(), protocol, path, latency_ms, user_agent
        );
    } else if status.is_client_error() {
        warn!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(), request_id, method.as_str(), protocol, path, latency_ms, user_agent
        );
    } else {
        info!(
            "| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}",
            status.as_u16(), request_id, method.as_str(), protocol, path, latency_ms, user_agent
        );
    }

    resp
}

pub fn build_router(state: PipelineState) -> Router {
    Router::new()
        .fallback(pipeline::handle)
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
