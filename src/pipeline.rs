//! Request Pipeline (spec §4.I): ingress classification, lazy body parsing,
//! dispatch through the router/retry engine, and upstream fallback
//! forwarding. Grounded on `server/router.rs`'s access-log middleware and
//! `build_client` helper, generalized from three fixed OAuth-specific
//! sub-routers to the single path-classifier chain spec requires.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::cooldown::{self, CooldownTracker};
use crate::db::CredentialActorHandle;
use crate::domain::{Account, ClientProvider, Pool, RouteTag};
use crate::error::ProxyError;
use crate::oauth::OauthEngine;
use crate::providers::common::{self, ForwardRequest};
use crate::providers::{anthropic, antigravity, codex, gemini};
use crate::retry::{self, ForwardOutcome};
use crate::routing::Router;
use crate::stats::{RequestEntry, StatsRing};
use crate::stream::envelope::{self, EnvelopeParams};
use crate::stream::rewrite::rewrite_payload;
use crate::stream::sse::SseDecoder;
use crate::stream::transcoder::{self, ResponsesToChatState};

const THREAD_ID_HEADER: &str = "x-amp-thread-id";

const BROWSER_REDIRECT_PREFIXES: &[&str] = &["/auth", "/threads", "/docs", "/settings"];
const BROWSER_REDIRECT_EXACT: &[&str] = &["/threads.rss", "/news.rss"];
const PASSTHROUGH_SEGMENTS: &[&str] = &[
    "internal",
    "user",
    "auth",
    "meta",
    "ads",
    "telemetry",
    "threads",
    "otel",
    "tab",
    "durable-thread-workers",
];
const PROVIDER_ROUTE_PREFIX: &str = "/api/provider/";

#[derive(Clone)]
pub struct ProviderClients {
    pub anthropic: reqwest::Client,
    pub codex: reqwest::Client,
    pub gemini: reqwest::Client,
    pub antigravity: reqwest::Client,
    pub upstream: reqwest::Client,
}

fn build_client(user_agent: &str, proxy: Option<&url::Url>, enable_multiplexing: bool) -> reqwest::Client {
    let mut headers = HeaderMap::new();
    let mut builder = reqwest::Client::builder()
        .user_agent(user_agent.to_string())
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(10 * 60));

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url.as_str()).expect("invalid proxy url for reqwest client");
        builder = builder.proxy(proxy);
    }

    if enable_multiplexing {
        builder = builder.http2_adaptive_window(true);
    } else {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
        builder = builder.http1_only().pool_max_idle_per_host(0).pool_idle_timeout(Duration::from_secs(0));
    }

    builder.default_headers(headers).build().expect("failed to build reqwest client")
}

impl ProviderClients {
    pub fn new(config: &Config) -> Self {
        let defaults = &config.providers.defaults;
        let mux = defaults.enable_multiplexing;
        Self {
            anthropic: build_client(
                "amprelay-anthropic/0.1",
                config.providers.anthropic.resolved_proxy(defaults),
                mux,
            ),
            codex: build_client("amprelay-codex/0.1", config.providers.codex.resolved_proxy(defaults), mux),
            gemini: build_client("amprelay-gemini/0.1", config.providers.gemini.resolved_proxy(defaults), mux),
            antigravity: build_client(
                "amprelay-antigravity/0.1",
                config.providers.antigravity.resolved_proxy(defaults),
                mux,
            ),
            upstream: build_client("amprelay/0.1", defaults.proxy.as_ref(), mux),
        }
    }
}

#[derive(Clone)]
pub struct PipelineState {
    pub db: CredentialActorHandle,
    pub oauth: OauthEngine,
    pub router: Router,
    pub cooldown: CooldownTracker,
    pub stats: Arc<StatsRing>,
    pub clients: ProviderClients,
    pub config: Arc<Config>,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    service: &'static str,
    port: u16,
    upstream: String,
    providers: ProviderReadiness,
    stats: crate::stats::StatsSnapshot,
}

#[derive(Serialize)]
struct ProviderReadiness {
    anthropic: bool,
    codex: bool,
    google: bool,
}

/// Top-level fallback handler: every request lands here and is classified
/// in order (spec §4.I). Using a single fallback rather than axum route
/// matching mirrors the spec's sequential classifier chain, which is keyed
/// on dynamic path prefixes rather than a fixed route table.
pub async fn handle(State(state): State<PipelineState>, req: Request) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = if method == Method::GET && (path == "/" || path == "/status") {
        health(&state).await
    } else if let Some(dest) = browser_redirect_target(&path) {
        {
            let location = format!("{}{}", state.config.basic.upstream_base, dest);
            let mut resp = StatusCode::FOUND.into_response();
            if let Ok(value) = axum::http::HeaderValue::from_str(&location) {
                resp.headers_mut().insert(axum::http::header::LOCATION, value);
            }
            resp
        }
    } else if passes_through(&path) {
        forward_upstream(&state, req).await
    } else if let Some((provider, sub_path)) = parse_provider_route(&path) {
        handle_provider_route(&state, provider, sub_path, req, start).await
    } else {
        forward_upstream(&state, req).await
    };

    response
}

async fn health(state: &PipelineState) -> Response {
    let body = HealthBody {
        status: "ok",
        service: "amprelay",
        port: state.config.basic.listen_port,
        upstream: state.config.basic.upstream_base.clone(),
        providers: ProviderReadiness {
            anthropic: state.oauth.ready(Pool::Anthropic).await,
            codex: state.oauth.ready(Pool::Codex).await,
            google: state.oauth.ready(Pool::Gemini).await || state.oauth.ready(Pool::Antigravity).await,
        },
        stats: state.stats.snapshot(),
    };
    axum::Json(body).into_response()
}

fn browser_redirect_target(path: &str) -> Option<&str> {
    if BROWSER_REDIRECT_EXACT.contains(&path) {
        return Some(path);
    }
    if BROWSER_REDIRECT_PREFIXES.iter().any(|p| path == *p || path.starts_with(&format!("{p}/"))) {
        return Some(path);
    }
    None
}

fn passes_through(path: &str) -> bool {
    let Some(rest) = path.strip_prefix("/api/") else { return false };
    let segment = rest.split('/').next().unwrap_or("");
    PASSTHROUGH_SEGMENTS.contains(&segment)
}

fn parse_provider_route(path: &str) -> Option<(ClientProvider, &str)> {
    let rest = path.strip_prefix(PROVIDER_ROUTE_PREFIX)?;
    let (segment, sub_path) = rest.split_once('/').unwrap_or((rest, ""));
    let provider = ClientProvider::from_path_segment(segment)?;
    Some((provider, sub_path))
}

/// Extract `ampModel` from the JSON `model` field, falling back to the URL
/// pattern `models/([^/:]+)` that Gemini/Antigravity paths carry instead of
/// a JSON body field.
fn extract_amp_model(body_json: Option<&Value>, sub_path: &str) -> Option<String> {
    if let Some(model) = body_json.and_then(|v| v.get("model")).and_then(Value::as_str) {
        return Some(model.to_string());
    }
    let after = sub_path.split("models/").nth(1)?;
    let end = after.find(|c| c == ':' || c == '/').unwrap_or(after.len());
    let model = &after[..end];
    (!model.is_empty()).then(|| model.to_string())
}

async fn handle_provider_route(
    state: &PipelineState,
    provider: ClientProvider,
    sub_path: &str,
    req: Request,
    start: Instant,
) -> Response {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let thread_id = headers
        .get(THREAD_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let raw_body: Bytes = if method == Method::POST {
        match axum::body::to_bytes(req.into_body(), 32 * 1024 * 1024).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to buffer request body");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }
    } else {
        Bytes::new()
    };

    let body_json: Option<Value> = (!raw_body.is_empty()).then(|| serde_json::from_slice(&raw_body).ok()).flatten();
    let amp_model = extract_amp_model(body_json.as_ref(), sub_path);
    let requested_stream = body_json.as_ref().and_then(|v| v.get("stream")).and_then(Value::as_bool).unwrap_or(false);

    let route = state.router.route(provider, thread_id.as_deref()).await;

    let Some(pool) = route.pool else {
        info!(decision = %route.decision, provider = %provider, "routing to upstream fallback");
        let response = forward_upstream_raw(state, method, sub_path, headers, raw_body).await;
        record_stats(state, route.decision, &response, start);
        return response;
    };

    info!(decision = %route.decision, pool = %pool, account = route.account, provider = %provider, "routed locally");

    let cancel = CancellationToken::new();
    let forward = |pool: Pool, account: Account| {
        forward_to_pool(
            state,
            pool,
            account,
            sub_path,
            &raw_body,
            &headers,
            amp_model.as_deref(),
            thread_id.as_deref(),
            requested_stream,
        )
    };

    let outcome = retry::run(
        &state.router,
        &state.cooldown,
        provider,
        thread_id.as_deref(),
        pool,
        route.account.expect("pool implies account"),
        &cancel,
        forward,
    )
    .await;

    let response = match outcome {
        Ok(Some(resp)) => resp,
        Ok(None) => {
            info!(provider = %provider, "local options exhausted, falling back to upstream");
            forward_upstream_raw(state, method, sub_path, headers, raw_body).await
        }
        Err(e) => {
            error!(error = %e, "provider forward failed");
            e.into_response()
        }
    };

    record_stats(state, route.decision, &response, start);
    response
}

fn record_stats(state: &PipelineState, route: RouteTag, response: &Response, start: Instant) {
    state.stats.record(RequestEntry {
        route,
        status: response.status().as_u16(),
        duration_ms: start.elapsed().as_millis() as u64,
    });
}

#[allow(clippy::too_many_arguments)]
async fn forward_to_pool(
    state: &PipelineState,
    pool: Pool,
    account: Account,
    sub_path: &str,
    raw_body: &Bytes,
    client_headers: &HeaderMap,
    amp_model: Option<&str>,
    thread_id: Option<&str>,
    requested_stream: bool,
) -> Result<ForwardOutcome, ProxyError> {
    let Some(access_token) = state.oauth.token(pool, account).await? else {
        return Ok(ForwardOutcome::Unauthorized);
    };

    match pool {
        Pool::Anthropic => {
            forward_anthropic(state, &access_token, raw_body, client_headers, amp_model, requested_stream).await
        }
        Pool::Codex => forward_codex(state, pool, account, &access_token, raw_body, thread_id, requested_stream).await,
        Pool::Gemini | Pool::Antigravity => {
            forward_google(state, pool, account, &access_token, sub_path, raw_body, requested_stream).await
        }
    }
}

async fn forward_anthropic(
    state: &PipelineState,
    access_token: &str,
    raw_body: &Bytes,
    client_headers: &HeaderMap,
    amp_model: Option<&str>,
    requested_stream: bool,
) -> Result<ForwardOutcome, ProxyError> {
    let client_beta = client_headers.get("anthropic-beta").and_then(|v| v.to_str().ok());
    let headers = anthropic::build_headers(access_token, client_beta);
    let url = url::Url::parse(&anthropic::base_url("/v1/messages"))?;

    let resp = common::forward(ForwardRequest { client: &state.clients.anthropic, url, headers, body: raw_body.to_vec() }).await?;
    let status = resp.status();

    if let Some(outcome) = classify_error_status(status, &resp).await {
        return Ok(outcome);
    }

    let model = amp_model.unwrap_or_default().to_string();
    if requested_stream || is_event_stream(&resp) {
        Ok(ForwardOutcome::Success(sse_response(resp, StreamTransform::AnthropicRewrite { model })))
    } else {
        let bytes = resp.bytes().await?;
        let rewritten = rewrite_payload(&String::from_utf8_lossy(&bytes), &model);
        Ok(ForwardOutcome::Success(Response::new(Body::from(rewritten))))
    }
}

async fn forward_codex(
    state: &PipelineState,
    pool: Pool,
    account: Account,
    access_token: &str,
    raw_body: &Bytes,
    thread_id: Option<&str>,
    requested_stream: bool,
) -> Result<ForwardOutcome, ProxyError> {
    let chat: amprelay_schema::ChatCompletionsRequest = serde_json::from_slice(raw_body)?;
    let client_model = chat.model.clone();
    let chatgpt_account_id = state
        .db
        .get(pool, account)
        .await?
        .and_then(|c| c.account_id)
        .unwrap_or_default();

    let responses_body = amprelay_schema::build_responses_request(chat, thread_id.map(str::to_string));
    let body = serde_json::to_vec(&responses_body)?;
    let headers = codex::build_headers(access_token, &chatgpt_account_id, thread_id);
    let url = url::Url::parse(&codex::responses_url())?;

    let resp = common::forward(ForwardRequest { client: &state.clients.codex, url, headers, body }).await?;
    let status = resp.status();
    if let Some(outcome) = classify_error_status(status, &resp).await {
        return Ok(outcome);
    }

    let _ = requested_stream; // Codex always streams upstream; the client sees a re-shaped SSE either way.
    let created = crate::clock::now_ms() / 1000;
    Ok(ForwardOutcome::Success(sse_response(
        resp,
        StreamTransform::CodexTranscode(Box::new(ResponsesToChatState::new(&client_model, created))),
    )))
}

async fn forward_google(
    state: &PipelineState,
    pool: Pool,
    account: Account,
    access_token: &str,
    sub_path: &str,
    raw_body: &Bytes,
    requested_stream: bool,
) -> Result<ForwardOutcome, ProxyError> {
    let Some(parsed) = gemini::parse_path(sub_path) else {
        return Ok(ForwardOutcome::Unauthorized);
    };
    let stream = requested_stream || parsed.action.starts_with("stream");

    let project_id = state.db.get(pool, account).await?.and_then(|c| c.project_id).unwrap_or_default();
    let inner: Value = serde_json::from_slice(raw_body).unwrap_or(Value::Null);

    let (client, url, envelope_params, request_type): (&reqwest::Client, String, EnvelopeParams, Option<&str>) = match pool
    {
        Pool::Gemini => (&state.clients.gemini, gemini::build_url(&parsed.action, stream), gemini::envelope_params(), None),
        Pool::Antigravity => {
            return forward_antigravity(state, &project_id, &parsed.model, &parsed.action, access_token, inner, stream)
                .await;
        }
        Pool::Anthropic | Pool::Codex => unreachable!("google pools only"),
    };

    let wrapped = envelope::wrap(inner, &project_id, &parsed.model, request_type, envelope_params, crate::clock::now_ms());
    let body = serde_json::to_vec(&wrapped)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("bearer token is valid ascii"),
    );
    headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let resp = common::forward(ForwardRequest { client, url: url::Url::parse(&url)?, headers, body }).await?;
    let status = resp.status();
    if let Some(outcome) = classify_error_status(status, &resp).await {
        return Ok(outcome);
    }

    Ok(ForwardOutcome::Success(sse_response(resp, StreamTransform::GeminiUnwrap)))
}

#[allow(clippy::too_many_arguments)]
async fn forward_antigravity(
    state: &PipelineState,
    project_id: &str,
    model: &str,
    action: &str,
    access_token: &str,
    inner: Value,
    stream: bool,
) -> Result<ForwardOutcome, ProxyError> {
    let wrapped = envelope::wrap(inner, project_id, model, Some("agent"), antigravity::envelope_params(), crate::clock::now_ms());
    let body = serde_json::to_vec(&wrapped)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {access_token}")).expect("bearer token is valid ascii"),
    );
    headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let mut last_status = None;
    for endpoint in antigravity::ENDPOINT_CASCADE {
        let url = antigravity::build_url(endpoint, action, stream);
        let outcome = state.clients.antigravity.post(&url).headers(headers.clone()).body(body.clone()).send().await;

        match outcome {
            Ok(resp) if antigravity::should_advance_to_next_endpoint(Some(resp.status()), false) => {
                last_status = Some(resp.status());
                continue;
            }
            Ok(resp) => {
                let status = resp.status();
                if let Some(outcome) = classify_error_status(status, &resp).await {
                    return Ok(outcome);
                }
                return Ok(ForwardOutcome::Success(sse_response(resp, StreamTransform::GeminiUnwrap)));
            }
            Err(e) if antigravity::should_advance_to_next_endpoint(e.status(), e.is_connect()) => {
                warn!(endpoint, error = %e, "antigravity endpoint unreachable, advancing cascade");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(?last_status, "antigravity endpoint cascade exhausted");
    Err(ProxyError::UpstreamStatus(StatusCode::BAD_GATEWAY))
}

/// 401/403/429 short-circuit before the body is consumed for streaming.
async fn classify_error_status(status: reqwest::StatusCode, resp: &reqwest::Response) -> Option<ForwardOutcome> {
    match status.as_u16() {
        401 => Some(ForwardOutcome::Unauthorized),
        403 => Some(ForwardOutcome::Forbidden),
        429 => {
            let retry_after_s = resp.headers().get(reqwest::header::RETRY_AFTER).and_then(|v| v.to_str().ok()).and_then(cooldown::parse_retry_after);
            Some(ForwardOutcome::RateLimited { retry_after_s })
        }
        _ => None,
    }
}

fn is_event_stream(resp: &reqwest::Response) -> bool {
    resp.headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"))
}

enum StreamTransform {
    AnthropicRewrite { model: String },
    GeminiUnwrap,
    CodexTranscode(Box<ResponsesToChatState>),
}

/// Re-shape an upstream SSE response into a client-facing `axum::body::Body`,
/// forwarding rate-limit headers bit-exact (spec §4.H).
fn sse_response(resp: reqwest::Response, transform: StreamTransform) -> Response {
    let mut forwarded = HeaderMap::new();
    common::copy_forwarded_headers(resp.headers(), &mut forwarded);

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Bytes, std::io::Error>>(32);
    tokio::spawn(async move {
        let mut decoder = SseDecoder::new();
        let mut transform = transform;
        let mut byte_stream = resp.bytes_stream();

        while let Some(item) = byte_stream.next().await {
            let bytes = match item {
                Ok(b) => b,
                Err(e) => {
                    let _ = tx.send(Err(std::io::Error::other(e))).await;
                    return;
                }
            };
            for chunk in decoder.push(&bytes) {
                if let Some(encoded) = apply_transform(&mut transform, chunk) {
                    if tx.send(Ok(Bytes::from(encoded))).await.is_err() {
                        return;
                    }
                }
            }
        }
        for chunk in decoder.finish() {
            if let Some(encoded) = apply_transform(&mut transform, chunk) {
                if tx.send(Ok(Bytes::from(encoded))).await.is_err() {
                    return;
                }
            }
        }
        if let StreamTransform::CodexTranscode(_) = &transform {
            let _ = tx.send(Ok(Bytes::from(transcoder::render_sse_line(None)))).await;
        }
    });

    let mut response = Response::new(Body::from_stream(ReceiverStream::new(rx)));
    response.headers_mut().insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response.headers_mut().insert(reqwest::header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response.headers_mut().insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response.headers_mut().extend(forwarded);
    response
}

fn apply_transform(transform: &mut StreamTransform, chunk: crate::stream::sse::Chunk) -> Option<String> {
    match transform {
        StreamTransform::AnthropicRewrite { model } => {
            if chunk.data == "[DONE]" {
                return Some(crate::stream::sse::encode(&chunk));
            }
            let rewritten = rewrite_payload(&chunk.data, model);
            Some(crate::stream::sse::encode(&crate::stream::sse::Chunk { data: rewritten, ..chunk }))
        }
        StreamTransform::GeminiUnwrap => {
            let inner = envelope::unwrap(&chunk.data)?;
            Some(crate::stream::sse::encode(&crate::stream::sse::Chunk { data: inner, ..chunk }))
        }
        StreamTransform::CodexTranscode(state) => {
            let event = chunk.event.as_deref().unwrap_or_default();
            let data: Value = serde_json::from_str(&chunk.data).ok()?;
            let emitted = state.handle_event(event, &data);
            if emitted.is_empty() {
                return None;
            }
            Some(emitted.iter().map(|v| transcoder::render_sse_line(Some(v))).collect::<String>())
        }
    }
}

async fn forward_upstream(state: &PipelineState, req: Request) -> Response {
    let method = req.method().clone();
    let path_and_query = req.uri().path_and_query().map(ToString::to_string).unwrap_or_default();
    let headers = req.headers().clone();
    let body = match axum::body::to_bytes(req.into_body(), 32 * 1024 * 1024).await {
        Ok(b) => b,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    forward_upstream_raw(state, method, &path_and_query, headers, body).await
}

/// Fallback forwarding to the paid upstream gateway (spec §4.I): rewrite the
/// URL, attach the configured amp key, strip `Content-Encoding`/
/// `Content-Length`, and stream the body through with no redirect following
/// (the upstream client is built with `redirect::Policy::none()`).
async fn forward_upstream_raw(state: &PipelineState, method: Method, path: &str, mut headers: HeaderMap, body: Bytes) -> Response {
    let Ok(url) = url::Url::parse(&format!("{}{}", state.config.basic.upstream_base, path)) else {
        return StatusCode::BAD_GATEWAY.into_response();
    };

    if let Some(key) = &state.config.basic.amp_key {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
    }
    headers.remove(reqwest::header::HOST);

    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes()).unwrap_or(reqwest::Method::GET);
    let result = state
        .clients
        .upstream
        .request(reqwest_method, url)
        .headers(headers)
        .body(body.to_vec())
        .send()
        .await;

    let Ok(resp) = result else {
        return StatusCode::BAD_GATEWAY.into_response();
    };

    let status = StatusCode::from_u16(resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = resp.headers().clone();
    response_headers.remove(reqwest::header::CONTENT_ENCODING);
    response_headers.remove(reqwest::header::CONTENT_LENGTH);

    let stream = resp.bytes_stream().map(|r| r.map_err(std::io::Error::other));
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    response.headers_mut().extend(response_headers);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browser_redirect_matches_prefixes_and_exact_paths() {
        assert_eq!(browser_redirect_target("/auth/callback"), Some("/auth/callback"));
        assert_eq!(browser_redirect_target("/threads"), Some("/threads"));
        assert_eq!(browser_redirect_target("/threads.rss"), Some("/threads.rss"));
        assert_eq!(browser_redirect_target("/api/provider/anthropic/v1/messages"), None);
    }

    #[test]
    fn passthrough_segments_require_api_prefix() {
        assert!(passes_through("/api/internal/whoami"));
        assert!(passes_through("/api/threads/123/events"));
        assert!(!passes_through("/api/provider/openai/v1/responses"));
        assert!(!passes_through("/internal/whoami"));
    }

    #[test]
    fn provider_route_splits_segment_from_sub_path() {
        let (provider, sub_path) = parse_provider_route("/api/provider/google/v1beta/models/gemini-2.5-pro:streamGenerateContent").unwrap();
        assert_eq!(provider, ClientProvider::Google);
        assert_eq!(sub_path, "v1beta/models/gemini-2.5-pro:streamGenerateContent");
        assert!(parse_provider_route("/api/provider/unknown/x").is_none());
        assert!(parse_provider_route("/api/internal/whoami").is_none());
    }

    #[test]
    fn amp_model_prefers_json_body_over_url() {
        let body = json!({"model": "claude-opus-4"});
        assert_eq!(extract_amp_model(Some(&body), "v1/models/ignored:generate"), Some("claude-opus-4".to_string()));
    }

    #[test]
    fn amp_model_falls_back_to_url_pattern() {
        let sub_path = "v1beta/models/gemini-2.5-pro:streamGenerateContent";
        assert_eq!(extract_amp_model(None, sub_path), Some("gemini-2.5-pro".to_string()));

        let sub_path_slash = "v1beta/models/gemini-2.5-pro/other";
        assert_eq!(extract_amp_model(None, sub_path_slash), Some("gemini-2.5-pro".to_string()));
    }

    #[test]
    fn amp_model_absent_when_neither_source_has_it() {
        assert_eq!(extract_amp_model(None, "v1/responses"), None);
    }
}
