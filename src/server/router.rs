use axum::{
    extract::Request,
    http::{StatusCode, Version, header::USER_AGENT},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use base64::Engine as _;
use rand::RngCore;
use reqwest::header::{HeaderName, HeaderValue};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::orchestrator::Orchestrator;
use crate::pool::AccountPoolHandle;

use super::auth::accept_any;
use super::routes::{anthropic, gemini, health, openai};

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

/// Shared state threaded into every handler. The orchestrator already owns the pool, refresher
/// and upstream client; `pool` is kept alongside it only because `/healthz` needs an account
/// listing and the orchestrator doesn't otherwise expose one.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub pool: AccountPoolHandle,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, pool: AccountPoolHandle) -> Self {
        Self { orchestrator, pool }
    }
}

async fn not_found_handler() -> StatusCode {
    StatusCode::NOT_FOUND
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

    // For streaming responses this is time-to-first-byte, not full stream duration.
    if status.is_server_error() {
        error!("| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}", status.as_u16(), request_id, method.as_str(), protocol, path, latency_ms, user_agent);
    } else if status.is_client_error() {
        warn!("| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}", status.as_u16(), request_id, method.as_str(), protocol, path, latency_ms, user_agent);
    } else {
        info!("| {:>3} | {} | {:^7} | {:<8} | {} | {}ms | {}", status.as_u16(), request_id, method.as_str(), protocol, path, latency_ms, user_agent);
    }

    resp
}

pub fn build_router(state: AppState) -> Router {
    let openai_routes = Router::new()
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1/models", get(openai::list_models));

    let anthropic_routes = Router::new()
        .route("/v1/messages", post(anthropic::messages))
        .route("/v1/messages/count_tokens", post(anthropic::count_tokens));

    let gemini_routes = Router::new().route("/v1/models/{*rest}", post(gemini::generate_content));

    let health_routes = Router::new().route("/healthz", get(health::healthz));

    Router::new()
        .merge(openai_routes)
        .merge(anthropic_routes)
        .merge(gemini_routes)
        .merge(health_routes)
        .fallback(not_found_handler)
        .layer(middleware::from_fn(accept_any))
        .with_state(state)
        .layer(middleware::from_fn(access_log))
}
