//! HTTP front of the sandbox execution service
//!
//! Routes:
//! - `POST /execute` `{"code": "..."}` → `200 {"stdout", "stderr", "image_b64"}`,
//!   `400 {"error": "No code provided"}`, `429` when rate limited
//! - `GET /health` liveness and load
//! - `GET /metrics` Prometheus text format
//!
//! Executor failures never surface as 5xx: they are folded into a `200`
//! whose stderr explains what went wrong, so a caller always receives an
//! `ExecutionOutcome` it can feed to the correction loop.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tracing::{error, info, warn};

use super::config::SandboxConfig;
use super::executor::Executor;
use super::outcome::{CodeArtifact, ExecutionOutcome};
use crate::metrics::{self, SANDBOX_IN_FLIGHT, SANDBOX_REJECTED};
use crate::security::RateLimiter;

/// Shared state of the service
#[derive(Clone)]
pub struct SandboxState {
    pub executor: Arc<dyn Executor>,
    pub limiter: Arc<RateLimiter>,
}

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub in_flight: f64,
    pub rate_limit_tokens: u64,
}

/// Build the router; at most `max_concurrent` executions run at once,
/// further requests wait for a slot
pub fn create_router(state: SandboxState, max_concurrent: usize) -> Router {
    let execute_route = post(execute).layer(ConcurrencyLimitLayer::new(max_concurrent.max(1)));

    Router::new()
        .route("/execute", execute_route)
        .route("/health", get(health))
        .route("/metrics", get(metrics_text))
        .with_state(state)
}

/// Router with a token bucket sized from `config`
pub fn router_from_config(config: &SandboxConfig, executor: Arc<dyn Executor>) -> Router {
    let limiter = Arc::new(RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec));
    create_router(SandboxState { executor, limiter }, config.max_concurrent)
}

/// Serve until Ctrl-C
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "Sandbox service listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
        })
        .await
}

/// The `code` string of a JSON object body; an empty string is valid code
fn code_from_body(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value.get("code")?.as_str().map(str::to_string)
}

async fn execute(State(state): State<SandboxState>, body: Bytes) -> Response {
    if !state.limiter.try_acquire() {
        SANDBOX_REJECTED.with_label_values(&["rate_limited"]).inc();
        let retry_after = state.limiter.retry_after().as_secs().max(1);
        warn!(retry_after, "Rejecting execution: rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after.to_string())],
            Json(json!({ "error": "Rate limit exceeded" })),
        )
            .into_response();
    }

    let Some(code) = code_from_body(&body) else {
        SANDBOX_REJECTED.with_label_values(&["bad_request"]).inc();
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "No code provided" }))).into_response();
    };

    let outcome = match state.executor.execute(&CodeArtifact::new(code)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Executor failed");
            ExecutionOutcome::failure(e.to_string())
        }
    };

    (StatusCode::OK, Json(outcome)).into_response()
}

async fn health(State(state): State<SandboxState>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        in_flight: SANDBOX_IN_FLIGHT.get(),
        rate_limit_tokens: state.limiter.available_tokens(),
    })
}

async fn metrics_text() -> Response {
    match metrics::render() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
