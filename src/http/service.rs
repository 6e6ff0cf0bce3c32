//! Request handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing::{debug, instrument, warn};

use super::identity::client_key;
use crate::ratelimit::{LimiterRegistry, Quota};

/// Header carrying the configured limit.
pub const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Header carrying the quota left in the current window.
pub const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Per-client counters
    pub registry: Arc<LimiterRegistry>,
    /// Quota applied to every client
    pub quota: Quota,
}

impl AppState {
    /// Create handler state around a registry.
    pub fn new(registry: Arc<LimiterRegistry>, quota: Quota) -> Self {
        Self { registry, quota }
    }
}

/// Build the router: `/health` is exempt, everything else is counted.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .fallback(admit_handler)
        .with_state(state)
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Admit or reject the request based on its client's recent history.
#[instrument(
    skip(state, request),
    fields(method = %request.method(), path = %request.uri().path())
)]
async fn admit_handler(State(state): State<AppState>, request: Request) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);

    let Some(key) = client_key(request.headers(), peer) else {
        warn!("Unable to determine client address");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to determine client address",
        )
            .into_response();
    };

    let quota = state.quota;
    let admission = state.registry.admit(&key, quota.limit, quota.window);

    debug!(
        client = %key,
        count = admission.count,
        admitted = admission.admitted,
        "Admission decision made"
    );

    let headers = [
        (LIMIT_HEADER, quota.limit.to_string()),
        (REMAINING_HEADER, admission.remaining(quota.limit).to_string()),
    ];

    if admission.admitted {
        (
            StatusCode::OK,
            headers,
            format!("Current request: {}", admission.count),
        )
            .into_response()
    } else {
        (StatusCode::TOO_MANY_REQUESTS, headers, "Rate limit exceeded").into_response()
    }
}
