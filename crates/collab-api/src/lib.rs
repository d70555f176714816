//! # collab-api — Collaboration Workflow Service
//!
//! Axum service for the collaboration negotiation and moderation workflow:
//! parties propose, counter and answer; moderators approve, reject and
//! flag every message before it is delivered. The moderation step is never
//! visible to parties.
//!
//! ## API Surface
//!
//! | Prefix | Module | Audience |
//! |--------|--------|----------|
//! | `/v1/collaborations/*` | [`routes::collaborations`] | Parties |
//! | `/v1/admin/*` | [`routes::admin`] | Moderators |
//! | `/openapi.json` | [`openapi`] | Authenticated clients |
//! | `/health/*`, `/metrics` | this module | Unauthenticated |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! ## Consistency
//!
//! Every state change is a versioned compare-and-swap, enforced by the
//! database when one is configured (see [`db`]) and under the store write
//! locks otherwise (see [`state`]).

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod moderation;
pub mod openapi;
pub mod proposals;
pub mod routes;
pub mod state;
pub mod views;

#[cfg(test)]
mod test_support;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};
use collab_core::Timestamp;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Request bodies above this size are refused.
const MAX_BODY_BYTES: usize = 256 * 1024;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes and `/metrics` are mounted outside the auth middleware
/// so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };

    let api = Router::new()
        .merge(routes::collaborations::router())
        .merge(routes::admin::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(Extension(state.metrics.clone()))
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness))
        .route("/metrics", axum::routing::get(prometheus_metrics))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — 503 when the configured database is unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let _ = state.collaborations.len();
    let _ = state.counters.len();

    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}

/// GET /metrics — Prometheus scrape endpoint.
///
/// Refreshes the per-status gauge from the store (pull model), then
/// encodes every registered metric in the text exposition format.
async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    views::refresh_status_gauge(&state, &Timestamp::now());
    match state.metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("metrics encoding failed: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}
