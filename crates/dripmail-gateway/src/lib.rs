// SPDX-FileCopyrightText: 2026 Dripmail Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Serves the unauthenticated `GET /health` endpoint for external
//! orchestration (systemd, container probes). The payload is fed from the
//! shared supervisor state; nothing here can block or mutate the bot.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use dripmail_config::model::GatewayConfig;
use dripmail_core::error::DripmailError;
use dripmail_supervisor::{SupervisorState, SupervisorStatus};

/// Response body for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `healthy` while the supervisor is operating, `unhealthy` once it has
    /// terminally failed. Orchestrators key off this field alone.
    pub status: String,
    /// Fine-grained supervisor state (healthy, degraded, restarting, failed).
    pub state: String,
    /// Seconds since the poll loop last handled an update.
    pub last_response_age_seconds: u64,
    /// Failed probes since the last healthy one.
    pub consecutive_failure_count: u32,
}

/// GET /health
///
/// Answers 200 while the supervisor is operating (healthy, degraded, or
/// mid-restart) and 503 once it has terminally failed.
pub async fn get_health(State(status): State<Arc<SupervisorStatus>>) -> Response {
    let state = status.state();
    let failed = state == SupervisorState::Failed;
    let body = HealthResponse {
        status: if failed { "unhealthy" } else { "healthy" }.to_string(),
        state: state.as_str().to_string(),
        last_response_age_seconds: status.last_response_age_secs(),
        consecutive_failure_count: status.consecutive_failures(),
    };
    let code = if failed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(body)).into_response()
}

pub fn router(status: Arc<SupervisorStatus>) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .with_state(status)
        .layer(CorsLayer::permissive())
}

/// Binds the gateway listener; returns the serve future and the bound
/// address. Serving stops when `shutdown` is cancelled.
pub async fn start_server(
    config: &GatewayConfig,
    status: Arc<SupervisorStatus>,
    shutdown: CancellationToken,
) -> Result<(impl std::future::Future<Output = ()> + use<>, SocketAddr), DripmailError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DripmailError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| DripmailError::Internal(format!("gateway local_addr: {e}")))?;

    info!(addr = %local_addr, "gateway listening");

    let app = router(status);
    let serve = async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "gateway server error");
        }
    };
    Ok((serve, local_addr))
}
