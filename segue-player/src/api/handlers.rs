//! HTTP request handlers

use crate::api::server::AppContext;
use crate::error::IngressError;
use crate::ingress::IngressOutcome;
use crate::playback::PlaybackStatus;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Serialize)]
pub struct IngressResponse {
    outcome: IngressOutcome,
}

type ApiError = (StatusCode, Json<StatusResponse>);

fn engine_stopped() -> ApiError {
    error!("Request failed: playback engine stopped");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(StatusResponse {
            status: "playback engine stopped".to_string(),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "segue-player".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Producer Channel
// ============================================================================

/// POST /ingress - one raw producer message
///
/// 202 with the outcome, 400 for a malformed message.
pub async fn ingest(State(ctx): State<AppContext>, body: String) -> Response {
    match ctx.ingress.handle_raw(&body).await {
        Ok(outcome) => (StatusCode::ACCEPTED, Json(IngressResponse { outcome })).into_response(),
        Err(IngressError::MalformedEvent(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(StatusResponse {
                status: format!("malformed event: {}", reason),
            }),
        )
            .into_response(),
        Err(IngressError::EngineStopped) => engine_stopped().into_response(),
    }
}

/// GET /signals - SSE stream of messages for the producer
pub async fn signal_stream(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.engine.signals().handle_sse_connection()
}

// ============================================================================
// Host Controls
// ============================================================================

/// POST /playback/resume - user gesture, clears AutoplayBlocked
pub async fn resume(State(ctx): State<AppContext>) -> Result<StatusCode, ApiError> {
    info!("Resume requested");
    ctx.engine.resume().map_err(|_| engine_stopped())?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /playback/status
pub async fn status(State(ctx): State<AppContext>) -> Result<Json<PlaybackStatus>, ApiError> {
    let status = ctx.engine.status().await.map_err(|_| engine_stopped())?;
    Ok(Json(status))
}

/// GET /events - SSE stream of player events
pub async fn event_stream(State(ctx): State<AppContext>) -> impl IntoResponse {
    ctx.engine.events().handle_sse_connection()
}
