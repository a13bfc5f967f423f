//! HTTP server setup and routing

use crate::error::{Error, Result};
use crate::ingress::EventIngress;
use crate::playback::EngineHandle;
use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub engine: EngineHandle,
    pub ingress: EventIngress,
}

impl AppContext {
    pub fn new(engine: EngineHandle) -> Self {
        let ingress = engine.ingress();
        Self { engine, ingress }
    }
}

/// Router with every endpoint attached
pub fn build_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Producer event channel
        .route("/ingress", post(super::handlers::ingest))
        .route("/signals", get(super::handlers::signal_stream))

        // Host controls
        .route("/playback/resume", post(super::handlers::resume))
        .route("/playback/status", get(super::handlers::status))
        .route("/events", get(super::handlers::event_stream))

        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Serve the API until `shutdown` resolves
pub async fn run<S>(port: u16, ctx: AppContext, shutdown: S) -> Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let app = build_router(ctx);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("HTTP server stopped");
    Ok(())
}
