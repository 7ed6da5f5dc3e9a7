//! Relay Chat server
//!
//! A single-room relay: every chat frame received on `/ws` is re-sent to
//! every connected socket, sender included. Nothing is stored.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod registry;
pub mod views;
pub mod ws;

use anyhow::{Context, Result};
use axum::{Router, http::HeaderValue, routing::get};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::metrics::ServerMetrics;
use crate::registry::ConnectionRegistry;

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub config: Arc<ServerConfig>,
    /// Server metrics for observability
    pub metrics: Arc<ServerMetrics>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let metrics = Arc::new(ServerMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new(
            config.relay.session_queue_capacity,
            metrics.clone(),
        ));
        Self {
            registry,
            config: Arc::new(config),
            metrics,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ServerConfig::default())
    }
}

/// CORS for the plain HTTP surface, limited to the configured origins.
fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.origins.allows_any() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .origins
        .origins()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring unusable origin in allow-list: {}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(views::index_page))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route(chat_protocol::WS_PATH, get(handlers::websocket_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(cors)
        .with_state(state)
}

/// Serve the relay on an already-bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: tokio::net::TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let metrics = state.metrics.clone();
    let app = build_router(state);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error");

    let snapshot = metrics.snapshot();
    info!(
        "Relay stopped after {}s: {} connections, {} messages relayed, {} deliveries dropped",
        snapshot.uptime_secs,
        snapshot.connections.total,
        snapshot.messages.relayed,
        snapshot.messages.dropped
    );
    result
}
