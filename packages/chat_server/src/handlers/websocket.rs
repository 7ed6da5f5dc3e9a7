use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, header},
    response::{IntoResponse, Response},
};
use chat_protocol::HandshakeQuery;
use tracing::warn;

use crate::AppState;
use crate::ws;

/// Upgrade handler for `/ws`.
///
/// Origin and handshake metadata are checked here, before the upgrade, so a
/// refused client is never registered and never sees a broadcast.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok());

    if let Err(rejection) = state.config.origins.check(origin, host) {
        state.metrics.handshake_rejected();
        warn!("Rejected WebSocket handshake: {}", rejection);
        return rejection.into_response();
    }

    let display_name = match ws::resolve_display_name(&query, state.config.require_username) {
        Ok(name) => name,
        Err(rejection) => {
            state.metrics.handshake_rejected();
            warn!("Rejected WebSocket handshake: {}", rejection);
            return rejection.into_response();
        }
    };

    let registry = state.registry.clone();
    let relay_config = state.config.relay.clone();
    let metrics = state.metrics.clone();

    ws.on_upgrade(move |socket| {
        ws::handle_session(socket, display_name, registry, relay_config, metrics)
    })
}
