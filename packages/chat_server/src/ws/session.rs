//! Per-connection task: registers the session, pumps broadcast frames out,
//! relays inbound chat frames, and unregisters on any exit path.

use axum::extract::ws::{Message, WebSocket};
use chat_protocol::{Envelope, RawFrame};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::RelayConfig;
use crate::metrics::ServerMetrics;
use crate::registry::{ConnectionId, ConnectionRegistry};

/// Drive one WebSocket connection until either side goes away.
pub async fn handle_session(
    socket: WebSocket,
    display_name: Option<String>,
    registry: Arc<ConnectionRegistry>,
    relay_config: RelayConfig,
    metrics: Arc<ServerMetrics>,
) {
    let (session, mut outbound) = registry.connect(display_name).await;
    let conn_id = session.id;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task to send broadcast frames to the WebSocket
    let sender_task = async move {
        while let Some(frame) = outbound.recv().await {
            let json = match frame.to_json() {
                Ok(j) => j,
                Err(e) => {
                    error!(conn_id = %conn_id, "Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming frames
    let registry_input = registry.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    handle_text(
                        conn_id,
                        text.as_str(),
                        &registry_input,
                        &relay_config,
                        &metrics,
                    )
                    .await;
                }
                Ok(Message::Binary(_)) => {
                    debug!(conn_id = %conn_id, "Binary frames not supported");
                }
                Ok(Message::Close(_)) => {
                    debug!(conn_id = %conn_id, "Close frame received");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(conn_id = %conn_id, "WebSocket error: {}", e);
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = sender_task => {
            info!(conn_id = %conn_id, "WebSocket sender ended");
        }
        _ = input_task => {
            debug!(conn_id = %conn_id, "WebSocket receiver ended");
        }
    }

    registry.disconnect(conn_id).await;
}

/// Decode one text frame and relay it if it is a chat message.
async fn handle_text(
    conn_id: ConnectionId,
    text: &str,
    registry: &ConnectionRegistry,
    relay_config: &RelayConfig,
    metrics: &ServerMetrics,
) {
    metrics.frame_received();

    let payload = match RawFrame::from_json(text) {
        Ok(frame) => frame.into_payload(),
        Err(e) => {
            metrics.malformed_frame();
            debug!(conn_id = %conn_id, "Ignoring unrecognized frame: {}", e);
            return;
        }
    };

    if relay_config.strict_envelopes && Envelope::from_value(&payload).is_none() {
        metrics.malformed_frame();
        debug!(conn_id = %conn_id, "Dropping malformed envelope (strict mode)");
        return;
    }

    registry.relay(conn_id, payload).await;
}
