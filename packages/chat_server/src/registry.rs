//! Connection Registry
//!
//! Tracks every live session and fans chat envelopes out to all of them,
//! the sender included. The map is the only shared state on the server;
//! registration and removal take the write lock, fan-out takes the read lock.

use chat_protocol::RawFrame;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::metrics::ServerMetrics;

/// Opaque identifier assigned to a connection when it registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-side record of one live connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: ConnectionId,
    /// Taken from handshake metadata; fixed for the life of the session.
    pub display_name: Option<String>,
    pub connected_at: DateTime<Utc>,
}

impl Session {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or("anonymous")
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Sessions the frame was queued for
    pub delivered: usize,
    /// Sessions skipped because their outbound queue was full
    pub dropped: usize,
}

struct SessionEntry {
    session: Session,
    outbound: mpsc::Sender<RawFrame>,
}

pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<ConnectionId, SessionEntry>>,
    queue_capacity: usize,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize, metrics: Arc<ServerMetrics>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
            metrics,
        }
    }

    /// Register a new session. Never fails.
    ///
    /// The returned receiver yields every frame broadcast while the session
    /// stays registered; it closes once the session is disconnected.
    pub async fn connect(&self, display_name: Option<String>) -> (Session, mpsc::Receiver<RawFrame>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let session = Session {
            id: ConnectionId::generate(),
            display_name,
            connected_at: Utc::now(),
        };

        let count = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                session.id,
                SessionEntry {
                    session: session.clone(),
                    outbound: tx,
                },
            );
            sessions.len()
        };
        self.metrics.connection_opened();

        info!(conn_id = %session.id, user = session.label(), "a user connected ({} online)", count);
        (session, rx)
    }

    /// Queue `payload` for every registered session, the originator included.
    ///
    /// The payload is relayed exactly as received. A session whose queue is
    /// full misses this one frame; nobody else is affected.
    pub async fn relay(&self, from: ConnectionId, payload: serde_json::Value) -> RelayOutcome {
        let frame = RawFrame::ChatMessage(payload);
        let mut outcome = RelayOutcome::default();

        {
            let sessions = self.sessions.read().await;
            for (id, entry) in sessions.iter() {
                match entry.outbound.try_send(frame.clone()) {
                    Ok(()) => outcome.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        outcome.dropped += 1;
                        warn!(conn_id = %id, from = %from, "outbound queue full, dropping message");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        // Writer already gone; its disconnect is in flight
                        debug!(conn_id = %id, "outbound queue closed, skipping");
                    }
                }
            }
        }

        self.metrics
            .envelope_relayed(outcome.delivered, outcome.dropped);
        debug!(
            from = %from,
            delivered = outcome.delivered,
            dropped = outcome.dropped,
            "relayed chat message"
        );
        outcome
    }

    /// Remove a session. Returns false if it was not registered.
    pub async fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(entry) => {
                self.metrics.connection_closed();
                info!(conn_id = %id, user = entry.session.label(), "user disconnected");
                true
            }
            None => {
                debug!(conn_id = %id, "disconnect for unknown session ignored");
                false
            }
        }
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Snapshot of the currently registered sessions.
    pub async fn sessions(&self) -> Vec<Session> {
        self.sessions
            .read()
            .await
            .values()
            .map(|entry| entry.session.clone())
            .collect()
    }
}
