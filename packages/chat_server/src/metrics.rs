//! Relay counters, kept in-process and served as JSON at `/metrics`.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters shared by every session task.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// Currently registered sessions
    pub active_connections: AtomicU64,
    /// Total sessions registered since server start
    pub total_connections: AtomicU64,
    /// Upgrades refused before a session was created
    pub rejected_handshakes: AtomicU64,

    /// Text frames received from clients
    pub frames_received: AtomicU64,
    /// Frames that could not be relayed (bad JSON, unknown event, strict mode)
    pub malformed_frames: AtomicU64,
    /// Envelopes accepted for fan-out
    pub envelopes_relayed: AtomicU64,
    /// Individual per-session deliveries queued
    pub deliveries: AtomicU64,
    /// Deliveries dropped because a session's queue was full
    pub deliveries_dropped: AtomicU64,

    /// Set by `new`; `Default` leaves uptime at zero
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn handshake_rejected(&self) {
        self.rejected_handshakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn envelope_relayed(&self, delivered: usize, dropped: usize) {
        self.envelopes_relayed.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.deliveries_dropped
            .fetch_add(dropped as u64, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                rejected: self.rejected_handshakes.load(Ordering::Relaxed),
            },
            messages: MessageMetrics {
                received: self.frames_received.load(Ordering::Relaxed),
                malformed: self.malformed_frames.load(Ordering::Relaxed),
                relayed: self.envelopes_relayed.load(Ordering::Relaxed),
                deliveries: self.deliveries.load(Ordering::Relaxed),
                dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            },
        }
    }
}

/// Body of `GET /metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub messages: MessageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub received: u64,
    pub malformed: u64,
    pub relayed: u64,
    pub deliveries: u64,
    pub dropped: u64,
}
