//! Server metrics for observability
//!
//! Counters are bumped by the transport directly and by a background task
//! that follows the multiplexer's lifecycle events.

use serde::{Deserialize, Serialize};
use session_mux::{Multiplexer, MuxEvent, TeardownCause};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::warn;

/// Server-wide metrics
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    /// Currently open WebSocket connections
    pub active_connections: AtomicU64,
    /// Total connections since server start
    pub total_connections: AtomicU64,
    /// Connections refused by the multiplexer
    pub rejected_connections: AtomicU64,

    // Session metrics
    pub sessions_opened: AtomicU64,
    pub sessions_attached: AtomicU64,
    pub closed_by_connection: AtomicU64,
    pub closed_by_surface: AtomicU64,
    pub closed_by_shutdown: AtomicU64,

    // Message metrics
    /// Inbound chunks forwarded to sessions
    pub chunks_received: AtomicU64,
    pub bytes_received: AtomicU64,

    /// Server start time (for uptime calculation)
    start_time: Option<Instant>,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    // Connection tracking
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn chunk_received(&self, bytes: usize) {
        self.chunks_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Fold one lifecycle event into the counters
    pub fn record(&self, event: &MuxEvent) {
        let counter = match event {
            MuxEvent::Opened { .. } => &self.sessions_opened,
            MuxEvent::Attached { .. } => &self.sessions_attached,
            MuxEvent::Closed { cause, .. } => match cause {
                TeardownCause::ConnectionClosed => &self.closed_by_connection,
                TeardownCause::SurfaceClosed => &self.closed_by_surface,
                TeardownCause::Shutdown => &self.closed_by_shutdown,
            },
            MuxEvent::Rejected { .. } => &self.rejected_connections,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    /// Create a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        let closed_by_connection = self.closed_by_connection.load(Ordering::Relaxed);
        let closed_by_surface = self.closed_by_surface.load(Ordering::Relaxed);
        let closed_by_shutdown = self.closed_by_shutdown.load(Ordering::Relaxed);
        let opened = self.sessions_opened.load(Ordering::Relaxed);
        let closed = closed_by_connection + closed_by_surface + closed_by_shutdown;

        MetricsSnapshot {
            uptime_secs: self.uptime_secs(),
            connections: ConnectionMetrics {
                active: self.active_connections.load(Ordering::Relaxed),
                total: self.total_connections.load(Ordering::Relaxed),
                rejected: self.rejected_connections.load(Ordering::Relaxed),
            },
            sessions: SessionMetrics {
                active: opened.saturating_sub(closed),
                opened,
                attached: self.sessions_attached.load(Ordering::Relaxed),
                closed_by_connection,
                closed_by_surface,
                closed_by_shutdown,
            },
            messages: MessageMetrics {
                chunks: self.chunks_received.load(Ordering::Relaxed),
                bytes: self.bytes_received.load(Ordering::Relaxed),
            },
        }
    }
}

/// Follow the multiplexer's lifecycle broadcast until it closes.
pub fn spawn_recorder(
    metrics: Arc<ServerMetrics>,
    mux: &Multiplexer,
) -> tokio::task::JoinHandle<()> {
    let mut events = mux.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => metrics.record(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Metrics recorder lagged by {} lifecycle events", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Serializable snapshot of metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub connections: ConnectionMetrics,
    pub sessions: SessionMetrics,
    pub messages: MessageMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionMetrics {
    pub active: u64,
    pub total: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub active: u64,
    pub opened: u64,
    pub attached: u64,
    pub closed_by_connection: u64,
    pub closed_by_surface: u64,
    pub closed_by_shutdown: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetrics {
    pub chunks: u64,
    pub bytes: u64,
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub sessions: usize,
    pub connections: u64,
    pub uptime_secs: u64,
}
