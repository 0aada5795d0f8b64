use session_mux::{
    Connection, ConnectionId, Event, Multiplexer, MuxConfig, SessionId, SessionRegistry, Surface,
    SurfaceFactory, SurfaceSignals,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use tokio::sync::mpsc;

use crate::AppState;
use crate::metrics::ServerMetrics;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Created(SessionId),
    Shown(SessionId, String),
    SurfaceClosed(SessionId),
}

/// Surfaces that attach immediately and report ready right after each show.
pub struct EchoFactory {
    tx: mpsc::UnboundedSender<Recorded>,
}

impl SurfaceFactory for EchoFactory {
    fn create_surface(&self, session_id: SessionId, signals: SurfaceSignals) -> Box<dyn Surface> {
        let _ = self.tx.send(Recorded::Created(session_id));
        signals.attached();
        Box::new(EchoSurface {
            tx: self.tx.clone(),
            signals,
        })
    }
}

struct EchoSurface {
    tx: mpsc::UnboundedSender<Recorded>,
    signals: SurfaceSignals,
}

impl Surface for EchoSurface {
    fn show_next(&mut self, event: Event) {
        let id = self.signals.session_id();
        let _ = self.tx.send(Recorded::Shown(id, event.text().into_owned()));
        self.signals.ready();
    }

    fn close(&mut self) {
        let _ = self.tx.send(Recorded::SurfaceClosed(self.signals.session_id()));
    }
}

pub struct RecordingConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ConnectionId>,
}

impl RecordingConnection {
    pub fn new(id: u64) -> (Self, mpsc::UnboundedReceiver<ConnectionId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ConnectionId(id),
                tx,
            },
            rx,
        )
    }
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn close(&mut self) {
        let _ = self.tx.send(self.id);
    }
}

/// Build an `AppState` whose surfaces report into the returned receiver
/// instead of drawing panels.
pub fn test_app_state() -> (AppState, mpsc::UnboundedReceiver<Recorded>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mux = Multiplexer::new(
        Arc::new(SessionRegistry::new()),
        Arc::new(EchoFactory { tx }),
        MuxConfig::default(),
    );
    let metrics = Arc::new(ServerMetrics::new());
    crate::metrics::spawn_recorder(metrics.clone(), &mux);

    let state = AppState {
        mux,
        metrics,
        next_connection_id: Arc::new(AtomicU64::new(1)),
    };
    (state, rx)
}

/// Serve the full router on an ephemeral port.
pub async fn spawn_test_server() -> (SocketAddr, AppState, mpsc::UnboundedReceiver<Recorded>) {
    let (state, rx) = test_app_state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = crate::build_router(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, state, rx)
}
