use bytes::Bytes;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::error::MuxError;
use crate::event::{ConnectionId, Event, SessionId};
use crate::registry::SessionRegistry;
use crate::session::{PreAttachPolicy, SessionCommand, SessionInfo, TeardownCause};
use crate::surface::{Connection, SurfaceFactory};

/// Multiplexer tunables
#[derive(Clone, Debug, Default)]
pub struct MuxConfig {
    pub pre_attach: PreAttachPolicy,
}

/// Lifecycle notifications for observers (metrics, logs, UIs)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MuxEvent {
    Opened { id: SessionId },
    Attached { id: SessionId },
    Closed { id: SessionId, cause: TeardownCause },
    Rejected { connection: ConnectionId },
}

struct Inner {
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn SurfaceFactory>,
    config: MuxConfig,
    event_tx: broadcast::Sender<MuxEvent>,
}

/// Pairs every accepted connection with a session and a surface, routes
/// inbound data and surface signals to the right session, and tears both
/// sides down together.
///
/// All notification methods are fire-and-forget: they never wait on the
/// session worker, and calls for a session that no longer exists are
/// silently ignored.
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    pub fn new(
        registry: Arc<SessionRegistry>,
        factory: Arc<dyn SurfaceFactory>,
        config: MuxConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                registry,
                factory,
                config,
                event_tx,
            }),
        }
    }

    /// Accept a new connection: register its session, request a surface for
    /// it and start the session worker.
    ///
    /// Must be called from within a tokio runtime. On an identity collision
    /// the connection is closed and `DuplicateSession` is returned.
    pub fn on_accept(&self, mut connection: Box<dyn Connection>) -> Result<SessionId, MuxError> {
        let connection_id = connection.id();
        let session = match self.inner.registry.create(connection_id) {
            Ok(session) => session
                .with_pre_attach(self.inner.config.pre_attach)
                .with_events(self.inner.event_tx.clone()),
            Err(e) => {
                error!("Rejecting connection {}: {}", connection_id, e);
                connection.close();
                self.inner.emit(MuxEvent::Rejected {
                    connection: connection_id,
                });
                return Err(e);
            }
        };

        let id = session.id();
        // Before the factory runs: a surface may attach or close synchronously
        self.inner.emit(MuxEvent::Opened { id });

        let signals = SurfaceSignals {
            session_id: id,
            mux: Arc::downgrade(&self.inner),
        };
        let surface = self.inner.factory.create_surface(id, signals);

        tokio::spawn(session.run(surface, connection));

        info!(session = %id, "Accepted {}", connection_id);
        Ok(id)
    }

    /// The surface for `id` finished constructing.
    pub fn on_surface_attached(&self, id: SessionId) {
        self.inner.on_surface_attached(id);
    }

    /// A chunk arrived on the connection behind `id`.
    pub fn on_inbound_data(&self, id: SessionId, payload: impl Into<Bytes>) {
        match self.inner.registry.lookup(id) {
            Some(session) => session.send(SessionCommand::Inbound(Event::new(payload))),
            None => debug!(session = %id, "Dropping data for unknown session"),
        }
    }

    /// The surface for `id` finished its update cycle.
    pub fn on_surface_ready(&self, id: SessionId) {
        self.inner.on_surface_ready(id);
    }

    pub fn on_connection_closed(&self, id: SessionId) {
        self.inner.teardown(id, TeardownCause::ConnectionClosed);
    }

    pub fn on_surface_closed(&self, id: SessionId) {
        self.inner.teardown(id, TeardownCause::SurfaceClosed);
    }

    /// Tear down every live session, closing both sides of each.
    pub fn shutdown(&self) {
        let ids = self.inner.registry.ids();
        info!("Shutting down {} sessions", ids.len());
        for id in ids {
            self.inner.teardown(id, TeardownCause::Shutdown);
        }
    }

    pub async fn session_info(&self, id: SessionId) -> Result<SessionInfo, MuxError> {
        let session = self
            .inner
            .registry
            .lookup(id)
            .ok_or(MuxError::UnknownSession(id))?;
        session.info().await
    }

    /// Snapshots of all live sessions, ordered by id.
    ///
    /// Sessions torn down while the list is being collected are skipped.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let mut infos = Vec::new();
        for id in self.inner.registry.ids() {
            if let Ok(info) = self.session_info(id).await {
                infos.push(info);
            }
        }
        infos
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.inner.event_tx.subscribe()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }
}

impl Inner {
    fn emit(&self, event: MuxEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    fn on_surface_attached(&self, id: SessionId) {
        match self.registry.lookup(id) {
            Some(session) => session.send(SessionCommand::Attached),
            None => debug!(session = %id, "Ignoring attach for unknown session"),
        }
    }

    fn on_surface_ready(&self, id: SessionId) {
        match self.registry.lookup(id) {
            Some(session) => session.send(SessionCommand::Ready),
            None => debug!(session = %id, "Ignoring ready signal for unknown session"),
        }
    }

    fn teardown(&self, id: SessionId, cause: TeardownCause) {
        match self.registry.remove(id) {
            Some(handle) => {
                handle.close(cause);
                self.emit(MuxEvent::Closed { id, cause });
            }
            None => debug!(session = %id, ?cause, "Session already torn down"),
        }
    }
}

/// Handle given to each surface for reporting back to the multiplexer.
///
/// Holds only a weak reference, so a surface outliving the multiplexer
/// signals into the void instead of keeping it alive.
#[derive(Clone)]
pub struct SurfaceSignals {
    session_id: SessionId,
    mux: Weak<Inner>,
}

impl SurfaceSignals {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// One-time handshake: the surface is constructed and can show events.
    pub fn attached(&self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.on_surface_attached(self.session_id);
        }
    }

    /// The surface finished showing the last event.
    pub fn ready(&self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.on_surface_ready(self.session_id);
        }
    }

    /// The user closed the surface.
    pub fn closed(&self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.teardown(self.session_id, TeardownCause::SurfaceClosed);
        }
    }
}

impl std::fmt::Debug for SurfaceSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceSignals")
            .field("session_id", &self.session_id)
            .finish()
    }
}
