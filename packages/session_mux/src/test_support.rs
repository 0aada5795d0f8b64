//! In-memory surfaces and connections that record what the core asks of them.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::event::{ConnectionId, Event, SessionId};
use crate::multiplexer::SurfaceSignals;
use crate::surface::{Connection, Surface, SurfaceFactory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Recorded {
    Created(SessionId),
    Shown(SessionId, String),
    SurfaceClosed(SessionId),
    /// The worker released the surface; nothing can follow for this session
    Dropped(SessionId),
}

pub(crate) struct RecordingFactory {
    tx: mpsc::UnboundedSender<Recorded>,
    echo: bool,
    signals: Mutex<HashMap<SessionId, SurfaceSignals>>,
}

impl RecordingFactory {
    /// Surfaces that only record; tests drive attach/ready by hand.
    pub(crate) fn manual() -> (Self, mpsc::UnboundedReceiver<Recorded>) {
        Self::build(false)
    }

    /// Surfaces that attach on creation and signal ready right after each show.
    pub(crate) fn echo() -> (Self, mpsc::UnboundedReceiver<Recorded>) {
        Self::build(true)
    }

    fn build(echo: bool) -> (Self, mpsc::UnboundedReceiver<Recorded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let factory = Self {
            tx,
            echo,
            signals: Mutex::new(HashMap::new()),
        };
        (factory, rx)
    }

    pub(crate) fn signals(&self, id: SessionId) -> Option<SurfaceSignals> {
        self.signals.lock().unwrap().get(&id).cloned()
    }
}

impl SurfaceFactory for RecordingFactory {
    fn create_surface(&self, session_id: SessionId, signals: SurfaceSignals) -> Box<dyn Surface> {
        let _ = self.tx.send(Recorded::Created(session_id));
        self.signals
            .lock()
            .unwrap()
            .insert(session_id, signals.clone());
        if self.echo {
            signals.attached();
        }
        Box::new(RecordingSurface {
            id: session_id,
            tx: self.tx.clone(),
            echo: self.echo.then_some(signals),
        })
    }
}

struct RecordingSurface {
    id: SessionId,
    tx: mpsc::UnboundedSender<Recorded>,
    echo: Option<SurfaceSignals>,
}

impl Surface for RecordingSurface {
    fn show_next(&mut self, event: Event) {
        let _ = self
            .tx
            .send(Recorded::Shown(self.id, event.text().into_owned()));
        if let Some(signals) = &self.echo {
            signals.ready();
        }
    }

    fn close(&mut self) {
        let _ = self.tx.send(Recorded::SurfaceClosed(self.id));
    }
}

impl Drop for RecordingSurface {
    fn drop(&mut self) {
        let _ = self.tx.send(Recorded::Dropped(self.id));
    }
}

/// Connection whose `close` calls are reported on a private channel.
///
/// The channel ends when the connection is dropped.
pub(crate) struct RecordingConnection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<ConnectionId>,
}

impl RecordingConnection {
    pub(crate) fn new(id: u64) -> (Self, mpsc::UnboundedReceiver<ConnectionId>) {
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
