use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

use crate::error::MuxError;
use crate::event::{Event, SessionId};
use crate::multiplexer::MuxEvent;
use crate::scheduler::{DeliveryScheduler, DeliveryState};
use crate::surface::{Connection, Surface};

/// What to do with events that arrive before the surface has attached
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreAttachPolicy {
    /// Queue them and deliver once the surface attaches
    #[default]
    Buffer,
    /// Discard them
    Drop,
}

/// Why a session ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownCause {
    /// The connection went away; the surface gets closed
    ConnectionClosed,
    /// The user closed the surface; the connection gets closed
    SurfaceClosed,
    /// The multiplexer is shutting down; both sides get closed
    Shutdown,
}

/// Point-in-time view of a session's delivery state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub attached: bool,
    pub state: DeliveryState,
    pub pending: usize,
    pub delivered: u64,
    pub high_water: usize,
    /// Events discarded because they arrived before the surface attached
    pub dropped_before_attach: u64,
    pub created_at: DateTime<Utc>,
}

/// Messages processed by a session worker, in arrival order
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Inbound(Event),
    Attached,
    Ready,
    GetInfo {
        respond_to: oneshot::Sender<SessionInfo>,
    },
}

/// Cloneable, fire-and-forget sender into a session worker
#[derive(Clone, Debug)]
pub(crate) struct SessionSender {
    id: SessionId,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionSender {
    pub(crate) fn send(&self, command: SessionCommand) {
        // The worker may already be gone after a racing teardown
        if self.commands.send(command).is_err() {
            debug!(session = %self.id, "Session worker gone, dropping command");
        }
    }

    pub(crate) async fn info(&self) -> Result<SessionInfo, MuxError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand::GetInfo { respond_to: tx })
            .map_err(|_| MuxError::UnknownSession(self.id))?;
        rx.await.map_err(|_| MuxError::UnknownSession(self.id))
    }
}

/// Registry-owned half of a session: the way in, and the way to end it
#[derive(Debug)]
pub struct SessionHandle {
    sender: SessionSender,
    shutdown: oneshot::Sender<TeardownCause>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.sender.id
    }

    pub(crate) fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// Stop the worker; anything still pending is discarded.
    pub fn close(self, cause: TeardownCause) {
        if self.shutdown.send(cause).is_err() {
            debug!(session = %self.sender.id, "Session worker already stopped");
        }
    }
}

/// A freshly created session, not yet bound to its surface and connection.
///
/// Owns the delivery state; once [`Session::run`] is spawned, that state is
/// touched only by the worker task.
pub struct Session {
    id: SessionId,
    scheduler: DeliveryScheduler,
    pre_attach: PreAttachPolicy,
    attached: bool,
    dropped_before_attach: u64,
    created_at: DateTime<Utc>,
    events: Option<broadcast::Sender<MuxEvent>>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    shutdown: oneshot::Receiver<TeardownCause>,
}

enum Step {
    Command(SessionCommand),
    Teardown(TeardownCause),
}

impl Session {
    pub(crate) fn new(id: SessionId) -> (Self, SessionHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let session = Self {
            id,
            scheduler: DeliveryScheduler::new(),
            pre_attach: PreAttachPolicy::default(),
            attached: false,
            dropped_before_attach: 0,
            created_at: Utc::now(),
            events: None,
            commands: command_rx,
            shutdown: shutdown_rx,
        };
        let handle = SessionHandle {
            sender: SessionSender {
                id,
                commands: command_tx,
            },
            shutdown: shutdown_tx,
        };
        (session, handle)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn with_pre_attach(mut self, policy: PreAttachPolicy) -> Self {
        self.pre_attach = policy;
        self
    }

    /// Announce the first surface handshake on the multiplexer's lifecycle channel.
    pub(crate) fn with_events(mut self, events: broadcast::Sender<MuxEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> DeliveryState {
        self.scheduler.state()
    }

    pub fn pending_len(&self) -> usize {
        self.scheduler.pending_len()
    }

    /// Drive the session until teardown.
    ///
    /// Arrivals and ready signals are applied strictly in the order they were
    /// sent. A teardown request overtakes queued commands.
    pub async fn run(mut self, mut surface: Box<dyn Surface>, mut connection: Box<dyn Connection>) {
        debug!(session = %self.id, "Session worker started");

        let cause = loop {
            let step = tokio::select! {
                biased;
                cause = &mut self.shutdown => {
                    Step::Teardown(cause.unwrap_or(TeardownCause::Shutdown))
                }
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Teardown(TeardownCause::Shutdown),
                },
            };

            match step {
                Step::Command(command) => self.handle(command, surface.as_mut()),
                Step::Teardown(cause) => break cause,
            }
        };

        let discarded = self.scheduler.discard();
        match cause {
            TeardownCause::ConnectionClosed => surface.close(),
            TeardownCause::SurfaceClosed => connection.close(),
            TeardownCause::Shutdown => {
                surface.close();
                connection.close();
            }
        }

        info!(
            session = %self.id,
            ?cause,
            delivered = self.scheduler.delivered(),
            discarded,
            "Session closed"
        );
    }

    fn handle(&mut self, command: SessionCommand, surface: &mut dyn Surface) {
        match command {
            SessionCommand::Inbound(event) => {
                if !self.attached {
                    match self.pre_attach {
                        PreAttachPolicy::Buffer => self.scheduler.enqueue(event),
                        PreAttachPolicy::Drop => {
                            self.dropped_before_attach += 1;
                            debug!(session = %self.id, "Dropping event received before attach");
                        }
                    }
                } else if let Some(event) = self.scheduler.on_event(event) {
                    surface.show_next(event);
                }
            }
            SessionCommand::Attached => {
                if self.attached {
                    debug!(session = %self.id, "Ignoring repeated surface handshake");
                    return;
                }
                self.attached = true;
                debug!(
                    session = %self.id,
                    buffered = self.scheduler.pending_len(),
                    "Surface attached"
                );
                if let Some(events) = &self.events {
                    let _ = events.send(MuxEvent::Attached { id: self.id });
                }
                if let Some(event) = self.scheduler.resume() {
                    surface.show_next(event);
                }
            }
            SessionCommand::Ready => {
                if !self.attached {
                    debug!(session = %self.id, "Ignoring ready signal before attach");
                    return;
                }
                if let Some(event) = self.scheduler.on_ready() {
                    surface.show_next(event);
                }
            }
            SessionCommand::GetInfo { respond_to } => {
                let _ = respond_to.send(self.info());
            }
        }
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            attached: self.attached,
            state: self.scheduler.state(),
            pending: self.scheduler.pending_len(),
            delivered: self.scheduler.delivered(),
            high_water: self.scheduler.high_water(),
            dropped_before_attach: self.dropped_before_attach,
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        shown: Vec<String>,
        surface_closed: bool,
        connection_closed: bool,
    }

    struct LogSurface(Arc<Mutex<Log>>);

    impl Surface for LogSurface {
        fn show_next(&mut self, event: Event) {
            self.0.lock().unwrap().shown.push(event.text().into_owned());
        }

        fn close(&mut self) {
            self.0.lock().unwrap().surface_closed = true;
        }
    }

    struct LogConnection(Arc<Mutex<Log>>);

    impl Connection for LogConnection {
        fn id(&self) -> crate::ConnectionId {
            crate::ConnectionId(1)
        }

        fn close(&mut self) {
            self.0.lock().unwrap().connection_closed = true;
        }
    }

    fn spawn(
        policy: PreAttachPolicy,
    ) -> (SessionHandle, Arc<Mutex<Log>>, tokio::task::JoinHandle<()>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let (session, handle) = Session::new(SessionId(1));
        let task = tokio::spawn(session.with_pre_attach(policy).run(
            Box::new(LogSurface(log.clone())),
            Box::new(LogConnection(log.clone())),
        ));
        (handle, log, task)
    }

    #[tokio::test]
    async fn buffers_until_attached() {
        let (handle, log, _task) = spawn(PreAttachPolicy::Buffer);
        let sender = handle.sender();

        sender.send(SessionCommand::Inbound(Event::new("hello")));
        let info = sender.info().await.unwrap();
        assert!(!info.attached);
        assert_eq!(info.pending, 1);
        assert!(log.lock().unwrap().shown.is_empty());

        sender.send(SessionCommand::Attached);
        let info = sender.info().await.unwrap();
        assert_eq!(info.state, DeliveryState::AwaitingReady);
        assert_eq!(log.lock().unwrap().shown, vec!["hello"]);

        sender.send(SessionCommand::Ready);
        let info = sender.info().await.unwrap();
        assert_eq!(info.state, DeliveryState::Idle);
        assert_eq!(info.delivered, 1);
    }

    #[tokio::test]
    async fn drop_policy_discards_early_events() {
        let (handle, log, _task) = spawn(PreAttachPolicy::Drop);
        let sender = handle.sender();

        sender.send(SessionCommand::Inbound(Event::new("lost")));
        sender.send(SessionCommand::Attached);
        sender.send(SessionCommand::Inbound(Event::new("kept")));

        let info = sender.info().await.unwrap();
        assert_eq!(info.dropped_before_attach, 1);
        assert_eq!(log.lock().unwrap().shown, vec!["kept"]);
    }

    #[tokio::test]
    async fn ready_before_attach_is_ignored() {
        let (handle, log, _task) = spawn(PreAttachPolicy::Buffer);
        let sender = handle.sender();

        sender.send(SessionCommand::Inbound(Event::new("a")));
        sender.send(SessionCommand::Ready);
        sender.send(SessionCommand::Attached);
        sender.send(SessionCommand::Attached);

        let info = sender.info().await.unwrap();
        assert_eq!(info.delivered, 1);
        assert_eq!(log.lock().unwrap().shown, vec!["a"]);
    }

    #[tokio::test]
    async fn connection_teardown_closes_surface_only() {
        let (handle, log, task) = spawn(PreAttachPolicy::Buffer);
        let sender = handle.sender();
        sender.send(SessionCommand::Attached);
        sender.send(SessionCommand::Inbound(Event::new("a")));
        sender.send(SessionCommand::Inbound(Event::new("b")));
        sender.info().await.unwrap();

        handle.close(TeardownCause::ConnectionClosed);
        task.await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.shown, vec!["a"]);
        assert!(log.surface_closed);
        assert!(!log.connection_closed);
        assert_eq!(
            sender.info().await,
            Err(MuxError::UnknownSession(SessionId(1)))
        );
    }

    #[tokio::test]
    async fn surface_teardown_closes_connection_only() {
        let (handle, log, task) = spawn(PreAttachPolicy::Buffer);
        handle.close(TeardownCause::SurfaceClosed);
        task.await.unwrap();

        let log = log.lock().unwrap();
        assert!(!log.surface_closed);
        assert!(log.connection_closed);
    }

    #[tokio::test]
    async fn dropped_handle_shuts_down_both_sides() {
        let (handle, log, task) = spawn(PreAttachPolicy::Buffer);
        drop(handle);
        task.await.unwrap();

        let log = log.lock().unwrap();
        assert!(log.surface_closed);
        assert!(log.connection_closed);
    }
}
