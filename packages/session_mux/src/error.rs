use crate::event::{ConnectionId, SessionId};

/// Errors that can occur while multiplexing sessions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MuxError {
    /// A session is already registered for this connection identity
    #[error("duplicate session for {0}")]
    DuplicateSession(ConnectionId),

    /// The session was torn down (or never existed)
    #[error("unknown session: {0}")]
    UnknownSession(SessionId),
}
