use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use crate::error::MuxError;
use crate::event::{ConnectionId, SessionId};
use crate::session::{Session, SessionHandle, SessionSender};

/// Table of live sessions, keyed by connection identity.
///
/// Only the [`Multiplexer`](crate::Multiplexer) inserts and removes entries;
/// lookups may come from anywhere.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session for `connection_id`.
    ///
    /// The returned [`Session`] starts with an empty queue in the `Idle` state
    /// and still has to be spawned.
    pub fn create(&self, connection_id: ConnectionId) -> Result<Session, MuxError> {
        let id = SessionId::from(connection_id);
        match self.sessions.entry(id) {
            Entry::Occupied(_) => Err(MuxError::DuplicateSession(connection_id)),
            Entry::Vacant(slot) => {
                let (session, handle) = Session::new(id);
                slot.insert(handle);
                debug!(session = %id, "Session registered");
                Ok(session)
            }
        }
    }

    /// Remove a session. Removing an unknown id is a no-op returning `None`.
    pub fn remove(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.remove(&id).map(|(_, handle)| handle)
    }

    pub(crate) fn lookup(&self, id: SessionId) -> Option<SessionSender> {
        self.sessions.get(&id).map(|handle| handle.sender())
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// All live session ids, ascending
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
