use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use uuid::Uuid;

/// Identity of a live connection, assigned by the transport
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Unique identifier for a session, derived from its connection's identity
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl From<ConnectionId> for SessionId {
    fn from(id: ConnectionId) -> Self {
        SessionId(id.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Accepts both `session-7` and a bare `7`.
impl FromStr for SessionId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix("session-").unwrap_or(s).parse().map(SessionId)
    }
}

/// One discrete payload received on a connection.
///
/// The key is a time-ordered UUID that surfaces use as a stable display
/// identity for the entry (e.g. for keyed list rendering).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    key: Uuid,
    payload: Bytes,
    received_at: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            key: Uuid::now_v7(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }

    pub fn key(&self) -> Uuid {
        self.key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload as text, with invalid UTF-8 replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
