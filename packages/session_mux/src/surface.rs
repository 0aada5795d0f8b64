//! Seams to the two external collaborators: the network transport that owns
//! connections, and the UI that owns surfaces.

use crate::event::{ConnectionId, Event, SessionId};
use crate::multiplexer::SurfaceSignals;

/// A transport endpoint feeding one session.
///
/// The transport keeps reading from the endpoint itself and forwards chunks
/// through [`Multiplexer::on_inbound_data`](crate::Multiplexer::on_inbound_data);
/// the core only holds this handle so it can close the endpoint.
pub trait Connection: Send + 'static {
    fn id(&self) -> ConnectionId;

    /// Close the endpoint. Called when the session's surface went away first,
    /// or when the connection is rejected.
    fn close(&mut self);
}

/// The on-screen target of one session.
///
/// `show_next` must not block; the surface performs its update asynchronously
/// and reports completion through [`SurfaceSignals::ready`].
pub trait Surface: Send + 'static {
    fn show_next(&mut self, event: Event);

    /// Close the surface because its connection ended.
    fn close(&mut self);
}

/// Creates one surface per accepted session.
///
/// The returned surface announces itself with [`SurfaceSignals::attached`]
/// once constructed; until then inbound events are held back.
pub trait SurfaceFactory: Send + Sync + 'static {
    fn create_surface(&self, session_id: SessionId, signals: SurfaceSignals) -> Box<dyn Surface>;
}
