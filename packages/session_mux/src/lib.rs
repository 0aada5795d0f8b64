//! Session multiplexing core.
//!
//! Every accepted connection becomes an independent session with its own
//! on-screen surface. Inbound chunks from the connection are queued per
//! session and handed to the surface one at a time, paced by the surface's
//! ready signal. When either the connection or the surface goes away, the
//! other side is closed and the session is dropped along with anything still
//! queued.
//!
//! The crate knows nothing about concrete transports or UIs; they plug in
//! through [`Connection`], [`Surface`] and [`SurfaceFactory`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use session_mux::{
//!     Connection, ConnectionId, Event, Multiplexer, MuxConfig, SessionId, SessionRegistry,
//!     Surface, SurfaceFactory, SurfaceSignals,
//! };
//!
//! struct Printer(SurfaceSignals);
//!
//! impl Surface for Printer {
//!     fn show_next(&mut self, event: Event) {
//!         println!("{}: {}", self.0.session_id(), event.text());
//!         self.0.ready();
//!     }
//!     fn close(&mut self) {}
//! }
//!
//! struct Printers;
//!
//! impl SurfaceFactory for Printers {
//!     fn create_surface(&self, _id: SessionId, signals: SurfaceSignals) -> Box<dyn Surface> {
//!         signals.attached();
//!         Box::new(Printer(signals))
//!     }
//! }
//!
//! struct Socket(ConnectionId);
//!
//! impl Connection for Socket {
//!     fn id(&self) -> ConnectionId {
//!         self.0
//!     }
//!     fn close(&mut self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mux = Multiplexer::new(
//!         Arc::new(SessionRegistry::new()),
//!         Arc::new(Printers),
//!         MuxConfig::default(),
//!     );
//!
//!     let id = mux.on_accept(Box::new(Socket(ConnectionId(1)))).unwrap();
//!     mux.on_inbound_data(id, "hello");
//!     mux.on_connection_closed(id);
//! }
//! ```

mod error;
mod event;
mod multiplexer;
mod registry;
pub mod scheduler;
mod session;
mod surface;

#[cfg(test)]
mod test_support;

pub use error::MuxError;
pub use event::{ConnectionId, Event, SessionId};
pub use multiplexer::{Multiplexer, MuxConfig, MuxEvent, SurfaceSignals};
pub use registry::SessionRegistry;
pub use scheduler::{DeliveryScheduler, DeliveryState};
pub use session::{PreAttachPolicy, Session, SessionHandle, SessionInfo, TeardownCause};
pub use surface::{Connection, Surface, SurfaceFactory};
