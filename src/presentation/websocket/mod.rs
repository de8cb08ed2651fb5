//! WebSocket Gateway
//!
//! Per-user connections, the protocol dispatcher, the in-process connection
//! registry, and the fan-out bridge subscriber.

pub mod bridge;
pub mod dispatcher;
pub mod frames;
pub mod handler;
pub mod registry;

pub use bridge::FanoutSubscriber;
pub use dispatcher::{ConnectionContext, ConnectionPhase, DispatchOutcome, Dispatcher};
pub use frames::{ClientFrame, ServerFrame};
pub use handler::ws_handler;
pub use registry::{Connection, ConnectionRegistry, Registration};
