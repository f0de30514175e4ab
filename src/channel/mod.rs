//! Duplex channel connections
//!
//! The router talks to two endpoints: a mandatory read (replica) connection
//! and an optional write (master) connection. Each connection is a
//! [`Transport`]; the [`ConnectionManager`] tracks their open/closed state
//! from the [`ChannelEvent`]s the transports produce and refuses to send on
//! anything that is not open.
//!
//! [`WebSocketTransport`] is the production transport. It keeps the
//! connection alive with a text `ping` every 60 seconds; the matching `pong`
//! replies are dropped by the protocol decoder before dispatch.

mod errors;
mod manager;
mod transport;
mod websocket;

pub use errors::{ChannelError, ChannelResult};
pub use manager::{ConnectionManager, ConnectionState};
pub use transport::{ChannelEvent, ChannelEventKind, ConnectionRole, MemoryTransport, Transport};
pub use websocket::{WebSocketOptions, WebSocketTransport, KEEPALIVE_INTERVAL};
