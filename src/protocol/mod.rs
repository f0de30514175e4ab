//! Epistream wire protocol
//!
//! Outbound requests are JSON objects naming a query template, the server
//! side connection to run it on and an opaque data payload. Inbound frames
//! are JSON objects discriminated by their `message` field, plus the bare
//! `pong` reply to the transport keep-alive.
//!
//! Two query ids are reserved for watermark probes:
//! - `replica_replication_time`: the replica's replication watermark
//! - `write_replication_time<N>`: the master's timestamp for the N-th write

mod errors;
mod message;
mod query_id;
mod request;

pub use errors::{ProtocolError, ProtocolResult};
pub use message::{
    parse_frame, Column, InboundMessage, MessageKind, KEEPALIVE_PING, KEEPALIVE_PONG,
    REPLICA_WRITE_ERROR,
};
pub use query_id::{ProbeKind, QueryId, REPLICA_PROBE_ID, WRITE_PROBE_PREFIX};
pub use request::QueryRequest;
