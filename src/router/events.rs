//! Events surfaced to consumers of the router
//!
//! Every event is a pass-through of what the channel or the router saw.
//! Consumers attach through an [`EventSink`]; the row buffer is one.

use serde_json::Value;
use tokio::sync::broadcast;

use crate::channel::ConnectionRole;
use crate::protocol::{Column, QueryId, QueryRequest};

/// Observable router event
#[derive(Debug, Clone, PartialEq)]
pub enum RouterEvent {
    Open { role: ConnectionRole },
    Close { role: ConnectionRole },
    /// Transport error (`role` set) or a server error for a query
    Error {
        role: Option<ConnectionRole>,
        query_id: Option<QueryId>,
        error: String,
    },
    Data(Value),
    Row { query_id: QueryId, columns: Vec<Column> },
    BeginQuery { query_id: QueryId },
    EndQuery { query_id: QueryId },
    BeginRowSet { query_id: QueryId },
    EndRowSet { query_id: QueryId },
    /// A request went out on a connection
    Send { role: ConnectionRole, request: QueryRequest },
    /// Replica refused a write; the query was moved to master
    ReplicaWrite { query_id: QueryId },
}

impl RouterEvent {
    /// Event name as consumers know it.
    pub fn name(&self) -> &'static str {
        match self {
            RouterEvent::Open { .. } => "open",
            RouterEvent::Close { .. } => "close",
            RouterEvent::Error { .. } => "error",
            RouterEvent::Data(_) => "data",
            RouterEvent::Row { .. } => "row",
            RouterEvent::BeginQuery { .. } => "beginquery",
            RouterEvent::EndQuery { .. } => "endquery",
            RouterEvent::BeginRowSet { .. } => "beginrowset",
            RouterEvent::EndRowSet { .. } => "endrowset",
            RouterEvent::Send { .. } => "send",
            RouterEvent::ReplicaWrite { .. } => "replicawrite",
        }
    }

    /// Query the event refers to, if any.
    pub fn query_id(&self) -> Option<&QueryId> {
        match self {
            RouterEvent::Row { query_id, .. }
            | RouterEvent::BeginQuery { query_id }
            | RouterEvent::EndQuery { query_id }
            | RouterEvent::BeginRowSet { query_id }
            | RouterEvent::EndRowSet { query_id }
            | RouterEvent::ReplicaWrite { query_id } => Some(query_id),
            RouterEvent::Send { request, .. } => Some(&request.query_id),
            RouterEvent::Error { query_id, .. } => query_id.as_ref(),
            RouterEvent::Open { .. } | RouterEvent::Close { .. } | RouterEvent::Data(_) => None,
        }
    }
}

/// Receiver of router events
pub trait EventSink: Send {
    fn emit(&mut self, event: RouterEvent);
}

/// Collects events in order. Handy in tests.
impl EventSink for Vec<RouterEvent> {
    fn emit(&mut self, event: RouterEvent) {
        self.push(event);
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: RouterEvent) {}
}

/// Fans events out to any number of tokio subscribers
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<RouterEvent>,
}

impl BroadcastSink {
    pub fn new(sender: broadcast::Sender<RouterEvent>) -> Self {
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouterEvent> {
        self.sender.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn emit(&mut self, event: RouterEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }
}
