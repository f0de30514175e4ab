//! Inbound message decoding
//!
//! Every frame except the keep-alive reply is a JSON object with a `message`
//! field naming its kind. Kinds this client does not know are decoded as
//! [`InboundMessage::Unknown`] and ignored by the router.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::{ProtocolError, ProtocolResult};
use super::query_id::QueryId;

/// Keep-alive payload sent by the transport
pub const KEEPALIVE_PING: &str = "ping";

/// Keep-alive reply, discarded before dispatch
pub const KEEPALIVE_PONG: &str = "pong";

/// One column of a streamed row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Column {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            extra: Map::new(),
        }
    }
}

/// Closed set of message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    BeginQuery,
    Row,
    BeginRowSet,
    EndRowSet,
    EndQuery,
    Error,
    Data,
    ReplicaMasterWrite,
}

impl MessageKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::BeginQuery => "beginquery",
            MessageKind::Row => "row",
            MessageKind::BeginRowSet => "beginrowset",
            MessageKind::EndRowSet => "endrowset",
            MessageKind::EndQuery => "endquery",
            MessageKind::Error => "error",
            MessageKind::Data => "data",
            MessageKind::ReplicaMasterWrite => "replicamasterwrite",
        }
    }

    /// Look up a kind by its wire name.
    pub fn from_wire(kind: &str) -> Option<Self> {
        let kind = match kind {
            "beginquery" => MessageKind::BeginQuery,
            "row" => MessageKind::Row,
            "beginrowset" => MessageKind::BeginRowSet,
            "endrowset" => MessageKind::EndRowSet,
            "endquery" => MessageKind::EndQuery,
            "error" => MessageKind::Error,
            "data" => MessageKind::Data,
            "replicamasterwrite" => MessageKind::ReplicaMasterWrite,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    BeginQuery { query_id: QueryId },
    Row { query_id: QueryId, columns: Vec<Column> },
    BeginRowSet { query_id: QueryId },
    EndRowSet { query_id: QueryId },
    EndQuery { query_id: QueryId },
    /// Server reported error. `error == "replicawrite"` is the stale write signal.
    Error { query_id: Option<QueryId>, error: String },
    /// Free-form data frame, passed through untouched
    Data(Value),
    /// Master reports that the query executed as a write
    ReplicaMasterWrite { query_id: QueryId },
    /// Kind this client does not handle
    Unknown { kind: String },
}

/// Error value the replica sends when it was asked to run a write
pub const REPLICA_WRITE_ERROR: &str = "replicawrite";

impl InboundMessage {
    /// Kind of this message, `None` for unknown kinds.
    pub fn kind(&self) -> Option<MessageKind> {
        let kind = match self {
            InboundMessage::BeginQuery { .. } => MessageKind::BeginQuery,
            InboundMessage::Row { .. } => MessageKind::Row,
            InboundMessage::BeginRowSet { .. } => MessageKind::BeginRowSet,
            InboundMessage::EndRowSet { .. } => MessageKind::EndRowSet,
            InboundMessage::EndQuery { .. } => MessageKind::EndQuery,
            InboundMessage::Error { .. } => MessageKind::Error,
            InboundMessage::Data(_) => MessageKind::Data,
            InboundMessage::ReplicaMasterWrite { .. } => MessageKind::ReplicaMasterWrite,
            InboundMessage::Unknown { .. } => return None,
        };
        Some(kind)
    }

    /// Query this message refers to, if any.
    pub fn query_id(&self) -> Option<&QueryId> {
        match self {
            InboundMessage::BeginQuery { query_id }
            | InboundMessage::Row { query_id, .. }
            | InboundMessage::BeginRowSet { query_id }
            | InboundMessage::EndRowSet { query_id }
            | InboundMessage::EndQuery { query_id }
            | InboundMessage::ReplicaMasterWrite { query_id } => Some(query_id),
            InboundMessage::Error { query_id, .. } => query_id.as_ref(),
            InboundMessage::Data(_) | InboundMessage::Unknown { .. } => None,
        }
    }

    /// Whether this is the replica's stale write signal.
    pub fn is_replica_write(&self) -> bool {
        matches!(self, InboundMessage::Error { error, .. } if error == REPLICA_WRITE_ERROR)
    }
}

#[derive(Deserialize)]
struct QueryRef {
    #[serde(rename = "queryId")]
    query_id: QueryId,
}

#[derive(Deserialize)]
struct RowFrame {
    #[serde(rename = "queryId")]
    query_id: QueryId,
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Deserialize)]
struct ErrorFrame {
    #[serde(rename = "queryId", default)]
    query_id: Option<QueryId>,
    #[serde(default)]
    error: Value,
}

/// Decode one text frame. Returns `Ok(None)` for the keep-alive reply.
pub fn parse_frame(text: &str) -> ProtocolResult<Option<InboundMessage>> {
    if text == KEEPALIVE_PONG {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedFrame(e.to_string()))?;

    let kind = match value.get("message") {
        Some(Value::String(kind)) => kind.clone(),
        Some(_) | None => return Err(ProtocolError::MissingKind),
    };

    let Some(kind) = MessageKind::from_wire(&kind) else {
        return Ok(Some(InboundMessage::Unknown { kind }));
    };

    let message = match kind {
        MessageKind::BeginQuery => InboundMessage::BeginQuery {
            query_id: query_ref(kind, value)?,
        },
        MessageKind::BeginRowSet => InboundMessage::BeginRowSet {
            query_id: query_ref(kind, value)?,
        },
        MessageKind::EndRowSet => InboundMessage::EndRowSet {
            query_id: query_ref(kind, value)?,
        },
        MessageKind::EndQuery => InboundMessage::EndQuery {
            query_id: query_ref(kind, value)?,
        },
        MessageKind::ReplicaMasterWrite => InboundMessage::ReplicaMasterWrite {
            query_id: query_ref(kind, value)?,
        },
        MessageKind::Row => {
            let row: RowFrame = decode(kind, value)?;
            InboundMessage::Row {
                query_id: row.query_id,
                columns: row.columns,
            }
        }
        MessageKind::Error => {
            let frame: ErrorFrame = decode(kind, value)?;
            let error = match frame.error {
                Value::String(s) => s,
                Value::Null => String::new(),
                other => other.to_string(),
            };
            InboundMessage::Error {
                query_id: frame.query_id,
                error,
            }
        }
        MessageKind::Data => InboundMessage::Data(value),
    };

    Ok(Some(message))
}

fn query_ref(kind: MessageKind, value: Value) -> ProtocolResult<QueryId> {
    decode::<QueryRef>(kind, value).map(|r| r.query_id)
}

fn decode<T: for<'de> Deserialize<'de>>(kind: MessageKind, value: Value) -> ProtocolResult<T> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidMessage {
        kind: kind.as_str(),
        reason: e.to_string(),
    })
}
