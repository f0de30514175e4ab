//! Query metadata

use std::fmt;

use serde_json::Value;

use crate::channel::ConnectionRole;
use crate::protocol::{QueryId, QueryRequest};

/// Read/write label of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    #[default]
    Unclassified,
    Read,
    Write,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Unclassified => "unclassified",
            Classification::Read => "read",
            Classification::Write => "write",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live query as recorded at submission time
///
/// The record owns its own copy of the request data, so later changes to
/// the caller's value never reach it.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub id: QueryId,
    pub template_name: String,
    pub connection_name: String,
    pub data: Value,
    pub close_on_end: bool,
    pub classification: Classification,
    /// Connection the query was sent on
    pub sent_on: ConnectionRole,
}

impl Query {
    /// Snapshot a request as it was submitted by the caller.
    pub fn from_request(request: &QueryRequest) -> Self {
        Self {
            id: request.query_id.clone(),
            template_name: request.template_name.clone(),
            connection_name: request.connection_name.clone(),
            data: request.data.clone(),
            close_on_end: request.close_on_end.unwrap_or(false),
            classification: if request.is_write {
                Classification::Write
            } else {
                Classification::Unclassified
            },
            sent_on: ConnectionRole::Read,
        }
    }

    /// Record which connection the query goes out on.
    pub fn routed_to(mut self, role: ConnectionRole) -> Self {
        self.sent_on = role;
        self
    }

    pub fn is_write(&self) -> bool {
        self.classification == Classification::Write
    }

    pub fn is_unclassified(&self) -> bool {
        self.classification == Classification::Unclassified
    }
}
