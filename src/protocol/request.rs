//! Outbound query request

use serde::Serialize;
use serde_json::Value;

use super::errors::{ProtocolError, ProtocolResult};
use super::query_id::QueryId;

/// A query request as sent over either connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub template_name: String,
    pub connection_name: String,
    pub data: Value,
    pub query_id: QueryId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_on_end: Option<bool>,
    /// Provisional write flag, only sent when set
    #[serde(rename = "is_write", skip_serializing_if = "std::ops::Not::not")]
    pub is_write: bool,
}

impl QueryRequest {
    /// Build a request. `closeOnEnd` is lifted out of `data` when present.
    pub fn new(
        template_name: impl Into<String>,
        connection_name: impl Into<String>,
        data: Value,
        query_id: QueryId,
    ) -> Self {
        let close_on_end = data.get("closeOnEnd").and_then(Value::as_bool);
        Self {
            template_name: template_name.into(),
            connection_name: connection_name.into(),
            data,
            query_id,
            close_on_end,
            is_write: false,
        }
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }
}
