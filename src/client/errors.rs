//! Client error types

use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::protocol::QueryId;
use crate::router::RouterError;

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Router(#[from] RouterError),

    /// The server reported an error for the query
    #[error("query {query_id} failed: {error}")]
    Query { query_id: QueryId, error: String },

    /// The client task has stopped
    #[error("client is closed")]
    Closed,
}
