//! Registry error types

use thiserror::Error;

use crate::protocol::QueryId;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry misuse. Never fatal: callers log and carry on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A live query already uses this id
    #[error("Duplicate query id: {0}")]
    DuplicateQueryId(QueryId),

    /// No live query has this id
    #[error("Query not found: {0}")]
    NotFound(QueryId),
}
