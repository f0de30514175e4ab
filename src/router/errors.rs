//! Router error types

use thiserror::Error;

use crate::channel::ChannelError;
use crate::protocol::ProtocolError;
use crate::registry::RegistryError;

/// Result type for router operations
pub type RouterResult<T> = Result<T, RouterError>;

/// Why a query could not be submitted
#[derive(Debug, Clone, Error)]
pub enum RouterError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
