//! Channel error types

use thiserror::Error;

use super::transport::ConnectionRole;

/// Result type for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Transport level failures. Logged and surfaced, never retried here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Target connection is absent or not open
    #[error("Channel closed: {0} connection")]
    ChannelClosed(ConnectionRole),

    /// Connecting to the endpoint failed
    #[error("Failed to connect {role} connection to {url}: {reason}")]
    Connect {
        role: ConnectionRole,
        url: String,
        reason: String,
    },

    /// Writing a frame failed
    #[error("Send failed on {role} connection: {reason}")]
    Send { role: ConnectionRole, reason: String },
}

impl ChannelError {
    /// Role of the connection the error concerns.
    pub fn role(&self) -> ConnectionRole {
        match self {
            ChannelError::ChannelClosed(role) => *role,
            ChannelError::Connect { role, .. } | ChannelError::Send { role, .. } => *role,
        }
    }
}
