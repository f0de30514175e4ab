//! Protocol error types

use thiserror::Error;

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors decoding or encoding epistream frames
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Frame has no `message` discriminator
    #[error("Frame has no message kind")]
    MissingKind,

    /// Known kind with an unexpected shape
    #[error("Invalid {kind} message: {reason}")]
    InvalidMessage { kind: &'static str, reason: String },

    /// Request could not be serialized
    #[error("Failed to encode request: {0}")]
    Encode(String),
}
