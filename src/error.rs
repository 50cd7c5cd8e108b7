//! Error types for the wire protocol and connection layer.
//!
//! A would-block result is not represented here: it is normal flow under
//! readiness multiplexing and surfaces as `Step::Blocked` instead.

use thiserror::Error;

/// Errors that end a single connection.
///
/// None of these propagate past the connection that raised them.
#[derive(Debug, Error)]
pub enum WireError {
    /// Remote end closed or reset the connection.
    #[error("peer closed connection")]
    PeerClosed,

    /// Inbound bytes violate the frame format.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An outbound frame cannot be represented on the wire.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Any other socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        WireError::Protocol(msg.into())
    }

    pub fn encoding(msg: impl Into<String>) -> Self {
        WireError::Encoding(msg.into())
    }
}

/// Result type alias using WireError.
pub type Result<T> = std::result::Result<T, WireError>;
