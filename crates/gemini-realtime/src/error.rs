//! Error types for the live session client.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to callers of [`crate::LiveConnection`].
///
/// Failures inside the receive loop never show up here; they are contained
/// by the loop's retry policy or turned into a disconnect event.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// `connect()` was called while a connection handle already exists.
    #[error("Session already connected")]
    AlreadyConnected,

    /// The session configuration cannot be used to open a connection.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The socket could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The setup message could not be transmitted.
    #[error("Setup handshake failed: {0}")]
    HandshakeFailed(String),

    /// `disconnect()` ran while the socket was still being opened.
    #[error("Connect aborted by disconnect")]
    ConnectAborted,

    /// A text turn was sent before the session became ready.
    #[error("Session is not ready")]
    NotReady,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for live session operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;
