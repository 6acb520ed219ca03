//! Session Error Types

use thiserror::Error;

/// Errors from session operations. Causes are carried as plain strings so
/// the HTTP layer can log them without serializing transport internals.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was intentionally closed and cannot be reused.
    #[error("session is closed")]
    Closed,

    /// Operation requires a connected session.
    #[error("session is not connected")]
    NotConnected,

    /// Connect attempt did not produce a verified connection.
    #[error("failed to connect to messaging network: {0}")]
    ConnectionFailed(String),

    /// The transport refused or failed to deliver a message.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// Any other transport failure (contact/group listing, status).
    #[error("transport request failed: {0}")]
    Transport(String),
}
