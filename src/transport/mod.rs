//! Messaging transport capability.
//!
//! The bridge never speaks the messaging protocol itself; it consumes an
//! opaque capability behind the [`Transport`] trait. Production deployments
//! bind it to a local gateway daemon over HTTP ([`HttpTransport`]); tests use
//! the in-memory [`MockTransport`].

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub use http::HttpTransport;
pub use mock::MockTransport;

/// Errors surfaced by a transport implementation.
///
/// These never reach HTTP clients verbatim; the session layer wraps them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(String),

    #[error("transport request failed: {0}")]
    Request(String),

    #[error("transport rejected send: {0}")]
    Send(String),

    #[error("pairing code unavailable: {0}")]
    Pairing(String),
}

/// Connection-related events pushed by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link was established or re-established.
    Connected,
    /// The link dropped without a local `disconnect` call.
    Disconnected,
    /// A previously issued pairing code was confirmed out-of-band.
    PairingConfirmed,
    /// A previously issued pairing code was rejected or expired upstream.
    PairingFailed,
}

/// A contact known to the messaging account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub jid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// A group chat the messaging account is a member of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub jid: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Opaque capability over the messaging network client.
///
/// `is_connected` and `credential_id` must answer from cached state and
/// never block on I/O; the session state machine calls them under a lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the network link for an existing credential.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Close the network link.
    async fn disconnect(&self);

    /// The transport's own view of connectivity.
    fn is_connected(&self) -> bool;

    /// Identifier of the durable login credential, if one exists.
    fn credential_id(&self) -> Option<String>;

    /// Request a short-lived pairing code for interactive login.
    async fn request_pairing_code(&self) -> Result<String, TransportError>;

    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError>;

    async fn contacts(&self) -> Result<Vec<Contact>, TransportError>;

    async fn groups(&self) -> Result<Vec<Group>, TransportError>;

    /// Subscribe to connection events. Each call returns an independent
    /// receiver positioned at the current end of the stream.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
