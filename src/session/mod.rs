//! Messaging session lifecycle.
//!
//! One [`SessionManager`] owns the single long-lived link to the messaging
//! network: pairing authentication, disconnect handling, and automatic
//! reconnection with exponential backoff.

pub mod error;
pub mod manager;

pub use error::SessionError;
pub use manager::{ReconnectPolicy, SessionManager, SessionStatus};
