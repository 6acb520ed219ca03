//! WhatsApp Notification Bridge
//!
//! Forwards webhook push events and operator API requests as chat messages
//! through one long-lived, automatically reconnecting messaging session.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod ratelimit;
pub mod session;
pub mod transport;
pub mod util;
pub mod validation;
pub mod webhook;
