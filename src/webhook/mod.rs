//! Webhook intake: signature verification, payload parsing, dispatch.
//!
//! Every provider runs the same pipeline (verify, parse, ensure session,
//! format, send); providers differ only in signature header conventions and
//! payload shape.

pub mod dispatch;
pub mod gitea;
pub mod github;
pub mod handlers;
pub mod message;
pub mod types;
pub mod verify;

pub use handlers::router;
pub use types::{CommitInfo, Provider, PushNotification, WebhookConfig};
