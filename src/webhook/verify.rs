//! HMAC-SHA256 Webhook Signature Verification

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

use super::types::WebhookConfig;
use crate::util::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

/// Sign a payload with HMAC-SHA256 and return the hex-encoded signature.
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature header value against the raw request body.
///
/// An empty configured secret disables verification entirely; that is an
/// explicit insecure mode and every skipped check is logged. A configured
/// prefix (GitHub's `sha256=`) is mandatory when present.
pub fn verify_signature(payload: &[u8], header_value: &str, config: &WebhookConfig) -> bool {
    if config.secret.is_empty() {
        warn!(
            provider = config.provider.as_str(),
            "webhook secret not configured, skipping signature verification"
        );
        return true;
    }

    let provided = match config.signature_prefix {
        Some(prefix) => match header_value.strip_prefix(prefix) {
            Some(rest) => rest,
            None => return false,
        },
        None => header_value,
    };

    let expected = sign_payload(&config.secret, payload);
    constant_time_eq(expected.as_bytes(), provided.as_bytes())
}
