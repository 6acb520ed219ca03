//! Request validation for recipient addresses and message bodies.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ApiError;

/// Maximum accepted message length in bytes.
pub const MAX_MESSAGE_LEN: usize = 4096;

// Recipient JID shapes: individual, group, business.
static INDIVIDUAL_JID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,15}@s\.whatsapp\.net$").expect("valid regex"));
static GROUP_JID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+@g\.us$").expect("valid regex"));
static BUSINESS_JID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{10,15}@c\.us$").expect("valid regex"));

static EXCESS_NEWLINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Whether `jid` is a valid recipient address of any supported shape.
pub fn is_valid_jid(jid: &str) -> bool {
    let jid = jid.trim();
    INDIVIDUAL_JID.is_match(jid) || GROUP_JID.is_match(jid) || BUSINESS_JID.is_match(jid)
}

pub fn validate_recipient(to: &str) -> Result<(), ApiError> {
    if to.trim().is_empty() {
        return Err(ApiError::ValidationFailed("'to' field is required".into()));
    }
    if !is_valid_jid(to) {
        return Err(ApiError::ValidationFailed(format!(
            "Invalid recipient address: {to}"
        )));
    }
    Ok(())
}

pub fn validate_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(ApiError::ValidationFailed(
            "'message' field is required".into(),
        ));
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(ApiError::ValidationFailed(format!(
            "Message too long (maximum {MAX_MESSAGE_LEN} characters)"
        )));
    }
    Ok(())
}

/// Trim, strip NUL bytes, and collapse runs of three or more newlines.
pub fn sanitize_message(message: &str) -> String {
    let cleaned = message.trim().replace('\0', "");
    EXCESS_NEWLINES.replace_all(&cleaned, "\n\n").into_owned()
}
