//! Provider-agnostic dispatch pipeline.
//!
//! Order is fixed: signature header presence, verification, parse, session,
//! format, send. Verification always runs against the raw body before any
//! JSON parsing.

use axum::http::HeaderMap;
use serde_json::json;
use tracing::{info, warn};

use super::message;
use super::types::{PushNotification, WebhookConfig};
use super::verify;
use crate::api::AppState;
use crate::error::{ApiError, ApiResult};

/// Provider-specific payload parser plugged into the pipeline.
pub type ParseFn = fn(&[u8]) -> Result<PushNotification, serde_json::Error>;

pub async fn dispatch(
    state: &AppState,
    config: &WebhookConfig,
    headers: &HeaderMap,
    body: &[u8],
    parse: ParseFn,
) -> ApiResult<serde_json::Value> {
    let header_value = headers
        .get(config.signature_header)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if header_value.is_empty() {
        warn!(
            provider = config.provider.as_str(),
            "webhook received without signature header"
        );
        return Err(ApiError::Unauthorized(format!(
            "Missing {} header",
            config.signature_header
        )));
    }

    if !verify::verify_signature(body, header_value, config) {
        warn!(provider = config.provider.as_str(), "invalid webhook signature");
        return Err(ApiError::Unauthorized("Invalid webhook signature".into()));
    }

    let push = parse(body).map_err(|e| {
        warn!(provider = config.provider.as_str(), error = %e, "unparseable webhook payload");
        ApiError::ValidationFailed(format!("Invalid webhook payload: {e}"))
    })?;

    info!(
        provider = config.provider.as_str(),
        repository = %push.repository,
        commits = push.commits.len(),
        "webhook received"
    );

    if !state.session.is_connected() {
        state.session.ensure_connected().await?;
    }

    let Some(text) = message::format_push_message(&push, config.provider) else {
        warn!(
            provider = config.provider.as_str(),
            "webhook payload has zero commits, nothing to notify"
        );
        return Err(ApiError::ValidationFailed(
            "Webhook payload has no commits to notify".into(),
        ));
    };

    state.session.send_text(&config.recipient, &text).await?;

    info!(
        provider = config.provider.as_str(),
        recipient = %config.recipient,
        "webhook notification sent"
    );
    Ok(json!({ "status": "notification sent" }))
}
