//! Operator message endpoints.

use axum::{
    extract::rejection::JsonRejection,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::{ApiError, ApiResult};
use crate::transport::{Contact, Group};
use crate::validation;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub status: &'static str,
    pub to: String,
    pub timestamp: i64,
}

/// `POST /send` - deliver an ad-hoc message to a recipient JID.
///
/// Responds 202: the message was handed to the transport, end-to-end
/// delivery is not confirmed synchronously.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) =
        body.map_err(|e| ApiError::ValidationFailed(format!("Invalid request body: {e}")))?;

    validation::validate_recipient(&req.to)?;
    validation::validate_message(&req.message)?;
    let message = validation::sanitize_message(&req.message);

    if !state.session.is_connected() {
        state.session.ensure_connected().await?;
    }

    state.session.send_text(&req.to, &message).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendMessageResponse {
            status: "sent",
            to: req.to,
            timestamp: Utc::now().timestamp(),
        }),
    ))
}

/// `GET /contacts` - contacts known to the messaging account.
pub async fn get_contacts(State(state): State<AppState>) -> ApiResult<Json<Vec<Contact>>> {
    Ok(Json(state.session.contacts().await?))
}

/// `GET /groups` - groups the messaging account is a member of.
pub async fn get_groups(State(state): State<AppState>) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(state.session.groups().await?))
}
