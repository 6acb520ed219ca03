//! API key admission control.
//!
//! Operator endpoints authenticate with a pre-shared key in the `X-API-Key`
//! header, with an `api_key` query parameter fallback for clients that
//! cannot set headers. Webhook routes are exempt; they authenticate with
//! their own signatures.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::error::ApiError;
use crate::util::constant_time_eq;

pub const API_KEY_HEADER: &str = "X-API-Key";
const API_KEY_QUERY_PARAM: &str = "api_key";

pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| query_api_key(request.uri().query()));

    let Some(provided) = provided else {
        return Err(ApiError::Unauthorized("Missing API key".into()));
    };
    if !is_valid_key(&provided, &state.config.api_keys) {
        return Err(ApiError::Unauthorized("Invalid API key".into()));
    }

    Ok(next.run(request).await)
}

fn query_api_key(query: Option<&str>) -> Option<String> {
    query?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == API_KEY_QUERY_PARAM && !value.is_empty()).then(|| value.to_string())
    })
}

/// Compare the provided key against every configured key so timing does not
/// reveal which key matched.
fn is_valid_key(provided: &str, keys: &[String]) -> bool {
    keys.iter().fold(false, |valid, key| {
        valid | constant_time_eq(provided.as_bytes(), key.as_bytes())
    })
}
