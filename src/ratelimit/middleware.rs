//! Axum middleware applying the rate limiter per client IP.

use std::net::SocketAddr;

use axum::{
    extract::{rejection::ExtensionRejection, ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::ip::{extract_client_ip, normalize_ip};
use crate::api::AppState;
use crate::error::ApiError;

/// Admission check before any authentication or handler work. Denials are
/// pure 429 responses with Retry-After and never touch the session.
pub async fn rate_limit_by_ip(
    State(state): State<AppState>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let connect_info = connect_info.ok();
    let ip = extract_client_ip(request.headers(), connect_info.as_ref());
    let identity = normalize_ip(ip);

    let result = state.rate_limiter.check(&identity);
    if !result.allowed {
        debug!(
            identity = %identity,
            retry_after = result.retry_after,
            "rate limit exceeded"
        );
        return Err(ApiError::TooManyRequests {
            retry_after: result.retry_after,
        });
    }

    Ok(next.run(request).await)
}
