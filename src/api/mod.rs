//! API Router and Application State

pub mod messages;

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::config::Config;
use crate::error::ApiError;
use crate::ratelimit::{self, RateLimiter};
use crate::session::SessionManager;
use crate::webhook;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        session: Arc<SessionManager>,
        rate_limiter: Arc<RateLimiter>,
        config: Config,
    ) -> Self {
        Self {
            session,
            rate_limiter,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
///
/// Admission order, outermost first: rate limit, then per-route
/// authentication (API key for operator routes, signatures inside the
/// webhook handlers), then the handler.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    let protected_routes = Router::new()
        .route("/contacts", get(messages::get_contacts))
        .route("/groups", get(messages::get_groups))
        .route("/send", post(messages::send_message))
        .layer(from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected_routes)
        .nest("/webhook", webhook::router())
        .layer(from_fn_with_state(state.clone(), ratelimit::rate_limit_by_ip))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    // Raw string so anything other than "true" degrades to the summary
    // view instead of a rejection.
    detailed: Option<String>,
}

/// Liveness probe. `?detailed=true` adds the full session status snapshot.
async fn health_check(
    State(state): State<AppState>,
    Query(query): Query<HealthQuery>,
) -> Json<serde_json::Value> {
    let status = state.session.status();
    let mut body = json!({
        "status": "ok",
        "connected": status.connected,
        "timestamp": Utc::now().timestamp(),
    });
    if query.detailed.as_deref() == Some("true") {
        body["connection_status"] = serde_json::to_value(&status).unwrap_or_default();
    }
    Json(body)
}

/// Last-resort boundary: a panicking handler becomes a structured 500
/// instead of a dropped connection.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}
