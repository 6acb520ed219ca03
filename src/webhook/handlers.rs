//! Axum handlers binding each provider to the dispatch pipeline.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};

use super::{dispatch, gitea, github};
use crate::api::AppState;
use crate::error::ApiResult;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/github", post(github_webhook))
        .route("/gitea", post(gitea_webhook))
}

async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let config = state.config.github_webhook();
    dispatch::dispatch(&state, &config, &headers, &body, github::parse)
        .await
        .map(Json)
}

async fn gitea_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let config = state.config.gitea_webhook();
    dispatch::dispatch(&state, &config, &headers, &body, gitea::parse)
        .await
        .map(Json)
}
