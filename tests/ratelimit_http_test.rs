//! Rate limiting behavior over the full router.
//!
//! Run with: cargo test --test ratelimit_http_test

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use wa_bridge::api::{create_router, AppState};
use wa_bridge::config::Config;
use wa_bridge::ratelimit::{RateLimitConfig, RateLimiter};
use wa_bridge::session::SessionManager;
use wa_bridge::transport::{MockTransport, Transport};

fn build_app(capacity: u32) -> (Router, Arc<MockTransport>) {
    let mut config = Config::default_for_test();
    config.rate_limit = RateLimitConfig {
        capacity,
        window: std::time::Duration::from_secs(60),
    };

    let mock = Arc::new(MockTransport::new());
    let shutdown = CancellationToken::new();
    let transport: Arc<dyn Transport> = mock.clone();
    let session = SessionManager::new(transport, config.reconnect.clone(), shutdown.clone());
    session.spawn_event_loop();

    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let state = AppState::new(session, limiter, config);
    (create_router(state), mock)
}

fn health_from(ip: &str) -> Request<Body> {
    Request::get("/health")
        .header("X-Forwarded-For", ip)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn requests_past_capacity_are_denied_with_retry_after() {
    let (router, _mock) = build_app(3);

    for i in 0..3 {
        let response = router.clone().oneshot(health_from("203.0.113.9")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {i} within capacity");
    }

    let response = router.clone().oneshot(health_from("203.0.113.9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .expect("Retry-After header present")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after >= 1 && retry_after <= 60);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["error"], "TOO_MANY_REQUESTS");
}

#[tokio::test]
async fn identities_do_not_share_buckets() {
    let (router, _mock) = build_app(1);

    let response = router.clone().oneshot(health_from("203.0.113.9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = router.clone().oneshot(health_from("203.0.113.9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    // A different client is untouched by the first client's exhaustion.
    let response = router.clone().oneshot(health_from("203.0.113.10")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn denied_requests_never_touch_the_session() {
    let (router, mock) = build_app(1);

    let response = router.clone().oneshot(health_from("203.0.113.9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Denied before authentication and before any session work.
    let request = Request::post("/send")
        .header("X-Forwarded-For", "203.0.113.9")
        .header("X-API-Key", "test-api-key-123456")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "to": "8801712345678@s.whatsapp.net",
                "message": "hi"
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(mock.connect_attempts(), 0);
    assert!(mock.sent().is_empty());
}

#[tokio::test]
async fn webhooks_are_rate_limited_too() {
    let (router, _mock) = build_app(1);

    let response = router.clone().oneshot(health_from("203.0.113.9")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let request = Request::post("/webhook/gitea")
        .header("X-Forwarded-For", "203.0.113.9")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}
