//! Session lifecycle integration tests.
//!
//! Run with: cargo test --test session_test
//!
//! All tests run under a paused tokio clock so settle delays, pairing
//! timeouts, and backoff schedules elapse instantly and deterministically.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use wa_bridge::session::{ReconnectPolicy, SessionError, SessionManager};
use wa_bridge::transport::{MockTransport, TransportEvent};

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 3,
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(4),
        multiplier: 2.0,
    }
}

fn build_session(
    mock: &Arc<MockTransport>,
    policy: ReconnectPolicy,
) -> (Arc<SessionManager>, CancellationToken) {
    let shutdown = CancellationToken::new();
    let transport: Arc<dyn wa_bridge::transport::Transport> = mock.clone();
    let session = SessionManager::new(transport, policy, shutdown.clone());
    session.spawn_event_loop();
    (session, shutdown)
}

/// Let spawned tasks and the event loop catch up.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn connect_with_credential_establishes_session() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());

    session.connect().await.unwrap();

    assert!(session.is_connected());
    assert_eq!(mock.connect_attempts(), 1);
    let status = session.status();
    assert!(status.connected);
    assert!(status.internal_state);
    assert!(status.client_state);
    assert!(status.has_credential);
    assert_eq!(status.credential_id.as_deref(), Some("mock-device"));
    assert!(!status.reconnection_active);
}

#[tokio::test(start_paused = true)]
async fn connected_predicate_requires_all_three_legs() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());
    session.connect().await.unwrap();
    assert!(session.is_connected());

    // Transport flag drops: predicate drops with it.
    mock.set_connected(false);
    assert!(!session.is_connected());
    mock.set_connected(true);
    assert!(session.is_connected());

    // Credential disappears: predicate drops.
    mock.set_credential(None);
    assert!(!session.is_connected());
    mock.set_credential(Some("mock-device"));
    assert!(session.is_connected());

    // Fresh session: internal flag is false even though the transport
    // says connected and a credential exists.
    let mock2 = Arc::new(MockTransport::new());
    mock2.set_connected(true);
    let (session2, _shutdown2) = build_session(&mock2, fast_policy());
    assert!(!session2.is_connected());
}

#[tokio::test(start_paused = true)]
async fn ensure_connected_is_noop_when_connected() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());
    session.connect().await.unwrap();
    assert_eq!(mock.connect_attempts(), 1);

    session.ensure_connected().await.unwrap();
    session.ensure_connected().await.unwrap();
    assert_eq!(mock.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn ensure_connected_connects_when_down() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());

    assert!(!session.is_connected());
    session.ensure_connected().await.unwrap();
    assert!(session.is_connected());
    assert_eq!(mock.connect_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_connect_reports_connection_failed() {
    let mock = Arc::new(MockTransport::new());
    mock.fail_next_connects(1);
    let (session, _shutdown) = build_session(&mock, fast_policy());

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::ConnectionFailed(_)));
    assert!(!session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn disconnect_event_burst_spawns_one_reconnect_loop() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());
    session.connect().await.unwrap();
    assert_eq!(mock.connect_attempts(), 1);

    mock.set_connected(false);
    mock.fail_next_connects(u32::MAX);
    for _ in 0..5 {
        mock.emit(TransportEvent::Disconnected);
    }
    settle().await;
    assert!(session.status().reconnection_active);

    // Exhaust the loop: 3 attempts at 1s, 2s, 4s backoff.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(mock.connect_attempts(), 1 + 3);
    assert!(!session.status().reconnection_active);
    assert!(!session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn reconnect_backoff_follows_schedule() {
    let mock = Arc::new(MockTransport::new());
    let (_session, _shutdown) = build_session(&mock, fast_policy());

    mock.fail_next_connects(u32::MAX);
    mock.emit(TransportEvent::Disconnected);
    settle().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    let instants = mock.attempt_instants();
    assert_eq!(instants.len(), 3);
    // Waits of 1s, then 2s, then 4s between consecutive attempts.
    assert_eq!(instants[1] - instants[0], Duration::from_secs(2));
    assert_eq!(instants[2] - instants[1], Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn reconnect_interval_caps_at_max() {
    let mock = Arc::new(MockTransport::new());
    let policy = ReconnectPolicy {
        max_attempts: 5,
        initial_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(2),
        multiplier: 3.0,
    };
    let (_session, _shutdown) = build_session(&mock, policy);

    mock.fail_next_connects(u32::MAX);
    mock.emit(TransportEvent::Disconnected);
    settle().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    let instants = mock.attempt_instants();
    assert_eq!(instants.len(), 5);
    // 1s * 3 caps at 2s immediately; every later gap stays 2s.
    for window in instants.windows(2) {
        assert_eq!(window[1] - window[0], Duration::from_secs(2));
    }
}

#[tokio::test(start_paused = true)]
async fn connected_event_cancels_reconnection() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());

    mock.fail_next_connects(u32::MAX);
    mock.emit(TransportEvent::Disconnected);
    settle().await;
    assert!(session.status().reconnection_active);

    // Link restored out-of-band before the first backoff elapses.
    mock.set_connected(true);
    mock.emit(TransportEvent::Connected);
    settle().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(mock.connect_attempts(), 0);
    assert!(session.is_connected());
    assert!(!session.status().reconnection_active);
}

#[tokio::test(start_paused = true)]
async fn successful_reconnect_restores_session() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());
    session.connect().await.unwrap();

    mock.set_connected(false);
    mock.fail_next_connects(2);
    mock.emit(TransportEvent::Disconnected);
    settle().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    // Two failures, then the third attempt lands.
    assert_eq!(mock.connect_attempts(), 1 + 3);
    assert!(session.is_connected());
    assert!(!session.status().reconnection_active);
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_terminal_and_idempotent() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());
    session.connect().await.unwrap();

    session.disconnect().await;
    session.disconnect().await;
    assert!(!session.is_connected());

    // Closed sessions never auto-reconnect.
    let attempts = mock.connect_attempts();
    mock.emit(TransportEvent::Disconnected);
    settle().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(mock.connect_attempts(), attempts);
    assert!(!session.status().reconnection_active);

    assert!(matches!(session.connect().await, Err(SessionError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_inflight_reconnection() {
    let mock = Arc::new(MockTransport::new());
    let (session, _shutdown) = build_session(&mock, fast_policy());

    mock.fail_next_connects(u32::MAX);
    mock.emit(TransportEvent::Disconnected);
    settle().await;
    assert!(session.status().reconnection_active);

    session.disconnect().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(mock.connect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn pairing_flow_connects_without_credential() {
    let mock = Arc::new(MockTransport::with_credential(None));
    let (session, _shutdown) = build_session(&mock, fast_policy());

    // Returns immediately; pairing continues in the background.
    session.connect().await.unwrap();
    assert!(!session.is_connected());
    settle().await;
    assert_eq!(mock.pairing_codes_issued(), 1);

    // Out-of-band confirmation: the account links and gains a credential.
    mock.set_credential(Some("fresh-device"));
    mock.emit(TransportEvent::PairingConfirmed);
    settle().await;

    assert!(session.is_connected());
    assert_eq!(
        session.status().credential_id.as_deref(),
        Some("fresh-device")
    );
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_share_one_pairing_cycle() {
    let mock = Arc::new(MockTransport::with_credential(None));
    let (session, _shutdown) = build_session(&mock, fast_policy());

    // Several callers race into an unauthenticated session.
    session.connect().await.unwrap();
    session.connect().await.unwrap();
    session.ensure_connected().await.unwrap();
    settle().await;

    // Well inside the first code's validity window: one cycle, one code.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(mock.pairing_codes_issued(), 1);

    mock.set_credential(Some("fresh-device"));
    mock.emit(TransportEvent::PairingConfirmed);
    settle().await;
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn pairing_can_restart_after_exhaustion() {
    let mock = Arc::new(MockTransport::with_credential(None));
    let (session, _shutdown) = build_session(&mock, fast_policy());

    session.connect().await.unwrap();
    tokio::time::sleep(Duration::from_secs(400)).await;
    assert_eq!(mock.pairing_codes_issued(), 5);

    // The finished cycle releases its guard; a fresh connect starts over.
    session.connect().await.unwrap();
    settle().await;
    assert_eq!(mock.pairing_codes_issued(), 6);
}

#[tokio::test(start_paused = true)]
async fn pairing_retries_until_attempts_exhausted() {
    let mock = Arc::new(MockTransport::with_credential(None));
    let (session, _shutdown) = build_session(&mock, fast_policy());

    session.connect().await.unwrap();
    // Each cycle: 60s code timeout, 5s delay before the next code.
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert_eq!(mock.pairing_codes_issued(), 5);
    assert!(!session.is_connected());

    // No further codes after exhaustion.
    tokio::time::sleep(Duration::from_secs(400)).await;
    assert_eq!(mock.pairing_codes_issued(), 5);
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_pairing_silently() {
    let mock = Arc::new(MockTransport::with_credential(None));
    let (session, shutdown) = build_session(&mock, fast_policy());

    session.connect().await.unwrap();
    settle().await;
    assert_eq!(mock.pairing_codes_issued(), 1);

    shutdown.cancel();
    tokio::time::sleep(Duration::from_secs(400)).await;

    assert_eq!(mock.pairing_codes_issued(), 1);
    assert!(!session.is_connected());
}
