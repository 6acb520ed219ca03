//! Session lifecycle state machine.
//!
//! Drives the transport through its states: pairing authentication when no
//! credential exists, verified connects when one does, and automatic
//! reconnection with exponential backoff after unsolicited disconnects.
//! All entry points are safe to call from concurrent request handlers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::SessionError;
use crate::transport::{Contact, Group, Transport, TransportEvent};

/// Pairing attempts per authentication cycle.
const MAX_AUTH_ATTEMPTS: u32 = 5;
/// Delay between pairing attempts.
const AUTH_RETRY_DELAY: Duration = Duration::from_secs(5);
/// How long a single pairing code stays valid.
const PAIRING_TIMEOUT: Duration = Duration::from_secs(60);
/// Grace period after a transport connect before trusting its flags.
const CONNECT_SETTLE: Duration = Duration::from_secs(2);

/// Backoff policy for automatic reconnection. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(300),
            multiplier: 1.5,
        }
    }
}

/// Reconnection guard.
///
/// Explicit tri-state instead of a nullable cancel handle; the generation
/// lets a finishing loop clear only its own registration.
enum ReconnectGuard {
    Idle,
    Active {
        token: CancellationToken,
        generation: u64,
    },
}

struct SessionState {
    internal_connected: bool,
    closed: bool,
    authenticating: bool,
    reconnect: ReconnectGuard,
    reconnect_generation: u64,
}

enum PairingOutcome {
    Confirmed,
    TimedOut,
    Failed,
    Cancelled,
}

enum ReconnectOutcome {
    Connected,
    Cancelled,
    Exhausted,
}

/// Diagnostic snapshot of all connection flags, taken under one lock.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// The externally observable predicate: all three legs below.
    pub connected: bool,
    pub internal_state: bool,
    pub client_state: bool,
    pub has_credential: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    pub reconnection_active: bool,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    state: Mutex<SessionState>,
    /// Serializes synchronous connect attempts.
    connect_gate: AsyncMutex<()>,
    shutdown: CancellationToken,
    me: Weak<Self>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            transport,
            policy,
            state: Mutex::new(SessionState {
                internal_connected: false,
                closed: false,
                authenticating: false,
                reconnect: ReconnectGuard::Idle,
                reconnect_generation: 0,
            }),
            connect_gate: AsyncMutex::new(()),
            shutdown,
            me: me.clone(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the transport event loop. Call once after construction.
    pub fn spawn_event_loop(&self) {
        let Some(manager) = self.me.upgrade() else {
            return;
        };
        let mut events = manager.transport.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = manager.shutdown.cancelled() => return,
                    event = events.recv() => match event {
                        Ok(event) => manager.handle_event(event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "transport event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                }
            }
        });
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => {
                let mut state = self.lock();
                state.internal_connected = true;
                // A live connection always wins over a pending retry loop.
                if let ReconnectGuard::Active { token, .. } = &state.reconnect {
                    token.cancel();
                    state.reconnect = ReconnectGuard::Idle;
                }
                drop(state);
                info!("transport connected");
            }
            TransportEvent::Disconnected => {
                let mut state = self.lock();
                state.internal_connected = false;
                let should_reconnect =
                    !state.closed && matches!(state.reconnect, ReconnectGuard::Idle);
                drop(state);
                warn!("transport disconnected");
                if should_reconnect {
                    if let Some(manager) = self.me.upgrade() {
                        tokio::spawn(async move { manager.run_reconnect_loop().await });
                    }
                }
            }
            TransportEvent::PairingConfirmed | TransportEvent::PairingFailed => {
                // Consumed by the authentication task's own subscription.
            }
        }
    }

    /// Connect the session.
    ///
    /// Without a durable credential this starts the asynchronous pairing
    /// flow and returns immediately so the HTTP server can begin serving.
    /// With one it performs a verified synchronous connect attempt.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.lock().closed {
            return Err(SessionError::Closed);
        }

        if self.transport.credential_id().is_none() {
            {
                // One pairing cycle at a time; concurrent callers join the
                // cycle already waiting for confirmation.
                let mut state = self.lock();
                if state.authenticating {
                    debug!("pairing authentication already in progress");
                    return Ok(());
                }
                state.authenticating = true;
            }
            info!("no existing credential, starting pairing authentication");
            if let Some(manager) = self.me.upgrade() {
                tokio::spawn(async move {
                    manager.authenticate().await;
                    manager.lock().authenticating = false;
                });
            } else {
                self.lock().authenticating = false;
            }
            return Ok(());
        }

        let _gate = self.connect_gate.lock().await;

        // Another caller may have finished connecting while we waited.
        if self.is_connected() {
            return Ok(());
        }

        info!("existing credential found, connecting");
        self.transport.connect().await.map_err(|e| {
            error!(error = %e, "transport connect failed");
            SessionError::ConnectionFailed(e.to_string())
        })?;

        // Let the link settle before trusting the transport's flags.
        sleep(CONNECT_SETTLE).await;

        if !self.transport.is_connected() {
            error!("connection not established after connect attempt");
            return Err(SessionError::ConnectionFailed(
                "connection not established".into(),
            ));
        }
        let Some(credential) = self.transport.credential_id() else {
            error!("connect completed without a valid credential");
            return Err(SessionError::ConnectionFailed(
                "no valid credential after connect".into(),
            ));
        };

        self.lock().internal_connected = true;
        info!(credential_id = %credential, "session connected");
        Ok(())
    }

    /// Interactive pairing flow: request a code, render it out-of-band and
    /// wait for confirmation, retrying with fresh codes a bounded number of
    /// times. Shutdown cancellation abandons the cycle silently.
    async fn authenticate(&self) {
        let mut events = self.transport.subscribe();

        for attempt in 1..=MAX_AUTH_ATTEMPTS {
            if self.shutdown.is_cancelled() {
                debug!("authentication cancelled");
                return;
            }

            if attempt > 1 {
                info!(attempt, max = MAX_AUTH_ATTEMPTS, "requesting new pairing code");
                tokio::select! {
                    () = self.shutdown.cancelled() => {
                        debug!("authentication cancelled");
                        return;
                    }
                    () = sleep(AUTH_RETRY_DELAY) => {}
                }
            }

            let code = match self.transport.request_pairing_code().await {
                Ok(code) => code,
                Err(e) => {
                    warn!(attempt, error = %e, "failed to obtain pairing code");
                    continue;
                }
            };

            render_pairing_code(&code);

            if !self.transport.is_connected() {
                if let Err(e) = self.transport.connect().await {
                    warn!(attempt, error = %e, "transport connect failed during pairing");
                    continue;
                }
            }

            match self.wait_for_pairing(&mut events).await {
                PairingOutcome::Cancelled => {
                    debug!("authentication cancelled");
                    return;
                }
                PairingOutcome::Confirmed => {
                    self.lock().internal_connected = true;
                    info!(
                        credential_id = ?self.transport.credential_id(),
                        "authentication successful"
                    );
                    return;
                }
                PairingOutcome::TimedOut => {
                    warn!(attempt, "pairing code expired without confirmation");
                }
                PairingOutcome::Failed => {
                    warn!(attempt, "pairing attempt failed, retrying with a new code");
                }
            }
        }

        error!(
            attempts = MAX_AUTH_ATTEMPTS,
            "authentication failed after exhausting pairing attempts"
        );
    }

    async fn wait_for_pairing(
        &self,
        events: &mut broadcast::Receiver<TransportEvent>,
    ) -> PairingOutcome {
        let deadline = sleep(PAIRING_TIMEOUT);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => return PairingOutcome::Cancelled,
                () = &mut deadline => return PairingOutcome::TimedOut,
                event = events.recv() => match event {
                    Ok(TransportEvent::PairingConfirmed) => return PairingOutcome::Confirmed,
                    Ok(TransportEvent::PairingFailed) => return PairingOutcome::Failed,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return PairingOutcome::Failed,
                },
            }
        }
    }

    /// Automatic reconnection with exponential backoff.
    ///
    /// At most one loop runs at a time; registration and the connected flag
    /// change under the same lock, so a Disconnected burst spawns one loop.
    async fn run_reconnect_loop(&self) {
        let (token, generation) = {
            let mut state = self.lock();
            if state.internal_connected
                || state.closed
                || matches!(state.reconnect, ReconnectGuard::Active { .. })
            {
                return;
            }
            state.reconnect_generation += 1;
            let generation = state.reconnect_generation;
            let token = self.shutdown.child_token();
            state.reconnect = ReconnectGuard::Active {
                token: token.clone(),
                generation,
            };
            (token, generation)
        };

        let outcome = self.reconnect_attempts(&token).await;

        {
            // Only clear our own registration; a newer loop may exist if we
            // were cancelled and a later disconnect re-registered.
            let mut state = self.lock();
            if let ReconnectGuard::Active {
                generation: active, ..
            } = &state.reconnect
            {
                if *active == generation {
                    state.reconnect = ReconnectGuard::Idle;
                }
            }
        }

        match outcome {
            ReconnectOutcome::Connected => info!("reconnected to messaging network"),
            ReconnectOutcome::Cancelled => debug!("reconnection cancelled"),
            ReconnectOutcome::Exhausted => {
                error!(
                    attempts = self.policy.max_attempts,
                    "all reconnection attempts failed"
                );
            }
        }
    }

    async fn reconnect_attempts(&self, token: &CancellationToken) -> ReconnectOutcome {
        let mut interval = self.policy.initial_interval;

        for attempt in 1..=self.policy.max_attempts {
            tokio::select! {
                () = token.cancelled() => return ReconnectOutcome::Cancelled,
                () = sleep(interval) => {}
            }

            // The session may have been restored through another path while
            // we slept; never fight a live connection.
            if self.lock().internal_connected {
                debug!("already connected, stopping reconnection attempts");
                return ReconnectOutcome::Connected;
            }
            if self.transport.is_connected() {
                self.lock().internal_connected = true;
                return ReconnectOutcome::Connected;
            }

            info!(attempt, max = self.policy.max_attempts, "reconnection attempt");

            match self.transport.connect().await {
                Ok(()) => {
                    self.lock().internal_connected = true;
                    return ReconnectOutcome::Connected;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnection attempt failed");
                    interval = next_interval(interval, self.policy.multiplier, self.policy.max_interval);
                }
            }
        }

        ReconnectOutcome::Exhausted
    }

    /// Intentional shutdown of the session. Idempotent; cancels in-flight
    /// reconnection and leaves the session in its terminal state.
    pub async fn disconnect(&self) {
        {
            let mut state = self.lock();
            if let ReconnectGuard::Active { token, .. } = &state.reconnect {
                token.cancel();
                state.reconnect = ReconnectGuard::Idle;
            }
            state.internal_connected = false;
            state.closed = true;
        }
        self.transport.disconnect().await;
        info!("session closed");
    }

    /// The externally observable connected predicate: internal flag AND
    /// transport flag AND credential presence. Never blocks on I/O.
    pub fn is_connected(&self) -> bool {
        let internal = self.lock().internal_connected;
        internal && self.transport.is_connected() && self.transport.credential_id().is_some()
    }

    /// No-op when connected, otherwise delegates to [`Self::connect`].
    pub async fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            return Ok(());
        }
        info!("session not connected, attempting to connect");
        self.connect().await
    }

    pub async fn send_text(&self, to: &str, text: &str) -> Result<(), SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.transport.send_text(to, text).await.map_err(|e| {
            warn!(recipient = %to, error = %e, "message send failed");
            SessionError::SendFailed(e.to_string())
        })
    }

    pub async fn contacts(&self) -> Result<Vec<Contact>, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.transport
            .contacts()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    pub async fn groups(&self) -> Result<Vec<Group>, SessionError> {
        if !self.is_connected() {
            return Err(SessionError::NotConnected);
        }
        self.transport
            .groups()
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    /// Consistent snapshot of all connection flags.
    pub fn status(&self) -> SessionStatus {
        let state = self.lock();
        let client_state = self.transport.is_connected();
        let credential_id = self.transport.credential_id();
        SessionStatus {
            connected: state.internal_connected && client_state && credential_id.is_some(),
            internal_state: state.internal_connected,
            client_state,
            has_credential: credential_id.is_some(),
            credential_id,
            reconnection_active: matches!(state.reconnect, ReconnectGuard::Active { .. }),
        }
    }
}

/// Render the pairing code for out-of-band confirmation. Display only; the
/// state machine sees the outcome through transport events.
fn render_pairing_code(code: &str) {
    let rule = "=".repeat(64);
    println!("\n{rule}");
    println!("  PAIRING CODE: {code}");
    println!("  Confirm it from the linked-devices screen of your app.");
    println!("  The code expires in {} seconds.", PAIRING_TIMEOUT.as_secs());
    println!("{rule}\n");
    info!(code = %code, "pairing code issued");
}

/// Next backoff interval: `min(current * multiplier, max)`.
fn next_interval(current: Duration, multiplier: f64, max: Duration) -> Duration {
    let scaled = current.mul_f64(multiplier);
    if scaled > max {
        max
    } else {
        scaled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let max = Duration::from_secs(300);
        let mut interval = Duration::from_secs(5);
        let mut schedule = Vec::new();
        for _ in 0..20 {
            schedule.push(interval);
            interval = next_interval(interval, 1.5, max);
        }
        assert_eq!(schedule[0], Duration::from_secs(5));
        assert_eq!(schedule[1], Duration::from_millis(7500));
        assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*schedule.last().unwrap(), max);
    }

    #[test]
    fn default_policy_matches_deployment_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts, 10);
        assert_eq!(policy.initial_interval, Duration::from_secs(5));
        assert_eq!(policy.max_interval, Duration::from_secs(300));
        assert!((policy.multiplier - 1.5).abs() < f64::EPSILON);
    }
}
