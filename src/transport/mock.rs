//! In-memory transport double for tests and local development.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{Contact, Group, Transport, TransportError, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Scriptable [`Transport`] implementation.
///
/// Connects succeed unless failures are queued with `fail_next_connects`;
/// sends succeed unless `set_fail_sends(true)`. Events are emitted manually
/// through `emit`, and connect attempts are timestamped with the tokio clock
/// so tests under a paused runtime can assert backoff schedules.
pub struct MockTransport {
    connected: AtomicBool,
    credential: RwLock<Option<String>>,
    fail_connects: AtomicU32,
    fail_sends: AtomicBool,
    connect_attempts: AtomicU32,
    attempt_instants: Mutex<Vec<tokio::time::Instant>>,
    pairing_counter: AtomicU32,
    sent: Mutex<Vec<(String, String)>>,
    contacts: Mutex<Vec<Contact>>,
    groups: Mutex<Vec<Group>>,
    events: broadcast::Sender<TransportEvent>,
}

impl MockTransport {
    /// Disconnected transport holding a durable credential.
    pub fn new() -> Self {
        Self::with_credential(Some("mock-device"))
    }

    pub fn with_credential(credential: Option<&str>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connected: AtomicBool::new(false),
            credential: RwLock::new(credential.map(str::to_string)),
            fail_connects: AtomicU32::new(0),
            fail_sends: AtomicBool::new(false),
            connect_attempts: AtomicU32::new(0),
            attempt_instants: Mutex::new(Vec::new()),
            pairing_counter: AtomicU32::new(0),
            sent: Mutex::new(Vec::new()),
            contacts: Mutex::new(Vec::new()),
            groups: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_credential(&self, credential: Option<&str>) {
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential.map(str::to_string);
    }

    /// Make the next `n` connect calls fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_connects.store(n, Ordering::SeqCst);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Tokio-clock timestamps of every connect call, in order.
    pub fn attempt_instants(&self) -> Vec<tokio::time::Instant> {
        self.attempt_instants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of pairing codes handed out so far.
    pub fn pairing_codes_issued(&self) -> u32 {
        self.pairing_counter.load(Ordering::SeqCst)
    }

    /// Messages delivered through `send_text`, as `(recipient, text)` pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_contacts(&self, contacts: Vec<Contact>) {
        *self
            .contacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = contacts;
    }

    pub fn set_groups(&self, groups: Vec<Group>) {
        *self.groups.lock().unwrap_or_else(PoisonError::into_inner) = groups;
    }

    /// Publish a connection event to all subscribers.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_instants
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tokio::time::Instant::now());

        if self.fail_connects.load(Ordering::SeqCst) > 0 {
            self.fail_connects.fetch_sub(1, Ordering::SeqCst);
            return Err(TransportError::Connect("simulated connect failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn credential_id(&self) -> Option<String> {
        self.credential
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn request_pairing_code(&self) -> Result<String, TransportError> {
        let n = self.pairing_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("PAIR-{n:04}"))
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("simulated send failure".into()));
        }
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((to.to_string(), text.to_string()));
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<Contact>, TransportError> {
        Ok(self
            .contacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    async fn groups(&self) -> Result<Vec<Group>, TransportError> {
        Ok(self
            .groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}
