//! HTTP binding of the transport capability.
//!
//! Talks to a local WhatsApp gateway daemon that owns the actual protocol
//! session. The gateway exposes a small REST surface (`/session/*`,
//! `/messages`, `/contacts`, `/groups`) plus a long-poll `/events` stream
//! which this module pumps into a broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Contact, Group, Transport, TransportError, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 64;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Must exceed the gateway's long-poll hold time.
const EVENT_POLL_TIMEOUT: Duration = Duration::from_secs(90);
const EVENT_POLL_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct SessionStatusBody {
    connected: bool,
    #[serde(default)]
    credential_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PairingCodeBody {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayEvent {
    Connected,
    Disconnected,
    PairingConfirmed,
    PairingFailed,
    #[serde(other)]
    Unknown,
}

/// Transport backed by an HTTP gateway daemon.
///
/// Connectivity and credential state are cached locally so the sync trait
/// methods never touch the network.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
    connected: AtomicBool,
    credential: RwLock<Option<String>>,
    events: broadcast::Sender<TransportEvent>,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(false),
            credential: RwLock::new(None),
            events,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Pull `/session/status` and refresh the cached flags.
    async fn refresh_status(&self) -> Result<SessionStatusBody, TransportError> {
        let status: SessionStatusBody = self
            .client
            .get(self.url("/session/status"))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        self.connected.store(status.connected, Ordering::SeqCst);
        *self
            .credential
            .write()
            .unwrap_or_else(PoisonError::into_inner) = status.credential_id.clone();
        Ok(status)
    }

    fn apply_event(&self, event: GatewayEvent) {
        let mapped = match event {
            GatewayEvent::Connected => {
                self.connected.store(true, Ordering::SeqCst);
                TransportEvent::Connected
            }
            GatewayEvent::Disconnected => {
                self.connected.store(false, Ordering::SeqCst);
                TransportEvent::Disconnected
            }
            GatewayEvent::PairingConfirmed => TransportEvent::PairingConfirmed,
            GatewayEvent::PairingFailed => TransportEvent::PairingFailed,
            GatewayEvent::Unknown => return,
        };
        // No receivers is fine; subscribers come and go.
        let _ = self.events.send(mapped);
    }

    /// Spawn the background event pump.
    ///
    /// Long-polls the gateway's `/events` endpoint and republishes events
    /// until `shutdown` is cancelled. Poll failures back off and retry.
    pub fn spawn_event_pump(self: Arc<Self>, shutdown: CancellationToken) {
        tokio::spawn(async move {
            let poll_client = match reqwest::Client::builder()
                .timeout(EVENT_POLL_TIMEOUT)
                .build()
            {
                Ok(client) => client,
                Err(e) => {
                    warn!(error = %e, "failed to build event poll client, events disabled");
                    return;
                }
            };

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!("event pump stopped");
                        return;
                    }
                    result = poll_client.get(self.url("/events")).send() => {
                        match Self::decode_events(result).await {
                            Ok(events) => {
                                for event in events {
                                    self.apply_event(event);
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "event poll failed, backing off");
                                tokio::select! {
                                    () = shutdown.cancelled() => return,
                                    () = tokio::time::sleep(EVENT_POLL_BACKOFF) => {}
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    async fn decode_events(
        result: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<Vec<GatewayEvent>, TransportError> {
        result
            .map_err(|e| TransportError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.client
            .post(self.url("/session/connect"))
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let status = self.refresh_status().await?;
        if status.connected {
            Ok(())
        } else {
            Err(TransportError::Connect(
                "gateway accepted connect but reports disconnected".into(),
            ))
        }
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.post(self.url("/session/disconnect")).send().await {
            debug!(error = %e, "gateway disconnect request failed");
        }
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
        let body: PairingCodeBody = self
            .client
            .post(self.url("/session/pairing-code"))
            .send()
            .await
            .map_err(|e| TransportError::Pairing(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Pairing(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Pairing(e.to_string()))?;
        Ok(body.code)
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<(), TransportError> {
        self.client
            .post(self.url("/messages"))
            .json(&json!({ "to": to, "text": text }))
            .send()
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(())
    }

    async fn contacts(&self) -> Result<Vec<Contact>, TransportError> {
        self.client
            .get(self.url("/contacts"))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    async fn groups(&self) -> Result<Vec<Group>, TransportError> {
        self.client
            .get(self.url("/groups"))
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?
            .error_for_status()
            .map_err(|e| TransportError::Request(e.to_string()))?
            .json()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_stripped() {
        let transport = HttpTransport::new("http://127.0.0.1:3000/").unwrap();
        assert_eq!(transport.url("/messages"), "http://127.0.0.1:3000/messages");
    }

    #[test]
    fn gateway_events_decode() {
        let events: Vec<GatewayEvent> = serde_json::from_str(
            r#"[{"type":"connected"},{"type":"pairing_confirmed"},{"type":"presence_update"}]"#,
        )
        .unwrap();
        assert!(matches!(events[0], GatewayEvent::Connected));
        assert!(matches!(events[1], GatewayEvent::PairingConfirmed));
        // Unrecognized event kinds decode but are dropped by apply_event.
        assert!(matches!(events[2], GatewayEvent::Unknown));
    }

    #[test]
    fn unknown_events_are_not_republished() {
        let transport = HttpTransport::new("http://127.0.0.1:3000").unwrap();
        let mut rx = transport.subscribe();
        transport.apply_event(GatewayEvent::Unknown);
        transport.apply_event(GatewayEvent::Disconnected);
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Disconnected);
        assert!(rx.try_recv().is_err());
    }
}
