//! Per-vacuum connector: session lifecycle plus topic caches
//!
//! The connector owns one MQTT session and a demultiplexer task that sorts
//! inbound messages into three independent caches (map payload, status,
//! error). Each topic keeps only its latest value; an unconsumed map
//! payload is replaced wholesale when a newer one arrives.

use crate::config::MqttSection;
use crate::protocol::{self, DecodedEvent, TopicSet, VacuumIdentity};
use crate::transport::mqtt::{ConnectionState, MqttError, MqttSession, SessionStatus};
use crate::transport::RawMessage;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Latest-value caches for one vacuum's three subscription topics.
///
/// Locks are held only for the copy or swap. No payload interpretation
/// happens under a lock.
#[derive(Debug, Default)]
struct Caches {
    map_payload: Mutex<Option<Bytes>>,
    /// Set when a map payload arrives, cleared when it is taken.
    data_available: AtomicBool,
    status: Mutex<Option<String>>,
    error: Mutex<Option<String>>,
    /// True once any status or map message arrived on the current
    /// connection. Cleared when the session leaves `Subscribed` or when the
    /// connection generation changes.
    reading_since_connect: AtomicBool,
}

/// Cheap read handle over a connector's caches and connection state.
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    caches: Arc<Caches>,
    state_rx: watch::Receiver<SessionStatus>,
}

impl ConnectorHandle {
    /// Latest status string, if any has arrived.
    pub fn latest_status(&self) -> Option<String> {
        self.caches.status.lock().ok().and_then(|guard| guard.clone())
    }

    /// Latest error description, if any has arrived.
    pub fn latest_error(&self) -> Option<String> {
        self.caches.error.lock().ok().and_then(|guard| guard.clone())
    }

    /// Whether a map payload arrived since the last take.
    pub fn has_unconsumed_map_payload(&self) -> bool {
        self.caches.data_available.load(Ordering::Acquire)
    }

    /// Take the cached map payload, clearing the unconsumed flag. Safe to
    /// call when nothing is cached.
    pub fn take_map_payload(&self) -> Option<Bytes> {
        self.caches.data_available.store(false, Ordering::Release);
        self.caches
            .map_payload
            .lock()
            .ok()
            .and_then(|mut guard| guard.take())
    }

    pub fn is_subscribed(&self) -> bool {
        self.state_rx.borrow().is_subscribed()
    }

    /// Whether any status or map message has arrived on the current
    /// connection.
    pub fn has_reading_since_connect(&self) -> bool {
        self.caches.reading_since_connect.load(Ordering::Acquire)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().state.clone()
    }
}

enum Backend {
    Mqtt(MqttSession),
    /// Test backend: no broker. Messages are injected through the channel
    /// handed out by [`Connector::detached`]; publishes are recorded.
    Detached {
        published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
        state_tx: Arc<watch::Sender<SessionStatus>>,
    },
}

/// Connector for one vacuum.
pub struct Connector {
    identity: VacuumIdentity,
    topics: TopicSet,
    caches: Arc<Caches>,
    backend: Backend,
    state_rx: watch::Receiver<SessionStatus>,
    message_rx: Option<mpsc::Receiver<RawMessage>>,
    demux_handle: Option<JoinHandle<()>>,
}

impl Connector {
    /// Connector backed by a live MQTT session.
    pub fn new(identity: VacuumIdentity, config: &MqttSection) -> Result<Self, MqttError> {
        let topics = TopicSet::new(&identity.base_topic);
        let (message_tx, message_rx) = mpsc::channel(64);
        let session = MqttSession::new(
            &identity.unique_id(),
            topics.clone(),
            config.clone(),
            message_tx,
        )?;
        let state_rx = session.state_receiver();

        Ok(Self {
            identity,
            topics,
            caches: Arc::new(Caches::default()),
            backend: Backend::Mqtt(session),
            state_rx,
            message_rx: Some(message_rx),
            demux_handle: None,
        })
    }

    /// Connector with no broker behind it. Returns the sender used to
    /// inject raw messages; the detached session reports `Subscribed`.
    pub fn detached(identity: VacuumIdentity) -> (Self, mpsc::Sender<RawMessage>) {
        let topics = TopicSet::new(&identity.base_topic);
        let (message_tx, message_rx) = mpsc::channel(64);
        let (state_tx, state_rx) = watch::channel(SessionStatus::new(1, ConnectionState::Subscribed));

        let connector = Self {
            identity,
            topics,
            caches: Arc::new(Caches::default()),
            backend: Backend::Detached {
                published: Arc::new(Mutex::new(Vec::new())),
                state_tx: Arc::new(state_tx),
            },
            state_rx,
            message_rx: Some(message_rx),
            demux_handle: None,
        };
        (connector, message_tx)
    }

    pub fn identity(&self) -> &VacuumIdentity {
        &self.identity
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// Start the session (when backed by one) and the demultiplexer task.
    pub fn start(&mut self) -> Result<(), MqttError> {
        if let Backend::Mqtt(session) = &mut self.backend {
            session.start()?;
        }

        if self.demux_handle.is_none() {
            if let Some(message_rx) = self.message_rx.take() {
                let handle = tokio::spawn(Self::run_demux(
                    self.identity.unique_id(),
                    self.topics.clone(),
                    self.caches.clone(),
                    message_rx,
                    self.state_rx.clone(),
                ));
                self.demux_handle = Some(handle);
            }
        }
        Ok(())
    }

    async fn run_demux(
        vacuum_id: String,
        topics: TopicSet,
        caches: Arc<Caches>,
        mut message_rx: mpsc::Receiver<RawMessage>,
        mut state_rx: watch::Receiver<SessionStatus>,
    ) {
        info!(vacuum = %vacuum_id, "starting connector demultiplexer");
        let mut seen_generation = state_rx.borrow().generation;
        loop {
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = state_rx.borrow().clone();
                    // The latch covers the current connection only. The
                    // generation check catches a drop-and-resubscribe whose
                    // intermediate states coalesced in the watch channel.
                    if !status.is_subscribed() || status.generation != seen_generation {
                        caches.reading_since_connect.store(false, Ordering::Release);
                        debug!(
                            vacuum = %vacuum_id,
                            state = ?status.state,
                            generation = status.generation,
                            "cleared reading latch"
                        );
                    }
                    seen_generation = status.generation;
                }

                message = message_rx.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    Self::sort_message(&vacuum_id, &topics, &caches, message);
                }
            }
        }
        info!(vacuum = %vacuum_id, "connector demultiplexer stopped");
    }

    fn sort_message(vacuum_id: &str, topics: &TopicSet, caches: &Caches, message: RawMessage) {
        let Some(suffix) = topics.suffix_of(&message.topic) else {
            debug!(vacuum = %vacuum_id, topic = %message.topic, "message outside topic set, dropped");
            return;
        };

        match protocol::decode(suffix, &message.payload) {
            DecodedEvent::MapUpdate(payload) => {
                if let Ok(mut guard) = caches.map_payload.lock() {
                    *guard = Some(payload);
                }
                caches.data_available.store(true, Ordering::Release);
                caches.reading_since_connect.store(true, Ordering::Release);
            }
            DecodedEvent::StatusUpdate(status) => {
                if let Ok(mut guard) = caches.status.lock() {
                    *guard = Some(status);
                }
                caches.reading_since_connect.store(true, Ordering::Release);
            }
            DecodedEvent::ErrorUpdate(description) => {
                if let Ok(mut guard) = caches.error.lock() {
                    *guard = Some(description);
                }
            }
            DecodedEvent::Unrecognized => {
                warn!(vacuum = %vacuum_id, topic = %message.topic, "unrecognized message dropped");
            }
        }
    }

    /// Stop the demultiplexer and the session.
    pub async fn stop(&mut self) -> Result<(), MqttError> {
        if let Backend::Mqtt(session) = &mut self.backend {
            session.stop().await?;
        }
        if let Some(handle) = self.demux_handle.take() {
            handle.abort();
        }
        Ok(())
    }

    /// Read handle sharing this connector's caches and state.
    pub fn handle(&self) -> ConnectorHandle {
        ConnectorHandle {
            caches: self.caches.clone(),
            state_rx: self.state_rx.clone(),
        }
    }

    /// Publish a command payload through the backend.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), MqttError> {
        match &self.backend {
            Backend::Mqtt(session) => session.publish(topic, payload, retain).await,
            Backend::Detached { published, .. } => {
                if let Ok(mut guard) = published.lock() {
                    guard.push((topic.to_string(), payload));
                }
                Ok(())
            }
        }
    }

    /// Messages published through a detached backend, in publish order.
    /// Empty for MQTT-backed connectors.
    pub fn published_messages(&self) -> Vec<(String, Vec<u8>)> {
        match &self.backend {
            Backend::Detached { published, .. } => published
                .lock()
                .map(|guard| guard.clone())
                .unwrap_or_default(),
            Backend::Mqtt(_) => Vec::new(),
        }
    }

    /// Force the detached backend into a state, for exercising availability
    /// transitions. Leaving `Subscribed` starts a new connection generation,
    /// mirroring the live session. No-op on MQTT-backed connectors.
    pub fn set_detached_state(&self, state: ConnectionState) {
        if let Backend::Detached { state_tx, .. } = &self.backend {
            state_tx.send_modify(|status| {
                if state != ConnectionState::Subscribed {
                    status.generation += 1;
                }
                status.state = state;
            });
        }
    }

    /// State sender of a detached backend, usable after the connector has
    /// been handed off. `None` for MQTT-backed connectors.
    pub fn detached_state_sender(&self) -> Option<Arc<watch::Sender<SessionStatus>>> {
        match &self.backend {
            Backend::Detached { state_tx, .. } => Some(state_tx.clone()),
            Backend::Mqtt(_) => None,
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        if let Some(handle) = self.demux_handle.take() {
            handle.abort();
        }
    }
}
