//! Impure MQTT session for one vacuum
//!
//! Owns the rumqttc event loop and its reconnection supervisor. Inbound
//! publishes are forwarded as [`RawMessage`] over a channel; the session
//! never interprets payloads.

use super::connection::{
    configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig, SessionStatus,
};
use super::router::{route_mqtt_event, EventRoute};
use crate::config::MqttSection;
use crate::protocol::TopicSet;
use crate::transport::RawMessage;
use rumqttc::v5::mqttbytes::v5::PublishProperties;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, EventLoop};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// MQTT session for a single vacuum.
///
/// One session per vacuum: each gets its own client, its own event loop
/// task, and its own subscription set. A broker outage on one vacuum's
/// session never stalls another's.
pub struct MqttSession {
    vacuum_name: String,
    topics: TopicSet,
    client: Arc<Mutex<AsyncClient>>,
    event_loop: std::sync::Mutex<Option<EventLoop>>,
    config: MqttSection,
    supervisor_handle: Option<JoinHandle<()>>,
    state_tx: watch::Sender<SessionStatus>,
    state_rx: watch::Receiver<SessionStatus>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reconnect_config: ReconnectConfig,
    message_tx: mpsc::Sender<RawMessage>,
}

impl MqttSession {
    /// Create a session. No I/O happens until [`start`](Self::start).
    pub fn new(
        vacuum_name: &str,
        topics: TopicSet,
        config: MqttSection,
        message_tx: mpsc::Sender<RawMessage>,
    ) -> Result<Self, MqttError> {
        let mqtt_options = configure_mqtt_options(vacuum_name, &config)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (state_tx, state_rx) = watch::channel(SessionStatus::new(
            0,
            ConnectionState::Disconnected("not started".to_string()),
        ));

        Ok(Self {
            vacuum_name: vacuum_name.to_string(),
            topics,
            client: Arc::new(Mutex::new(client)),
            event_loop: std::sync::Mutex::new(Some(event_loop)),
            config,
            supervisor_handle: None,
            state_tx,
            state_rx,
            shutdown_tx: None,
            reconnect_config: ReconnectConfig::default(),
            message_tx,
        })
    }

    fn create_connection(
        vacuum_name: &str,
        config: &MqttSection,
    ) -> Result<(AsyncClient, EventLoop), MqttError> {
        let mqtt_options = configure_mqtt_options(vacuum_name, config)?;
        Ok(AsyncClient::new(mqtt_options, 10))
    }

    /// Start the event loop supervisor. Idempotent: a second call while
    /// running is a no-op.
    pub fn start(&mut self) -> Result<(), MqttError> {
        if self.supervisor_handle.is_some() {
            return Ok(());
        }

        let event_loop = match self.event_loop.get_mut().ok().and_then(|slot| slot.take()) {
            Some(event_loop) => event_loop,
            None => {
                // A previous run consumed the loop; build a fresh connection
                let (client, event_loop) =
                    Self::create_connection(&self.vacuum_name, &self.config)?;
                // Nothing holds the client lock while the supervisor is down
                if let Ok(mut guard) = self.client.try_lock() {
                    *guard = client;
                }
                event_loop
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);
        // Each connection attempt gets a fresh generation so observers can
        // tell a resubscribe apart from an uninterrupted subscription
        self.state_tx.send_modify(|status| {
            status.generation += 1;
            status.state = ConnectionState::Connecting;
        });

        let handle = tokio::spawn(Self::run_supervisor(
            self.vacuum_name.clone(),
            self.topics.clone(),
            self.config.clone(),
            self.client.clone(),
            event_loop,
            self.state_tx.clone(),
            shutdown_rx,
            self.reconnect_config.clone(),
            self.message_tx.clone(),
        ));
        self.supervisor_handle = Some(handle);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_supervisor(
        vacuum_name: String,
        topics: TopicSet,
        config: MqttSection,
        shared_client: Arc<Mutex<AsyncClient>>,
        mut event_loop: EventLoop,
        state_tx: watch::Sender<SessionStatus>,
        mut shutdown_rx: watch::Receiver<bool>,
        reconnect_config: ReconnectConfig,
        message_tx: mpsc::Sender<RawMessage>,
    ) {
        info!(vacuum = %vacuum_name, "starting MQTT session supervisor");
        let mut reconnect_attempts = 0u32;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(vacuum = %vacuum_name, "shutdown signal received, stopping supervisor");
                        break;
                    }
                }

                event_result = event_loop.poll() => {
                    match event_result {
                        Ok(event) => {
                            let keep_going = Self::process_event_route(
                                route_mqtt_event(&event),
                                &vacuum_name,
                                &topics,
                                &config,
                                &shared_client,
                                &mut event_loop,
                                &state_tx,
                                shutdown_rx.clone(),
                                &reconnect_config,
                                &mut reconnect_attempts,
                                &message_tx,
                            ).await;
                            if !keep_going {
                                break;
                            }
                        }
                        Err(e) => {
                            error!(vacuum = %vacuum_name, error = %e, "MQTT event loop error");
                            let keep_going = Self::attempt_reconnection(
                                &vacuum_name,
                                &config,
                                &shared_client,
                                &mut event_loop,
                                &state_tx,
                                shutdown_rx.clone(),
                                &reconnect_config,
                                &mut reconnect_attempts,
                            ).await;
                            if !keep_going {
                                break;
                            }
                        }
                    }
                }
            }
        }
        info!(vacuum = %vacuum_name, "MQTT session supervisor stopped");
    }

    /// Returns false when the supervisor should stop.
    #[allow(clippy::too_many_arguments)]
    async fn process_event_route(
        route: EventRoute,
        vacuum_name: &str,
        topics: &TopicSet,
        config: &MqttSection,
        shared_client: &Arc<Mutex<AsyncClient>>,
        event_loop: &mut EventLoop,
        state_tx: &watch::Sender<SessionStatus>,
        shutdown_rx: watch::Receiver<bool>,
        reconnect_config: &ReconnectConfig,
        reconnect_attempts: &mut u32,
        message_tx: &mpsc::Sender<RawMessage>,
    ) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                *reconnect_attempts = 0;
                if let Err(e) = Self::subscribe_all(shared_client, topics, vacuum_name).await {
                    error!(vacuum = %vacuum_name, error = %e, "resubscription failed");
                    return Self::attempt_reconnection(
                        vacuum_name,
                        config,
                        shared_client,
                        event_loop,
                        state_tx,
                        shutdown_rx,
                        reconnect_config,
                        reconnect_attempts,
                    )
                    .await;
                }
                state_tx.send_modify(|status| status.state = ConnectionState::Subscribed);
                true
            }
            EventRoute::MessageReceived { topic, payload, retain } => {
                // Retained messages are delivered too: vacuum status topics
                // are published retained and seed the caches on connect
                debug!(
                    vacuum = %vacuum_name,
                    topic = %topic,
                    bytes = payload.len(),
                    retain,
                    "received MQTT message"
                );
                if message_tx.send(RawMessage::new(topic, payload)).await.is_err() {
                    warn!(vacuum = %vacuum_name, "message channel closed, stopping supervisor");
                    return false;
                }
                true
            }
            EventRoute::Disconnected => {
                warn!(vacuum = %vacuum_name, "broker closed the connection");
                Self::attempt_reconnection(
                    vacuum_name,
                    config,
                    shared_client,
                    event_loop,
                    state_tx,
                    shutdown_rx,
                    reconnect_config,
                    reconnect_attempts,
                )
                .await
            }
            EventRoute::SubscriptionConfirmed { packet_id } => {
                debug!(vacuum = %vacuum_name, packet_id, "subscription confirmed");
                true
            }
            EventRoute::InfrastructureEvent(event_str) => {
                debug!(vacuum = %vacuum_name, event = %event_str, "MQTT event");
                true
            }
            EventRoute::OutgoingEvent => true,
        }
    }

    async fn subscribe_all(
        client: &Arc<Mutex<AsyncClient>>,
        topics: &TopicSet,
        vacuum_name: &str,
    ) -> Result<(), MqttError> {
        let client_guard = client.lock().await;
        for topic in topics.subscriptions() {
            client_guard
                .subscribe(&topic, QoS::AtLeastOnce)
                .await
                .map_err(|e| MqttError::SubscriptionFailed(Box::new(e)))?;
            debug!(vacuum = %vacuum_name, topic = %topic, "subscribed");
        }
        Ok(())
    }

    /// Sleep that aborts early on shutdown. Returns false when shutdown was
    /// requested.
    async fn interruptible_sleep(mut shutdown_rx: watch::Receiver<bool>, delay_ms: u64) -> bool {
        tokio::select! {
            _ = shutdown_rx.changed() => !*shutdown_rx.borrow(),
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => true,
        }
    }

    /// Back off, rebuild the client and event loop, and resume polling.
    /// Retries indefinitely; returns false only when shutdown interrupts.
    #[allow(clippy::too_many_arguments)]
    async fn attempt_reconnection(
        vacuum_name: &str,
        config: &MqttSection,
        shared_client: &Arc<Mutex<AsyncClient>>,
        event_loop: &mut EventLoop,
        state_tx: &watch::Sender<SessionStatus>,
        shutdown_rx: watch::Receiver<bool>,
        reconnect_config: &ReconnectConfig,
        reconnect_attempts: &mut u32,
    ) -> bool {
        if *shutdown_rx.borrow() {
            return false;
        }

        *reconnect_attempts += 1;
        let attempt = *reconnect_attempts;
        let delay_ms = reconnect_config.calculate_backoff_delay(attempt);
        state_tx.send_modify(|status| {
            status.generation += 1;
            status.state = ConnectionState::Reconnecting(attempt);
        });
        info!(vacuum = %vacuum_name, attempt, delay_ms, "attempting reconnection");

        if !Self::interruptible_sleep(shutdown_rx.clone(), delay_ms).await {
            return false;
        }
        if *shutdown_rx.borrow() {
            return false;
        }

        match Self::create_connection(vacuum_name, config) {
            Ok((new_client, new_event_loop)) => {
                *event_loop = new_event_loop;
                *shared_client.lock().await = new_client;
                state_tx.send_modify(|status| status.state = ConnectionState::Connecting);
            }
            Err(e) => {
                // Options rebuild failed; keep the old loop and retry on the
                // next poll error
                error!(vacuum = %vacuum_name, error = %e, "failed to rebuild connection");
            }
        }
        true
    }

    /// Stop the supervisor and disconnect. Safe to call when never started.
    pub async fn stop(&mut self) -> Result<(), MqttError> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        let mut disconnect_result = Ok(());
        if self.is_subscribed() {
            let client = self.client.lock().await;
            for topic in self.topics.subscriptions() {
                let _ = client.unsubscribe(&topic).await;
            }
            disconnect_result = client
                .disconnect()
                .await
                .map_err(|e| MqttError::ConnectionFailed(Box::new(e)));
        }

        if let Some(handle) = self.supervisor_handle.take() {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => info!(vacuum = %self.vacuum_name, "session shut down cleanly"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!(vacuum = %self.vacuum_name, error = %e, "supervisor task ended with error");
                }
                Err(_) => {
                    warn!(vacuum = %self.vacuum_name, "supervisor did not stop in time, aborting");
                }
                _ => {}
            }
        }

        self.shutdown_tx = None;
        self.state_tx
            .send_modify(|status| status.state = ConnectionState::Disconnected("stopped".to_string()));
        disconnect_result
    }

    /// Publish a command payload. Guarded: publishing while not subscribed
    /// is an error rather than a silent queue.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        retain: bool,
    ) -> Result<(), MqttError> {
        let state = self.state();
        if state != ConnectionState::Subscribed {
            return Err(MqttError::NotConnected { state });
        }

        let client = self.client.lock().await;
        client
            .publish_with_properties(
                topic,
                QoS::AtLeastOnce,
                retain,
                payload,
                PublishProperties::default(),
            )
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(vacuum = %self.vacuum_name, topic = %topic, "published command");
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().state.clone()
    }

    pub fn is_subscribed(&self) -> bool {
        self.state_rx.borrow().is_subscribed()
    }

    /// Watch receiver for generation-tagged state transitions.
    pub fn state_receiver(&self) -> watch::Receiver<SessionStatus> {
        self.state_rx.clone()
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.supervisor_handle.take() {
            handle.abort();
        }
    }
}
