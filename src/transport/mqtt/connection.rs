//! Pure connection state management for the MQTT session
//!
//! State types, reconnect backoff math, and broker option construction.
//! Nothing here performs I/O.

use crate::config::MqttSection;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Session state for one vacuum's broker connection.
///
/// The session moves `Disconnected -> Connecting -> Subscribed`, drops back
/// to `Reconnecting` on transport loss (indefinitely), and only reaches
/// `Disconnected` again through an explicit stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or stopped (with reason).
    Disconnected(String),
    /// Connection attempt in flight.
    Connecting,
    /// Connected with the three per-vacuum subscriptions issued.
    Subscribed,
    /// Transport lost; reconnection attempt count.
    Reconnecting(u32),
}

/// Reconnection backoff configuration.
///
/// Reconnection is automatic and indefinite: there is no attempt cap, the
/// delay pattern is walked once and the sustained delay holds after that.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Backoff pattern in milliseconds.
    pub backoff_pattern: Vec<u64>,
    /// Delay to hold after the pattern is exhausted.
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![500, 1000, 2000, 5000],
            sustained_delay: 5000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay for the given attempt (1-based).
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        if self.backoff_pattern.is_empty() {
            return self.sustained_delay;
        }
        let index = (attempt.saturating_sub(1)) as usize;
        if index < self.backoff_pattern.len() {
            self.backoff_pattern[index]
        } else {
            self.sustained_delay
        }
    }
}

/// Connection state tagged with a connection generation.
///
/// The generation increases every time a new connection attempt starts.
/// Watch channels coalesce rapid transitions, so an observer that only
/// sees the latest value can still detect a drop-and-resubscribe by
/// comparing generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub generation: u64,
    pub state: ConnectionState,
}

impl SessionStatus {
    pub fn new(generation: u64, state: ConnectionState) -> Self {
        Self { generation, state }
    }

    pub fn is_subscribed(&self) -> bool {
        self.state == ConnectionState::Subscribed
    }
}

/// MQTT transport errors.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Serialization error")]
    Serialization(#[source] serde_json::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
}

/// Build rumqttc options for one vacuum's session.
///
/// Map payloads run large, so the packet size limit is raised well past the
/// broker default.
pub fn configure_mqtt_options(
    vacuum_name: &str,
    config: &MqttSection,
) -> Result<MqttOptions, MqttError> {
    let url = Url::parse(&config.broker_url)
        .map_err(|_| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(config.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    // Unique client id per connection attempt so the broker never sees a
    // duplicate-id takeover during reconnects
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let client_id = format!("vacuum-map-{vacuum_name}-{timestamp}");
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username_env) = &config.username_env {
        if let Ok(username) = std::env::var(username_env) {
            let password = config
                .password_env
                .as_ref()
                .and_then(|env_name| std::env::var(env_name).ok())
                .unwrap_or_default();
            mqtt_options.set_credentials(&username, &password);
        }
    }

    mqtt_options.set_keep_alive(Duration::from_secs(60));
    // Hypfer map payloads run far larger than typical MQTT messages
    mqtt_options.set_max_packet_size(Some(256 * 1024));

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mqtt_config() -> MqttSection {
        MqttSection {
            broker_url: "mqtt://localhost:1883".to_string(),
            username_env: None,
            password_env: None,
        }
    }

    #[test]
    fn backoff_walks_pattern_then_sustains() {
        let config = ReconnectConfig::default();
        assert_eq!(config.calculate_backoff_delay(1), 500);
        assert_eq!(config.calculate_backoff_delay(2), 1000);
        assert_eq!(config.calculate_backoff_delay(3), 2000);
        assert_eq!(config.calculate_backoff_delay(4), 5000);
        assert_eq!(config.calculate_backoff_delay(5), 5000);
        assert_eq!(config.calculate_backoff_delay(100), 5000);
    }

    #[test]
    fn empty_pattern_falls_back_to_sustained_delay() {
        let config = ReconnectConfig {
            backoff_pattern: vec![],
            sustained_delay: 750,
        };
        assert_eq!(config.calculate_backoff_delay(1), 750);
    }

    #[test]
    fn options_build_from_valid_url() {
        let options = configure_mqtt_options("tango", &test_mqtt_config());
        assert!(options.is_ok());
    }

    #[test]
    fn invalid_broker_url_is_rejected() {
        let mut config = test_mqtt_config();
        config.broker_url = "not a url".to_string();
        assert!(matches!(
            configure_mqtt_options("tango", &config),
            Err(MqttError::InvalidBrokerUrl(_))
        ));
    }

    #[test]
    fn connection_state_equality() {
        assert_eq!(ConnectionState::Subscribed, ConnectionState::Subscribed);
        assert_ne!(
            ConnectionState::Subscribed,
            ConnectionState::Reconnecting(1)
        );
        assert_eq!(
            ConnectionState::Disconnected("stopped".to_string()),
            ConnectionState::Disconnected("stopped".to_string())
        );
    }

    #[test]
    fn mqtt_error_display_is_nonempty() {
        let errors = vec![
            MqttError::ConnectionFailed("x".to_string().into()),
            MqttError::PublishFailed("x".to_string().into()),
            MqttError::SubscriptionFailed("x".to_string().into()),
            MqttError::InvalidBrokerUrl("x".to_string()),
            MqttError::NotConnected {
                state: ConnectionState::Connecting,
            },
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn session_status_distinguishes_generations() {
        let first = SessionStatus::new(1, ConnectionState::Subscribed);
        let resubscribed = SessionStatus::new(2, ConnectionState::Subscribed);
        assert!(first.is_subscribed());
        assert!(resubscribed.is_subscribed());
        // same state, different connection
        assert_ne!(first, resubscribed);
        assert_ne!(first.generation, resubscribed.generation);
    }
}
