//! MQTT session management built on rumqttc
//!
//! `connection` and `router` are pure: state types, backoff math, option
//! building, and event classification. `session` owns the impure event
//! loop and its reconnection supervisor.

pub mod connection;
pub mod router;
pub mod session;

pub use connection::{
    configure_mqtt_options, ConnectionState, MqttError, ReconnectConfig, SessionStatus,
};
pub use router::{route_mqtt_event, EventRoute};
pub use session::MqttSession;
