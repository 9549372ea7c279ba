//! Broker transport layer
//!
//! The broker client's callback-style delivery is turned into an explicit
//! message channel: the MQTT session is the producer, the connector's
//! demultiplexer is the consumer. Ordering per topic follows channel order.

use bytes::Bytes;
use chrono::{DateTime, Utc};

pub mod mqtt;

/// One raw inbound broker message.
///
/// Transient: owned by the connector until handed to the decoder, never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Full topic the message arrived on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Bytes,
    /// Receive timestamp.
    pub received_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}
