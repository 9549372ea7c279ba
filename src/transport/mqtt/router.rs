//! Pure routing of rumqttc events
//!
//! The session's supervisor loop matches on [`EventRoute`] instead of raw
//! rumqttc packets, which keeps the routing decision testable without a
//! broker.

use bytes::Bytes;
use rumqttc::v5::Event;

/// Routing decision for one MQTT event.
#[derive(Debug, Clone)]
pub enum EventRoute {
    /// ConnAck received; subscriptions can be (re)issued.
    ConnectionAcknowledged,
    /// Message received on a subscribed topic.
    MessageReceived {
        topic: String,
        payload: Bytes,
        retain: bool,
    },
    /// Broker closed the connection.
    Disconnected,
    /// Subscription confirmed.
    SubscriptionConfirmed { packet_id: u16 },
    /// Other incoming packets (PingResp etc.).
    InfrastructureEvent(String),
    /// Outgoing side of the event loop; nothing to do.
    OutgoingEvent,
}

/// Classify one rumqttc event.
pub fn route_mqtt_event(event: &Event) -> EventRoute {
    match event {
        Event::Incoming(incoming) => {
            use rumqttc::v5::mqttbytes::v5::Packet;
            match incoming {
                Packet::ConnAck(_) => EventRoute::ConnectionAcknowledged,
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retain: publish.retain,
                },
                Packet::Disconnect(_) => EventRoute::Disconnected,
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                },
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            }
        }
        Event::Outgoing(_) => EventRoute::OutgoingEvent,
    }
}
