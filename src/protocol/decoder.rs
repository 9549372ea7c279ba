//! Raw payload decoding
//!
//! `decode` is the single entry point the connector demultiplexer uses for
//! every inbound message. It never fails: anything it cannot place is
//! `Unrecognized` and silently dropped, keeping the pipeline live on a
//! malformed message.

use super::topics::TopicSuffix;
use bytes::Bytes;
use tracing::debug;

/// One decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Raw map payload; structural decoding is deferred to the map builder.
    MapUpdate(Bytes),
    /// Free-text vacuum state.
    StatusUpdate(String),
    /// Free-text error description.
    ErrorUpdate(String),
    /// Unknown topic or undecodable text payload; dropped.
    Unrecognized,
}

/// Decode a raw payload by topic suffix.
///
/// Status and error payloads must be UTF-8; invalid encoding degrades to
/// `Unrecognized` rather than raising, so one bad message never stalls the
/// session. Map payloads pass through as bytes.
pub fn decode(topic_suffix: &str, payload: &Bytes) -> DecodedEvent {
    match TopicSuffix::classify(topic_suffix) {
        Some(TopicSuffix::MapData) => DecodedEvent::MapUpdate(payload.clone()),
        Some(TopicSuffix::Status) => match std::str::from_utf8(payload) {
            Ok(text) => DecodedEvent::StatusUpdate(text.to_string()),
            Err(err) => {
                debug!(suffix = topic_suffix, %err, "dropping non-UTF-8 status payload");
                DecodedEvent::Unrecognized
            }
        },
        Some(TopicSuffix::ErrorDescription) => match std::str::from_utf8(payload) {
            Ok(text) => DecodedEvent::ErrorUpdate(text.to_string()),
            Err(err) => {
                debug!(suffix = topic_suffix, %err, "dropping non-UTF-8 error payload");
                DecodedEvent::Unrecognized
            }
        },
        None => DecodedEvent::Unrecognized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::topics::{ERROR_SUFFIX, MAP_DATA_SUFFIX, STATUS_SUFFIX};

    #[test]
    fn map_suffix_passes_bytes_through() {
        let payload = Bytes::from_static(b"\x00\x01binary");
        match decode(MAP_DATA_SUFFIX, &payload) {
            DecodedEvent::MapUpdate(bytes) => assert_eq!(bytes, payload),
            other => panic!("expected MapUpdate, got {other:?}"),
        }
    }

    #[test]
    fn status_suffix_decodes_utf8() {
        let payload = Bytes::from_static(b"cleaning");
        assert_eq!(
            decode(STATUS_SUFFIX, &payload),
            DecodedEvent::StatusUpdate("cleaning".to_string())
        );
    }

    #[test]
    fn error_suffix_decodes_utf8() {
        let payload = Bytes::from_static(b"stuck on carpet");
        assert_eq!(
            decode(ERROR_SUFFIX, &payload),
            DecodedEvent::ErrorUpdate("stuck on carpet".to_string())
        );
    }

    #[test]
    fn invalid_utf8_text_is_unrecognized_not_an_error() {
        let payload = Bytes::from_static(&[0xff, 0xfe, 0x80]);
        assert_eq!(decode(STATUS_SUFFIX, &payload), DecodedEvent::Unrecognized);
        assert_eq!(decode(ERROR_SUFFIX, &payload), DecodedEvent::Unrecognized);
    }

    #[test]
    fn unknown_suffix_is_unrecognized() {
        let payload = Bytes::from_static(b"97");
        assert_eq!(
            decode("BatteryStateAttribute/level", &payload),
            DecodedEvent::Unrecognized
        );
        assert_eq!(decode("", &payload), DecodedEvent::Unrecognized);
    }
}
