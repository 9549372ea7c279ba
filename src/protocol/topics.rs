//! Per-vacuum MQTT topic layout
//!
//! Each vacuum publishes on exactly three topics under its base topic, and
//! accepts go-to commands on a firmware-specific topic. All construction
//! and classification here is pure string work.

use super::identity::FirmwareVariant;

/// Suffix of the binary map payload topic.
pub const MAP_DATA_SUFFIX: &str = "MapData/map-data-hass";
/// Suffix of the textual status topic.
pub const STATUS_SUFFIX: &str = "StatusStateAttribute/status";
/// Suffix of the textual error-description topic.
pub const ERROR_SUFFIX: &str = "StatusStateAttribute/error_description";

/// The three recognized per-vacuum topic suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicSuffix {
    MapData,
    Status,
    ErrorDescription,
}

impl TopicSuffix {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicSuffix::MapData => MAP_DATA_SUFFIX,
            TopicSuffix::Status => STATUS_SUFFIX,
            TopicSuffix::ErrorDescription => ERROR_SUFFIX,
        }
    }

    /// Classify a raw suffix string. Unknown suffixes return `None` and are
    /// dropped by the caller.
    pub fn classify(suffix: &str) -> Option<Self> {
        match suffix {
            MAP_DATA_SUFFIX => Some(TopicSuffix::MapData),
            STATUS_SUFFIX => Some(TopicSuffix::Status),
            ERROR_SUFFIX => Some(TopicSuffix::ErrorDescription),
            _ => None,
        }
    }
}

/// Topic set for one vacuum, derived from its base topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    base: String,
}

impl TopicSet {
    pub fn new(base_topic: impl Into<String>) -> Self {
        let mut base: String = base_topic.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// The exact three topics the connector subscribes to.
    pub fn subscriptions(&self) -> [String; 3] {
        [
            self.full_topic(TopicSuffix::MapData),
            self.full_topic(TopicSuffix::Status),
            self.full_topic(TopicSuffix::ErrorDescription),
        ]
    }

    pub fn full_topic(&self, suffix: TopicSuffix) -> String {
        format!("{}/{}", self.base, suffix.as_str())
    }

    /// Strip the base from a full topic, returning the raw suffix.
    ///
    /// Returns `None` for topics outside this vacuum's base.
    pub fn suffix_of<'a>(&self, full_topic: &'a str) -> Option<&'a str> {
        full_topic
            .strip_prefix(self.base.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Go-to command topic for the given firmware family.
    pub fn go_to_command_topic(&self, firmware: FirmwareVariant) -> String {
        match firmware {
            FirmwareVariant::Hypfer => format!("{}/GoToLocationCapability/go/set", self.base),
            FirmwareVariant::Rand256 => format!("{}/custom_command", self.base),
        }
    }
}

/// Append a base topic to a set of suffixes, optionally adding one extra
/// full topic. Order of the suffixes is preserved.
pub fn build_full_topic_set(
    base_topic: &str,
    suffixes: &[&str],
    add_topic: Option<&str>,
) -> Vec<String> {
    let mut topics: Vec<String> = suffixes
        .iter()
        .map(|suffix| format!("{base_topic}/{suffix}"))
        .collect();
    if let Some(extra) = add_topic {
        topics.push(extra.to_string());
    }
    topics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriptions_cover_exactly_three_topics() {
        let topics = TopicSet::new("valetudo/tango");
        assert_eq!(
            topics.subscriptions(),
            [
                "valetudo/tango/MapData/map-data-hass".to_string(),
                "valetudo/tango/StatusStateAttribute/status".to_string(),
                "valetudo/tango/StatusStateAttribute/error_description".to_string(),
            ]
        );
    }

    #[test]
    fn trailing_slash_is_normalized() {
        let topics = TopicSet::new("valetudo/tango/");
        assert_eq!(topics.base(), "valetudo/tango");
    }

    #[test]
    fn suffix_of_strips_base() {
        let topics = TopicSet::new("valetudo/tango");
        assert_eq!(
            topics.suffix_of("valetudo/tango/StatusStateAttribute/status"),
            Some("StatusStateAttribute/status")
        );
        assert_eq!(topics.suffix_of("valetudo/other/status"), None);
        assert_eq!(topics.suffix_of("valetudo/tango"), None);
    }

    #[test]
    fn suffix_classification() {
        assert_eq!(
            TopicSuffix::classify("MapData/map-data-hass"),
            Some(TopicSuffix::MapData)
        );
        assert_eq!(
            TopicSuffix::classify("StatusStateAttribute/status"),
            Some(TopicSuffix::Status)
        );
        assert_eq!(
            TopicSuffix::classify("StatusStateAttribute/error_description"),
            Some(TopicSuffix::ErrorDescription)
        );
        assert_eq!(TopicSuffix::classify("BatteryStateAttribute/level"), None);
    }

    #[test]
    fn go_to_topics_per_firmware() {
        let topics = TopicSet::new("tango");
        assert_eq!(
            topics.go_to_command_topic(FirmwareVariant::Hypfer),
            "tango/GoToLocationCapability/go/set"
        );
        assert_eq!(
            topics.go_to_command_topic(FirmwareVariant::Rand256),
            "tango/custom_command"
        );
    }

    #[test]
    fn full_topic_set_appends_optional_extra() {
        let topics = build_full_topic_set(
            "valetudo/tango",
            &[STATUS_SUFFIX, ERROR_SUFFIX],
            Some("valetudo/tango/custom_command"),
        );
        assert_eq!(
            topics,
            vec![
                "valetudo/tango/StatusStateAttribute/status",
                "valetudo/tango/StatusStateAttribute/error_description",
                "valetudo/tango/custom_command",
            ]
        );
    }
}
