//! Vacuum identity and firmware classification
//!
//! A vacuum is addressed three ways: by host entity id, by host device id,
//! and by its MQTT base topic. The firmware family is classified once from
//! the device's reported software version and never re-derived on the hot
//! path.

use serde::{Deserialize, Serialize};

/// Supported vacuum firmware families.
///
/// The two families publish different map payload layouts and accept
/// different command payloads, so the variant drives a `match` in the map
/// builder and the command dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareVariant {
    /// Modern streaming-map firmware (Valetudo).
    Hypfer,
    /// Legacy Rand256 firmware.
    Rand256,
}

impl FirmwareVariant {
    /// Classify the firmware family from a reported software-version string.
    ///
    /// A version beginning with `valetudo` (case-insensitive) is Hypfer;
    /// anything else is Rand256. There is deliberately no "unknown" state:
    /// Rand256 is the catch-all for every non-Valetudo version string.
    pub fn classify(software_version: &str) -> Self {
        if software_version.to_lowercase().starts_with("valetudo") {
            FirmwareVariant::Hypfer
        } else {
            FirmwareVariant::Rand256
        }
    }
}

/// Resolved identity of one registered vacuum.
///
/// Immutable once resolved; re-resolved only when the host configuration
/// changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VacuumIdentity {
    /// Host entity identifier (e.g. `vacuum.tango`).
    pub entity_id: String,
    /// Host device identifier.
    pub device_id: String,
    /// Firmware family, classified from the software version.
    pub firmware: FirmwareVariant,
    /// MQTT base topic the vacuum publishes under (no trailing slash).
    pub base_topic: String,
}

impl VacuumIdentity {
    /// Unique id derived from the base topic: second segment, lowercased.
    ///
    /// Falls back to the whole topic when it has a single segment.
    pub fn unique_id(&self) -> String {
        vacuum_unique_id(&self.base_topic)
    }
}

/// Compute the unique id for a vacuum from its MQTT base topic.
pub fn vacuum_unique_id(base_topic: &str) -> String {
    base_topic
        .split('/')
        .nth(1)
        .unwrap_or(base_topic)
        .to_lowercase()
}

/// Derive the base topic from a full subscription topic by stripping the
/// last segment. `valetudo/tango/StatusStateAttribute/status` becomes
/// `valetudo/tango/StatusStateAttribute`.
pub fn base_topic_from_subscription(full_topic: &str) -> String {
    match full_topic.rsplit_once('/') {
        Some((base, _)) => base.to_string(),
        None => full_topic.to_string(),
    }
}
