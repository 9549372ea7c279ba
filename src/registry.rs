//! Registered-vacuum lookups and identity resolution
//!
//! The host platform's entity/device registries are modeled as an injected
//! capability so the core runs and tests without a live host environment.
//! Resolution is the only place firmware classification happens.

use crate::config::ServiceConfig;
use crate::error::{VacuumError, VacuumResult};
use crate::protocol::{FirmwareVariant, VacuumIdentity};
use tracing::debug;

/// Raw registration data for one vacuum, before identity resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VacuumRecord {
    pub name: String,
    pub entity_id: String,
    pub device_id: String,
    pub base_topic: String,
    pub software_version: String,
}

/// Target of a lookup or a command: a host entity id or a device id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandTarget {
    Entity(String),
    Device(String),
}

impl CommandTarget {
    fn describe(&self) -> &str {
        match self {
            CommandTarget::Entity(id) | CommandTarget::Device(id) => id,
        }
    }
}

/// Injected registry capability. Lookups return found or not-found, never
/// partial results.
pub trait VacuumRegistry: Send + Sync {
    /// Record for an entity id, if registered.
    fn record_for_entity(&self, entity_id: &str) -> Option<VacuumRecord>;

    /// All vacuum records registered under a device id. A device may carry
    /// more than one vacuum entity; callers decide the ambiguity policy.
    fn records_for_device(&self, device_id: &str) -> Vec<VacuumRecord>;

    /// Every registered record.
    fn all_records(&self) -> Vec<VacuumRecord>;
}

/// In-memory registry built from the service configuration.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    records: Vec<VacuumRecord>,
}

impl InMemoryRegistry {
    pub fn new(records: Vec<VacuumRecord>) -> Self {
        Self { records }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let records = config
            .vacuums
            .iter()
            .map(|vacuum| VacuumRecord {
                name: vacuum.name.clone(),
                entity_id: vacuum.entity_id.clone(),
                device_id: vacuum.device_id.clone(),
                base_topic: vacuum.base_topic.clone(),
                software_version: vacuum.software_version.clone(),
            })
            .collect();
        Self { records }
    }
}

impl VacuumRegistry for InMemoryRegistry {
    fn record_for_entity(&self, entity_id: &str) -> Option<VacuumRecord> {
        self.records
            .iter()
            .find(|record| record.entity_id == entity_id)
            .cloned()
    }

    fn records_for_device(&self, device_id: &str) -> Vec<VacuumRecord> {
        self.records
            .iter()
            .filter(|record| record.device_id == device_id)
            .cloned()
            .collect()
    }

    fn all_records(&self) -> Vec<VacuumRecord> {
        self.records.clone()
    }
}

/// Resolve a target to exactly one [`VacuumIdentity`].
///
/// A device id mapping to more than one vacuum entity is rejected as
/// `AmbiguousTarget` rather than resolved by silent first-match.
pub fn resolve_identity(
    registry: &dyn VacuumRegistry,
    target: &CommandTarget,
) -> VacuumResult<VacuumIdentity> {
    let record = match target {
        CommandTarget::Entity(entity_id) => registry
            .record_for_entity(entity_id)
            .ok_or_else(|| VacuumError::not_found(entity_id.clone()))?,
        CommandTarget::Device(device_id) => {
            let mut records = registry.records_for_device(device_id);
            match records.len() {
                0 => return Err(VacuumError::not_found(device_id.clone())),
                1 => records.remove(0),
                count => {
                    return Err(VacuumError::AmbiguousTarget {
                        device_id: device_id.clone(),
                        count,
                    })
                }
            }
        }
    };

    let identity = identity_from_record(&record);
    debug!(
        target = target.describe(),
        entity_id = %identity.entity_id,
        firmware = ?identity.firmware,
        base_topic = %identity.base_topic,
        "resolved vacuum identity"
    );
    Ok(identity)
}

/// Build an identity from a record, classifying the firmware family.
pub fn identity_from_record(record: &VacuumRecord) -> VacuumIdentity {
    VacuumIdentity {
        entity_id: record.entity_id.clone(),
        device_id: record.device_id.clone(),
        firmware: FirmwareVariant::classify(&record.software_version),
        base_topic: record.base_topic.clone(),
    }
}
