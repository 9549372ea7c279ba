//! Go-to command construction and firmware-specific payload shaping
//!
//! Dispatch resolves the target to one vacuum, then builds the topic and
//! JSON payload for that vacuum's firmware family. Building is pure; the
//! coordinator performs the actual publish.

use crate::error::{VacuumError, VacuumResult};
use crate::protocol::{FirmwareVariant, TopicSet, VacuumIdentity};
use crate::registry::{resolve_identity, CommandTarget, VacuumRegistry};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

/// Where to send the vacuum.
#[derive(Debug, Clone, PartialEq)]
pub enum Destination {
    /// Map coordinates in the vacuum's own coordinate space.
    Coordinates { x: f64, y: f64 },
    /// Named spot, available on Rand256 firmware only.
    Spot(String),
}

/// A fully shaped command, ready to publish.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub identity: VacuumIdentity,
    pub topic: String,
    pub payload: serde_json::Value,
}

/// Builds go-to commands against the registry.
pub struct CommandDispatcher {
    registry: Arc<dyn VacuumRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<dyn VacuumRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve the target and shape the go-to command for its firmware.
    ///
    /// Coordinates are truncated to integers: both firmware families
    /// reject fractional map positions.
    pub fn go_to(
        &self,
        target: &CommandTarget,
        destination: &Destination,
    ) -> VacuumResult<CommandRequest> {
        let identity = resolve_identity(self.registry.as_ref(), target)?;
        let topics = TopicSet::new(&identity.base_topic);
        let topic = topics.go_to_command_topic(identity.firmware);

        let payload = match (identity.firmware, destination) {
            (FirmwareVariant::Hypfer, Destination::Coordinates { x, y }) => {
                json!({
                    "coordinates": {
                        "x": *x as i64,
                        "y": *y as i64,
                    }
                })
            }
            (FirmwareVariant::Hypfer, Destination::Spot(name)) => {
                return Err(VacuumError::unsupported_firmware(
                    identity.firmware,
                    format!("named spot \"{name}\" requires Rand256 firmware"),
                ));
            }
            (FirmwareVariant::Rand256, Destination::Coordinates { x, y }) => {
                json!({
                    "command": "go_to",
                    "spot_coordinates": {
                        "x": *x as i64,
                        "y": *y as i64,
                    }
                })
            }
            (FirmwareVariant::Rand256, Destination::Spot(name)) => {
                json!({
                    "command": "go_to",
                    "spot_id": name,
                })
            }
        };

        debug!(
            entity_id = %identity.entity_id,
            firmware = ?identity.firmware,
            topic = %topic,
            "built go-to command"
        );

        Ok(CommandRequest {
            identity,
            topic,
            payload,
        })
    }
}
