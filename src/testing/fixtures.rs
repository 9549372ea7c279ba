//! Shared fixtures for unit and integration tests

use crate::protocol::{FirmwareVariant, VacuumIdentity};
use crate::registry::VacuumRecord;
use bytes::Bytes;
use serde_json::json;

/// Identity for a Hypfer (Valetudo) vacuum on `valetudo/{name}`.
pub fn hypfer_identity(name: &str) -> VacuumIdentity {
    VacuumIdentity {
        entity_id: format!("vacuum.{name}"),
        device_id: format!("dev-{name}"),
        firmware: FirmwareVariant::Hypfer,
        base_topic: format!("valetudo/{name}"),
    }
}

/// Identity for a Rand256 vacuum on `rand256/{name}`.
pub fn rand256_identity(name: &str) -> VacuumIdentity {
    VacuumIdentity {
        entity_id: format!("vacuum.{name}"),
        device_id: format!("dev-{name}"),
        firmware: FirmwareVariant::Rand256,
        base_topic: format!("rand256/{name}"),
    }
}

/// Registry record matching [`hypfer_identity`].
pub fn hypfer_record(name: &str) -> VacuumRecord {
    VacuumRecord {
        name: name.to_string(),
        entity_id: format!("vacuum.{name}"),
        device_id: format!("dev-{name}"),
        base_topic: format!("valetudo/{name}"),
        software_version: "Valetudo 2024.08.0".to_string(),
    }
}

/// Registry record matching [`rand256_identity`].
pub fn rand256_record(name: &str) -> VacuumRecord {
    VacuumRecord {
        name: name.to_string(),
        entity_id: format!("vacuum.{name}"),
        device_id: format!("dev-{name}"),
        base_topic: format!("rand256/{name}"),
        software_version: "3.5.8_1234".to_string(),
    }
}

/// Minimal valid Hypfer map payload with one segment, a robot pose, a
/// charger, and a two-point path.
pub fn hypfer_map_payload() -> Bytes {
    let value = json!({
        "metaData": {"version": 1},
        "size": {"x": 5000, "y": 5000},
        "pixelSize": 5,
        "layers": [
            {
                "type": "segment",
                "metaData": {"segmentId": "7", "name": "Kitchen"},
                "dimensions": {
                    "x": {"min": 100, "max": 200},
                    "y": {"min": 150, "max": 250}
                }
            }
        ],
        "entities": [
            {
                "type": "robot_position",
                "points": [2560, 2560],
                "metaData": {"angle": 90}
            },
            {"type": "charger_location", "points": [2500, 2500]},
            {"type": "path", "points": [2560, 2560, 2600, 2600]}
        ]
    });
    Bytes::from(serde_json::to_vec(&value).unwrap_or_default())
}

/// Minimal valid Rand256 parsed-map payload.
pub fn rand256_map_payload() -> Bytes {
    let value = json!({
        "image": {
            "dimensions": {"width": 1024, "height": 1024},
            "segments": {
                "id": [16, 17],
                "names": {"16": "Kitchen", "17": "Hallway"}
            }
        },
        "robot": [25600, 25600],
        "robot_angle": 180,
        "charger": [25000, 25000],
        "path": {"points": [[25600, 25600], [25700, 25700]]},
        "currently_cleaned_zones": [],
        "no_go_areas": [],
        "virtual_walls": []
    });
    Bytes::from(serde_json::to_vec(&value).unwrap_or_default())
}
