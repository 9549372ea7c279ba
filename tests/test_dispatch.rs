//! Go-to command dispatch, end to end through the coordinator
//!
//! Verifies the exact topics and payloads each firmware family receives,
//! and that resolution failures surface before anything is published.

use mqtt_vacuum_map::connector::Connector;
use mqtt_vacuum_map::coordinator::Coordinator;
use mqtt_vacuum_map::dispatch::Destination;
use mqtt_vacuum_map::error::VacuumError;
use mqtt_vacuum_map::registry::{CommandTarget, InMemoryRegistry, VacuumRecord};
use mqtt_vacuum_map::testing::fixtures;
use serde_json::json;
use std::sync::Arc;

fn coordinator_with_both_firmwares() -> Coordinator {
    let registry = Arc::new(InMemoryRegistry::new(vec![
        fixtures::hypfer_record("tango"),
        fixtures::rand256_record("legacy"),
    ]));
    let mut coordinator = Coordinator::new(registry);

    let (hypfer, _tx) = Connector::detached(fixtures::hypfer_identity("tango"));
    coordinator.insert("tango", hypfer);
    let (rand256, _tx) = Connector::detached(fixtures::rand256_identity("legacy"));
    coordinator.insert("legacy", rand256);
    coordinator.start_all().unwrap();
    coordinator
}

#[tokio::test]
async fn hypfer_coordinates_publish_capability_command() {
    let coordinator = coordinator_with_both_firmwares();

    let request = coordinator
        .send_go_to(
            &CommandTarget::Entity("vacuum.tango".into()),
            &Destination::Coordinates { x: 100.0, y: 200.0 },
        )
        .await
        .unwrap();

    assert_eq!(request.topic, "valetudo/tango/GoToLocationCapability/go/set");
    assert_eq!(
        request.payload,
        json!({"coordinates": {"x": 100, "y": 200}})
    );

    let published = coordinator.connector("tango").unwrap().published_messages();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].0, "valetudo/tango/GoToLocationCapability/go/set");
    let payload: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
    assert_eq!(payload, json!({"coordinates": {"x": 100, "y": 200}}));
}

#[tokio::test]
async fn rand256_coordinates_publish_custom_command() {
    let coordinator = coordinator_with_both_firmwares();

    let request = coordinator
        .send_go_to(
            &CommandTarget::Entity("vacuum.legacy".into()),
            &Destination::Coordinates { x: 100.0, y: 200.0 },
        )
        .await
        .unwrap();

    assert_eq!(request.topic, "rand256/legacy/custom_command");
    assert_eq!(
        request.payload,
        json!({"command": "go_to", "spot_coordinates": {"x": 100, "y": 200}})
    );
    assert_eq!(
        coordinator.connector("legacy").unwrap().published_messages().len(),
        1
    );
}

#[tokio::test]
async fn rand256_spot_publishes_spot_id() {
    let coordinator = coordinator_with_both_firmwares();

    let request = coordinator
        .send_go_to(
            &CommandTarget::Entity("vacuum.legacy".into()),
            &Destination::Spot("kitchen".into()),
        )
        .await
        .unwrap();

    assert_eq!(
        request.payload,
        json!({"command": "go_to", "spot_id": "kitchen"})
    );
}

#[tokio::test]
async fn hypfer_spot_is_rejected_without_publishing() {
    let coordinator = coordinator_with_both_firmwares();

    let err = coordinator
        .send_go_to(
            &CommandTarget::Entity("vacuum.tango".into()),
            &Destination::Spot("kitchen".into()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, VacuumError::UnsupportedFirmware { .. }));
    assert!(coordinator
        .connector("tango")
        .unwrap()
        .published_messages()
        .is_empty());
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let coordinator = coordinator_with_both_firmwares();

    let err = coordinator
        .send_go_to(
            &CommandTarget::Entity("vacuum.ghost".into()),
            &Destination::Coordinates { x: 0.0, y: 0.0 },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VacuumError::NotFound(_)));
}

#[tokio::test]
async fn device_target_resolves_single_entity() {
    let coordinator = coordinator_with_both_firmwares();

    let request = coordinator
        .send_go_to(
            &CommandTarget::Device("dev-tango".into()),
            &Destination::Coordinates { x: 10.0, y: 20.0 },
        )
        .await
        .unwrap();
    assert_eq!(request.identity.entity_id, "vacuum.tango");
}

#[tokio::test]
async fn ambiguous_device_target_is_rejected() {
    let twin = |name: &str| VacuumRecord {
        name: name.to_string(),
        entity_id: format!("vacuum.{name}"),
        device_id: "dev-twin".to_string(),
        base_topic: format!("valetudo/{name}"),
        software_version: "Valetudo 2024.08.0".to_string(),
    };
    let registry = Arc::new(InMemoryRegistry::new(vec![twin("twin-a"), twin("twin-b")]));
    let coordinator = Coordinator::new(registry);

    let err = coordinator
        .send_go_to(
            &CommandTarget::Device("dev-twin".into()),
            &Destination::Coordinates { x: 0.0, y: 0.0 },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, VacuumError::AmbiguousTarget { count: 2, .. }));
}
