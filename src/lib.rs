//! MQTT vacuum map service
//!
//! Ingests map, status, and error topics published by robot vacuums running
//! Valetudo-family firmware, normalizes the two firmware map layouts into
//! one snapshot model, and dispatches go-to commands back over MQTT.
//!
//! # Overview
//!
//! - Topic resolution and payload classification per vacuum base topic
//! - Map decoding for the Hypfer (Valetudo) and Rand256 payload layouts
//! - Per-vacuum MQTT sessions with automatic reconnection
//! - A coordinator exposing a pull API: snapshots, status, availability
//! - Firmware-specific go-to command construction and publishing
//!
//! # Quick Start
//!
//! ```rust
//! use mqtt_vacuum_map::protocol::{FirmwareVariant, TopicSet};
//!
//! let firmware = FirmwareVariant::classify("Valetudo 2024.08.0");
//! assert_eq!(firmware, FirmwareVariant::Hypfer);
//!
//! let topics = TopicSet::new("valetudo/tango");
//! assert_eq!(
//!     topics.go_to_command_topic(firmware),
//!     "valetudo/tango/GoToLocationCapability/go/set"
//! );
//! ```

pub mod config;
pub mod connector;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod map;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod testing;
pub mod transport;

pub use config::ServiceConfig;
pub use connector::{Connector, ConnectorHandle};
pub use coordinator::{Coordinator, StatusReading};
pub use dispatch::{CommandDispatcher, CommandRequest, Destination};
pub use error::{VacuumError, VacuumResult};
pub use map::{DecodeError, MapDataBuilder, MapSnapshot};
pub use protocol::{FirmwareVariant, TopicSet, VacuumIdentity};
pub use registry::{CommandTarget, InMemoryRegistry, VacuumRegistry};
