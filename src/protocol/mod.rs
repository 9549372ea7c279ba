//! Vacuum identity, topic layout, and payload classification
//!
//! Everything in this module is pure: no I/O, no broker state. The
//! transport and connector layers build on these functions.

pub mod decoder;
pub mod identity;
pub mod topics;

pub use decoder::{decode, DecodedEvent};
pub use identity::{FirmwareVariant, VacuumIdentity};
pub use topics::{TopicSet, TopicSuffix};
