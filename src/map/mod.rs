//! Structured map model
//!
//! The builder normalizes the two firmware map layouts into one immutable
//! [`MapSnapshot`] value. Snapshots are replaced whole, never mutated.

pub mod builder;
pub mod snapshot;

pub use builder::{DecodeError, MapDataBuilder};
pub use snapshot::{
    CalibrationPoint, ImageSize, MapSnapshot, Point, RobotPose, Room, Zone, ZoneKind,
};

/// Injected store of user-assigned room display names.
///
/// The store itself (file, database, host registry) lives outside this
/// crate; the decode path only consults it to override the names carried
/// in the map payload.
pub trait RoomNameStore: Send + Sync {
    /// Display-name override for a segment of one vacuum, if the user has
    /// assigned one.
    fn room_name(&self, vacuum_id: &str, segment_id: &str) -> Option<String>;
}
