//! Immutable map snapshot value types
//!
//! All coordinates are integers in the vacuum's native map-pixel space;
//! unit conversion is the renderer's job, not ours.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point in native map-pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Robot position and heading. Absent when the firmware has not reported
/// a position yet (valid, not an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RobotPose {
    pub x: i32,
    pub y: i32,
    /// Heading in degrees.
    pub angle: i32,
}

/// Pixel dimensions of the map image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Zone kinds, in the order the renderer layers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Clean,
    NoGo,
    VirtualWall,
}

/// One zone polygon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub outline: Vec<Point>,
}

/// One named room (segment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Firmware-assigned segment id, kept verbatim.
    pub id: String,
    /// Display name from segment metadata, or a generated fallback.
    pub name: String,
    /// Bounding outline of the segment in map pixels.
    pub outline: Vec<Point>,
    /// Index into the renderer's room palette.
    pub color_index: u8,
}

/// Correspondence between a map pixel and the vacuum's coordinate space,
/// used by consumers to calibrate overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub map: Point,
    pub vacuum: Point,
}

/// One internally consistent view of the vacuum's map at a point in time.
///
/// A snapshot is constructed whole by the map builder and replaced whole
/// by the coordinator; rooms, zones, and poses always belong to the same
/// decode generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSnapshot {
    pub rooms: Vec<Room>,
    pub zones: Vec<Zone>,
    pub robot: Option<RobotPose>,
    pub charger: Option<Point>,
    pub path: Vec<Point>,
    pub image: ImageSize,
    pub calibration: Vec<CalibrationPoint>,
    pub generated_at: DateTime<Utc>,
}

impl MapSnapshot {
    /// Zones of one kind, in payload order.
    pub fn zones_of_kind(&self, kind: ZoneKind) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |zone| zone.kind == kind)
    }

    /// Room display name lookup by segment id.
    pub fn room_name(&self, id: &str) -> Option<&str> {
        self.rooms
            .iter()
            .find(|room| room.id == id)
            .map(|room| room.name.as_str())
    }
}
