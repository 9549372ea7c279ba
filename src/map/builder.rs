//! Map payload decoding for both firmware families
//!
//! The Hypfer (Valetudo) firmware streams a layered map JSON document; the
//! Rand256 firmware publishes a flat parsed-map document. Both are
//! normalized into the same [`MapSnapshot`] shape here. Coordinates are
//! kept verbatim in the payload's native integer space.

use super::snapshot::{
    CalibrationPoint, ImageSize, MapSnapshot, Point, RobotPose, Room, Zone, ZoneKind,
};
use crate::protocol::FirmwareVariant;
use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

/// Number of room colors the renderer's palette cycles through.
const ROOM_PALETTE_SIZE: u8 = 16;

/// Hypfer map format versions this builder understands.
const SUPPORTED_HYPFER_VERSIONS: [u64; 2] = [1, 2];

/// Recoverable decode failures. On any of these the caller keeps the
/// previous snapshot unchanged; a failed decode never nulls out a valid map.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("map payload truncated")]
    Truncated,
    #[error("map payload malformed: {0}")]
    Malformed(String),
    #[error("unsupported map format version {0}")]
    UnsupportedVersion(u64),
}

impl DecodeError {
    /// Stable kind label for logs and metrics fields.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::Truncated => "truncated",
            DecodeError::Malformed(_) => "malformed",
            DecodeError::UnsupportedVersion(_) => "unsupported_version",
        }
    }
}

/// Decodes raw map payloads into snapshots for one firmware family.
#[derive(Debug, Clone, Copy)]
pub struct MapDataBuilder {
    firmware: FirmwareVariant,
}

impl MapDataBuilder {
    pub fn new(firmware: FirmwareVariant) -> Self {
        Self { firmware }
    }

    pub fn firmware(&self) -> FirmwareVariant {
        self.firmware
    }

    /// Decode one raw map payload into a snapshot.
    pub fn build(&self, payload: &Bytes) -> Result<MapSnapshot, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Truncated);
        }

        let value: Value = serde_json::from_slice(payload).map_err(|err| {
            if err.is_eof() {
                DecodeError::Truncated
            } else {
                DecodeError::Malformed(err.to_string())
            }
        })?;

        match self.firmware {
            FirmwareVariant::Hypfer => build_hypfer(&value),
            FirmwareVariant::Rand256 => build_rand256(&value),
        }
    }
}

fn malformed(message: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(message.into())
}

// ---- Hypfer (Valetudo) layout ----------------------------------------------

fn build_hypfer(value: &Value) -> Result<MapSnapshot, DecodeError> {
    let version = value
        .pointer("/metaData/version")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    if !SUPPORTED_HYPFER_VERSIONS.contains(&version) {
        return Err(DecodeError::UnsupportedVersion(version));
    }

    let size_x = value
        .pointer("/size/x")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing size.x"))?;
    let size_y = value
        .pointer("/size/y")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing size.y"))?;
    let pixel_size = value
        .get("pixelSize")
        .and_then(Value::as_i64)
        .unwrap_or(5)
        .max(1) as i32;

    let image = ImageSize {
        width: (size_x / pixel_size as u64) as u32,
        height: (size_y / pixel_size as u64) as u32,
    };

    let mut rooms = Vec::new();
    if let Some(layers) = value.get("layers").and_then(Value::as_array) {
        for layer in layers {
            if layer.get("type").and_then(Value::as_str) != Some("segment") {
                continue;
            }
            let id = segment_id(layer.pointer("/metaData/segmentId"))
                .ok_or_else(|| malformed("segment layer without segmentId"))?;
            let name = layer
                .pointer("/metaData/name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Room {id}"));
            let outline = layer_bounds(layer);
            let color_index = (rooms.len() % ROOM_PALETTE_SIZE as usize) as u8;
            rooms.push(Room {
                id,
                name,
                outline,
                color_index,
            });
        }
    }

    let mut zones = Vec::new();
    let mut robot = None;
    let mut charger = None;
    let mut path = Vec::new();
    if let Some(entities) = value.get("entities").and_then(Value::as_array) {
        for entity in entities {
            let points = flat_points(entity.get("points"));
            match entity.get("type").and_then(Value::as_str) {
                Some("robot_position") => {
                    if let Some(point) = points.first() {
                        let angle = entity
                            .pointer("/metaData/angle")
                            .and_then(Value::as_i64)
                            .unwrap_or(0) as i32;
                        robot = Some(RobotPose {
                            x: point.x,
                            y: point.y,
                            angle,
                        });
                    }
                }
                Some("charger_location") => {
                    charger = points.first().copied();
                }
                Some("path") => {
                    path.extend(points);
                }
                Some("active_zone") => zones.push(Zone {
                    kind: ZoneKind::Clean,
                    outline: points,
                }),
                Some("no_go_area") => zones.push(Zone {
                    kind: ZoneKind::NoGo,
                    outline: points,
                }),
                Some("virtual_wall") => zones.push(Zone {
                    kind: ZoneKind::VirtualWall,
                    outline: points,
                }),
                _ => {}
            }
        }
    }

    Ok(MapSnapshot {
        rooms,
        zones,
        robot,
        charger,
        path,
        image,
        calibration: corner_calibration(image, pixel_size),
        generated_at: Utc::now(),
    })
}

/// Segment ids appear as strings in current payloads and as numbers in
/// older ones; both are kept verbatim.
fn segment_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Bounding outline of a segment layer from its min/max dimensions.
/// A layer without dimensions yields an empty outline, which the renderer
/// treats as "label only".
fn layer_bounds(layer: &Value) -> Vec<Point> {
    let bound = |pointer: &str| layer.pointer(pointer).and_then(Value::as_i64);
    match (
        bound("/dimensions/x/min"),
        bound("/dimensions/x/max"),
        bound("/dimensions/y/min"),
        bound("/dimensions/y/max"),
    ) {
        (Some(x_min), Some(x_max), Some(y_min), Some(y_max)) => vec![
            Point::new(x_min as i32, y_min as i32),
            Point::new(x_max as i32, y_min as i32),
            Point::new(x_max as i32, y_max as i32),
            Point::new(x_min as i32, y_max as i32),
        ],
        _ => Vec::new(),
    }
}

/// Flat coordinate list `[x0, y0, x1, y1, ...]` to points. A trailing
/// unpaired value is dropped.
fn flat_points(value: Option<&Value>) -> Vec<Point> {
    let Some(numbers) = value.and_then(Value::as_array) else {
        return Vec::new();
    };
    numbers
        .chunks_exact(2)
        .filter_map(|pair| {
            Some(Point::new(
                pair[0].as_i64()? as i32,
                pair[1].as_i64()? as i32,
            ))
        })
        .collect()
}

/// Map the four image corners into vacuum coordinates for calibration.
fn corner_calibration(image: ImageSize, scale: i32) -> Vec<CalibrationPoint> {
    let width = image.width as i32;
    let height = image.height as i32;
    [
        Point::new(0, 0),
        Point::new(width, 0),
        Point::new(width, height),
        Point::new(0, height),
    ]
    .into_iter()
    .map(|corner| CalibrationPoint {
        map: corner,
        vacuum: Point::new(corner.x * scale, corner.y * scale),
    })
    .collect()
}

// ---- Rand256 layout ---------------------------------------------------------

fn build_rand256(value: &Value) -> Result<MapSnapshot, DecodeError> {
    let width = value
        .pointer("/image/dimensions/width")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing image.dimensions.width"))?;
    let height = value
        .pointer("/image/dimensions/height")
        .and_then(Value::as_u64)
        .ok_or_else(|| malformed("missing image.dimensions.height"))?;
    let image = ImageSize {
        width: width as u32,
        height: height as u32,
    };

    let mut rooms = Vec::new();
    if let Some(ids) = value.pointer("/image/segments/id").and_then(Value::as_array) {
        let names = value.pointer("/image/segments/names");
        for id_value in ids {
            let Some(id) = segment_id(Some(id_value)) else {
                continue;
            };
            let name = names
                .and_then(|names| names.get(id.as_str()))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Room {id}"));
            let color_index = (rooms.len() % ROOM_PALETTE_SIZE as usize) as u8;
            rooms.push(Room {
                id,
                name,
                // Rand256 does not publish segment extents in the parsed map
                outline: Vec::new(),
                color_index,
            });
        }
    }

    let robot = pair_point(value.get("robot")).map(|point| RobotPose {
        x: point.x,
        y: point.y,
        angle: value
            .get("robot_angle")
            .and_then(Value::as_i64)
            .unwrap_or(0) as i32,
    });
    let charger = pair_point(value.get("charger"));

    let path = value
        .pointer("/path/points")
        .and_then(Value::as_array)
        .map(|points| points.iter().filter_map(|p| pair_point(Some(p))).collect())
        .unwrap_or_default();

    let mut zones = Vec::new();
    push_rand256_zones(&mut zones, value.get("currently_cleaned_zones"), ZoneKind::Clean);
    push_rand256_zones(&mut zones, value.get("no_go_areas"), ZoneKind::NoGo);
    push_rand256_zones(&mut zones, value.get("virtual_walls"), ZoneKind::VirtualWall);

    Ok(MapSnapshot {
        rooms,
        zones,
        robot,
        charger,
        path,
        image,
        // Rand256 parsed maps are already in pixel space
        calibration: corner_calibration(image, 1),
        generated_at: Utc::now(),
    })
}

/// One `[x, y]` coordinate pair.
fn pair_point(value: Option<&Value>) -> Option<Point> {
    let pair = value?.as_array()?;
    Some(Point::new(
        pair.first()?.as_i64()? as i32,
        pair.get(1)?.as_i64()? as i32,
    ))
}

/// Rand256 zone lists are arrays of flat coordinate runs: 4 values for a
/// rectangle or wall, 8 for a quad. Each run becomes one zone outline.
fn push_rand256_zones(zones: &mut Vec<Zone>, value: Option<&Value>, kind: ZoneKind) {
    let Some(runs) = value.and_then(Value::as_array) else {
        return;
    };
    for run in runs {
        let outline = flat_points(Some(run));
        if !outline.is_empty() {
            zones.push(Zone { kind, outline });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hypfer_builder() -> MapDataBuilder {
        MapDataBuilder::new(FirmwareVariant::Hypfer)
    }

    fn rand256_builder() -> MapDataBuilder {
        MapDataBuilder::new(FirmwareVariant::Rand256)
    }

    fn hypfer_payload() -> Bytes {
        Bytes::from(
            json!({
                "metaData": {"version": 2},
                "size": {"x": 2560, "y": 2560},
                "pixelSize": 5,
                "layers": [
                    {
                        "type": "segment",
                        "metaData": {"segmentId": "7", "name": "Kitchen"},
                        "dimensions": {
                            "x": {"min": 10, "max": 120},
                            "y": {"min": 20, "max": 240}
                        }
                    },
                    {"type": "floor"},
                    {
                        "type": "segment",
                        "metaData": {"segmentId": 9},
                        "dimensions": {
                            "x": {"min": 130, "max": 200},
                            "y": {"min": 20, "max": 100}
                        }
                    }
                ],
                "entities": [
                    {"type": "robot_position", "points": [1130, 1240], "metaData": {"angle": 270}},
                    {"type": "charger_location", "points": [1100, 1200]},
                    {"type": "path", "points": [1100, 1200, 1110, 1220, 1130, 1240]},
                    {"type": "no_go_area", "points": [200, 200, 400, 200, 400, 400, 200, 400]},
                    {"type": "active_zone", "points": [500, 500, 600, 500, 600, 600, 500, 600]},
                    {"type": "virtual_wall", "points": [700, 100, 700, 900]}
                ]
            })
            .to_string(),
        )
    }

    fn rand256_payload() -> Bytes {
        Bytes::from(
            json!({
                "image": {
                    "dimensions": {"width": 1024, "height": 768},
                    "segments": {
                        "id": [16, 17],
                        "names": {"16": "Bedroom", "17": "Hall"}
                    }
                },
                "robot": [512, 384],
                "robot_angle": 90,
                "charger": [500, 380],
                "path": {"points": [[500, 380], [505, 382], [512, 384]]},
                "currently_cleaned_zones": [[100, 100, 200, 200]],
                "no_go_areas": [[300, 300, 400, 300, 400, 400, 300, 400]],
                "virtual_walls": [[600, 100, 600, 700]]
            })
            .to_string(),
        )
    }

    #[test]
    fn hypfer_snapshot_normalizes_rooms_and_entities() {
        let snapshot = hypfer_builder().build(&hypfer_payload()).unwrap();

        assert_eq!(snapshot.image, ImageSize { width: 512, height: 512 });
        assert_eq!(snapshot.rooms.len(), 2);
        assert_eq!(snapshot.rooms[0].id, "7");
        assert_eq!(snapshot.rooms[0].name, "Kitchen");
        assert_eq!(snapshot.rooms[0].outline[0], Point::new(10, 20));
        assert_eq!(snapshot.rooms[1].id, "9");
        assert_eq!(snapshot.rooms[1].name, "Room 9");
        assert_eq!(snapshot.rooms[1].color_index, 1);

        assert_eq!(
            snapshot.robot,
            Some(RobotPose { x: 1130, y: 1240, angle: 270 })
        );
        assert_eq!(snapshot.charger, Some(Point::new(1100, 1200)));
        assert_eq!(snapshot.path.len(), 3);

        assert_eq!(snapshot.zones_of_kind(ZoneKind::NoGo).count(), 1);
        assert_eq!(snapshot.zones_of_kind(ZoneKind::Clean).count(), 1);
        assert_eq!(snapshot.zones_of_kind(ZoneKind::VirtualWall).count(), 1);

        // corners map to vacuum space via pixelSize
        assert_eq!(snapshot.calibration.len(), 4);
        assert_eq!(snapshot.calibration[2].map, Point::new(512, 512));
        assert_eq!(snapshot.calibration[2].vacuum, Point::new(2560, 2560));
    }

    #[test]
    fn rand256_snapshot_normalizes_to_same_shape() {
        let snapshot = rand256_builder().build(&rand256_payload()).unwrap();

        assert_eq!(snapshot.image, ImageSize { width: 1024, height: 768 });
        assert_eq!(snapshot.rooms.len(), 2);
        assert_eq!(snapshot.rooms[0].id, "16");
        assert_eq!(snapshot.rooms[0].name, "Bedroom");
        assert_eq!(
            snapshot.robot,
            Some(RobotPose { x: 512, y: 384, angle: 90 })
        );
        assert_eq!(snapshot.charger, Some(Point::new(500, 380)));
        assert_eq!(snapshot.path.len(), 3);
        assert_eq!(snapshot.zones_of_kind(ZoneKind::Clean).count(), 1);
        assert_eq!(snapshot.zones_of_kind(ZoneKind::NoGo).count(), 1);
        assert_eq!(snapshot.zones_of_kind(ZoneKind::VirtualWall).count(), 1);
        // identity calibration for pre-parsed pixel space
        assert_eq!(snapshot.calibration[1].map, snapshot.calibration[1].vacuum);
    }

    #[test]
    fn missing_poses_are_valid() {
        let payload = Bytes::from(
            json!({
                "metaData": {"version": 2},
                "size": {"x": 100, "y": 100},
                "pixelSize": 5,
                "layers": [],
                "entities": []
            })
            .to_string(),
        );
        let snapshot = hypfer_builder().build(&payload).unwrap();
        assert!(snapshot.robot.is_none());
        assert!(snapshot.charger.is_none());
        assert!(snapshot.rooms.is_empty());

        let payload = Bytes::from(
            json!({"image": {"dimensions": {"width": 10, "height": 10}}}).to_string(),
        );
        let snapshot = rand256_builder().build(&payload).unwrap();
        assert!(snapshot.robot.is_none());
        assert!(snapshot.charger.is_none());
    }

    #[test]
    fn empty_payload_is_truncated() {
        assert_eq!(
            hypfer_builder().build(&Bytes::new()),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn cut_off_json_is_truncated() {
        let full = hypfer_payload();
        let cut = full.slice(0..full.len() / 2);
        assert_eq!(hypfer_builder().build(&cut), Err(DecodeError::Truncated));
    }

    #[test]
    fn garbage_is_malformed() {
        let payload = Bytes::from_static(b"not json at all}");
        assert!(matches!(
            hypfer_builder().build(&payload),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        // valid JSON, but no size block
        let payload = Bytes::from(json!({"metaData": {"version": 2}}).to_string());
        assert!(matches!(
            hypfer_builder().build(&payload),
            Err(DecodeError::Malformed(_))
        ));

        let payload = Bytes::from(json!({"robot": [1, 2]}).to_string());
        assert!(matches!(
            rand256_builder().build(&payload),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn future_hypfer_version_is_unsupported() {
        let payload = Bytes::from(
            json!({"metaData": {"version": 3}, "size": {"x": 100, "y": 100}}).to_string(),
        );
        assert_eq!(
            hypfer_builder().build(&payload),
            Err(DecodeError::UnsupportedVersion(3))
        );
    }

    #[test]
    fn decode_error_kinds_are_stable() {
        assert_eq!(DecodeError::Truncated.kind(), "truncated");
        assert_eq!(DecodeError::Malformed("x".into()).kind(), "malformed");
        assert_eq!(DecodeError::UnsupportedVersion(3).kind(), "unsupported_version");
    }
}
