//! Decoded ST 0601 telemetry records.
//!
//! Records arrive as flat JSON objects keyed by field name (or by ST 0601
//! tag number) plus a `#ts` presentation time in seconds. Only the fields
//! the sensor model consumes are recognized; everything else is kept
//! verbatim in [`MetadataFrame::extras`].

use crate::types::{DrapeError, DrapeResult, GeodeticCoordinate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Presentation timestamp key
pub const TIMESTAMP_KEY: &str = "#ts";

/// Telemetry fields understood by the sensor model
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TelemetryField {
    PrecisionTimeStamp,
    PlatformHeadingAngle,
    PlatformPitchAngle,
    PlatformRollAngle,
    SensorLatitude,
    SensorLongitude,
    SensorTrueAltitude,
    SensorHorizontalFieldOfView,
    SensorVerticalFieldOfView,
    SensorRelativeAzimuthAngle,
    SensorRelativeElevationAngle,
    SensorRelativeRollAngle,
    SlantRange,
    FrameCenterLatitude,
    FrameCenterLongitude,
    FrameCenterElevation,
    OffsetCornerLatitudePoint1,
    OffsetCornerLongitudePoint1,
    OffsetCornerLatitudePoint2,
    OffsetCornerLongitudePoint2,
    OffsetCornerLatitudePoint3,
    OffsetCornerLongitudePoint3,
    OffsetCornerLatitudePoint4,
    OffsetCornerLongitudePoint4,
}

impl TelemetryField {
    pub const ALL: [TelemetryField; 24] = [
        TelemetryField::PrecisionTimeStamp,
        TelemetryField::PlatformHeadingAngle,
        TelemetryField::PlatformPitchAngle,
        TelemetryField::PlatformRollAngle,
        TelemetryField::SensorLatitude,
        TelemetryField::SensorLongitude,
        TelemetryField::SensorTrueAltitude,
        TelemetryField::SensorHorizontalFieldOfView,
        TelemetryField::SensorVerticalFieldOfView,
        TelemetryField::SensorRelativeAzimuthAngle,
        TelemetryField::SensorRelativeElevationAngle,
        TelemetryField::SensorRelativeRollAngle,
        TelemetryField::SlantRange,
        TelemetryField::FrameCenterLatitude,
        TelemetryField::FrameCenterLongitude,
        TelemetryField::FrameCenterElevation,
        TelemetryField::OffsetCornerLatitudePoint1,
        TelemetryField::OffsetCornerLongitudePoint1,
        TelemetryField::OffsetCornerLatitudePoint2,
        TelemetryField::OffsetCornerLongitudePoint2,
        TelemetryField::OffsetCornerLatitudePoint3,
        TelemetryField::OffsetCornerLongitudePoint3,
        TelemetryField::OffsetCornerLatitudePoint4,
        TelemetryField::OffsetCornerLongitudePoint4,
    ];

    /// Canonical field name
    pub fn name(&self) -> &'static str {
        match self {
            TelemetryField::PrecisionTimeStamp => "Precision Time Stamp",
            TelemetryField::PlatformHeadingAngle => "Platform Heading Angle",
            TelemetryField::PlatformPitchAngle => "Platform Pitch Angle",
            TelemetryField::PlatformRollAngle => "Platform Roll Angle",
            TelemetryField::SensorLatitude => "Sensor Latitude",
            TelemetryField::SensorLongitude => "Sensor Longitude",
            TelemetryField::SensorTrueAltitude => "Sensor True Altitude",
            TelemetryField::SensorHorizontalFieldOfView => "Sensor Horizontal Field of View",
            TelemetryField::SensorVerticalFieldOfView => "Sensor Vertical Field of View",
            TelemetryField::SensorRelativeAzimuthAngle => "Sensor Relative Azimuth Angle",
            TelemetryField::SensorRelativeElevationAngle => "Sensor Relative Elevation Angle",
            TelemetryField::SensorRelativeRollAngle => "Sensor Relative Roll Angle",
            TelemetryField::SlantRange => "Slant Range",
            TelemetryField::FrameCenterLatitude => "Frame Center Latitude",
            TelemetryField::FrameCenterLongitude => "Frame Center Longitude",
            TelemetryField::FrameCenterElevation => "Frame Center Elevation",
            TelemetryField::OffsetCornerLatitudePoint1 => "Offset Corner Latitude Point 1",
            TelemetryField::OffsetCornerLongitudePoint1 => "Offset Corner Longitude Point 1",
            TelemetryField::OffsetCornerLatitudePoint2 => "Offset Corner Latitude Point 2",
            TelemetryField::OffsetCornerLongitudePoint2 => "Offset Corner Longitude Point 2",
            TelemetryField::OffsetCornerLatitudePoint3 => "Offset Corner Latitude Point 3",
            TelemetryField::OffsetCornerLongitudePoint3 => "Offset Corner Longitude Point 3",
            TelemetryField::OffsetCornerLatitudePoint4 => "Offset Corner Latitude Point 4",
            TelemetryField::OffsetCornerLongitudePoint4 => "Offset Corner Longitude Point 4",
        }
    }

    /// ST 0601 local set tag
    pub fn tag(&self) -> u8 {
        match self {
            TelemetryField::PrecisionTimeStamp => 2,
            TelemetryField::PlatformHeadingAngle => 5,
            TelemetryField::PlatformPitchAngle => 6,
            TelemetryField::PlatformRollAngle => 7,
            TelemetryField::SensorLatitude => 13,
            TelemetryField::SensorLongitude => 14,
            TelemetryField::SensorTrueAltitude => 15,
            TelemetryField::SensorHorizontalFieldOfView => 16,
            TelemetryField::SensorVerticalFieldOfView => 17,
            TelemetryField::SensorRelativeAzimuthAngle => 18,
            TelemetryField::SensorRelativeElevationAngle => 19,
            TelemetryField::SensorRelativeRollAngle => 20,
            TelemetryField::SlantRange => 21,
            TelemetryField::FrameCenterLatitude => 23,
            TelemetryField::FrameCenterLongitude => 24,
            TelemetryField::FrameCenterElevation => 25,
            TelemetryField::OffsetCornerLatitudePoint1 => 26,
            TelemetryField::OffsetCornerLongitudePoint1 => 27,
            TelemetryField::OffsetCornerLatitudePoint2 => 28,
            TelemetryField::OffsetCornerLongitudePoint2 => 29,
            TelemetryField::OffsetCornerLatitudePoint3 => 30,
            TelemetryField::OffsetCornerLongitudePoint3 => 31,
            TelemetryField::OffsetCornerLatitudePoint4 => 32,
            TelemetryField::OffsetCornerLongitudePoint4 => 33,
        }
    }

    /// Alternate spellings emitted by common decoders
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            TelemetryField::PrecisionTimeStamp => &["Date"],
            TelemetryField::SensorHorizontalFieldOfView => &["Sensor Horizontal FOV"],
            TelemetryField::SensorVerticalFieldOfView => &["Sensor Vertical FOV"],
            _ => &[],
        }
    }

    /// Resolve a record key (name, alias or numeric tag)
    pub fn from_key(key: &str) -> Option<TelemetryField> {
        if let Ok(tag) = key.trim().parse::<u8>() {
            return Self::ALL.iter().copied().find(|f| f.tag() == tag);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.name() == key || f.aliases().contains(&key))
    }

    /// (latitude, longitude) offset fields of corner `n` in 1..=4
    pub fn offset_corner(n: usize) -> Option<(TelemetryField, TelemetryField)> {
        match n {
            1 => Some((Self::OffsetCornerLatitudePoint1, Self::OffsetCornerLongitudePoint1)),
            2 => Some((Self::OffsetCornerLatitudePoint2, Self::OffsetCornerLongitudePoint2)),
            3 => Some((Self::OffsetCornerLatitudePoint3, Self::OffsetCornerLongitudePoint3)),
            4 => Some((Self::OffsetCornerLatitudePoint4, Self::OffsetCornerLongitudePoint4)),
            _ => None,
        }
    }
}

impl std::fmt::Display for TelemetryField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One decoded telemetry record at a presentation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFrame {
    /// Presentation time (seconds)
    pub timestamp: f64,
    fields: BTreeMap<TelemetryField, f64>,
    /// Keys outside the recognized schema, untouched
    pub extras: Map<String, Value>,
}

impl MetadataFrame {
    pub fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
            extras: Map::new(),
        }
    }

    pub fn with(mut self, field: TelemetryField, value: f64) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: TelemetryField, value: f64) {
        self.fields.insert(field, value);
    }

    /// Field value if present
    pub fn value(&self, field: TelemetryField) -> Option<f64> {
        self.fields.get(&field).copied()
    }

    /// Field value, 0 when absent
    pub fn get(&self, field: TelemetryField) -> f64 {
        self.value(field).unwrap_or(0.0)
    }

    pub fn fields(&self) -> impl Iterator<Item = (TelemetryField, f64)> + '_ {
        self.fields.iter().map(|(k, v)| (*k, *v))
    }

    /// Build from a decoded JSON object.
    ///
    /// The record must be an object carrying a finite numeric `#ts`.
    /// Recognized fields must hold finite numbers; a recognized field with
    /// any other value is dropped (and so reads as 0).
    pub fn from_json(value: &Value) -> DrapeResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| DrapeError::InvalidRecord("record is not a JSON object".to_string()))?;

        let timestamp = object
            .get(TIMESTAMP_KEY)
            .and_then(Value::as_f64)
            .filter(|ts| ts.is_finite())
            .ok_or_else(|| {
                DrapeError::InvalidRecord(format!("missing numeric '{}' field", TIMESTAMP_KEY))
            })?;

        let mut frame = MetadataFrame::new(timestamp);
        for (key, raw) in object {
            if key == TIMESTAMP_KEY {
                continue;
            }
            match TelemetryField::from_key(key) {
                Some(field) => match raw.as_f64().filter(|v| v.is_finite()) {
                    Some(v) => frame.set(field, v),
                    None => log::warn!(
                        "Dropping non-numeric value for '{}' at t={}: {}",
                        field, timestamp, raw
                    ),
                },
                None => {
                    frame.extras.insert(key.clone(), raw.clone());
                }
            }
        }
        Ok(frame)
    }

    /// Parse one NDJSON line
    pub fn from_json_str(line: &str) -> DrapeResult<Self> {
        let value: Value = serde_json::from_str(line)?;
        Self::from_json(&value)
    }

    /// Serialize back to a flat JSON object keyed by canonical names
    pub fn to_json(&self) -> Value {
        let mut object = self.extras.clone();
        object.insert(TIMESTAMP_KEY.to_string(), Value::from(self.timestamp));
        for (field, value) in &self.fields {
            object.insert(field.name().to_string(), Value::from(*value));
        }
        Value::Object(object)
    }

    /// UTC time from the Precision Time Stamp (microseconds since the Unix epoch)
    pub fn precision_time(&self) -> Option<DateTime<Utc>> {
        let micros = self.value(TelemetryField::PrecisionTimeStamp)?;
        DateTime::from_timestamp_micros(micros as i64)
    }

    pub fn sensor_position(&self) -> GeodeticCoordinate {
        GeodeticCoordinate::new(
            self.get(TelemetryField::SensorLatitude),
            self.get(TelemetryField::SensorLongitude),
            self.get(TelemetryField::SensorTrueAltitude),
        )
    }

    /// Reported frame center, `None` unless latitude and longitude are present
    pub fn frame_center(&self) -> Option<GeodeticCoordinate> {
        Some(GeodeticCoordinate::new(
            self.value(TelemetryField::FrameCenterLatitude)?,
            self.value(TelemetryField::FrameCenterLongitude)?,
            self.get(TelemetryField::FrameCenterElevation),
        ))
    }

    /// Reported corner points (frame center plus offsets), height 0
    pub fn offset_corners(&self) -> Option<[GeodeticCoordinate; 4]> {
        let center = self.frame_center()?;
        let mut corners = [GeodeticCoordinate::new(0.0, 0.0, 0.0); 4];
        for (i, corner) in corners.iter_mut().enumerate() {
            let (lat_field, lon_field) = TelemetryField::offset_corner(i + 1)?;
            *corner = GeodeticCoordinate::new(
                center.latitude + self.get(lat_field),
                center.longitude + self.get(lon_field),
                0.0,
            );
        }
        Some(corners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_resolve_by_name_alias_and_tag() {
        assert_eq!(
            TelemetryField::from_key("Platform Heading Angle"),
            Some(TelemetryField::PlatformHeadingAngle)
        );
        assert_eq!(
            TelemetryField::from_key("Sensor Horizontal FOV"),
            Some(TelemetryField::SensorHorizontalFieldOfView)
        );
        assert_eq!(TelemetryField::from_key("5"), Some(TelemetryField::PlatformHeadingAngle));
        assert_eq!(TelemetryField::from_key("33"), Some(TelemetryField::OffsetCornerLongitudePoint4));
        assert_eq!(TelemetryField::from_key("Mission ID"), None);
        assert_eq!(TelemetryField::from_key("3"), None);
    }

    #[test]
    fn test_tags_are_unique() {
        let mut tags: Vec<u8> = TelemetryField::ALL.iter().map(|f| f.tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), TelemetryField::ALL.len());
    }

    #[test]
    fn test_parse_record_with_defaults_and_extras() {
        let record = json!({
            "#ts": 12.5,
            "Platform Heading Angle": 86.1,
            "14": -110.17,
            "Mission ID": "TEST",
            "Sensor Relative Roll Angle": "358.2"
        });
        let frame = MetadataFrame::from_json(&record).unwrap();

        assert_eq!(frame.timestamp, 12.5);
        assert_eq!(frame.get(TelemetryField::PlatformHeadingAngle), 86.1);
        assert_eq!(frame.get(TelemetryField::SensorLongitude), -110.17);
        // missing and non-numeric recognized fields read as 0
        assert_eq!(frame.get(TelemetryField::PlatformPitchAngle), 0.0);
        assert_eq!(frame.value(TelemetryField::SensorRelativeRollAngle), None);
        assert_eq!(frame.extras.get("Mission ID"), Some(&json!("TEST")));
    }

    #[test]
    fn test_reject_malformed_records() {
        assert!(MetadataFrame::from_json(&json!([1, 2, 3])).is_err());
        assert!(MetadataFrame::from_json(&json!({"Sensor Latitude": 1.0})).is_err());
        assert!(MetadataFrame::from_json(&json!({"#ts": "10"})).is_err());
        assert!(MetadataFrame::from_json_str("{not json").is_err());
    }

    #[test]
    fn test_offset_corners_and_frame_center() {
        let frame = MetadataFrame::new(0.0)
            .with(TelemetryField::FrameCenterLatitude, 54.0)
            .with(TelemetryField::FrameCenterLongitude, -110.0)
            .with(TelemetryField::OffsetCornerLatitudePoint1, 0.01)
            .with(TelemetryField::OffsetCornerLongitudePoint1, -0.02)
            .with(TelemetryField::OffsetCornerLatitudePoint3, -0.01);

        let corners = frame.offset_corners().unwrap();
        assert_eq!(corners[0].latitude, 54.01);
        assert_eq!(corners[0].longitude, -110.02);
        assert_eq!(corners[1].latitude, 54.0);
        assert_eq!(corners[2].latitude, 53.99);

        assert!(MetadataFrame::new(0.0).offset_corners().is_none());
    }

    #[test]
    fn test_precision_time_stamp() {
        let frame = MetadataFrame::from_json(&json!({"#ts": 0.0, "2": 1_600_000_000_000_000.0})).unwrap();
        let time = frame.precision_time().unwrap();
        assert_eq!(time.timestamp(), 1_600_000_000);
    }

    #[test]
    fn test_json_round_trip_keeps_canonical_names() {
        let frame = MetadataFrame::from_json(&json!({"#ts": 3.0, "16": 10.5, "extra": true})).unwrap();
        let value = frame.to_json();
        assert_eq!(value["Sensor Horizontal Field of View"], json!(10.5));
        assert_eq!(value["extra"], json!(true));
        assert_eq!(MetadataFrame::from_json(&value).unwrap(), frame);
    }
}
