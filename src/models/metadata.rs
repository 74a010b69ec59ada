//! Photo metadata and its flat key/value encoding.
//!
//! The blob store persists metadata as a `String -> String` map next to each
//! object. [`PhotoMetadata::encode`] and [`PhotoMetadata::decode`] convert
//! between that map and the typed record. Absent fields are simply left out of
//! the map, so `decode(encode(m)) == m` for every populated subset.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const KEY_LATITUDE: &str = "latitude";
pub const KEY_LONGITUDE: &str = "longitude";
pub const KEY_DATE_TAKEN: &str = "date_taken";
pub const KEY_WIDTH: &str = "width";
pub const KEY_HEIGHT: &str = "height";
pub const KEY_ORIGINAL_FILENAME: &str = "original_filename";
pub const KEY_CAMERA_MAKE: &str = "camera_make";
pub const KEY_CAMERA_MODEL: &str = "camera_model";
pub const KEY_FOCAL_LENGTH: &str = "focal_length";
pub const KEY_ISO: &str = "iso";
pub const KEY_APERTURE: &str = "aperture";
pub const KEY_EXPOSURE_TIME: &str = "exposure_time";
pub const KEY_LENS_MODEL: &str = "lens_model";

/// GPS position in decimal degrees (positive = North / East).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Pixel dimensions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Descriptive metadata extracted from a photo.
///
/// Every field is optional. `None` means "not present", which keeps a real
/// zero (e.g. latitude 0.0 on the equator) distinguishable from absence.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PhotoMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,

    /// Capture time, second precision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub lens_model: Option<String>,

    /// Focal length in millimetres, stored with two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,

    /// Aperture as f-number, stored with two decimals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture: Option<f64>,

    /// Exposure time in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<f64>,
}

impl PhotoMetadata {
    /// Metadata that only records the name the object was uploaded under.
    pub fn with_filename(original_filename: impl Into<String>) -> Self {
        Self {
            original_filename: Some(original_filename.into()),
            ..Self::default()
        }
    }

    /// Encode populated fields into the blob store's side-channel map.
    ///
    /// Coordinates keep six decimals, focal length and aperture two, and the
    /// capture time is written as RFC 3339 in UTC.
    pub fn encode(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();

        if let Some(loc) = self.location {
            map.insert(KEY_LATITUDE.into(), format!("{:.6}", loc.latitude));
            map.insert(KEY_LONGITUDE.into(), format!("{:.6}", loc.longitude));
        }
        if let Some(taken) = self.captured_at {
            map.insert(
                KEY_DATE_TAKEN.into(),
                taken.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        if let Some(dim) = self.dimensions {
            map.insert(KEY_WIDTH.into(), dim.width.to_string());
            map.insert(KEY_HEIGHT.into(), dim.height.to_string());
        }
        insert_text(&mut map, KEY_ORIGINAL_FILENAME, &self.original_filename);
        insert_text(&mut map, KEY_CAMERA_MAKE, &self.camera_make);
        insert_text(&mut map, KEY_CAMERA_MODEL, &self.camera_model);
        insert_text(&mut map, KEY_LENS_MODEL, &self.lens_model);
        if let Some(focal) = self.focal_length {
            map.insert(KEY_FOCAL_LENGTH.into(), format!("{:.2}", focal));
        }
        if let Some(iso) = self.iso {
            map.insert(KEY_ISO.into(), iso.to_string());
        }
        if let Some(aperture) = self.aperture {
            map.insert(KEY_APERTURE.into(), format!("{:.2}", aperture));
        }
        if let Some(exposure) = self.exposure_time {
            // Display for f64 is the shortest representation that parses back
            // to the same value.
            map.insert(KEY_EXPOSURE_TIME.into(), exposure.to_string());
        }

        map
    }

    /// Decode a side-channel map. Unknown keys are ignored and malformed
    /// values leave the corresponding field absent.
    pub fn decode(map: &HashMap<String, String>) -> Self {
        let location = match (
            parse::<f64>(map, KEY_LATITUDE),
            parse::<f64>(map, KEY_LONGITUDE),
        ) {
            (Some(latitude), Some(longitude)) => Some(GeoLocation {
                latitude,
                longitude,
            }),
            _ => None,
        };

        let dimensions = match (parse::<u32>(map, KEY_WIDTH), parse::<u32>(map, KEY_HEIGHT)) {
            (Some(width), Some(height)) => Some(Dimensions { width, height }),
            _ => None,
        };

        let captured_at = map
            .get(KEY_DATE_TAKEN)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|t| t.with_timezone(&Utc));

        Self {
            location,
            captured_at,
            dimensions,
            original_filename: map.get(KEY_ORIGINAL_FILENAME).cloned(),
            camera_make: map.get(KEY_CAMERA_MAKE).cloned(),
            camera_model: map.get(KEY_CAMERA_MODEL).cloned(),
            lens_model: map.get(KEY_LENS_MODEL).cloned(),
            focal_length: parse(map, KEY_FOCAL_LENGTH),
            iso: parse(map, KEY_ISO),
            aperture: parse(map, KEY_APERTURE),
            exposure_time: parse(map, KEY_EXPOSURE_TIME),
        }
    }
}

fn insert_text(map: &mut HashMap<String, String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.to_string(), v.clone());
    }
}

fn parse<T: std::str::FromStr>(map: &HashMap<String, String>, key: &str) -> Option<T> {
    map.get(key).and_then(|raw| raw.parse().ok())
}
