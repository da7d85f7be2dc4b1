use crate::error::{Result, VeracamError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Smartphone,
    Tablet,
    Camera,
    Unknown,
}

/// Capture-time sensor health bits. These travel with the bundle and feed
/// the plausibility checks; they are never an error by themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorFlags {
    pub gps_live: bool,
    pub motion_live: bool,
    pub screen_capture_suspected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_m: f64,
    /// Unix seconds at which the fix was taken.
    pub sampled_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    /// Unix seconds at which the sample was taken.
    pub sampled_at: u64,
}

impl MotionSample {
    pub fn magnitude(&self) -> f64 {
        (self.accel_x * self.accel_x + self.accel_y * self.accel_y + self.accel_z * self.accel_z)
            .sqrt()
    }
}

/// Capture-context record produced alongside the frozen image.
///
/// Geo and motion are independently optional — a bundle without them digests
/// and verifies fine, it just scores lower. Serialization skips absent
/// fields entirely, so bundles with different present-field sets can never
/// produce the same canonical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataBundle {
    /// Unix seconds of the capture itself.
    pub captured_at: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub geo: Option<GeoFix>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub motion: Option<MotionSample>,
    pub device_class: DeviceClass,
    pub sensor_flags: SensorFlags,
}

impl MetadataBundle {
    /// Structural validation of *present* fields only. Absence is a scored
    /// signal handled elsewhere; a present-but-nonsensical field is the one
    /// thing that makes digesting fail.
    pub fn validate(&self) -> Result<()> {
        if self.captured_at == 0 {
            return Err(VeracamError::MalformedField {
                field: "captured_at",
                reason: "capture timestamp is zero".into(),
            });
        }
        if let Some(geo) = &self.geo {
            if !geo.latitude.is_finite() || geo.latitude.abs() > 90.0 {
                return Err(VeracamError::MalformedField {
                    field: "geo.latitude",
                    reason: format!("{} is outside [-90, 90]", geo.latitude),
                });
            }
            if !geo.longitude.is_finite() || geo.longitude.abs() > 180.0 {
                return Err(VeracamError::MalformedField {
                    field: "geo.longitude",
                    reason: format!("{} is outside [-180, 180]", geo.longitude),
                });
            }
            if !geo.accuracy_m.is_finite() || geo.accuracy_m < 0.0 {
                return Err(VeracamError::MalformedField {
                    field: "geo.accuracy_m",
                    reason: format!("{} is not a usable radius", geo.accuracy_m),
                });
            }
            if geo.sampled_at == 0 {
                return Err(VeracamError::MalformedField {
                    field: "geo.sampled_at",
                    reason: "fix timestamp is zero".into(),
                });
            }
        }
        if let Some(motion) = &self.motion {
            if !motion.accel_x.is_finite()
                || !motion.accel_y.is_finite()
                || !motion.accel_z.is_finite()
            {
                return Err(VeracamError::MalformedField {
                    field: "motion",
                    reason: "acceleration components must be finite".into(),
                });
            }
            if motion.sampled_at == 0 {
                return Err(VeracamError::MalformedField {
                    field: "motion.sampled_at",
                    reason: "sample timestamp is zero".into(),
                });
            }
        }
        Ok(())
    }

    /// Canonical digest over the present fields.
    ///
    /// Serde writes struct fields in declaration order and skips absent
    /// optionals, so the JSON here is a canonical byte sequence for the
    /// bundle's content.
    pub fn digest(&self) -> Result<[u8; 32]> {
        self.validate()?;
        let canonical = serde_json::to_vec(self)?;
        Ok(blake3::hash(&canonical).into())
    }
}
