use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use veracam_core::error::{Result, VeracamError};
use veracam_core::metadata::{DeviceClass, MetadataBundle};

/// Whole-score denominator: weights are basis points summing to this.
/// Scoring stays in integers until the final confidence division, so
/// repeated verification of identical inputs is bit-identical.
pub const SCORE_DENOMINATOR_BP: u32 = 10_000;

/// Verdict boundary, inclusive on the pass side: 0.70 exactly is AUTHENTIC.
/// This constant is the single source of truth for the verdict; nothing
/// else compares against a threshold.
pub const DEFAULT_AUTHENTIC_THRESHOLD_BP: u32 = 7_000;

const DEFAULT_SIGNATURE_BP: u32 = 3_000;
const DEFAULT_INTEGRITY_BP: u32 = 2_500;
const DEFAULT_COMPLETENESS_BP: u32 = 2_000;
const DEFAULT_GEO_BP: u32 = 1_000;
const DEFAULT_MOTION_BP: u32 = 1_000;
const DEFAULT_TIMESTAMP_BP: u32 = 500;

const DEFAULT_MAX_TIMESTAMP_AGE_SECS: u64 = 72 * 3600;
const DEFAULT_MAX_FUTURE_SKEW_SECS: u64 = 300;
const DEFAULT_CORROBORATION_SKEW_SECS: u64 = 600;
const DEFAULT_MAX_GEO_ACCURACY_M: f64 = 150.0;
// resting device reads ~9.8 m/s² of gravity; a dead sensor reads ~0
const DEFAULT_MIN_ACCEL_MAGNITUDE: f64 = 0.5;
const DEFAULT_MAX_ACCEL_MAGNITUDE: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    Signature,
    Integrity,
    MetadataBinding,
    MetadataCompleteness,
    GeoPlausibility,
    MotionPlausibility,
    TimestampPlausibility,
}

impl Check {
    pub const ALL: [Check; 7] = [
        Check::Signature,
        Check::Integrity,
        Check::MetadataBinding,
        Check::MetadataCompleteness,
        Check::GeoPlausibility,
        Check::MotionPlausibility,
        Check::TimestampPlausibility,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Authentic,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Online,
    Offline,
}

/// Deployment-tunable scoring configuration, injected into the engines at
/// construction. The weight table is data, not code — swapping the split
/// never touches verification logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// check → weight in basis points; must sum to `SCORE_DENOMINATOR_BP`.
    /// Checks absent from the table are computed and reported but carry no
    /// weight (metadata binding is reported-only by default).
    pub weights_bp: BTreeMap<Check, u32>,
    pub authentic_threshold_bp: u32,
    pub max_timestamp_age_secs: u64,
    pub max_future_skew_secs: u64,
    /// How close (seconds) a sensor sample must sit to the capture
    /// timestamp to corroborate it.
    pub corroboration_skew_secs: u64,
    pub max_geo_accuracy_m: f64,
    pub min_accel_magnitude: f64,
    pub max_accel_magnitude: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            weights_bp: BTreeMap::from([
                (Check::Signature, DEFAULT_SIGNATURE_BP),
                (Check::Integrity, DEFAULT_INTEGRITY_BP),
                (Check::MetadataCompleteness, DEFAULT_COMPLETENESS_BP),
                (Check::GeoPlausibility, DEFAULT_GEO_BP),
                (Check::MotionPlausibility, DEFAULT_MOTION_BP),
                (Check::TimestampPlausibility, DEFAULT_TIMESTAMP_BP),
            ]),
            authentic_threshold_bp: DEFAULT_AUTHENTIC_THRESHOLD_BP,
            max_timestamp_age_secs: DEFAULT_MAX_TIMESTAMP_AGE_SECS,
            max_future_skew_secs: DEFAULT_MAX_FUTURE_SKEW_SECS,
            corroboration_skew_secs: DEFAULT_CORROBORATION_SKEW_SECS,
            max_geo_accuracy_m: DEFAULT_MAX_GEO_ACCURACY_M,
            min_accel_magnitude: DEFAULT_MIN_ACCEL_MAGNITUDE,
            max_accel_magnitude: DEFAULT_MAX_ACCEL_MAGNITUDE,
        }
    }
}

impl ScoringPolicy {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let policy: ScoringPolicy = serde_json::from_slice(data)?;
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        let total: u64 = self.weights_bp.values().map(|w| *w as u64).sum();
        if total != SCORE_DENOMINATOR_BP as u64 {
            return Err(VeracamError::Policy(format!(
                "weights sum to {total} bp, expected {SCORE_DENOMINATOR_BP}"
            )));
        }
        if self.authentic_threshold_bp > SCORE_DENOMINATOR_BP {
            return Err(VeracamError::Policy(format!(
                "threshold {} bp exceeds the score range",
                self.authentic_threshold_bp
            )));
        }
        if self.min_accel_magnitude >= self.max_accel_magnitude {
            return Err(VeracamError::Policy(
                "acceleration band is empty".into(),
            ));
        }
        Ok(())
    }

    pub fn weight_bp(&self, check: Check) -> u32 {
        self.weights_bp.get(&check).copied().unwrap_or(0)
    }

    /// Full weight per passed check, no partial credit inside one.
    pub fn score(&self, per_check: BTreeMap<Check, bool>, mode: Mode) -> VerificationResult {
        let granted_bp: u32 = per_check
            .iter()
            .filter(|(_, passed)| **passed)
            .map(|(check, _)| self.weight_bp(*check))
            .sum();
        let verdict = if granted_bp >= self.authentic_threshold_bp {
            Verdict::Authentic
        } else {
            Verdict::Rejected
        };
        VerificationResult {
            confidence: granted_bp as f64 / SCORE_DENOMINATOR_BP as f64,
            granted_bp,
            per_check,
            verdict,
            mode,
        }
    }

    // --- metadata plausibility sub-checks, shared by both engines ---

    /// Structural completeness of the bundle: the capture clock ran, the
    /// device identified itself, and nothing flagged a screen capture.
    /// Absence of the optional sensors is scored by their own checks.
    pub fn metadata_complete(&self, bundle: &MetadataBundle) -> bool {
        bundle.captured_at != 0
            && bundle.device_class != DeviceClass::Unknown
            && !bundle.sensor_flags.screen_capture_suspected
    }

    pub fn geo_plausible(&self, bundle: &MetadataBundle) -> bool {
        let Some(geo) = &bundle.geo else {
            return false;
        };
        bundle.sensor_flags.gps_live
            && geo.latitude.is_finite()
            && geo.latitude.abs() <= 90.0
            && geo.longitude.is_finite()
            && geo.longitude.abs() <= 180.0
            // a fix at exactly 0,0 is the null-island default, not a place
            && !(geo.latitude == 0.0 && geo.longitude == 0.0)
            && geo.accuracy_m.is_finite()
            && geo.accuracy_m > 0.0
            && geo.accuracy_m <= self.max_geo_accuracy_m
    }

    pub fn motion_plausible(&self, bundle: &MetadataBundle) -> bool {
        let Some(motion) = &bundle.motion else {
            return false;
        };
        let magnitude = motion.magnitude();
        bundle.sensor_flags.motion_live
            && magnitude.is_finite()
            && magnitude >= self.min_accel_magnitude
            && magnitude <= self.max_accel_magnitude
    }

    /// Recency plus corroboration: the capture timestamp must fall inside
    /// the freshness window, and at least one sensor sample must have been
    /// taken close to it. A bundle with neither geo nor motion cannot
    /// corroborate its own clock, so this check fails.
    pub fn timestamp_plausible(&self, bundle: &MetadataBundle, now: u64) -> bool {
        if bundle.captured_at == 0 {
            return false;
        }
        if bundle.captured_at > now.saturating_add(self.max_future_skew_secs) {
            return false;
        }
        if now.saturating_sub(bundle.captured_at) > self.max_timestamp_age_secs {
            return false;
        }
        let corroborates = |sampled_at: u64| {
            sampled_at.abs_diff(bundle.captured_at) <= self.corroboration_skew_secs
        };
        bundle.geo.map(|g| corroborates(g.sampled_at)).unwrap_or(false)
            || bundle
                .motion
                .map(|m| corroborates(m.sampled_at))
                .unwrap_or(false)
    }
}

/// One verification attempt's answer. Produced fresh per call, never
/// mutated; a failed check is a meaningful answer, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub per_check: BTreeMap<Check, bool>,
    pub granted_bp: u32,
    pub confidence: f64,
    pub verdict: Verdict,
    pub mode: Mode,
}

impl VerificationResult {
    pub fn passed(&self, check: Check) -> bool {
        self.per_check.get(&check).copied().unwrap_or(false)
    }
}
