// THEORY:
// The `classifier` turns a frame's feature vector into a verdict. It judges each
// body segment on its own against configurable bounds, then folds the segment
// verdicts into one overall label.
//
// Key architectural principles:
// 1.  **Confidence Gating**: A segment whose inputs are below 0.5 confidence is
//     `Unknown`. Unknown segments are excluded from the overall verdict; they are
//     neither good nor bad.
// 2.  **Warning Dominates**: If any known segment is in its warning band, the
//     overall verdict is `Warning`, no matter how many others look fine.
// 3.  **Majority For Good**: Otherwise the posture is `Good` only when strictly more
//     than half of the known segments are acceptable. An exact half is `Meh`.
// 4.  **Thresholds Are Data**: `ThresholdSet` is plain configuration. It is read
//     every frame and may be replaced between frames by calibration or by a remote
//     update, but only ever with a set that passes `validate()`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core_modules::features::PostureFeatures;
use crate::error::ConfigError;

/// Minimum confidence for a segment to be judged at all.
pub const MIN_CONFIDENCE: f64 = 0.5;

/// Upper bounds for a "smaller is better" measurement (trunk curvature, neck deviation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpperLimits {
    pub acceptable: f64,
    pub warning: f64,
}

/// Nested ranges for a "stay near the middle" joint angle.
/// `[acceptable_min, acceptable_max]` must sit inside `[warning_lower, warning_upper]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeLimits {
    pub acceptable_min: f64,
    pub acceptable_max: f64,
    pub warning_lower: f64,
    pub warning_upper: f64,
}

impl RangeLimits {
    fn classify(&self, value: f64) -> SegmentStatus {
        if (self.acceptable_min..=self.acceptable_max).contains(&value) {
            SegmentStatus::Acceptable
        } else if (self.warning_lower..=self.warning_upper).contains(&value) {
            SegmentStatus::Warning
        } else {
            SegmentStatus::NotRecommended
        }
    }

    fn is_consistent(&self) -> bool {
        self.warning_lower <= self.acceptable_min
            && self.acceptable_min <= self.acceptable_max
            && self.acceptable_max <= self.warning_upper
    }
}

/// Every bound the classifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSet {
    /// Normalized back curvature bounds.
    pub trunk: UpperLimits,
    /// Bounds on the neck's deviation from a straight 180 degrees.
    pub neck: UpperLimits,
    pub arm: RangeLimits,
    pub hip: RangeLimits,
    pub knee: RangeLimits,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            trunk: UpperLimits { acceptable: 0.10, warning: 0.20 },
            neck: UpperLimits { acceptable: 10.0, warning: 20.0 },
            arm: RangeLimits {
                acceptable_min: 75.0,
                acceptable_max: 105.0,
                warning_lower: 60.0,
                warning_upper: 120.0,
            },
            hip: RangeLimits {
                acceptable_min: 85.0,
                acceptable_max: 105.0,
                warning_lower: 75.0,
                warning_upper: 115.0,
            },
            knee: RangeLimits {
                acceptable_min: 80.0,
                acceptable_max: 100.0,
                warning_lower: 70.0,
                warning_upper: 110.0,
            },
        }
    }
}

impl ThresholdSet {
    /// Checks that every acceptable range lies inside its warning range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let upper = [("trunk", &self.trunk), ("neck", &self.neck)];
        for (segment, limits) in upper {
            if !(limits.acceptable <= limits.warning) {
                return Err(ConfigError::Inconsistent {
                    segment,
                    detail: format!("acceptable {} exceeds warning {}", limits.acceptable, limits.warning),
                });
            }
        }
        let ranges = [("arm", &self.arm), ("hip", &self.hip), ("knee", &self.knee)];
        for (segment, limits) in ranges {
            if !limits.is_consistent() {
                return Err(ConfigError::Inconsistent {
                    segment,
                    detail: format!(
                        "acceptable [{}, {}] is not inside warning [{}, {}]",
                        limits.acceptable_min, limits.acceptable_max, limits.warning_lower, limits.warning_upper
                    ),
                });
            }
        }
        Ok(())
    }

    /// Returns a copy with the patch applied, or an error if the result would be inconsistent.
    pub fn apply(&self, patch: &ThresholdPatch) -> Result<ThresholdSet, ConfigError> {
        let mut candidate = *self;
        for (key, value) in patch {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { key: *key });
            }
            *candidate.slot_mut(*key) = *value;
        }
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn get(&self, key: ThresholdKey) -> f64 {
        let mut copy = *self;
        *copy.slot_mut(key)
    }

    fn slot_mut(&mut self, key: ThresholdKey) -> &mut f64 {
        use ThresholdKey::*;
        match key {
            TrunkAcceptable => &mut self.trunk.acceptable,
            TrunkWarning => &mut self.trunk.warning,
            NeckAcceptable => &mut self.neck.acceptable,
            NeckWarning => &mut self.neck.warning,
            ArmAcceptableMin => &mut self.arm.acceptable_min,
            ArmAcceptableMax => &mut self.arm.acceptable_max,
            ArmWarningLower => &mut self.arm.warning_lower,
            ArmWarningUpper => &mut self.arm.warning_upper,
            HipAcceptableMin => &mut self.hip.acceptable_min,
            HipAcceptableMax => &mut self.hip.acceptable_max,
            HipWarningLower => &mut self.hip.warning_lower,
            HipWarningUpper => &mut self.hip.warning_upper,
            KneeAcceptableMin => &mut self.knee.acceptable_min,
            KneeAcceptableMax => &mut self.knee.acceptable_max,
            KneeWarningLower => &mut self.knee.warning_lower,
            KneeWarningUpper => &mut self.knee.warning_upper,
        }
    }
}

/// The wire name of every individual threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKey {
    TrunkAcceptable,
    TrunkWarning,
    NeckAcceptable,
    NeckWarning,
    ArmAcceptableMin,
    ArmAcceptableMax,
    ArmWarningLower,
    ArmWarningUpper,
    HipAcceptableMin,
    HipAcceptableMax,
    HipWarningLower,
    HipWarningUpper,
    KneeAcceptableMin,
    KneeAcceptableMax,
    KneeWarningLower,
    KneeWarningUpper,
}

impl ThresholdKey {
    pub const ALL: [ThresholdKey; 16] = [
        ThresholdKey::TrunkAcceptable,
        ThresholdKey::TrunkWarning,
        ThresholdKey::NeckAcceptable,
        ThresholdKey::NeckWarning,
        ThresholdKey::ArmAcceptableMin,
        ThresholdKey::ArmAcceptableMax,
        ThresholdKey::ArmWarningLower,
        ThresholdKey::ArmWarningUpper,
        ThresholdKey::HipAcceptableMin,
        ThresholdKey::HipAcceptableMax,
        ThresholdKey::HipWarningLower,
        ThresholdKey::HipWarningUpper,
        ThresholdKey::KneeAcceptableMin,
        ThresholdKey::KneeAcceptableMax,
        ThresholdKey::KneeWarningLower,
        ThresholdKey::KneeWarningUpper,
    ];

    pub fn as_str(self) -> &'static str {
        use ThresholdKey::*;
        match self {
            TrunkAcceptable => "trunk_acceptable",
            TrunkWarning => "trunk_warning",
            NeckAcceptable => "neck_acceptable",
            NeckWarning => "neck_warning",
            ArmAcceptableMin => "arm_acceptable_min",
            ArmAcceptableMax => "arm_acceptable_max",
            ArmWarningLower => "arm_warning_lower",
            ArmWarningUpper => "arm_warning_upper",
            HipAcceptableMin => "hip_acceptable_min",
            HipAcceptableMax => "hip_acceptable_max",
            HipWarningLower => "hip_warning_lower",
            HipWarningUpper => "hip_warning_upper",
            KneeAcceptableMin => "knee_acceptable_min",
            KneeAcceptableMax => "knee_acceptable_max",
            KneeWarningLower => "knee_warning_lower",
            KneeWarningUpper => "knee_warning_upper",
        }
    }
}

impl fmt::Display for ThresholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThresholdKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// A partial threshold update: only the listed keys change.
pub type ThresholdPatch = BTreeMap<ThresholdKey, f64>;

/// Verdict for a single body segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Acceptable,
    Warning,
    NotRecommended,
    #[default]
    Unknown,
}

/// Verdict for the whole body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverallStatus {
    #[serde(rename = "GOOD")]
    Good,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "MEH")]
    Meh,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl OverallStatus {
    /// Aggregates segment verdicts into the overall label.
    pub fn from_segments(segments: &[SegmentStatus]) -> Self {
        let known: Vec<SegmentStatus> = segments
            .iter()
            .copied()
            .filter(|s| *s != SegmentStatus::Unknown)
            .collect();
        if known.is_empty() {
            return OverallStatus::Unknown;
        }
        if known.contains(&SegmentStatus::Warning) {
            return OverallStatus::Warning;
        }
        let acceptable = known.iter().filter(|s| **s == SegmentStatus::Acceptable).count();
        if acceptable * 2 > known.len() {
            OverallStatus::Good
        } else {
            OverallStatus::Meh
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverallStatus::Good => "GOOD",
            OverallStatus::Warning => "WARNING",
            OverallStatus::Meh => "MEH",
            OverallStatus::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Per-segment and overall classification of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PostureClassification {
    pub overall: OverallStatus,
    pub trunk: SegmentStatus,
    pub neck: SegmentStatus,
    pub arm_left: SegmentStatus,
    pub arm_right: SegmentStatus,
    pub hip: SegmentStatus,
    pub knee: SegmentStatus,
}

impl PostureClassification {
    pub fn segments(&self) -> [SegmentStatus; 6] {
        [self.trunk, self.neck, self.arm_left, self.arm_right, self.hip, self.knee]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostureClassifier;

impl PostureClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, features: &PostureFeatures, thresholds: &ThresholdSet) -> PostureClassification {
        let angles = &features.angles;

        let trunk = if features.trust >= MIN_CONFIDENCE {
            classify_upper(features.curvature, &thresholds.trunk, true)
        } else {
            SegmentStatus::Unknown
        };

        let neck = angles
            .neck
            .trusted(MIN_CONFIDENCE)
            .map(|angle| classify_upper((angle - 180.0).abs(), &thresholds.neck, false))
            .unwrap_or_default();

        let arm_left = angles
            .arm_left
            .trusted(MIN_CONFIDENCE)
            .map(|angle| thresholds.arm.classify(angle))
            .unwrap_or_default();
        let arm_right = angles
            .arm_right
            .trusted(MIN_CONFIDENCE)
            .map(|angle| thresholds.arm.classify(angle))
            .unwrap_or_default();

        let hip = angles
            .hip
            .trusted(MIN_CONFIDENCE)
            .map(|angle| thresholds.hip.classify(angle))
            .unwrap_or_default();

        let knee = match (angles.knee_left.trusted(MIN_CONFIDENCE), angles.knee_right.trusted(MIN_CONFIDENCE)) {
            (Some(left), Some(right)) => thresholds.knee.classify((left + right) / 2.0),
            _ => SegmentStatus::Unknown,
        };

        let mut classification = PostureClassification {
            overall: OverallStatus::Unknown,
            trunk,
            neck,
            arm_left,
            arm_right,
            hip,
            knee,
        };
        classification.overall = OverallStatus::from_segments(&classification.segments());
        classification
    }
}

/// Trunk uses an inclusive warning bound, neck an exclusive one.
fn classify_upper(value: f64, limits: &UpperLimits, warning_inclusive: bool) -> SegmentStatus {
    let within_warning = if warning_inclusive {
        value <= limits.warning
    } else {
        value < limits.warning
    };
    if value < limits.acceptable {
        SegmentStatus::Acceptable
    } else if within_warning {
        SegmentStatus::Warning
    } else {
        SegmentStatus::NotRecommended
    }
}
