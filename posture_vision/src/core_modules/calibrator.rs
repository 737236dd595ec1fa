// THEORY:
// The `calibrator` adapts the thresholds to the person in front of the camera. When
// the user signals "this is my correct posture", the latest feature snapshot is
// taken as the reference and new bounds are built around it with fixed margins.
//
// Only segments measured with enough confidence are recalibrated; the result is a
// partial patch. Each acceptable band is built strictly inside its warning band by
// construction (smaller additive margin), so a calibration can never invert them.

use crate::core_modules::classifier::{MIN_CONFIDENCE, ThresholdKey, ThresholdPatch};
use crate::core_modules::features::PostureFeatures;

const TRUNK_ACCEPTABLE_MARGIN: f64 = 0.05;
const TRUNK_WARNING_MARGIN: f64 = 0.15;
const NECK_ACCEPTABLE_MARGIN: f64 = 5.0;
const NECK_WARNING_MARGIN: f64 = 15.0;
const ARM_ACCEPTABLE_MARGIN: f64 = 10.0;
const ARM_WARNING_MARGIN: f64 = 20.0;
const HIP_ACCEPTABLE_MARGIN: f64 = 5.0;
const HIP_WARNING_MARGIN: f64 = 10.0;
const KNEE_ACCEPTABLE_MARGIN: f64 = 15.0;
const KNEE_WARNING_MARGIN: f64 = 25.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdCalibrator;

impl ThresholdCalibrator {
    pub fn new() -> Self {
        Self
    }

    /// Derives a threshold patch from a reference "good posture" sample.
    pub fn calibrate(&self, reference: &PostureFeatures) -> ThresholdPatch {
        let angles = &reference.angles;
        let mut patch = ThresholdPatch::new();

        if reference.trust >= MIN_CONFIDENCE {
            let curvature = reference.curvature;
            patch.insert(ThresholdKey::TrunkAcceptable, (curvature + TRUNK_ACCEPTABLE_MARGIN).max(0.0));
            patch.insert(ThresholdKey::TrunkWarning, (curvature + TRUNK_WARNING_MARGIN).max(0.0));
        }

        if let Some(neck) = angles.neck.trusted(MIN_CONFIDENCE) {
            let deviation = (neck - 180.0).abs();
            patch.insert(ThresholdKey::NeckAcceptable, deviation + NECK_ACCEPTABLE_MARGIN);
            patch.insert(ThresholdKey::NeckWarning, deviation + NECK_WARNING_MARGIN);
        }

        if let (Some(left), Some(right)) = (
            angles.arm_left.trusted(MIN_CONFIDENCE),
            angles.arm_right.trusted(MIN_CONFIDENCE),
        ) {
            let centre = (left + right) / 2.0;
            insert_window(
                &mut patch,
                centre,
                ARM_ACCEPTABLE_MARGIN,
                ARM_WARNING_MARGIN,
                [
                    ThresholdKey::ArmAcceptableMin,
                    ThresholdKey::ArmAcceptableMax,
                    ThresholdKey::ArmWarningLower,
                    ThresholdKey::ArmWarningUpper,
                ],
            );
        }

        if let Some(hip) = angles.hip.trusted(MIN_CONFIDENCE) {
            insert_window(
                &mut patch,
                hip,
                HIP_ACCEPTABLE_MARGIN,
                HIP_WARNING_MARGIN,
                [
                    ThresholdKey::HipAcceptableMin,
                    ThresholdKey::HipAcceptableMax,
                    ThresholdKey::HipWarningLower,
                    ThresholdKey::HipWarningUpper,
                ],
            );
        }

        if let (Some(left), Some(right)) = (
            angles.knee_left.trusted(MIN_CONFIDENCE),
            angles.knee_right.trusted(MIN_CONFIDENCE),
        ) {
            insert_window(
                &mut patch,
                (left + right) / 2.0,
                KNEE_ACCEPTABLE_MARGIN,
                KNEE_WARNING_MARGIN,
                [
                    ThresholdKey::KneeAcceptableMin,
                    ThresholdKey::KneeAcceptableMax,
                    ThresholdKey::KneeWarningLower,
                    ThresholdKey::KneeWarningUpper,
                ],
            );
        }

        patch
    }
}

/// Writes `centre ± acceptable` and `centre ± warning`, lower bounds floored at 0.
/// Keys are ordered acceptable min, acceptable max, warning lower, warning upper.
fn insert_window(patch: &mut ThresholdPatch, centre: f64, acceptable: f64, warning: f64, keys: [ThresholdKey; 4]) {
    patch.insert(keys[0], (centre - acceptable).max(0.0));
    patch.insert(keys[1], centre + acceptable);
    patch.insert(keys[2], (centre - warning).max(0.0));
    patch.insert(keys[3], centre + warning);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::classifier::ThresholdSet;
    use crate::core_modules::features::{AngleMeasurement, JointAngles};
    use approx::assert_abs_diff_eq;

    fn reference() -> PostureFeatures {
        PostureFeatures {
            angles: JointAngles {
                neck: AngleMeasurement::new(172.0, 0.9),
                back: AngleMeasurement::new(95.0, 0.9),
                hip: AngleMeasurement::new(100.0, 0.9),
                arm_left: AngleMeasurement::new(80.0, 0.9),
                arm_right: AngleMeasurement::new(100.0, 0.9),
                knee_left: AngleMeasurement::new(85.0, 0.9),
                knee_right: AngleMeasurement::new(95.0, 0.9),
            },
            curvature: 0.2,
            trust: 0.9,
        }
    }

    #[test]
    fn trunk_margins() {
        let patch = ThresholdCalibrator::new().calibrate(&reference());
        assert_abs_diff_eq!(patch[&ThresholdKey::TrunkAcceptable], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(patch[&ThresholdKey::TrunkWarning], 0.35, epsilon = 1e-12);
    }

    #[test]
    fn neck_margins_around_deviation() {
        let patch = ThresholdCalibrator::new().calibrate(&reference());
        assert_abs_diff_eq!(patch[&ThresholdKey::NeckAcceptable], 13.0);
        assert_abs_diff_eq!(patch[&ThresholdKey::NeckWarning], 23.0);
    }

    #[test]
    fn arm_window_centred_on_mean() {
        let patch = ThresholdCalibrator::new().calibrate(&reference());
        assert_eq!(patch[&ThresholdKey::ArmAcceptableMin], 80.0);
        assert_eq!(patch[&ThresholdKey::ArmAcceptableMax], 100.0);
        assert_eq!(patch[&ThresholdKey::ArmWarningLower], 70.0);
        assert_eq!(patch[&ThresholdKey::ArmWarningUpper], 110.0);
    }

    #[test]
    fn hip_and_knee_windows() {
        let patch = ThresholdCalibrator::new().calibrate(&reference());
        assert_eq!(patch[&ThresholdKey::HipAcceptableMin], 95.0);
        assert_eq!(patch[&ThresholdKey::HipWarningUpper], 110.0);
        assert_eq!(patch[&ThresholdKey::KneeAcceptableMax], 105.0);
        assert_eq!(patch[&ThresholdKey::KneeWarningLower], 65.0);
    }

    #[test]
    fn low_confidence_segments_are_left_alone() {
        let mut sample = reference();
        sample.trust = 0.3;
        sample.angles.arm_right = AngleMeasurement::new(100.0, 0.2);
        sample.angles.hip = AngleMeasurement::ABSENT;
        let patch = ThresholdCalibrator::new().calibrate(&sample);

        assert!(!patch.contains_key(&ThresholdKey::TrunkAcceptable));
        assert!(!patch.contains_key(&ThresholdKey::ArmAcceptableMin));
        assert!(!patch.contains_key(&ThresholdKey::HipAcceptableMin));
        assert!(patch.contains_key(&ThresholdKey::KneeAcceptableMin));
    }

    #[test]
    fn lower_bounds_are_floored() {
        let mut sample = reference();
        sample.angles.arm_left = AngleMeasurement::new(5.0, 0.9);
        sample.angles.arm_right = AngleMeasurement::new(5.0, 0.9);
        let patch = ThresholdCalibrator::new().calibrate(&sample);

        assert_eq!(patch[&ThresholdKey::ArmAcceptableMin], 0.0);
        assert_eq!(patch[&ThresholdKey::ArmWarningLower], 0.0);
    }

    #[test]
    fn calibrated_set_is_consistent() {
        let patch = ThresholdCalibrator::new().calibrate(&reference());
        assert!(ThresholdSet::default().apply(&patch).is_ok());
    }
}
