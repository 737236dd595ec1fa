// THEORY:
// The `curvature` module estimates how rounded the subject's back is, using the
// silhouette rather than the sparse skeleton. The skeleton gives a straight torso
// axis; the segmentation contour shows where the back actually is. The further the
// back bulges away from the axis, the more the spine is curving.
//
// Algorithm steps:
// 1.  Build the torso axis from the shoulder midpoint to the hip midpoint and take
//     its midpoint ("axis-mid").
// 2.  Cast a ray from axis-mid perpendicular to the axis, flipped if needed so it
//     points away from the nose (towards the back).
// 3.  Intersect the ray with the largest external contour of the mask and keep
//     the nearest hit.
// 4.  Curvature = hit distance / (spine length + neck length). The normalization
//     makes the value independent of how far the subject sits from the camera.
// 5.  Trust comes from the torso's aspect ratio: a side-on torso looks tall and
//     narrow and is where the measurement is meaningful; a front-on torso looks
//     wide and earns low trust.
//
// Both shoulders and both hips must pass the visibility gate. Without them there
// is no axis to measure from, and the estimate is zero with zero trust.

use crate::core_modules::contour::contour_walk::{largest_external_contour, nearest_ray_hit};
use crate::core_modules::geometry::{EPSILON, Point2};
use crate::core_modules::landmark::{BodyPart, FrameSize, LandmarkSet, SegmentationMask};

/// Torso height-to-width ratio at which trust saturates at 1.0.
const FULL_TRUST_ASPECT_RATIO: f64 = 2.5;

const TORSO: [BodyPart; 4] = [
    BodyPart::LeftShoulder,
    BodyPart::RightShoulder,
    BodyPart::LeftHip,
    BodyPart::RightHip,
];

/// Result of one curvature estimate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CurvatureEstimate {
    /// Normalized distance from the torso axis to the back contour, >= 0.
    pub curvature: f64,
    /// Confidence in the estimate, in [0, 1].
    pub trust: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CurvatureEstimator;

impl CurvatureEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(
        &self,
        landmarks: Option<&LandmarkSet>,
        mask: Option<&SegmentationMask>,
        frame: FrameSize,
    ) -> CurvatureEstimate {
        let Some(lm) = landmarks else {
            return CurvatureEstimate::default();
        };
        if !TORSO.iter().all(|part| lm[*part].is_visible()) {
            return CurvatureEstimate::default();
        }

        // --- 1. Torso Axis ---
        let left_shoulder = lm[BodyPart::LeftShoulder].to_pixels(frame);
        let right_shoulder = lm[BodyPart::RightShoulder].to_pixels(frame);
        let shoulder_mid = left_shoulder.midpoint(right_shoulder);
        let hip_mid = lm[BodyPart::LeftHip]
            .to_pixels(frame)
            .midpoint(lm[BodyPart::RightHip].to_pixels(frame));
        let nose = lm[BodyPart::Nose].to_pixels(frame);
        let axis_mid = shoulder_mid.midpoint(hip_mid);

        // --- 2. Trust From Aspect Ratio ---
        let torso_height = shoulder_mid.distance(hip_mid);
        let torso_width = left_shoulder.distance(right_shoulder);
        let trust = (torso_height / torso_width.max(EPSILON) / FULL_TRUST_ASPECT_RATIO).clamp(0.0, 1.0);

        // --- 3. Ray Towards The Back ---
        let Some(ray_dir) = back_direction(shoulder_mid, hip_mid, nose, axis_mid) else {
            return CurvatureEstimate { curvature: 0.0, trust };
        };

        // --- 4. Contour Intersection ---
        let Some(contour) = mask.and_then(largest_external_contour) else {
            return CurvatureEstimate { curvature: 0.0, trust };
        };
        let Some(hit) = nearest_ray_hit(&contour, axis_mid, ray_dir) else {
            return CurvatureEstimate { curvature: 0.0, trust };
        };

        // --- 5. Normalization ---
        let spine_length = shoulder_mid.distance(hip_mid);
        let neck_length = nose.distance(shoulder_mid);
        let curvature = hit.point.distance(axis_mid) / (spine_length + neck_length).max(EPSILON);

        CurvatureEstimate { curvature, trust }
    }
}

/// Unit vector perpendicular to the torso axis, on the side facing away from the nose.
fn back_direction(shoulder_mid: Point2, hip_mid: Point2, nose: Point2, axis_mid: Point2) -> Option<Point2> {
    let perpendicular = (hip_mid - shoulder_mid).perpendicular().normalized()?;
    if perpendicular.dot(nose - axis_mid) > 0.0 {
        Some(perpendicular * -1.0)
    } else {
        Some(perpendicular)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::landmark::Landmark;
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeMap;

    const FRAME: FrameSize = FrameSize { width: 100, height: 100 };

    /// Side-on subject facing right (+x): nose ahead of the torso.
    fn side_on() -> LandmarkSet {
        let mut parts = BTreeMap::new();
        parts.insert(BodyPart::Nose, Landmark::new(0.60, 0.20, 0.9));
        parts.insert(BodyPart::LeftShoulder, Landmark::new(0.50, 0.30, 0.9));
        parts.insert(BodyPart::RightShoulder, Landmark::new(0.52, 0.30, 0.9));
        parts.insert(BodyPart::LeftHip, Landmark::new(0.50, 0.70, 0.9));
        parts.insert(BodyPart::RightHip, Landmark::new(0.52, 0.70, 0.9));
        LandmarkSet::from_parts(&parts)
    }

    /// Foreground rectangle spanning x in [x0, x1] for rows 10..=90.
    fn body_mask(x0: u32, x1: u32) -> SegmentationMask {
        let mut probs = vec![0.0f32; 100 * 100];
        for y in 10..=90u32 {
            for x in x0..=x1 {
                probs[(y * 100 + x) as usize] = 1.0;
            }
        }
        SegmentationMask::new(100, 100, probs).expect("mask dims")
    }

    #[test]
    fn no_landmarks_means_zero() {
        let estimate = CurvatureEstimator::new().estimate(None, Some(&body_mask(30, 70)), FRAME);
        assert_eq!(estimate, CurvatureEstimate { curvature: 0.0, trust: 0.0 });
    }

    #[test]
    fn no_mask_keeps_trust() {
        let estimate = CurvatureEstimator::new().estimate(Some(&side_on()), None, FRAME);

        assert_eq!(estimate.curvature, 0.0);
        // Torso 40px tall, 2px wide: ratio 20 saturates trust.
        assert_abs_diff_eq!(estimate.trust, 1.0);
    }

    #[test]
    fn ray_measures_distance_to_back() {
        let estimate = CurvatureEstimator::new().estimate(Some(&side_on()), Some(&body_mask(31, 70)), FRAME);

        // axis-mid = (51, 50); the back edge is at x = 31, 20px behind.
        // spine = 40, neck = |(60,20) - (51,30)| = sqrt(181).
        let expected = 20.0 / (40.0 + 181f64.sqrt());
        assert_abs_diff_eq!(estimate.curvature, expected, epsilon = 1e-9);
    }

    #[test]
    fn front_on_torso_has_low_trust() {
        let lm = side_on()
            .with(BodyPart::LeftShoulder, Landmark::new(0.30, 0.30, 0.9))
            .with(BodyPart::RightShoulder, Landmark::new(0.70, 0.30, 0.9))
            .with(BodyPart::LeftHip, Landmark::new(0.35, 0.70, 0.9))
            .with(BodyPart::RightHip, Landmark::new(0.65, 0.70, 0.9));
        let estimate = CurvatureEstimator::new().estimate(Some(&lm), None, FRAME);

        // Height 40, width 40: ratio 1.0 / 2.5.
        assert_abs_diff_eq!(estimate.trust, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn hidden_torso_joint_zeroes_trust() {
        for part in TORSO {
            let lm = side_on().with(part, Landmark::new(0.0, 0.0, 0.3));
            let estimate = CurvatureEstimator::new().estimate(Some(&lm), Some(&body_mask(31, 70)), FRAME);
            assert_eq!(estimate, CurvatureEstimate::default(), "{part:?} hidden");
        }
    }

    #[test]
    fn ray_that_misses_contour_is_zero() {
        // Foreground entirely in front of the subject.
        let estimate = CurvatureEstimator::new().estimate(Some(&side_on()), Some(&body_mask(60, 90)), FRAME);
        assert_eq!(estimate.curvature, 0.0);
    }

    #[test]
    fn degenerate_axis_is_zero() {
        let lm = side_on()
            .with(BodyPart::LeftHip, Landmark::new(0.50, 0.30, 0.9))
            .with(BodyPart::RightHip, Landmark::new(0.52, 0.30, 0.9));
        let estimate = CurvatureEstimator::new().estimate(Some(&lm), Some(&body_mask(31, 70)), FRAME);
        assert_eq!(estimate.curvature, 0.0);
        assert!(estimate.curvature >= 0.0);
    }
}
