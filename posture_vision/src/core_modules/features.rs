// THEORY:
// The `features` module is the first analysis layer. It converts one frame's
// `LandmarkSet` into named joint angles, each paired with the confidence of the
// keypoints it was measured from.
//
// Key architectural principles:
// 1.  **Gate Before Measure**: A joint triple is only measured when all three
//     contributing landmarks are visible (> 0.5). Otherwise the measurement is
//     absent: no value, no confidence. A missing joint is never reported as 0.
// 2.  **Defined Degenerate Result**: If the landmarks pass the gate but two of them
//     coincide, the angle is undefined. That case is reported as 0 degrees with
//     confidence 0, which downstream gates treat as unknown.
// 3.  **Pixel Space Geometry**: Angles are measured on pixel coordinates so a
//     non-square frame does not skew them.
// 4.  **Stateless**: The extractor holds no memory between frames.

use serde::{Deserialize, Serialize};

use crate::core_modules::geometry::angle_at_vertex;
use crate::core_modules::landmark::{BodyPart, FrameSize, Landmark, LandmarkSet};

/// A single joint angle and the confidence of its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AngleMeasurement {
    /// Degrees in [0, 180], or `None` when the joint could not be measured.
    pub value: Option<f64>,
    /// Minimum visibility of the contributing landmarks, or `None` when absent.
    pub confidence: Option<f64>,
}

impl AngleMeasurement {
    pub const ABSENT: AngleMeasurement = AngleMeasurement {
        value: None,
        confidence: None,
    };

    pub fn new(value: f64, confidence: f64) -> Self {
        Self {
            value: Some(value),
            confidence: Some(confidence),
        }
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    /// The value, if it is present and its confidence reaches `min_confidence`.
    pub fn trusted(&self, min_confidence: f64) -> Option<f64> {
        match (self.value, self.confidence) {
            (Some(value), Some(confidence)) if confidence >= min_confidence => Some(value),
            _ => None,
        }
    }
}

/// Every joint angle the engine tracks for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct JointAngles {
    pub neck: AngleMeasurement,
    pub back: AngleMeasurement,
    pub hip: AngleMeasurement,
    pub arm_left: AngleMeasurement,
    pub arm_right: AngleMeasurement,
    pub knee_left: AngleMeasurement,
    pub knee_right: AngleMeasurement,
}

impl JointAngles {
    pub const ABSENT: JointAngles = JointAngles {
        neck: AngleMeasurement::ABSENT,
        back: AngleMeasurement::ABSENT,
        hip: AngleMeasurement::ABSENT,
        arm_left: AngleMeasurement::ABSENT,
        arm_right: AngleMeasurement::ABSENT,
        knee_left: AngleMeasurement::ABSENT,
        knee_right: AngleMeasurement::ABSENT,
    };
}

/// The complete feature vector for one frame, consumed by the classifier and
/// by the publish path.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PostureFeatures {
    pub angles: JointAngles,
    /// Normalized back curvature, >= 0. Zero when it could not be determined.
    pub curvature: f64,
    /// Confidence in `curvature`, in [0, 1].
    pub trust: f64,
}

impl PostureFeatures {
    pub const ABSENT: PostureFeatures = PostureFeatures {
        angles: JointAngles::ABSENT,
        curvature: 0.0,
        trust: 0.0,
    };
}

/// Converts landmark sets into joint angles.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Measures every tracked joint. `None` landmarks yield all-absent angles.
    pub fn extract(&self, landmarks: Option<&LandmarkSet>, frame: FrameSize) -> JointAngles {
        let Some(lm) = landmarks else {
            return JointAngles::ABSENT;
        };

        let shoulder_mid = Landmark::midpoint(&lm[BodyPart::LeftShoulder], &lm[BodyPart::RightShoulder], frame);
        let hip_mid = Landmark::midpoint(&lm[BodyPart::LeftHip], &lm[BodyPart::RightHip], frame);

        JointAngles {
            neck: measure(&lm[BodyPart::Nose], &shoulder_mid, &hip_mid, frame),
            back: self.back_angle(lm, frame),
            hip: self.hip_angle(lm, &shoulder_mid, &hip_mid, frame),
            arm_left: measure(
                &lm[BodyPart::LeftShoulder],
                &lm[BodyPart::LeftElbow],
                &lm[BodyPart::LeftWrist],
                frame,
            ),
            arm_right: measure(
                &lm[BodyPart::RightShoulder],
                &lm[BodyPart::RightElbow],
                &lm[BodyPart::RightWrist],
                frame,
            ),
            knee_left: measure(&lm[BodyPart::LeftHip], &lm[BodyPart::LeftKnee], &lm[BodyPart::LeftAnkle], frame),
            knee_right: measure(
                &lm[BodyPart::RightHip],
                &lm[BodyPart::RightKnee],
                &lm[BodyPart::RightAnkle],
                frame,
            ),
        }
    }

    /// Angle at the hip between knee and shoulder, on the better-seen side.
    fn back_angle(&self, lm: &LandmarkSet, frame: FrameSize) -> AngleMeasurement {
        let left = [BodyPart::LeftKnee, BodyPart::LeftHip, BodyPart::LeftShoulder];
        let right = [BodyPart::RightKnee, BodyPart::RightHip, BodyPart::RightShoulder];
        let side_confidence = |side: &[BodyPart; 3]| {
            side.iter()
                .map(|p| lm[*p].visibility)
                .fold(f64::INFINITY, f64::min)
        };
        let side = if side_confidence(&right) > side_confidence(&left) {
            right
        } else {
            left
        };
        measure(&lm[side[0]], &lm[side[1]], &lm[side[2]], frame)
    }

    /// Angle at the hip midpoint between the shoulder midpoint and the nearer visible knee.
    fn hip_angle(
        &self,
        lm: &LandmarkSet,
        shoulder_mid: &Landmark,
        hip_mid: &Landmark,
        frame: FrameSize,
    ) -> AngleMeasurement {
        let left_knee = &lm[BodyPart::LeftKnee];
        let right_knee = &lm[BodyPart::RightKnee];

        let knee = match (left_knee.is_visible(), right_knee.is_visible()) {
            (true, true) => {
                let hip_px = hip_mid.to_pixels(frame);
                let left_dist = left_knee.to_pixels(frame).distance(hip_px);
                let right_dist = right_knee.to_pixels(frame).distance(hip_px);
                if right_dist < left_dist { right_knee } else { left_knee }
            }
            (true, false) => left_knee,
            (false, true) => right_knee,
            (false, false) => return AngleMeasurement::ABSENT,
        };
        measure(shoulder_mid, hip_mid, knee, frame)
    }
}

/// Measures the angle at `vertex`, applying the visibility gate first.
fn measure(p1: &Landmark, vertex: &Landmark, p3: &Landmark, frame: FrameSize) -> AngleMeasurement {
    if !(p1.is_visible() && vertex.is_visible() && p3.is_visible()) {
        return AngleMeasurement::ABSENT;
    }
    let confidence = p1.visibility.min(vertex.visibility).min(p3.visibility);
    match angle_at_vertex(p1.to_pixels(frame), vertex.to_pixels(frame), p3.to_pixels(frame)) {
        Some(degrees) => AngleMeasurement::new(degrees, confidence),
        None => AngleMeasurement::new(0.0, 0.0),
    }
}
