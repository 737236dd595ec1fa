#![allow(dead_code)]

use std::collections::BTreeMap;

use posture_vision::core_modules::landmark::{BodyPart, FrameSize, Landmark, LandmarkSet, PoseFrame, SegmentationMask};

pub const FRAME: FrameSize = FrameSize { width: 100, height: 100 };

/// Seated, side-on subject with every tracked joint at a textbook angle:
/// head straight over the shoulders, elbows, hip and knees at 90 degrees.
pub fn upright() -> LandmarkSet {
    let mut parts = BTreeMap::new();
    let mut put = |part, x, y| {
        parts.insert(part, Landmark::new(x, y, 0.9));
    };
    put(BodyPart::Nose, 0.51, 0.15);
    put(BodyPart::LeftShoulder, 0.50, 0.30);
    put(BodyPart::RightShoulder, 0.52, 0.30);
    put(BodyPart::LeftElbow, 0.50, 0.45);
    put(BodyPart::RightElbow, 0.52, 0.45);
    put(BodyPart::LeftWrist, 0.65, 0.45);
    put(BodyPart::RightWrist, 0.67, 0.45);
    put(BodyPart::LeftHip, 0.50, 0.60);
    put(BodyPart::RightHip, 0.52, 0.60);
    put(BodyPart::LeftKnee, 0.70, 0.60);
    put(BodyPart::RightKnee, 0.72, 0.60);
    put(BodyPart::LeftAnkle, 0.70, 0.80);
    put(BodyPart::RightAnkle, 0.72, 0.80);
    LandmarkSet::from_parts(&parts)
}

/// Same subject with the head pushed forward (neck about 15 degrees off straight).
pub fn head_forward() -> LandmarkSet {
    upright().with(BodyPart::Nose, Landmark::new(0.55, 0.15, 0.9))
}

/// Torso-shaped foreground block whose back edge sits at x = 40.
pub fn torso_mask() -> SegmentationMask {
    let mut probabilities = vec![0.0f32; (FRAME.width * FRAME.height) as usize];
    for y in 20..=70 {
        for x in 40..=52 {
            probabilities[(y * FRAME.width + x) as usize] = 1.0;
        }
    }
    SegmentationMask::new(FRAME.width, FRAME.height, probabilities).expect("mask dimensions")
}

pub fn frame(landmarks: LandmarkSet) -> PoseFrame {
    PoseFrame {
        size: FRAME,
        landmarks: Some(landmarks),
        mask: None,
    }
}

pub fn frame_with_mask(landmarks: LandmarkSet) -> PoseFrame {
    PoseFrame {
        size: FRAME,
        landmarks: Some(landmarks),
        mask: Some(torso_mask()),
    }
}
