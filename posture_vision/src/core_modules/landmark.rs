// THEORY:
// The `landmark` module is the data contract between the engine and the external
// pose/segmentation producer. Everything here is a "dumb" immutable container:
// one frame's worth of body keypoints and the foreground mask, plus the minimum
// conversions needed to move between normalized image coordinates and pixels.
//
// Key architectural principles:
// 1.  **Fixed, Indexable Layout**: A `LandmarkSet` is an array keyed by `BodyPart`,
//     never a loose map. A part the producer did not report is stored with zero
//     visibility so it simply fails every confidence gate downstream.
// 2.  **Derived Joints Are Plain Landmarks**: Shoulder and hip midpoints are built
//     with `Landmark::midpoint` and have exactly the same shape as a measured
//     keypoint. No caller needs to know whether a joint was observed or derived.
// 3.  **Absence Is Data**: A frame with no detected pose carries `landmarks: None`.
//     That is a normal state of the world, not an error.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;

use crate::core_modules::geometry::Point2;

/// Visibility a landmark must strictly exceed to contribute to a measurement.
pub const VISIBILITY_GATE: f64 = 0.5;

/// The body keypoints the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl BodyPart {
    pub const COUNT: usize = 13;

    pub const ALL: [BodyPart; Self::COUNT] = [
        BodyPart::Nose,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
    ];

    /// Position of this part in the 33-point MediaPipe BlazePose layout.
    pub fn mediapipe_index(self) -> usize {
        match self {
            BodyPart::Nose => 0,
            BodyPart::LeftShoulder => 11,
            BodyPart::RightShoulder => 12,
            BodyPart::LeftElbow => 13,
            BodyPart::RightElbow => 14,
            BodyPart::LeftWrist => 15,
            BodyPart::RightWrist => 16,
            BodyPart::LeftHip => 23,
            BodyPart::RightHip => 24,
            BodyPart::LeftKnee => 25,
            BodyPart::RightKnee => 26,
            BodyPart::LeftAnkle => 27,
            BodyPart::RightAnkle => 28,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// A single tracked keypoint in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// Horizontal position, 0.0 (left edge) to 1.0 (right edge).
    pub x: f64,
    /// Vertical position, 0.0 (top edge) to 1.0 (bottom edge).
    pub y: f64,
    /// Producer confidence that the keypoint is present and visible, 0.0 to 1.0.
    #[serde(default)]
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self { x, y, visibility }
    }

    pub fn is_visible(&self) -> bool {
        self.visibility > VISIBILITY_GATE
    }

    /// Position in pixel space for a frame of the given size.
    pub fn to_pixels(&self, frame: FrameSize) -> Point2 {
        Point2::new(self.x * frame.width as f64, self.y * frame.height as f64)
    }

    /// Builds a synthetic joint halfway between two landmarks.
    ///
    /// The midpoint is taken in pixel space and normalized back so it lines up
    /// with raw landmarks even on non-square frames. Visibility is the weaker of
    /// the two sources.
    pub fn midpoint(a: &Landmark, b: &Landmark, frame: FrameSize) -> Landmark {
        let mid = a.to_pixels(frame).midpoint(b.to_pixels(frame));
        Landmark {
            x: mid.x / frame.width.max(1) as f64,
            y: mid.y / frame.height.max(1) as f64,
            visibility: a.visibility.min(b.visibility),
        }
    }
}

/// Pixel dimensions of the frame the landmarks were measured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// One frame's worth of keypoints, indexable by `BodyPart`.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Landmark; BodyPart::COUNT],
}

impl LandmarkSet {
    pub fn from_parts(parts: &BTreeMap<BodyPart, Landmark>) -> Self {
        let mut points = [Landmark::default(); BodyPart::COUNT];
        for (part, landmark) in parts {
            points[part.slot()] = *landmark;
        }
        Self { points }
    }

    /// Picks the tracked parts out of a full MediaPipe pose result.
    pub fn from_mediapipe(points: &[Landmark]) -> Option<Self> {
        let needed = BodyPart::ALL.iter().map(|p| p.mediapipe_index()).max()?;
        if points.len() <= needed {
            return None;
        }
        let mut set = [Landmark::default(); BodyPart::COUNT];
        for part in BodyPart::ALL {
            set[part.slot()] = points[part.mediapipe_index()];
        }
        Some(Self { points: set })
    }

    pub fn with(mut self, part: BodyPart, landmark: Landmark) -> Self {
        self.points[part.slot()] = landmark;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (BodyPart, &Landmark)> {
        BodyPart::ALL.iter().map(|p| (*p, &self.points[p.slot()]))
    }
}

impl Index<BodyPart> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, part: BodyPart) -> &Self::Output {
        &self.points[part.slot()]
    }
}

/// Per-pixel foreground probability for the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    /// Row-major probabilities in [0, 1], `width * height` entries.
    probabilities: Vec<f32>,
}

impl SegmentationMask {
    pub const FOREGROUND_THRESHOLD: f32 = 0.5;

    /// Returns `None` when the buffer does not match the stated dimensions.
    pub fn new(width: u32, height: u32, probabilities: Vec<f32>) -> Option<Self> {
        if probabilities.len() != width as usize * height as usize {
            return None;
        }
        Some(Self { width, height, probabilities })
    }

    /// Wraps an 8-bit mask image, mapping 0..255 to 0.0..1.0.
    pub fn from_luma(image: &GrayImage) -> Self {
        let probabilities = image.pixels().map(|p| p.0[0] as f32 / 255.0).collect();
        Self {
            width: image.width(),
            height: image.height(),
            probabilities,
        }
    }

    pub fn probability(&self, x: u32, y: u32) -> f32 {
        self.probabilities[(y * self.width + x) as usize]
    }

    /// Binary foreground image: strictly above 0.5 becomes 255, everything else 0.
    pub fn to_binary(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.probability(x, y) > Self::FOREGROUND_THRESHOLD {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        })
    }
}

/// Everything the external producer hands over for one frame.
#[derive(Debug, Clone)]
pub struct PoseFrame {
    pub size: FrameSize,
    /// `None` when no pose was detected.
    pub landmarks: Option<LandmarkSet>,
    pub mask: Option<SegmentationMask>,
}

impl PoseFrame {
    pub fn empty(size: FrameSize) -> Self {
        Self {
            size,
            landmarks: None,
            mask: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_parts_are_invisible() {
        let mut parts = BTreeMap::new();
        parts.insert(BodyPart::Nose, Landmark::new(0.5, 0.2, 0.9));
        let set = LandmarkSet::from_parts(&parts);

        assert!(set[BodyPart::Nose].is_visible());
        assert!(!set[BodyPart::LeftKnee].is_visible());
        assert_eq!(set[BodyPart::LeftKnee].visibility, 0.0);
    }

    #[test]
    fn visibility_gate_is_strict() {
        assert!(!Landmark::new(0.0, 0.0, 0.5).is_visible());
        assert!(Landmark::new(0.0, 0.0, 0.51).is_visible());
    }

    #[test]
    fn midpoint_takes_weaker_visibility() {
        let frame = FrameSize::new(640, 480);
        let a = Landmark::new(0.2, 0.4, 0.9);
        let b = Landmark::new(0.4, 0.6, 0.6);
        let mid = Landmark::midpoint(&a, &b, frame);

        assert!((mid.x - 0.3).abs() < 1e-9);
        assert!((mid.y - 0.5).abs() < 1e-9);
        assert_eq!(mid.visibility, 0.6);
    }

    #[test]
    fn mediapipe_layout_is_remapped() {
        let mut raw = vec![Landmark::default(); 33];
        raw[0] = Landmark::new(0.5, 0.1, 0.99);
        raw[26] = Landmark::new(0.6, 0.8, 0.7);
        let set = LandmarkSet::from_mediapipe(&raw).expect("33 points");

        assert_eq!(set[BodyPart::Nose], raw[0]);
        assert_eq!(set[BodyPart::RightKnee], raw[26]);
        assert!(LandmarkSet::from_mediapipe(&raw[..20]).is_none());
    }

    #[test]
    fn mask_binarizes_above_half() {
        let mask = SegmentationMask::new(2, 1, vec![0.5, 0.8]).expect("2x1 mask");
        let binary = mask.to_binary();

        assert_eq!(binary.get_pixel(0, 0).0[0], 0);
        assert_eq!(binary.get_pixel(1, 0).0[0], 255);
        assert!(SegmentationMask::new(2, 2, vec![0.0]).is_none());
    }
}
