// THEORY:
// The `pipeline` module is the top-level, single-threaded API for the posture engine.
// It owns every stateful stage (the curvature smoother and the alert accumulator)
// and runs one frame through the full stack:
//
//   extract -> estimate -> smooth -> classify -> accumulate
//
// Thresholds are passed in on every call rather than owned, because they are shared
// configuration that calibration and remote updates may replace between frames.
// The concurrent `runtime` wraps exactly this struct; tests and the offline tester
// drive it directly.

use crate::config::EngineConfig;
use crate::core_modules::advice::{Advice, advise};
use crate::core_modules::alert::{AlertEngine, AlertEvent};
use crate::core_modules::calibrator::ThresholdCalibrator;
use crate::core_modules::classifier::{PostureClassification, PostureClassifier, ThresholdPatch, ThresholdSet};
use crate::core_modules::curvature::CurvatureEstimator;
use crate::core_modules::features::{FeatureExtractor, PostureFeatures};
use crate::core_modules::landmark::PoseFrame;
use crate::core_modules::smoother::TemporalSmoother;

// Re-export key data structures for the public API.
pub use crate::core_modules::alert::{AlertSettings, BadPosturePolicy};
pub use crate::core_modules::classifier::{OverallStatus, SegmentStatus};

/// Everything the engine concluded about one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PostureReport {
    /// Features with the smoothed curvature in place of the raw one.
    pub features: PostureFeatures,
    pub classification: PostureClassification,
    /// Accumulator temperature after this frame.
    pub temperature: f64,
    /// Set on the frame the accumulator crossed its bound.
    pub alert: Option<AlertEvent>,
}

impl PostureReport {
    pub fn advice(&self) -> Advice {
        advise(&self.classification, &self.features)
    }
}

pub struct PosturePipeline {
    extractor: FeatureExtractor,
    estimator: CurvatureEstimator,
    smoother: TemporalSmoother,
    classifier: PostureClassifier,
    calibrator: ThresholdCalibrator,
    alerts: AlertEngine,
}

impl PosturePipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            extractor: FeatureExtractor::new(),
            estimator: CurvatureEstimator::new(),
            smoother: TemporalSmoother::new(config.smoothing_alpha),
            classifier: PostureClassifier::new(),
            calibrator: ThresholdCalibrator::new(),
            alerts: AlertEngine::new(config.alert, config.cycle_secs),
        }
    }

    /// Runs one frame through the full stack and advances the alert accumulator.
    pub fn process(&mut self, frame: &PoseFrame, thresholds: &ThresholdSet) -> PostureReport {
        let features = self.features(frame);
        let classification = self.classifier.classify(&features, thresholds);
        let alert = self.alerts.update(classification.overall);

        PostureReport {
            features,
            classification,
            temperature: self.alerts.temperature(),
            alert,
        }
    }

    /// Derives a threshold patch treating `reference` as correct posture.
    pub fn calibrate(&self, reference: &PostureFeatures) -> ThresholdPatch {
        self.calibrator.calibrate(reference)
    }

    pub fn temperature(&self) -> f64 {
        self.alerts.temperature()
    }

    fn features(&mut self, frame: &PoseFrame) -> PostureFeatures {
        let Some(landmarks) = frame.landmarks.as_ref() else {
            return PostureFeatures::ABSENT;
        };

        let angles = self.extractor.extract(Some(landmarks), frame.size);
        let estimate = self.estimator.estimate(Some(landmarks), frame.mask.as_ref(), frame.size);
        let curvature = self.smoother.update(estimate.curvature);

        PostureFeatures {
            angles,
            curvature,
            trust: estimate.trust,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::landmark::FrameSize;

    #[test]
    fn empty_frames_are_unknown_and_cool_down() {
        let mut pipeline = PosturePipeline::new(&EngineConfig::default());
        let thresholds = ThresholdSet::default();
        let frame = PoseFrame::empty(FrameSize::new(640, 480));

        let report = pipeline.process(&frame, &thresholds);
        assert_eq!(report.features, PostureFeatures::ABSENT);
        assert_eq!(report.classification.overall, OverallStatus::Unknown);
        assert_eq!(report.temperature, 0.0);
        assert!(report.alert.is_none());
    }

    #[test]
    fn calibration_of_absent_features_is_empty() {
        let pipeline = PosturePipeline::new(&EngineConfig::default());
        assert!(pipeline.calibrate(&PostureFeatures::ABSENT).is_empty());
    }
}
