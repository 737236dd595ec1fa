// THEORY:
// The `advice` module turns a classification into short, human-readable guidance.
// It is the last step before a person sees anything: a headline plus one line per
// body segment that is out of its acceptable band. Segments that are unknown get
// no advice, since the engine cannot tell whether they need fixing.

use serde::Serialize;

use crate::core_modules::classifier::{OverallStatus, PostureClassification, SegmentStatus};
use crate::core_modules::features::AngleMeasurement;
use crate::core_modules::features::PostureFeatures;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advice {
    pub message: String,
    pub sub_messages: Vec<String>,
}

/// Builds advice for one frame.
pub fn advise(classification: &PostureClassification, features: &PostureFeatures) -> Advice {
    match classification.overall {
        OverallStatus::Good => {
            return Advice {
                message: "Posture is good".to_string(),
                sub_messages: vec!["Keep it up!".to_string()],
            };
        }
        OverallStatus::Unknown => {
            return Advice {
                message: "Posture unknown".to_string(),
                sub_messages: vec!["Make sure you are fully in view of the camera.".to_string()],
            };
        }
        OverallStatus::Warning | OverallStatus::Meh => {}
    }

    let needs_fix = |status: SegmentStatus| matches!(status, SegmentStatus::Warning | SegmentStatus::NotRecommended);
    let angles = &features.angles;
    let mut sub_messages = Vec::new();

    if needs_fix(classification.trunk) {
        sub_messages.push("Straighten your back.".to_string());
    }
    if needs_fix(classification.neck) {
        sub_messages.push("Bring your head back over your shoulders.".to_string());
    }
    if needs_fix(classification.arm_left) {
        sub_messages.push(format!("Adjust your left arm{}.", rounded(&angles.arm_left)));
    }
    if needs_fix(classification.arm_right) {
        sub_messages.push(format!("Adjust your right arm{}.", rounded(&angles.arm_right)));
    }
    if needs_fix(classification.hip) {
        sub_messages.push(format!("Adjust your hip to 90 degrees{}.", rounded(&angles.hip)));
    }
    if needs_fix(classification.knee) {
        sub_messages.push("Adjust your knees to 90 degrees.".to_string());
    }

    Advice {
        message: "Bad posture".to_string(),
        sub_messages,
    }
}

/// " (currently N°)" when the measurement has a value.
fn rounded(measurement: &AngleMeasurement) -> String {
    measurement
        .value
        .map(|v| format!(" (currently {}°)", v.round()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_posture_is_praised() {
        let classification = PostureClassification {
            overall: OverallStatus::Good,
            ..Default::default()
        };
        let advice = advise(&classification, &PostureFeatures::ABSENT);
        assert_eq!(advice.message, "Posture is good");
        assert_eq!(advice.sub_messages, vec!["Keep it up!".to_string()]);
    }

    #[test]
    fn only_out_of_band_segments_get_lines() {
        let classification = PostureClassification {
            overall: OverallStatus::Warning,
            trunk: SegmentStatus::Warning,
            neck: SegmentStatus::Acceptable,
            arm_left: SegmentStatus::NotRecommended,
            arm_right: SegmentStatus::Unknown,
            hip: SegmentStatus::Acceptable,
            knee: SegmentStatus::Unknown,
        };
        let mut features = PostureFeatures::ABSENT;
        features.angles.arm_left = AngleMeasurement::new(131.4, 0.9);

        let advice = advise(&classification, &features);
        assert_eq!(advice.message, "Bad posture");
        assert_eq!(
            advice.sub_messages,
            vec![
                "Straighten your back.".to_string(),
                "Adjust your left arm (currently 131°).".to_string(),
            ]
        );
    }
}
