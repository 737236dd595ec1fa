// THEORY:
// The `messages` module is the wire contract between the engine and the outside
// world. Internal types stay free of JSON concerns; the structs here own the field
// naming (camelCase outbound, snake_case inbound), the null encoding of absent
// measurements, and the leniency rules for inbound config.
//
// Outbound floats are always plain finite numbers or `null`. A NaN or infinity
// reaching this layer is a degenerate measurement, not something to put on the wire.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core_modules::classifier::{OverallStatus, PostureClassification, ThresholdKey, ThresholdPatch};
use crate::core_modules::features::{AngleMeasurement, PostureFeatures};

/// `{value, confidence}` pair as sent on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementWire {
    pub value: Option<f64>,
    pub confidence: Option<f64>,
}

impl MeasurementWire {
    pub fn new(value: Option<f64>, confidence: Option<f64>) -> Self {
        Self {
            value: value.filter(|v| v.is_finite()),
            confidence: confidence.filter(|c| c.is_finite()),
        }
    }
}

impl From<AngleMeasurement> for MeasurementWire {
    fn from(m: AngleMeasurement) -> Self {
        Self::new(m.value, m.confidence)
    }
}

/// One outbound posture update, published every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureUpdate {
    pub device_id: Option<String>,
    pub action: String,
    pub trust: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub neck_angle: MeasurementWire,
    pub back_curvature: MeasurementWire,
    #[serde(rename = "armAngleL")]
    pub arm_angle_l: MeasurementWire,
    #[serde(rename = "armAngleR")]
    pub arm_angle_r: MeasurementWire,
    pub hip_angle: MeasurementWire,
    #[serde(rename = "kneeAngleL")]
    pub knee_angle_l: MeasurementWire,
    #[serde(rename = "kneeAngleR")]
    pub knee_angle_r: MeasurementWire,
    pub posture: PostureClassification,
}

impl PostureUpdate {
    pub const ACTION: &'static str = "update";

    pub fn new(
        device_id: Option<String>,
        timestamp: DateTime<Utc>,
        features: &PostureFeatures,
        classification: &PostureClassification,
    ) -> Self {
        let angles = &features.angles;
        Self {
            device_id,
            action: Self::ACTION.to_string(),
            trust: Some(features.trust).filter(|t| t.is_finite()),
            timestamp,
            neck_angle: angles.neck.into(),
            back_curvature: MeasurementWire::new(Some(features.curvature), Some(features.trust)),
            arm_angle_l: angles.arm_left.into(),
            arm_angle_r: angles.arm_right.into(),
            hip_angle: angles.hip.into(),
            knee_angle_l: angles.knee_left.into(),
            knee_angle_r: angles.knee_right.into(),
            posture: *classification,
        }
    }
}

/// Inbound configuration or identity update from the remote collaborator.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default, alias = "deviceId")]
    pub device_id: Option<String>,
    /// Raw threshold map; keys and values are checked in `threshold_patch`.
    #[serde(default)]
    pub thresholds: Option<BTreeMap<String, serde_json::Value>>,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The device id, if present and non-empty.
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// Builds a patch from the known, numeric entries. Everything else is skipped with a warning.
    pub fn threshold_patch(&self) -> Option<ThresholdPatch> {
        let raw = self.thresholds.as_ref()?;
        let mut patch = ThresholdPatch::new();
        for (name, value) in raw {
            let key = match name.parse::<ThresholdKey>() {
                Ok(key) => key,
                Err(err) => {
                    warn!("ignoring inbound threshold: {err}");
                    continue;
                }
            };
            match value.as_f64() {
                Some(number) => {
                    patch.insert(key, number);
                }
                None => warn!("ignoring inbound threshold {key}: {value} is not a number"),
            }
        }
        Some(patch)
    }
}

/// Body of the alert POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub device_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub posture: OverallStatus,
    pub temperature: f64,
}
