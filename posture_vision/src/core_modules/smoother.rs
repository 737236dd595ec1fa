// THEORY:
// The `smoother` is the only piece of per-frame memory in the feature layer. Raw
// curvature jitters from frame to frame as the mask edge flickers; an exponential
// moving average turns it into a steady signal the classifier can threshold.
//
// A raw value of exactly zero means the mask or the ray intersection failed for
// that frame. Such samples are skipped rather than averaged in, so a single
// dropped detection does not drag the smoothed value towards zero.

pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.1;

/// Exponential moving average of back curvature across frames.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    alpha: f64,
    smoothed: Option<f64>,
}

impl TemporalSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            smoothed: None,
        }
    }

    /// Feeds one raw sample and returns the current smoothed value
    /// (0.0 until the first usable sample arrives).
    pub fn update(&mut self, raw: f64) -> f64 {
        if raw > 0.0 {
            self.smoothed = Some(match self.smoothed {
                None => raw,
                Some(previous) => self.alpha * raw + (1.0 - self.alpha) * previous,
            });
        }
        self.value()
    }

    pub fn value(&self) -> f64 {
        self.smoothed.unwrap_or(0.0)
    }
}

impl Default for TemporalSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_FACTOR)
    }
}
