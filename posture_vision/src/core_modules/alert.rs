// THEORY:
// The `alert` module is a leaky integrator. A single slouched frame means nothing;
// slouching for a minute does. Every cycle the "temperature" rises while the
// posture is bad and cools while it is not. Only a sustained bad stretch pushes
// it past the alert bound.
//
// Key architectural principles:
// 1.  **One Continuous Variable**: Temperature is the whole state. It never drops
//     below zero, so a long good stretch cannot bank credit against future slouching.
// 2.  **Explicit Bad Condition**: Which overall verdicts count as "bad" is a policy
//     (`BadPosturePolicy`), not something hard-coded. An `Unknown` verdict (nobody
//     in frame, or nothing measurable) is never bad and always cools.
// 3.  **One-Shot Latch**: An alert fires on the cycle the temperature first crosses
//     the bound. It re-arms only after the temperature has cooled all the way back
//     to zero, so a long slouch produces one alert, not one per cycle.

use serde::{Deserialize, Serialize};

use crate::core_modules::classifier::OverallStatus;

/// Which overall verdicts heat the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadPosturePolicy {
    /// Only `MEH` is bad.
    Meh,
    /// Only `WARNING` is bad.
    Warning,
    /// Both `WARNING` and `MEH` are bad.
    #[default]
    NonGood,
}

impl BadPosturePolicy {
    pub fn is_bad(self, overall: OverallStatus) -> bool {
        match self {
            BadPosturePolicy::Meh => overall == OverallStatus::Meh,
            BadPosturePolicy::Warning => overall == OverallStatus::Warning,
            BadPosturePolicy::NonGood => matches!(overall, OverallStatus::Warning | OverallStatus::Meh),
        }
    }
}

/// Tuning for the integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Temperature gained per second of bad posture.
    pub increase_rate: f64,
    /// Temperature lost per second of acceptable posture.
    pub decrease_rate: f64,
    /// Alert bound, in seconds-equivalent; compared against `threshold * cycle`.
    pub threshold: f64,
    pub policy: BadPosturePolicy,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            increase_rate: 0.1,
            decrease_rate: 0.05,
            threshold: 1.0,
            policy: BadPosturePolicy::NonGood,
        }
    }
}

/// Emitted on the cycle the temperature crosses the alert bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvent {
    pub overall: OverallStatus,
    pub temperature: f64,
}

#[derive(Debug, Clone)]
pub struct AlertEngine {
    settings: AlertSettings,
    /// Cycle length in seconds.
    cycle_secs: f64,
    temperature: f64,
    latched: bool,
}

impl AlertEngine {
    pub fn new(settings: AlertSettings, cycle_secs: f64) -> Self {
        Self {
            settings,
            cycle_secs,
            temperature: 0.0,
            latched: false,
        }
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Advances the integrator by one cycle.
    pub fn update(&mut self, overall: OverallStatus) -> Option<AlertEvent> {
        if self.settings.policy.is_bad(overall) {
            self.temperature += self.settings.increase_rate * self.cycle_secs;
        } else {
            self.temperature -= self.settings.decrease_rate * self.cycle_secs;
        }
        self.temperature = self.temperature.max(0.0);

        if self.temperature == 0.0 {
            self.latched = false;
        }

        if self.temperature > self.settings.threshold * self.cycle_secs && !self.latched {
            self.latched = true;
            return Some(AlertEvent {
                overall,
                temperature: self.temperature,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn engine() -> AlertEngine {
        AlertEngine::new(AlertSettings::default(), 0.3)
    }

    #[test]
    fn sustained_bad_posture_fires_once() {
        let mut engine = engine();
        let alerts: Vec<AlertEvent> = (0..40).filter_map(|_| engine.update(OverallStatus::Warning)).collect();

        assert_abs_diff_eq!(engine.temperature(), 1.2, epsilon = 1e-9);
        assert_eq!(alerts.len(), 1);
        assert!(alerts[0].temperature > 0.3);
        assert!(engine.is_latched());
    }

    #[test]
    fn good_cycle_cools_by_decrease_rate() {
        let mut engine = engine();
        for _ in 0..40 {
            engine.update(OverallStatus::Meh);
        }
        engine.update(OverallStatus::Good);
        assert_abs_diff_eq!(engine.temperature(), 1.2 - 0.015, epsilon = 1e-9);
    }

    #[test]
    fn temperature_never_negative() {
        let mut engine = engine();
        for _ in 0..10 {
            engine.update(OverallStatus::Good);
        }
        assert_eq!(engine.temperature(), 0.0);
    }

    #[test]
    fn unknown_cools() {
        let mut engine = engine();
        engine.update(OverallStatus::Warning);
        engine.update(OverallStatus::Unknown);
        assert_abs_diff_eq!(engine.temperature(), 0.03 - 0.015, epsilon = 1e-12);
    }

    #[test]
    fn latch_rearms_after_full_cooldown() {
        let mut engine = engine();
        for _ in 0..15 {
            engine.update(OverallStatus::Warning);
        }
        assert!(engine.is_latched());

        // Cool partway: still above zero, so another bad stretch stays silent.
        for _ in 0..5 {
            engine.update(OverallStatus::Good);
        }
        let refire: Vec<_> = (0..5).filter_map(|_| engine.update(OverallStatus::Warning)).collect();
        assert!(refire.is_empty());

        // Cool all the way down, then slouch again.
        while engine.temperature() > 0.0 {
            engine.update(OverallStatus::Good);
        }
        assert!(!engine.is_latched());
        let refire: Vec<_> = (0..15).filter_map(|_| engine.update(OverallStatus::Warning)).collect();
        assert_eq!(refire.len(), 1);
    }

    #[test]
    fn policies() {
        assert!(BadPosturePolicy::Meh.is_bad(OverallStatus::Meh));
        assert!(!BadPosturePolicy::Meh.is_bad(OverallStatus::Warning));
        assert!(BadPosturePolicy::Warning.is_bad(OverallStatus::Warning));
        assert!(!BadPosturePolicy::Warning.is_bad(OverallStatus::Meh));
        assert!(BadPosturePolicy::NonGood.is_bad(OverallStatus::Meh));
        assert!(!BadPosturePolicy::NonGood.is_bad(OverallStatus::Unknown));
        assert!(!BadPosturePolicy::NonGood.is_bad(OverallStatus::Good));
    }
}
