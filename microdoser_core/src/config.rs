//! Runtime settings for a single pump.
//!
//! These are the validated values the builder consumes. They are separate from
//! the TOML-deserialized config in `microdoser_config`.

use crate::calibration::DEFAULT_RATE_ML_PER_SEC;

/// Per-pump dosing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpSettings {
    /// Index shown in log lines.
    pub index: u8,
    /// Rate used when the store holds no calibration yet (mL/s).
    pub calibration_ml_per_sec: f32,
    /// Total volume per day, split evenly across schedule entries (mL).
    pub daily_dose_ml: f32,
    /// Late-dose recovery window in minutes; 0 disables recovery.
    pub max_late_minutes: u32,
    /// Daily `(hour, minute)` dose times, in evaluation order.
    pub schedule: Vec<(u8, u8)>,
}

impl Default for PumpSettings {
    fn default() -> Self {
        Self {
            index: 0,
            calibration_ml_per_sec: DEFAULT_RATE_ML_PER_SEC,
            daily_dose_ml: 0.0,
            max_late_minutes: 0,
            schedule: Vec::new(),
        }
    }
}
