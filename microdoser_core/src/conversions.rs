//! `From` implementations bridging `microdoser_config` types to `microdoser_core` types.

use crate::config::PumpSettings;

impl From<&microdoser_config::PumpCfg> for PumpSettings {
    fn from(c: &microdoser_config::PumpCfg) -> Self {
        Self {
            index: c.index,
            calibration_ml_per_sec: c.calibration_ml_per_sec,
            daily_dose_ml: c.daily_dose_ml,
            max_late_minutes: c.max_late_minutes,
            schedule: c.schedule.iter().map(|s| (s.hour, s.minute)).collect(),
        }
    }
}
