//! Builder for `PumpController`.
//!
//! All settings are validated on `build()`, which also loads (or seeds) the
//! persisted calibration so a built pump is immediately ready to dose.

use std::rc::Rc;
use std::sync::Arc;

use microdoser_traits::clock::{Clock, MonotonicClock};
use microdoser_traits::{Actuator, EnableSwitch, PreferenceStore, WallClock};

use crate::calibration::is_usable_rate;
use crate::config::PumpSettings;
use crate::error::BuildError;
use crate::keys;
use crate::pump::PumpController;
use crate::schedule::ScheduleEntry;

impl PumpController {
    /// Start building a pump identified by `id`.
    pub fn builder(id: impl Into<String>) -> PumpBuilder {
        PumpBuilder::new(id)
    }
}

/// Builder for `PumpController`.
pub struct PumpBuilder {
    id: String,
    settings: PumpSettings,
    actuator: Option<Box<dyn Actuator>>,
    wall_clock: Option<Rc<dyn WallClock>>,
    enable: Option<Rc<dyn EnableSwitch>>,
    store: Option<Rc<dyn PreferenceStore>>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
}

impl PumpBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            settings: PumpSettings::default(),
            actuator: None,
            wall_clock: None,
            enable: None,
            store: None,
            clock: None,
        }
    }

    /// Replace all dosing settings at once.
    pub fn with_settings(mut self, settings: PumpSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_index(mut self, index: u8) -> Self {
        self.settings.index = index;
        self
    }

    /// Rate used until a stored calibration exists (mL/s).
    pub fn with_calibration(mut self, ml_per_sec: f32) -> Self {
        self.settings.calibration_ml_per_sec = ml_per_sec;
        self
    }

    pub fn with_daily_dose_ml(mut self, ml: f32) -> Self {
        self.settings.daily_dose_ml = ml;
        self
    }

    /// Append a daily dose time.
    pub fn add_schedule(mut self, hour: u8, minute: u8) -> Self {
        self.settings.schedule.push((hour, minute));
        self
    }

    pub fn with_max_late_minutes(mut self, minutes: u32) -> Self {
        self.settings.max_late_minutes = minutes;
        self
    }

    pub fn with_actuator(mut self, actuator: impl Actuator + 'static) -> Self {
        self.actuator = Some(Box::new(actuator));
        self
    }

    /// Set an already-boxed output, or explicitly none.
    pub fn with_boxed_actuator(mut self, actuator: Option<Box<dyn Actuator>>) -> Self {
        self.actuator = actuator;
        self
    }

    pub fn with_wall_clock(mut self, clock: Rc<dyn WallClock>) -> Self {
        self.wall_clock = Some(clock);
        self
    }

    pub fn with_enable_switch(mut self, switch: Rc<dyn EnableSwitch>) -> Self {
        self.enable = Some(switch);
        self
    }

    pub fn with_store(mut self, store: Rc<dyn PreferenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Monotonic clock timing actuation. Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate and assemble the pump, loading persisted calibration.
    pub fn build(self) -> Result<PumpController, BuildError> {
        if self.id.trim().is_empty() {
            return Err(BuildError::MissingId);
        }
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let s = self.settings;

        if s.schedule.is_empty() {
            return Err(BuildError::EmptySchedule(self.id));
        }
        let schedule: Vec<ScheduleEntry> = s
            .schedule
            .iter()
            .map(|&(h, m)| ScheduleEntry::new(h, m))
            .collect();
        if let Some(bad) = schedule.iter().find(|e| !e.is_valid()) {
            return Err(BuildError::InvalidConfig(format!(
                "schedule entry {}:{} out of range",
                bad.hour, bad.minute
            )));
        }
        if !is_usable_rate(s.calibration_ml_per_sec) {
            return Err(BuildError::InvalidConfig(
                "calibration_ml_per_sec must be > 0".into(),
            ));
        }
        if !s.daily_dose_ml.is_finite() || s.daily_dose_ml < 0.0 {
            return Err(BuildError::InvalidConfig(
                "daily_dose_ml must be >= 0".into(),
            ));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => Arc::from(c),
            None => Arc::new(MonotonicClock::new()),
        };

        let mut pump = PumpController {
            cal_key: keys::calibration_key(&self.id),
            cal_time_key: keys::calibration_time_key(&self.id),
            id: self.id,
            index: s.index,
            calibration: s.calibration_ml_per_sec,
            daily_dose_ml: s.daily_dose_ml,
            schedule,
            max_late_minutes: s.max_late_minutes,
            last_calibrated: None,
            actuator: self.actuator,
            wall_clock: self.wall_clock,
            enable: self.enable,
            store,
            clock,
        };
        pump.setup();
        Ok(pump)
    }
}
