//! The per-channel dosing state machine (`PumpController`).
//!
//! Owns calibration, the daily schedule, and the persisted "dosed today"
//! records for one physical pump. All actuation is synchronous: the caller is
//! blocked for the whole dose and nothing can cancel it once started.

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use microdoser_traits::{Actuator, Clock, EnableSwitch, PreferenceStore, WallClock, WallTime};
use tracing::{debug, error, info, warn};

use crate::calibration::{
    REFERENCE_VOLUME_ML, duration_for_volume, is_usable_rate, rescale_rate,
};
use crate::error::{DoserError, Result};
use crate::hw_error::{map_hw_error, map_store_error};
use crate::keys;
use crate::schedule::{ScheduleEntry, SlotDecision, decide};
use crate::status::{CheckStatus, SkipReason, SlotOutcome};
use crate::util::PRIME_DURATION;

/// Why a pulse did not complete cleanly.
enum PulseError {
    /// The output never switched on; nothing was dispensed.
    NotStarted(DoserError),
    /// The output ran but could not be switched off.
    StopFailed(DoserError),
}

impl From<PulseError> for DoserError {
    fn from(e: PulseError) -> Self {
        match e {
            PulseError::NotStarted(e) | PulseError::StopFailed(e) => e,
        }
    }
}

/// One dosing channel. Build with [`PumpController::builder`].
pub struct PumpController {
    pub(crate) id: String,
    pub(crate) index: u8,
    pub(crate) calibration: f32,
    pub(crate) daily_dose_ml: f32,
    pub(crate) schedule: Vec<ScheduleEntry>,
    pub(crate) max_late_minutes: u32,
    pub(crate) last_calibrated: Option<u32>,
    pub(crate) actuator: Option<Box<dyn Actuator>>,
    pub(crate) wall_clock: Option<Rc<dyn WallClock>>,
    pub(crate) enable: Option<Rc<dyn EnableSwitch>>,
    pub(crate) store: Rc<dyn PreferenceStore>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) cal_key: u32,
    pub(crate) cal_time_key: u32,
}

impl core::fmt::Debug for PumpController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PumpController")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("calibration_ml_per_sec", &self.calibration)
            .field("daily_dose_ml", &self.daily_dose_ml)
            .field("schedule", &self.schedule)
            .field("max_late_minutes", &self.max_late_minutes)
            .field("has_actuator", &self.actuator.is_some())
            .finish()
    }
}

impl PumpController {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index(&self) -> u8 {
        self.index
    }

    /// Current calibration in mL per second.
    pub fn calibration(&self) -> f32 {
        self.calibration
    }

    /// Epoch seconds of the last applied calibration, if any was recorded.
    pub fn last_calibration_time(&self) -> Option<u32> {
        self.last_calibrated
    }

    pub fn daily_dose_ml(&self) -> f32 {
        self.daily_dose_ml
    }

    pub fn max_late_minutes(&self) -> u32 {
        self.max_late_minutes
    }

    pub fn schedule(&self) -> &[ScheduleEntry] {
        &self.schedule
    }

    pub fn has_actuator(&self) -> bool {
        self.actuator.is_some()
    }

    /// Replace (or remove) the output driving this pump.
    pub fn set_actuator(&mut self, actuator: Option<Box<dyn Actuator>>) {
        self.actuator = actuator;
    }

    /// Volume of one scheduled dose: the daily target split evenly.
    pub fn per_dose_ml(&self) -> f32 {
        debug_assert!(!self.schedule.is_empty(), "builder rejects empty schedules");
        self.daily_dose_ml / self.schedule.len().max(1) as f32
    }

    /// Actuation time of one scheduled dose at the current calibration.
    pub fn dose_duration(&self) -> Duration {
        duration_for_volume(self.per_dose_ml(), self.calibration)
    }

    /// Whether the enable switch (if any) allows scheduled dosing.
    pub fn is_enabled(&self) -> bool {
        self.enable.as_ref().is_none_or(|s| s.is_enabled())
    }

    /// Load persisted calibration, seeding the store with the configured
    /// default on first boot so later reads never see an empty slot.
    pub(crate) fn setup(&mut self) {
        info!(pump = self.index, id = %self.id, "setting up pump");

        match self.store.load_f32(self.cal_key) {
            Some(stored) if is_usable_rate(stored) => {
                info!(
                    pump = self.index,
                    ml_per_sec = stored,
                    "loaded stored calibration"
                );
                self.calibration = stored;
            }
            Some(stored) => {
                warn!(
                    pump = self.index,
                    ml_per_sec = stored,
                    "stored calibration unusable; resetting to configured rate"
                );
                debug_assert!(
                    is_usable_rate(self.calibration),
                    "builder rejects unusable configured rates"
                );
                self.persist_calibration();
            }
            None => {
                self.persist_calibration();
                info!(
                    pump = self.index,
                    ml_per_sec = self.calibration,
                    "saved initial calibration"
                );
            }
        }

        self.last_calibrated = self.store.load(self.cal_time_key);
    }

    /// Read the wall clock and evaluate the schedule against it.
    pub fn check_schedule(&mut self) -> CheckStatus {
        let now = self.wall_clock.as_ref().and_then(|c| c.now());
        self.evaluate_schedule(now)
    }

    /// Evaluate every schedule entry at `now`, dosing on-time and recoverable
    /// late entries. `None` means the clock is not synchronized.
    pub fn evaluate_schedule(&mut self, now: Option<WallTime>) -> CheckStatus {
        let Some(now) = now else {
            debug!(pump = self.index, "time not valid; skipping schedule check");
            return CheckStatus::Skipped(SkipReason::ClockInvalid);
        };

        if !self.is_enabled() {
            debug!(
                pump = self.index,
                "pump is disabled; skipping schedule check"
            );
            return CheckStatus::Skipped(SkipReason::Disabled);
        }

        let mut outcomes = Vec::with_capacity(self.schedule.len());
        for i in 0..self.schedule.len() {
            let entry = self.schedule[i];
            let already = self.has_dosed_today(&entry, &now);
            self.schedule[i].dosed_today = already;

            debug!(
                pump = self.index,
                slot = %entry,
                already_dosed = already,
                "checking schedule entry"
            );

            if already {
                outcomes.push(SlotOutcome::AlreadyDosed);
                continue;
            }

            let outcome = match decide(&entry, &now, self.max_late_minutes) {
                SlotDecision::OnTime => {
                    info!(
                        pump = self.index,
                        slot = %entry,
                        ml = self.per_dose_ml(),
                        "scheduled dosing"
                    );
                    self.dose_slot(i, &now, |duration| SlotOutcome::Dosed {
                        duration,
                    })
                }
                SlotDecision::Recover { late_min } => {
                    warn!(pump = self.index, slot = %entry, late_min, "recovered late dose");
                    self.dose_slot(i, &now, |duration| {
                        SlotOutcome::Recovered { late_min, duration }
                    })
                }
                SlotDecision::Missed { late_min } => {
                    warn!(
                        pump = self.index,
                        slot = %entry,
                        late_min,
                        "missed dose too old, skipping"
                    );
                    SlotOutcome::Missed { late_min }
                }
                SlotDecision::Wait => SlotOutcome::Pending,
            };
            outcomes.push(outcome);
        }
        CheckStatus::Checked(outcomes)
    }

    /// Dose the per-entry volume now, outside the schedule.
    ///
    /// Does not write a dosed record.
    pub fn dose_now(&mut self) -> Result<Duration> {
        self.deliver_dose().map_err(DoserError::from)
    }

    /// Run the output for the fixed prime duration. Never touches dosed records.
    pub fn prime(&mut self) -> Result<Duration> {
        if self.actuator.is_none() {
            error!(pump = self.index, "prime failed: no output defined");
            return Err(DoserError::NoActuator(self.id.clone()));
        }
        info!(
            pump = self.index,
            duration_ms = PRIME_DURATION.as_millis() as u64,
            "priming pump"
        );
        self.pulse(PRIME_DURATION)?;
        info!(pump = self.index, "priming complete");
        Ok(PRIME_DURATION)
    }

    /// First calibration step: dispense the reference volume at the current rate.
    pub fn run_calibration_dose(&mut self) -> Result<Duration> {
        info!(
            pump = self.index,
            ml = REFERENCE_VOLUME_ML,
            ml_per_sec = self.calibration,
            "running calibration dose"
        );
        if self.actuator.is_none() {
            error!(pump = self.index, "pump has no output assigned");
            return Err(DoserError::NoActuator(self.id.clone()));
        }
        let duration = duration_for_volume(REFERENCE_VOLUME_ML, self.calibration);
        self.pulse(duration)?;
        info!(
            pump = self.index,
            "calibration dose complete; enter actual mL measured"
        );
        Ok(duration)
    }

    /// Second calibration step: rescale the rate from the measured volume.
    ///
    /// Returns the new rate. A measurement of 0.1 mL or less, or one that
    /// would push the rate to zero or infinity, is rejected and leaves all
    /// state untouched.
    pub fn apply_measured_result(&mut self, actual_ml: f32) -> Result<f32> {
        let new_rate = match rescale_rate(self.calibration, actual_ml) {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    pump = self.index,
                    measured_ml = actual_ml,
                    "invalid calibration result; ignoring"
                );
                return Err(e);
            }
        };
        self.store_calibration(new_rate);

        match self.wall_clock.as_ref().and_then(|c| c.now()) {
            Some(now) => {
                self.last_calibrated = Some(now.timestamp);
                if self.persist(self.cal_time_key, now.timestamp) {
                    info!(
                        pump = self.index,
                        timestamp = now.timestamp,
                        "calibration timestamp saved"
                    );
                }
            }
            None => {
                warn!(
                    pump = self.index,
                    "time invalid; could not store calibration timestamp"
                );
            }
        }
        Ok(new_rate)
    }

    /// Set and persist a new calibration rate.
    pub(crate) fn store_calibration(&mut self, ml_per_sec: f32) {
        self.calibration = ml_per_sec;
        self.persist_calibration();
        info!(pump = self.index, ml_per_sec, "new calibration");
    }

    fn persist_calibration(&self) {
        self.persist(self.cal_key, self.calibration.to_bits());
    }

    /// Save one slot; failures are logged and reported as `false`.
    fn persist(&self, key: u32, value: u32) -> bool {
        match self.store.save(key, value) {
            Ok(()) => true,
            Err(e) => {
                let err = map_store_error(&*e);
                error!(pump = self.index, key, error = %err, "failed to persist preference");
                false
            }
        }
    }

    /// Dose slot `i` and record it, mapping the delivered duration through `ok`.
    fn dose_slot(
        &mut self,
        i: usize,
        now: &WallTime,
        ok: impl FnOnce(Duration) -> SlotOutcome,
    ) -> SlotOutcome {
        match self.deliver_dose() {
            Ok(duration) => {
                self.mark_dosed(i, now);
                ok(duration)
            }
            // The pump ran; recording it avoids a second dose once the output recovers.
            Err(PulseError::StopFailed(e)) => {
                self.mark_dosed(i, now);
                SlotOutcome::Failed(e)
            }
            Err(PulseError::NotStarted(e)) => SlotOutcome::Failed(e),
        }
    }

    fn deliver_dose(&mut self) -> std::result::Result<Duration, PulseError> {
        if self.actuator.is_none() {
            error!(pump = self.index, id = %self.id, "no output defined for pump");
            return Err(PulseError::NotStarted(DoserError::NoActuator(
                self.id.clone(),
            )));
        }
        let duration = self.dose_duration();
        info!(
            pump = self.index,
            duration_ms = duration.as_millis() as u64,
            "activating pump"
        );
        self.pulse(duration)?;
        info!(pump = self.index, "pump off");
        Ok(duration)
    }

    /// Switch the output on for `duration`, blocking the caller throughout.
    fn pulse(&mut self, duration: Duration) -> std::result::Result<(), PulseError> {
        let index = self.index;
        let Some(out) = self.actuator.as_mut() else {
            return Err(PulseError::NotStarted(DoserError::NoActuator(
                self.id.clone(),
            )));
        };
        if let Err(e) = out.turn_on() {
            let err = map_hw_error(&*e);
            error!(pump = index, error = %err, "failed to switch output on");
            // best-effort: leave the output in a known state
            let _ = out.turn_off();
            return Err(PulseError::NotStarted(err));
        }
        self.clock.sleep(duration);
        if let Err(e) = out.turn_off() {
            let err = map_hw_error(&*e);
            error!(pump = index, error = %err, "failed to switch output off");
            return Err(PulseError::StopFailed(err));
        }
        Ok(())
    }

    fn has_dosed_today(&self, entry: &ScheduleEntry, now: &WallTime) -> bool {
        let key = keys::dose_key(&self.id, entry.hour, entry.minute, now.day_of_year);
        match self.store.load(key) {
            Some(keys::LEGACY_DOSED) => {
                // Undated record: honour it today, then date it so it expires.
                debug!(pump = self.index, slot = %entry, "upgrading legacy dosed record");
                self.persist(key, keys::dosed_marker(now));
                true
            }
            Some(value) => keys::is_dosed_marker(value, now),
            None => false,
        }
    }

    fn mark_dosed(&mut self, i: usize, now: &WallTime) {
        let entry = self.schedule[i];
        let key = keys::dose_key(&self.id, entry.hour, entry.minute, now.day_of_year);
        self.persist(key, keys::dosed_marker(now));
        self.schedule[i].dosed_today = true;
    }
}
