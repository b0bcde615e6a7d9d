//! Wiring: config to pumps, outputs, store, clocks, and the calibration hub.
//! Also the per-command logic and its text/JSON reporting.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::{Result, WrapErr, eyre};
use microdoser_config::{Backend, Config, PumpCfg};
use microdoser_core::calibration::REFERENCE_VOLUME_ML;
use microdoser_core::runner::{RunParams, check_all, run_periodic};
use microdoser_core::util::PRIME_DURATION;
use microdoser_core::{
    CalibrationHub, CheckStatus, Dispatch, PumpController, PumpHandle, PumpSettings,
    ScheduleEntry, SkipReason, SlotOutcome,
};
use microdoser_hardware::{FilePreferenceStore, NoDelayClock, SimulatedActuator};
use microdoser_hardware::{SimulatedWallClock, SystemWallClock};
use microdoser_traits::{Actuator, Clock, MonotonicClock, WallClock};
use serde_json::json;

/// Setting this to `1` makes simulated doses complete instantly.
pub const SIM_INSTANT_ENV: &str = "MICRODOSER_SIM_INSTANT";

/// Everything a command needs, assembled from one config.
pub struct App {
    pub pumps: Vec<PumpHandle>,
    pub hub: CalibrationHub,
    pub selector: Rc<RefCell<String>>,
    pub store: Rc<FilePreferenceStore>,
    pub wall_clock: Rc<dyn WallClock>,
    pub check_interval: Duration,
    pub json: bool,
}

/// Wall clock override from `--at HH:MM --day N`.
#[derive(Debug, Clone, Copy)]
pub struct ClockOverride {
    pub hour: u8,
    pub minute: u8,
    pub day_of_year: u16,
}

impl ClockOverride {
    pub fn parse(at: &str, day: u16) -> Result<Self> {
        let t = microdoser_config::parse_hh_mm(at).map_err(|e| eyre!(e))?;
        if t.hour > 23 || t.minute > 59 {
            eyre::bail!("--at {at}: time out of range");
        }
        if !(1..=366).contains(&day) {
            eyre::bail!("--day {day} must be in 1..=366");
        }
        Ok(Self {
            hour: t.hour,
            minute: t.minute,
            day_of_year: day,
        })
    }
}

impl App {
    pub fn build(cfg: &Config, clock: Option<ClockOverride>, json: bool) -> Result<Self> {
        let store = Rc::new(
            FilePreferenceStore::open(&cfg.runtime.store_path)
                .wrap_err_with(|| format!("open preference store {}", cfg.runtime.store_path))?,
        );
        let wall_clock: Rc<dyn WallClock> = match clock {
            Some(o) => {
                tracing::info!(
                    hour = o.hour,
                    minute = o.minute,
                    day_of_year = o.day_of_year,
                    "using simulated wall clock"
                );
                Rc::new(SimulatedWallClock::starting_at(o.hour, o.minute, o.day_of_year))
            }
            None => Rc::new(SystemWallClock::new()),
        };

        let mut outputs = OutputFactory::new(cfg)?;
        let mut pumps = Vec::with_capacity(cfg.pumps.len());
        for p in &cfg.pumps {
            let mut builder = PumpController::builder(p.id.clone())
                .with_settings(PumpSettings::from(p))
                .with_boxed_actuator(outputs.make(p)?)
                .with_wall_clock(Rc::clone(&wall_clock))
                .with_store(store.clone())
                .with_clock(actuation_clock(cfg.hardware.backend));
            if let Some(enabled) = p.enabled {
                builder = builder.with_enable_switch(Rc::new(Cell::new(enabled)));
            }
            let pump = builder
                .build()
                .wrap_err_with(|| format!("build pump '{}'", p.id))?;
            pumps.push(Rc::new(RefCell::new(pump)));
        }

        let selector = Rc::new(RefCell::new(cfg.hub.selected.clone().unwrap_or_default()));
        let mut hub = CalibrationHub::new();
        hub.set_selector(selector.clone());
        for handle in &pumps {
            let id = handle.borrow().id().to_string();
            hub.register_pump(id, handle);
        }

        Ok(Self {
            pumps,
            hub,
            selector,
            store,
            wall_clock,
            check_interval: Duration::from_secs(cfg.runtime.check_interval_s),
            json,
        })
    }

    /// Point the hub selector at `pump`, if given.
    pub fn select(&self, pump: Option<&str>) {
        if let Some(id) = pump {
            *self.selector.borrow_mut() = id.to_string();
        }
    }

    fn selected(&self) -> String {
        self.selector.borrow().clone()
    }

    pub fn run(&self, passes: Option<u64>, shutdown: &AtomicBool) -> Result<()> {
        let params = RunParams {
            interval: self.check_interval,
            max_passes: passes,
        };
        let n = run_periodic(&self.pumps, &params, &MonotonicClock::new(), shutdown);
        self.emit(
            json!({ "event": "stopped", "passes": n }),
            format!("Stopped after {n} schedule passes."),
        );
        Ok(())
    }

    pub fn check(&self) -> Result<()> {
        for (id, status) in check_all(&self.pumps) {
            let schedule = self
                .hub
                .get(&id)
                .map(|h| h.borrow().schedule().to_vec())
                .unwrap_or_default();
            self.emit(check_json(&id, &schedule, &status), check_text(&id, &schedule, &status));
        }
        Ok(())
    }

    pub fn prime(&self) -> Result<()> {
        dispatch_result(self.hub.start_prime())?;
        let id = self.selected();
        self.emit(
            json!({ "event": "primed", "pump": id, "duration_ms": PRIME_DURATION.as_millis() as u64 }),
            format!("Pump {id} primed."),
        );
        Ok(())
    }

    pub fn calibrate(&self) -> Result<()> {
        dispatch_result(self.hub.start_calibration())?;
        let id = self.selected();
        self.emit(
            json!({ "event": "calibration_dose", "pump": id, "reference_ml": REFERENCE_VOLUME_ML }),
            format!(
                "Calibration dose complete for {id}. Measure the volume and run \
                 `microdoser apply-calibration --pump {id} --measured <mL>`."
            ),
        );
        Ok(())
    }

    pub fn apply_calibration(&self, measured_ml: f32) -> Result<()> {
        dispatch_result(self.hub.apply_calibration_result(measured_ml))?;
        let id = self.selected();
        let rate = self
            .hub
            .get(&id)
            .map(|h| h.borrow().calibration())
            .ok_or_else(|| eyre!("pump '{id}' is not configured"))?;
        self.emit(
            json!({ "event": "calibrated", "pump": id, "measured_ml": measured_ml, "calibration_ml_per_sec": rate }),
            format!("New calibration for {id}: {rate:.3} mL/s"),
        );
        Ok(())
    }

    pub fn status(&self) -> Result<()> {
        for handle in &self.pumps {
            let pump = handle.borrow();
            let schedule: Vec<String> = pump.schedule().iter().map(ToString::to_string).collect();
            let last = pump.last_calibration_time();
            let text = format!(
                "{} [#{}] {:.3} mL/s, last calibrated {}, {:.2} mL x {} ({}) = {:.2} mL/day, late window {} min, {}",
                pump.id(),
                pump.index(),
                pump.calibration(),
                last.map_or_else(|| "never".to_string(), |t| format!("at epoch {t}")),
                pump.per_dose_ml(),
                schedule.len(),
                schedule.join(", "),
                pump.daily_dose_ml(),
                pump.max_late_minutes(),
                if pump.is_enabled() { "enabled" } else { "disabled" },
            );
            self.emit(
                json!({
                    "pump": pump.id(),
                    "index": pump.index(),
                    "calibration_ml_per_sec": pump.calibration(),
                    "last_calibrated": last,
                    "per_dose_ml": pump.per_dose_ml(),
                    "dose_ms": pump.dose_duration().as_millis() as u64,
                    "daily_dose_ml": pump.daily_dose_ml(),
                    "schedule": schedule,
                    "max_late_minutes": pump.max_late_minutes(),
                    "enabled": pump.is_enabled(),
                    "has_output": pump.has_actuator(),
                }),
                text,
            );
        }
        Ok(())
    }

    pub fn self_check(&self) -> Result<()> {
        let missing: Vec<String> = self
            .pumps
            .iter()
            .filter(|h| !h.borrow().has_actuator())
            .map(|h| h.borrow().id().to_string())
            .collect();
        if !missing.is_empty() {
            eyre::bail!("no output assigned for pump(s): {}", missing.join(", "));
        }
        let clock_ok = self.wall_clock.now().is_some();
        if !clock_ok {
            tracing::warn!("wall clock not synchronized; schedules will not run");
        }
        self.emit(
            json!({
                "event": "self_check",
                "ok": true,
                "pumps": self.pumps.len(),
                "store": self.store.path().display().to_string(),
                "store_slots": self.store.len(),
                "clock_valid": clock_ok,
            }),
            format!(
                "self-check ok: {} pump(s), store {} ({} slots), clock {}",
                self.pumps.len(),
                self.store.path().display(),
                self.store.len(),
                if clock_ok { "valid" } else { "NOT synchronized" },
            ),
        );
        Ok(())
    }

    fn emit(&self, value: serde_json::Value, text: String) {
        if self.json {
            println!("{value}");
        } else {
            println!("{text}");
        }
    }
}

fn dispatch_result(d: Dispatch) -> Result<()> {
    match d {
        Dispatch::Done => Ok(()),
        Dispatch::Failed(e) => Err(e.into()),
        Dispatch::NoSelection => Err(eyre!("no pump selected; pass --pump or set hub.selected")),
        Dispatch::UnknownPump(id) => Err(eyre!("pump '{id}' is not configured")),
        Dispatch::Busy(id) => Err(eyre!("pump '{id}' is busy")),
    }
}

/// Monotonic clock for actuation; simulated backends may skip the wait.
fn actuation_clock(backend: Backend) -> Box<dyn Clock + Send + Sync> {
    let instant = std::env::var(SIM_INSTANT_ENV).is_ok_and(|v| v == "1");
    if backend == Backend::Sim && instant {
        Box::new(NoDelayClock)
    } else {
        Box::new(MonotonicClock::new())
    }
}

/// Creates pump outputs for the configured backend.
struct OutputFactory<'a> {
    cfg: &'a Config,
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    expander: Option<Rc<RefCell<microdoser_hardware::gpio::Pcf8574>>>,
}

impl<'a> OutputFactory<'a> {
    fn new(cfg: &'a Config) -> Result<Self> {
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        {
            let expander = if cfg.hardware.backend == Backend::Pcf8574 {
                Some(
                    microdoser_hardware::gpio::Pcf8574::open(
                        cfg.hardware.i2c_bus,
                        cfg.hardware.pcf8574_address,
                        cfg.hardware.active_low,
                    )
                    .wrap_err("open pcf8574 expander")?,
                )
            } else {
                None
            };
            Ok(Self { cfg, expander })
        }
        #[cfg(not(all(feature = "hardware", target_os = "linux")))]
        {
            if cfg.hardware.backend != Backend::Sim {
                eyre::bail!(
                    "hardware backend {:?} requires a Linux build with --features hardware",
                    cfg.hardware.backend
                );
            }
            Ok(Self { cfg })
        }
    }

    fn make(&mut self, p: &PumpCfg) -> Result<Option<Box<dyn Actuator>>> {
        match self.cfg.hardware.backend {
            Backend::Sim => Ok(Some(Box::new(SimulatedActuator::new(p.id.clone())))),
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            Backend::Gpio => {
                let Some(pin) = p.gpio_pin else {
                    return Ok(None);
                };
                let out = microdoser_hardware::gpio::GpioActuator::new(
                    pin,
                    self.cfg.hardware.active_low,
                )
                .wrap_err_with(|| format!("open gpio output for pump '{}'", p.id))?;
                Ok(Some(Box::new(out)))
            }
            #[cfg(all(feature = "hardware", target_os = "linux"))]
            Backend::Pcf8574 => {
                let (Some(dev), Some(pin)) = (self.expander.as_ref(), p.i2c_pin) else {
                    return Ok(None);
                };
                let out = microdoser_hardware::gpio::Pcf8574::pin(dev, pin)
                    .wrap_err_with(|| format!("open pcf8574 pin for pump '{}'", p.id))?;
                Ok(Some(Box::new(out)))
            }
            #[cfg(not(all(feature = "hardware", target_os = "linux")))]
            other => eyre::bail!("backend {other:?} not available in this build"),
        }
    }
}

fn outcome_name(o: &SlotOutcome) -> &'static str {
    match o {
        SlotOutcome::AlreadyDosed => "already_dosed",
        SlotOutcome::Dosed { .. } => "dosed",
        SlotOutcome::Recovered { .. } => "recovered",
        SlotOutcome::Missed { .. } => "missed",
        SlotOutcome::Pending => "pending",
        SlotOutcome::Failed(_) => "failed",
    }
}

fn skip_name(r: SkipReason) -> &'static str {
    match r {
        SkipReason::ClockInvalid => "clock_invalid",
        SkipReason::Disabled => "disabled",
    }
}

fn check_json(id: &str, schedule: &[ScheduleEntry], status: &CheckStatus) -> serde_json::Value {
    match status {
        CheckStatus::Skipped(r) => json!({ "pump": id, "skipped": skip_name(*r) }),
        CheckStatus::Checked(slots) => {
            let slots: Vec<serde_json::Value> = schedule
                .iter()
                .zip(slots)
                .map(|(e, o)| {
                    let mut v = json!({ "time": e.to_string(), "outcome": outcome_name(o) });
                    match o {
                        SlotOutcome::Dosed { duration } => {
                            v["duration_ms"] = json!(duration.as_millis() as u64);
                        }
                        SlotOutcome::Recovered { late_min, duration } => {
                            v["duration_ms"] = json!(duration.as_millis() as u64);
                            v["late_min"] = json!(late_min);
                        }
                        SlotOutcome::Missed { late_min } => v["late_min"] = json!(late_min),
                        SlotOutcome::Failed(e) => v["error"] = json!(e.to_string()),
                        _ => {}
                    }
                    v
                })
                .collect();
            json!({ "pump": id, "doses": status.doses(), "slots": slots })
        }
    }
}

fn check_text(id: &str, schedule: &[ScheduleEntry], status: &CheckStatus) -> String {
    match status {
        CheckStatus::Skipped(SkipReason::ClockInvalid) => {
            format!("{id}: skipped (clock not synchronized)")
        }
        CheckStatus::Skipped(SkipReason::Disabled) => format!("{id}: skipped (disabled)"),
        CheckStatus::Checked(slots) => {
            let mut out = String::new();
            for (e, o) in schedule.iter().zip(slots) {
                if !out.is_empty() {
                    out.push('\n');
                }
                let detail = match o {
                    SlotOutcome::AlreadyDosed => "already dosed today".to_string(),
                    SlotOutcome::Dosed { duration } => {
                        format!("dosed ({:.1} s)", duration.as_secs_f32())
                    }
                    SlotOutcome::Recovered { late_min, duration } => format!(
                        "recovered {late_min} min late ({:.1} s)",
                        duration.as_secs_f32()
                    ),
                    SlotOutcome::Missed { late_min } => {
                        format!("missed ({late_min} min late, outside window)")
                    }
                    SlotOutcome::Pending => "pending".to_string(),
                    SlotOutcome::Failed(err) => format!("failed: {err}"),
                };
                out.push_str(&format!("{id} {e}: {detail}"));
            }
            out
        }
    }
}

/// Shared shutdown flag set by Ctrl-C.
pub fn install_ctrlc() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        f.store(true, std::sync::atomic::Ordering::Relaxed);
    })
    .wrap_err("install Ctrl-C handler")?;
    Ok(flag)
}
