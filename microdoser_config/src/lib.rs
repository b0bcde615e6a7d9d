#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the dosing controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Schedule entries accept tables, `[hour, minute]` pairs, or `"HH:MM"` strings.
use serde::Deserialize;
use serde::de::Deserializer;
use std::collections::HashSet;
use std::path::Path;

/// Rate assumed before the first calibration (mL/s).
pub const DEFAULT_CALIBRATION_ML_PER_SEC: f32 = 1.0;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleCfg {
    pub hour: u8,
    pub minute: u8,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PumpCfg {
    /// Stable identifier; derives every persistence key. ASCII only.
    pub id: String,
    /// Index shown in log lines.
    #[serde(default)]
    pub index: u8,
    #[serde(default = "default_calibration")]
    pub calibration_ml_per_sec: f32,
    /// Total mL per day, split evenly across schedule entries.
    pub daily_dose_ml: f32,
    /// Late-dose recovery window; 0 disables recovery.
    #[serde(default)]
    pub max_late_minutes: u32,
    /// Initial state of the enable switch. Absent means no switch (always on).
    #[serde(default)]
    pub enabled: Option<bool>,
    /// BCM GPIO driving the pump relay (`gpio` backend).
    #[serde(default)]
    pub gpio_pin: Option<u8>,
    /// PCF8574 expander pin 0..=7 (`pcf8574` backend).
    #[serde(default)]
    pub i2c_pin: Option<u8>,
    #[serde(deserialize_with = "de_schedule")]
    pub schedule: Vec<ScheduleCfg>,
}

fn default_calibration() -> f32 {
    DEFAULT_CALIBRATION_ML_PER_SEC
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Runtime {
    /// Seconds between schedule checks.
    pub check_interval_s: u64,
    /// JSON file backing the preference store.
    pub store_path: String,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            check_interval_s: 30,
            store_path: "microdoser_prefs.json".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// In-process simulated outputs.
    #[default]
    Sim,
    /// One Raspberry Pi GPIO per pump.
    Gpio,
    /// Pins of a PCF8574 I2C I/O expander.
    Pcf8574,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Hardware {
    pub backend: Backend,
    /// I2C bus number for the expander.
    pub i2c_bus: u8,
    /// 7-bit I2C address of the expander.
    pub pcf8574_address: u16,
    /// Drive outputs low to switch the pump on.
    pub active_low: bool,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            i2c_bus: 1,
            pcf8574_address: 0x20,
            active_low: false,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct HubCfg {
    /// Pump targeted by hub actions when the CLI does not name one.
    pub selected: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub hardware: Hardware,
    #[serde(default)]
    pub hub: HubCfg,
    #[serde(rename = "pump", default)]
    pub pumps: Vec<PumpCfg>,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse, and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScheduleToml {
    Tuple((u8, u8)),
    Table { hour: u8, minute: u8 },
    Clock(String),
}

fn de_schedule<'de, D>(deserializer: D) -> Result<Vec<ScheduleCfg>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<ScheduleToml> = Vec::deserialize(deserializer)?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let entry = match item {
            ScheduleToml::Tuple((hour, minute)) | ScheduleToml::Table { hour, minute } => {
                ScheduleCfg { hour, minute }
            }
            ScheduleToml::Clock(s) => parse_hh_mm(&s).map_err(serde::de::Error::custom)?,
        };
        out.push(entry);
    }
    Ok(out)
}

/// Parse `"H:MM"` / `"HH:MM"` into a schedule entry (ranges checked by `validate`).
pub fn parse_hh_mm(s: &str) -> Result<ScheduleCfg, String> {
    let (h, m) = s
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("schedule time '{s}' must look like HH:MM"))?;
    let hour = h
        .parse::<u8>()
        .map_err(|_| format!("schedule time '{s}': bad hour"))?;
    let minute = m
        .parse::<u8>()
        .map_err(|_| format!("schedule time '{s}': bad minute"))?;
    Ok(ScheduleCfg { hour, minute })
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Runtime
        if self.runtime.check_interval_s == 0 {
            eyre::bail!("runtime.check_interval_s must be >= 1");
        }
        if self.runtime.check_interval_s > 60 {
            eyre::bail!("runtime.check_interval_s must be <= 60 (schedule resolution is one minute)");
        }
        if self.runtime.store_path.trim().is_empty() {
            eyre::bail!("runtime.store_path must not be empty");
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        // Hardware
        if self.hardware.backend == Backend::Pcf8574 && self.hardware.pcf8574_address > 0x7F {
            eyre::bail!("hardware.pcf8574_address must be a 7-bit address");
        }

        // Pumps
        if self.pumps.is_empty() {
            eyre::bail!("at least one [[pump]] must be configured");
        }
        let mut seen = HashSet::new();
        for p in &self.pumps {
            self.validate_pump(p)?;
            if !seen.insert(p.id.as_str()) {
                eyre::bail!("pump id '{}' is configured more than once", p.id);
            }
        }

        // Hub
        if let Some(sel) = self.hub.selected.as_deref()
            && !seen.contains(sel)
        {
            eyre::bail!("hub.selected '{sel}' does not name a configured pump");
        }

        Ok(())
    }

    fn validate_pump(&self, p: &PumpCfg) -> eyre::Result<()> {
        if p.id.trim().is_empty() {
            eyre::bail!("pump.id must not be empty");
        }
        if !p.id.is_ascii() {
            eyre::bail!("pump.id '{}' must be ASCII", p.id);
        }
        if !(p.calibration_ml_per_sec.is_finite() && p.calibration_ml_per_sec > 0.0) {
            eyre::bail!("pump '{}': calibration_ml_per_sec must be > 0", p.id);
        }
        if !(p.daily_dose_ml.is_finite() && p.daily_dose_ml >= 0.0) {
            eyre::bail!("pump '{}': daily_dose_ml must be >= 0", p.id);
        }
        if p.max_late_minutes >= 24 * 60 {
            eyre::bail!("pump '{}': max_late_minutes must be < 1440", p.id);
        }
        if p.schedule.is_empty() {
            eyre::bail!("pump '{}': schedule must have at least one entry", p.id);
        }
        for s in &p.schedule {
            if s.hour > 23 {
                eyre::bail!("pump '{}': schedule hour {} must be in 0..=23", p.id, s.hour);
            }
            if s.minute > 59 {
                eyre::bail!(
                    "pump '{}': schedule minute {} must be in 0..=59",
                    p.id,
                    s.minute
                );
            }
        }
        match self.hardware.backend {
            Backend::Sim => {}
            Backend::Gpio => {
                if p.gpio_pin.is_none() {
                    eyre::bail!("pump '{}': gpio backend requires gpio_pin", p.id);
                }
            }
            Backend::Pcf8574 => match p.i2c_pin {
                Some(pin) if pin <= 7 => {}
                Some(pin) => eyre::bail!("pump '{}': i2c_pin {} must be in 0..=7", p.id, pin),
                None => eyre::bail!("pump '{}': pcf8574 backend requires i2c_pin", p.id),
            },
        }
        Ok(())
    }

    /// Look up a pump by id.
    pub fn pump(&self, id: &str) -> Option<&PumpCfg> {
        self.pumps.iter().find(|p| p.id == id)
    }
}
