#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core dosing logic (hardware-agnostic).
//!
//! All hardware interactions go through the traits in `microdoser_traits`:
//! `Actuator` for the pump output, `WallClock` for schedule time,
//! `PreferenceStore` for non-volatile state, and `Clock` for timing actuation.
//!
//! ## Architecture
//!
//! - **Pump**: schedule evaluation, dosing, priming, calibration (`pump` module)
//! - **Schedule**: on-time / late-recovery / missed decision (`schedule` module)
//! - **Calibration**: rate rescaling and volume→duration (`calibration` module)
//! - **Keys**: FNV-1 persistence key derivation (`keys` module)
//! - **Hub**: selector-driven dispatch of operator actions (`hub` module)
//! - **Runner**: periodic schedule loop (`runner` module)
//!
//! ## Daily idempotence
//!
//! Each schedule entry's "dosed" record is keyed by pump, hour, minute, and day
//! of year. Repeated checks within a minute, and restarts, find the record and
//! skip; the next day derives a different key and the entry is due again.

pub mod builder;
pub mod calibration;
pub mod config;
pub mod conversions;
pub mod error;
pub mod hub;
pub mod hw_error;
pub mod keys;
pub mod mocks;
pub mod pump;
pub mod runner;
pub mod schedule;
pub mod status;
pub mod util;

pub use builder::PumpBuilder;
pub use config::PumpSettings;
pub use error::{BuildError, DoserError};
pub use hub::{CalibrationHub, PumpHandle};
pub use pump::PumpController;
pub use schedule::ScheduleEntry;
pub use status::{CheckStatus, Dispatch, SkipReason, SlotOutcome};
