//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "microdoser", version, about = "Scheduled dosing pump controller")]
pub struct Cli {
    /// Path to config TOML (typed)
    #[arg(long, value_name = "FILE", default_value = "etc/microdoser.toml")]
    pub config: PathBuf,

    /// Log and print results as JSON lines instead of pretty text
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Pretend the wall clock starts at this local time (HH:MM) instead of
    /// reading the system clock
    #[arg(long, value_name = "HH:MM")]
    pub at: Option<String>,

    /// Day of year for --at (1..=366, default 1)
    #[arg(long, value_name = "N", requires = "at")]
    pub day: Option<u16>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check every pump's schedule periodically until Ctrl-C
    Run {
        /// Stop after this many passes
        #[arg(long, value_name = "N")]
        passes: Option<u64>,
    },
    /// Run one schedule check on every pump and report each entry
    Check,
    /// Run the selected pump for the fixed prime duration
    Prime {
        /// Pump to prime (defaults to hub.selected)
        #[arg(long, value_name = "ID")]
        pump: Option<String>,
    },
    /// Dispense the 10 mL calibration reference volume
    Calibrate {
        /// Pump to calibrate (defaults to hub.selected)
        #[arg(long, value_name = "ID")]
        pump: Option<String>,
    },
    /// Rescale the pump rate from the volume actually measured after `calibrate`
    ApplyCalibration {
        /// Pump the measurement belongs to (defaults to hub.selected)
        #[arg(long, value_name = "ID")]
        pump: Option<String>,
        /// Measured volume in mL
        #[arg(long, value_name = "ML")]
        measured: f32,
    },
    /// Print calibration and dosing parameters of every pump
    Status,
    /// Quick health check (config, store, outputs, clock)
    SelfCheck,
}
