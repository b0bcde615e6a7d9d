//! Human-readable error descriptions and structured JSON error formatting.

use microdoser_core::error::{BuildError, DoserError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = find::<BuildError>(err) {
        return match be {
            BuildError::MissingId => {
                "What happened: A pump has an empty id.\nLikely causes: `id = \"\"` in a [[pump]] table.\nHow to fix: Give every pump a unique, non-empty ASCII id.".to_string()
            }
            BuildError::MissingStore => {
                "What happened: No preference store was provided to the pump.\nLikely causes: Internal wiring error.\nHow to fix: Report this as a bug.".to_string()
            }
            BuildError::EmptySchedule(id) => format!(
                "What happened: Pump '{id}' has no schedule entries.\nLikely causes: `schedule = []` in the config.\nHow to fix: Add at least one dose time, e.g. `schedule = [\"08:00\"]`."
            ),
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(de) = find::<DoserError>(err) {
        return match de {
            DoserError::NoActuator(id) => format!(
                "What happened: Pump '{id}' has no output assigned.\nLikely causes: gpio_pin / i2c_pin missing for the selected hardware backend.\nHow to fix: Set the pin for this pump in the config."
            ),
            DoserError::InvalidMeasurement(ml) => format!(
                "What happened: invalid calibration result ({ml:.2} mL).\nLikely causes: Measurement typed in the wrong unit, or the pump did not run.\nHow to fix: Re-run `calibrate`, measure the dispensed volume in mL, and enter a value above 0.1."
            ),
            DoserError::ClockInvalid => "What happened: The wall clock is not synchronized.\nLikely causes: No RTC/NTP time yet.\nHow to fix: Wait for time sync, or pass --at HH:MM for a simulated clock.".to_string(),
            DoserError::Hardware(msg) | DoserError::HardwareFault(msg) => format!(
                "What happened: Pump output failed ({msg}).\nLikely causes: Wiring, power, or GPIO/I2C permissions.\nHow to fix: Check the relay/expander wiring and run `microdoser self-check`."
            ),
            DoserError::Storage(msg) => format!(
                "What happened: Preference store write failed ({msg}).\nLikely causes: Read-only filesystem or missing directory for runtime.store_path.\nHow to fix: Point runtime.store_path at a writable location."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("is not configured") || lower.contains("no pump selected") {
        return format!(
            "What happened: {msg}.\nHow to fix: Pass --pump with an id from the config (see `microdoser status`)."
        );
    }

    if lower.contains("read config") || lower.contains("parse config") {
        return format!(
            "What happened: Could not load the config file.\nDetails: {}\nHow to fix: Check the --config path and the TOML syntax.",
            chain(err)
        );
    }

    if lower.contains("preference store") {
        return format!(
            "What happened: Could not open the preference store.\nDetails: {}\nHow to fix: Check runtime.store_path; delete the file if it is corrupt (calibration will reset).",
            chain(err)
        );
    }

    if lower.contains("requires a linux build") || lower.contains("gpio") || lower.contains("pcf8574") {
        return format!(
            "What happened: Failed to initialize pump outputs.\nDetails: {}\nHow to fix: Check the [hardware] backend and pins; ensure the process may access GPIO/I2C.",
            chain(err)
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes for typed failures; anything else exits with 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if find::<BuildError>(err).is_some() {
        return 2;
    }
    match find::<DoserError>(err) {
        Some(DoserError::NoActuator(_)) => 3,
        Some(DoserError::InvalidMeasurement(_)) => 4,
        Some(DoserError::ClockInvalid) => 5,
        Some(DoserError::Hardware(_) | DoserError::HardwareFault(_)) => 6,
        Some(DoserError::Storage(_)) => 7,
        None => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let reason = match find::<DoserError>(err) {
        Some(DoserError::NoActuator(_)) => "NoActuator",
        Some(DoserError::InvalidMeasurement(_)) => "InvalidMeasurement",
        Some(DoserError::ClockInvalid) => "ClockInvalid",
        Some(DoserError::Hardware(_) | DoserError::HardwareFault(_)) => "Hardware",
        Some(DoserError::Storage(_)) => "Storage",
        None if find::<BuildError>(err).is_some() => "Build",
        None => "Error",
    };
    json!({
        "reason": reason,
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}

/// First error of type `E` anywhere in the report's chain.
fn find<E: std::error::Error + 'static>(err: &eyre::Report) -> Option<&E> {
    err.chain().find_map(|e| e.downcast_ref::<E>())
}

fn chain(err: &eyre::Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}
