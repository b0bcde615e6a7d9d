//! Flow-rate calibration arithmetic.
//!
//! The operator runs a reference dose, measures what actually came out, and
//! the rate is rescaled by expected/actual.

use std::time::Duration;

use crate::error::DoserError;
use crate::util::secs_to_duration;

/// Volume dispensed by a calibration run, in mL.
pub const REFERENCE_VOLUME_ML: f32 = 10.0;

/// Measurements at or below this are rejected.
pub const MIN_MEASURED_ML: f32 = 0.1;

/// Rate used until the first calibration, in mL/s.
pub const DEFAULT_RATE_ML_PER_SEC: f32 = 1.0;

/// Range a rescaled rate must land in, in mL/s. Outside it dose durations
/// degenerate to zero or saturate.
pub const MIN_CALIBRATED_RATE: f32 = 1e-4;
pub const MAX_CALIBRATED_RATE: f32 = 1e4;

/// Rescale `rate` by the ratio of reference to measured volume.
///
/// Returns `DoserError::InvalidMeasurement` for `measured_ml <= 0.1`, a
/// non-finite input, or a result outside
/// `MIN_CALIBRATED_RATE..=MAX_CALIBRATED_RATE`.
pub fn rescale_rate(rate: f32, measured_ml: f32) -> Result<f32, DoserError> {
    if !measured_ml.is_finite() || measured_ml <= MIN_MEASURED_ML {
        return Err(DoserError::InvalidMeasurement(measured_ml));
    }
    let new_rate = (REFERENCE_VOLUME_ML / measured_ml) * rate;
    if !is_usable_rate(new_rate)
        || !(MIN_CALIBRATED_RATE..=MAX_CALIBRATED_RATE).contains(&new_rate)
    {
        return Err(DoserError::InvalidMeasurement(measured_ml));
    }
    Ok(new_rate)
}

/// Actuation time needed to dispense `volume_ml` at `rate_ml_per_sec`.
pub fn duration_for_volume(volume_ml: f32, rate_ml_per_sec: f32) -> Duration {
    secs_to_duration(volume_ml / rate_ml_per_sec)
}

/// Whether a stored or configured rate can be used for dosing.
#[inline]
pub fn is_usable_rate(rate: f32) -> bool {
    rate.is_finite() && rate > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_rate_by_reference_over_measured() {
        let r = rescale_rate(1.0, 8.0).unwrap();
        assert!((r - 1.25).abs() < 1e-6);
    }

    #[test]
    fn threshold_is_exclusive() {
        assert!(rescale_rate(1.0, 0.1).is_err());
        assert!(rescale_rate(1.0, 0.100_01).is_ok());
        assert!(rescale_rate(1.0, f32::NAN).is_err());
    }

    #[test]
    fn result_must_stay_in_range() {
        assert!(rescale_rate(1.0, f32::MAX).is_err());
        assert!(rescale_rate(1e-37, f32::MAX).is_err());
        assert!(rescale_rate(1e37, 0.11).is_err());
        assert!(rescale_rate(MAX_CALIBRATED_RATE, 9.0).is_err());
        assert!(rescale_rate(MIN_CALIBRATED_RATE, 11.0).is_err());
        assert!(rescale_rate(MIN_CALIBRATED_RATE, 10.0).is_ok());
    }

    #[test]
    fn reference_dose_duration() {
        assert_eq!(
            duration_for_volume(REFERENCE_VOLUME_ML, 2.0),
            Duration::from_secs(5)
        );
    }
}
