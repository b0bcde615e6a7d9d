//! Common time/volume helpers for microdoser_core.

use std::time::Duration;

/// Number of milliseconds in one second.
pub const MILLIS_PER_SEC: u64 = 1_000;

/// Fixed actuation time of a prime run.
pub const PRIME_DURATION: Duration = Duration::from_secs(10);

/// Recommended cadence of the periodic schedule check. Schedule resolution is
/// one minute, so anything finer only repeats work.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Convert fractional seconds to a millisecond-truncated `Duration`.
/// - Non-finite or non-positive inputs map to `Duration::ZERO`.
/// - Saturates at `u32::MAX` milliseconds.
#[inline]
pub fn secs_to_duration(secs: f32) -> Duration {
    if !secs.is_finite() || secs <= 0.0 {
        return Duration::ZERO;
    }
    let ms = (f64::from(secs) * MILLIS_PER_SEC as f64).min(f64::from(u32::MAX));
    Duration::from_millis(ms as u64)
}
