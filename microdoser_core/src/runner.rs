//! Periodic schedule runner.
//!
//! Stands in for the host scheduler: every `interval` it evaluates each pump in
//! registration order. Doses block the loop, so one pump's dose delays the next
//! pump's check; the shutdown flag is only honored between passes and while
//! idling, never in the middle of an actuation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use microdoser_traits::clock::Clock;
use tracing::{debug, info};

use crate::hub::PumpHandle;
use crate::status::CheckStatus;
use crate::util::DEFAULT_CHECK_INTERVAL;

/// Longest single idle sleep between shutdown-flag polls.
const IDLE_SLICE: Duration = Duration::from_millis(250);

/// Parameters for [`run_periodic`].
#[derive(Debug, Clone)]
pub struct RunParams {
    /// Delay between schedule passes.
    pub interval: Duration,
    /// Stop after this many passes; `None` runs until shutdown.
    pub max_passes: Option<u64>,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            interval: DEFAULT_CHECK_INTERVAL,
            max_passes: None,
        }
    }
}

/// Run one schedule check on every pump, returning `(pump id, status)` pairs.
///
/// A pump already borrowed elsewhere (re-entrant call) is skipped.
pub fn check_all(pumps: &[PumpHandle]) -> Vec<(String, CheckStatus)> {
    let mut out = Vec::with_capacity(pumps.len());
    for handle in pumps {
        let Ok(mut pump) = handle.try_borrow_mut() else {
            debug!("pump busy; skipping this pass");
            continue;
        };
        let status = pump.check_schedule();
        out.push((pump.id().to_string(), status));
    }
    out
}

/// Evaluate all pumps every `params.interval` until `shutdown` is set or the
/// pass limit is reached. Returns the number of completed passes.
pub fn run_periodic(
    pumps: &[PumpHandle],
    params: &RunParams,
    clock: &dyn Clock,
    shutdown: &AtomicBool,
) -> u64 {
    info!(
        pumps = pumps.len(),
        interval_ms = params.interval.as_millis() as u64,
        "schedule runner started"
    );
    let mut passes: u64 = 0;
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let results = check_all(pumps);
        let doses: usize = results.iter().map(|(_, s)| s.doses()).sum();
        passes += 1;
        debug!(pass = passes, doses, "schedule pass complete");

        if params.max_passes.is_some_and(|max| passes >= max) {
            break;
        }
        idle(params.interval, clock, shutdown);
    }
    info!(passes, "schedule runner stopped");
    passes
}

/// Sleep for `total`, waking every `IDLE_SLICE` to poll `shutdown`.
fn idle(total: Duration, clock: &dyn Clock, shutdown: &AtomicBool) {
    let mut remaining = total;
    while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(IDLE_SLICE);
        clock.sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
