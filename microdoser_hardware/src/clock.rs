//! Wall-clock sources and a non-blocking monotonic clock for simulation.

use std::time::{Duration, Instant};

use chrono::{Datelike, Local, Timelike};
use microdoser_traits::{Clock, WallClock, WallTime};
use tracing::trace;

/// Readings before 2020-01-01 mean the RTC was never set.
const EPOCH_2020: i64 = 1_577_836_800;

/// Local system time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemWallClock;

impl SystemWallClock {
    pub fn new() -> Self {
        Self
    }
}

impl WallClock for SystemWallClock {
    fn now(&self) -> Option<WallTime> {
        let now = Local::now();
        let ts = now.timestamp();
        if ts < EPOCH_2020 {
            return None;
        }
        Some(WallTime {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            day_of_year: now.ordinal() as u16,
            timestamp: u32::try_from(ts).unwrap_or(u32::MAX),
        })
    }
}

/// Simulated wall clock starting at a chosen time of day and advancing with
/// real elapsed time.
#[derive(Debug, Clone)]
pub struct SimulatedWallClock {
    start: WallTime,
    epoch: Instant,
}

impl SimulatedWallClock {
    pub fn starting_at(hour: u8, minute: u8, day_of_year: u16) -> Self {
        Self {
            start: WallTime::new(hour, minute, day_of_year.clamp(1, 366)),
            epoch: Instant::now(),
        }
    }

    /// Reading `elapsed` after the start point.
    pub fn at_elapsed(&self, elapsed: Duration) -> WallTime {
        let mins = u64::from(self.start.minute_of_day().unsigned_abs()) + elapsed.as_secs() / 60;
        let day_offset = mins / (24 * 60);
        let min_of_day = mins % (24 * 60);
        let day = (u64::from(self.start.day_of_year) - 1 + day_offset) % 365 + 1;
        WallTime {
            hour: (min_of_day / 60) as u8,
            minute: (min_of_day % 60) as u8,
            day_of_year: day as u16,
            timestamp: self
                .start
                .timestamp
                .saturating_add(u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX)),
        }
    }
}

impl WallClock for SimulatedWallClock {
    fn now(&self) -> Option<WallTime> {
        Some(self.at_elapsed(self.epoch.elapsed()))
    }
}

/// Monotonic clock whose `sleep` returns immediately. Lets simulated doses
/// complete without waiting out their duration.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelayClock;

impl Clock for NoDelayClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        trace!(skipped_ms = d.as_millis() as u64, "simulated sleep");
    }
}
