//! Daily schedule entries and the on-time / late / missed decision.

use microdoser_traits::WallTime;

/// One daily dose slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub hour: u8,
    pub minute: u8,
    /// Cache of the persisted dosed record; not authoritative across restarts.
    pub dosed_today: bool,
}

impl ScheduleEntry {
    pub fn new(hour: u8, minute: u8) -> Self {
        Self {
            hour,
            minute,
            dosed_today: false,
        }
    }

    #[inline]
    pub fn minute_of_day(&self) -> i32 {
        i32::from(self.hour) * 60 + i32::from(self.minute)
    }

    pub fn is_valid(&self) -> bool {
        self.hour <= 23 && self.minute <= 59
    }
}

impl std::fmt::Display for ScheduleEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// What an undosed entry calls for at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    /// Current minute is the scheduled minute.
    OnTime,
    /// Late by `late_min` minutes, still inside the recovery window.
    Recover { late_min: u32 },
    /// Late beyond the recovery window; stays undosed for the day.
    Missed { late_min: u32 },
    /// Scheduled later today, or late with recovery disabled.
    Wait,
}

/// Decide what an undosed `entry` calls for at `now`.
///
/// `max_late_minutes == 0` disables recovery entirely: a late entry is then
/// neither recovered nor reported missed.
pub fn decide(entry: &ScheduleEntry, now: &WallTime, max_late_minutes: u32) -> SlotDecision {
    if entry.hour == now.hour && entry.minute == now.minute {
        return SlotDecision::OnTime;
    }
    if max_late_minutes == 0 {
        return SlotDecision::Wait;
    }
    let delta = now.minute_of_day() - entry.minute_of_day();
    if delta <= 0 {
        return SlotDecision::Wait;
    }
    let late_min = delta.unsigned_abs();
    if late_min <= max_late_minutes {
        SlotDecision::Recover { late_min }
    } else {
        SlotDecision::Missed { late_min }
    }
}
