//! Outcome reports returned by schedule checks and hub dispatch.

use std::time::Duration;

use crate::error::DoserError;

/// Why a schedule check did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Wall clock missing or not synchronized.
    ClockInvalid,
    /// Enable switch is off.
    Disabled,
}

/// Result of evaluating one schedule entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotOutcome {
    /// Persisted record says this entry already ran today.
    AlreadyDosed,
    /// Dosed at the scheduled minute.
    Dosed { duration: Duration },
    /// Dosed late, inside the recovery window.
    Recovered { late_min: u32, duration: Duration },
    /// Too late to recover; not dosed.
    Missed { late_min: u32 },
    /// Not due yet.
    Pending,
    /// Due, but the dose could not be delivered.
    Failed(DoserError),
}

impl SlotOutcome {
    /// Whether this outcome actuated the pump.
    pub fn dosed(&self) -> bool {
        matches!(self, Self::Dosed { .. } | Self::Recovered { .. })
    }
}

/// Result of one `evaluate_schedule` call.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckStatus {
    Skipped(SkipReason),
    /// One outcome per schedule entry, in entry order.
    Checked(Vec<SlotOutcome>),
}

impl CheckStatus {
    /// Number of doses delivered by this check.
    pub fn doses(&self) -> usize {
        match self {
            Self::Skipped(_) => 0,
            Self::Checked(slots) => slots.iter().filter(|s| s.dosed()).count(),
        }
    }
}

/// Result of a hub action.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Forwarded to the pump, which completed the action.
    Done,
    /// Forwarded, but the pump reported a failure (already logged).
    Failed(DoserError),
    /// No selector attached or nothing selected.
    NoSelection,
    /// Selected id is not registered (or the pump was dropped).
    UnknownPump(String),
    /// The pump is mid-operation and cannot be re-entered.
    Busy(String),
}
