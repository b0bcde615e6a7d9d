//! Narrow collaborator interfaces consumed by the dosing core.
//!
//! Hardware outputs, clocks, the preference store, and UI entities all live
//! outside the core; it only ever sees them through these traits.

pub mod clock;

pub use clock::{Clock, MonotonicClock, WallClock, WallTime};

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, Ordering};

/// Binary pump output (relay, GPIO, or I/O-expander pin).
///
/// Both calls are assumed idempotent and immediate.
pub trait Actuator {
    fn turn_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn turn_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Non-volatile key/value slots, one `u32` per key.
///
/// Methods take `&self`; implementations use interior mutability so a single
/// store can be shared by every pump on the device. Each key is persisted
/// independently with no cross-key transactions.
pub trait PreferenceStore {
    fn load(&self, key: u32) -> Option<u32>;
    fn save(&self, key: u32, value: u32) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Load an `f32` stored by bit pattern.
    fn load_f32(&self, key: u32) -> Option<f32> {
        self.load(key).map(f32::from_bits)
    }

    fn save_f32(
        &self,
        key: u32,
        value: f32,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.save(key, value.to_bits())
    }
}

/// UI selector naming the pump targeted by hub actions.
pub trait Selector {
    /// Current selection; `None` when nothing is selected.
    fn current(&self) -> Option<String>;
}

/// External enable/disable switch for a pump.
pub trait EnableSwitch {
    fn is_enabled(&self) -> bool;
}

impl Selector for RefCell<String> {
    fn current(&self) -> Option<String> {
        let s = self.borrow();
        if s.is_empty() { None } else { Some(s.clone()) }
    }
}

impl Selector for String {
    fn current(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.clone())
        }
    }
}

impl EnableSwitch for Cell<bool> {
    fn is_enabled(&self) -> bool {
        self.get()
    }
}

impl EnableSwitch for AtomicBool {
    fn is_enabled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}
