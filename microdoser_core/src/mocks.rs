//! Test and simulation doubles for microdoser_core.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use microdoser_traits::{Actuator, PreferenceStore, WallClock, WallTime};

/// In-memory preference store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: RefCell<HashMap<u32, u32>>,
    writes: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `save` calls.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }
}

impl PreferenceStore for MemoryStore {
    fn load(&self, key: u32) -> Option<u32> {
        self.slots.borrow().get(&key).copied()
    }

    fn save(&self, key: u32, value: u32) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.slots.borrow_mut().insert(key, value);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

/// Actuator that records switching instead of driving hardware.
///
/// Clones share state, so a test can keep one handle after handing the other
/// to a pump.
#[derive(Debug, Clone, Default)]
pub struct SpyActuator {
    on: Rc<Cell<bool>>,
    starts: Rc<Cell<usize>>,
    stops: Rc<Cell<usize>>,
}

impl SpyActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }

    /// Number of `turn_on` calls.
    pub fn starts(&self) -> usize {
        self.starts.get()
    }

    /// Number of `turn_off` calls.
    pub fn stops(&self) -> usize {
        self.stops.get()
    }
}

impl Actuator for SpyActuator {
    fn turn_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.on.set(true);
        self.starts.set(self.starts.get() + 1);
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.on.set(false);
        self.stops.set(self.stops.get() + 1);
        Ok(())
    }
}

/// Wall clock whose reading is set by the test; `None` means unsynchronized.
#[derive(Debug, Default)]
pub struct FixedWallClock {
    now: Cell<Option<WallTime>>,
}

impl FixedWallClock {
    pub fn at(hour: u8, minute: u8, day_of_year: u16) -> Self {
        Self {
            now: Cell::new(Some(WallTime::new(hour, minute, day_of_year))),
        }
    }

    pub fn unsynced() -> Self {
        Self::default()
    }

    pub fn set(&self, hour: u8, minute: u8, day_of_year: u16) {
        self.now.set(Some(WallTime::new(hour, minute, day_of_year)));
    }

    /// Set an arbitrary reading, e.g. one with a later epoch timestamp.
    pub fn set_time(&self, now: WallTime) {
        self.now.set(Some(now));
    }

    pub fn invalidate(&self) {
        self.now.set(None);
    }
}

impl WallClock for FixedWallClock {
    fn now(&self) -> Option<WallTime> {
        self.now.get()
    }
}
