pub mod clock;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod store;
pub mod util;

pub use clock::{NoDelayClock, SimulatedWallClock, SystemWallClock};
pub use error::HwError;
pub use store::FilePreferenceStore;

use microdoser_traits::Actuator;
use std::cell::Cell;
use std::rc::Rc;

/// Simulated pump output. Logs switching and tracks the current state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedActuator {
    label: String,
    on: Rc<Cell<bool>>,
    activations: Rc<Cell<u32>>,
}

impl SimulatedActuator {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }

    /// Number of off→on transitions so far.
    pub fn activations(&self) -> u32 {
        self.activations.get()
    }
}

impl Actuator for SimulatedActuator {
    fn turn_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.on.replace(true) {
            self.activations.set(self.activations.get() + 1);
        }
        tracing::info!(output = %self.label, "output on (simulated)");
        Ok(())
    }

    fn turn_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.on.set(false);
        tracing::info!(output = %self.label, "output off (simulated)");
        Ok(())
    }
}
