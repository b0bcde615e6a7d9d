//! Calibration hub: routes operator actions to the selected pump.
//!
//! The hub keeps a directory of non-owning pump references. It never extends
//! a pump's lifetime and never fails its caller: misses are logged and
//! reported through [`Dispatch`].

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use microdoser_traits::Selector;
use tracing::{info, warn};

use crate::error::Result;
use crate::pump::PumpController;
use crate::status::Dispatch;

/// Shared handle to a pump on the single control thread.
pub type PumpHandle = Rc<RefCell<PumpController>>;

#[derive(Default)]
pub struct CalibrationHub {
    pumps: HashMap<String, Weak<RefCell<PumpController>>>,
    selector: Option<Rc<dyn Selector>>,
}

impl core::fmt::Debug for CalibrationHub {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut ids: Vec<&String> = self.pumps.keys().collect();
        ids.sort();
        f.debug_struct("CalibrationHub")
            .field("pumps", &ids)
            .field("has_selector", &self.selector.is_some())
            .finish()
    }
}

impl CalibrationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the UI selector read on every action.
    pub fn set_selector(&mut self, selector: Rc<dyn Selector>) {
        self.selector = Some(selector);
    }

    /// Register `pump` under `id`. Re-registering an id replaces the old entry.
    pub fn register_pump(&mut self, id: impl Into<String>, pump: &PumpHandle) {
        self.pumps.insert(id.into(), Rc::downgrade(pump));
    }

    pub fn len(&self) -> usize {
        self.pumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pumps.is_empty()
    }

    /// Look up a live pump by id.
    pub fn get(&self, id: &str) -> Option<PumpHandle> {
        self.pumps.get(id).and_then(Weak::upgrade)
    }

    /// Run the reference calibration dose on the selected pump.
    pub fn start_calibration(&self) -> Dispatch {
        self.dispatch("calibration", |target, pump| {
            info!(pump = %target, "starting calibration");
            pump.run_calibration_dose().map(|_| ())
        })
    }

    /// Apply an operator-measured volume to the selected pump.
    pub fn apply_calibration_result(&self, measured_ml: f32) -> Dispatch {
        self.dispatch("applying calibration", |target, pump| {
            info!(pump = %target, measured_ml, "applying calibration result");
            pump.apply_measured_result(measured_ml).map(|_| ())
        })
    }

    /// Prime the selected pump.
    pub fn start_prime(&self) -> Dispatch {
        self.dispatch("priming", |target, pump| {
            info!(pump = %target, "priming pump");
            pump.prime().map(|_| ())
        })
    }

    fn dispatch(
        &self,
        action: &str,
        f: impl FnOnce(&str, &mut PumpController) -> Result<()>,
    ) -> Dispatch {
        let Some(target) = self.selector.as_ref().and_then(|s| s.current()) else {
            warn!(action, "no pump selected");
            return Dispatch::NoSelection;
        };
        let Some(pump) = self.get(&target) else {
            warn!(pump = %target, action, "pump not found");
            return Dispatch::UnknownPump(target);
        };
        let Ok(mut pump) = pump.try_borrow_mut() else {
            warn!(pump = %target, action, "pump busy; action dropped");
            return Dispatch::Busy(target);
        };
        match f(&target, &mut pump) {
            Ok(()) => Dispatch::Done,
            Err(e) => Dispatch::Failed(e),
        }
    }
}
