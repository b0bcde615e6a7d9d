//! Maps `Box<dyn Error>` from trait boundaries to typed `DoserError`.
//!
//! The traits in `microdoser_traits` use `Box<dyn Error + Send + Sync>` so any
//! driver can plug in; this module converts those to our typed error enum, with
//! an optional feature-gated path for `microdoser_hardware::HwError` downcasting.

use crate::error::DoserError;

/// Map an actuator error to a typed `DoserError`.
///
/// Attempts to downcast known hardware error types first, then falls back to
/// the error's display text.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DoserError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<microdoser_hardware::error::HwError>() {
            return match hw {
                microdoser_hardware::error::HwError::Io(_)
                | microdoser_hardware::error::HwError::Store(_) => {
                    DoserError::Storage(hw.to_string())
                }
                other => DoserError::HardwareFault(other.to_string()),
            };
        }
    }

    DoserError::Hardware(e.to_string())
}

/// Map a preference-store error to `DoserError::Storage`.
pub fn map_store_error(e: &(dyn std::error::Error + 'static)) -> DoserError {
    DoserError::Storage(e.to_string())
}
