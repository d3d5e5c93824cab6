//! Maps `Box<dyn Error>` from trait boundaries to typed `ServoError`.
//!
//! The traits in `servo_traits` use `Box<dyn Error + Send + Sync>`; this module
//! converts those to our typed error enum, with an optional feature-gated path
//! for `servo_hardware::HwError` downcasting.

use crate::error::ServoError;

/// Map a trait-boundary error to a typed `ServoError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ServoError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<servo_hardware::error::HwError>() {
            return match hw {
                servo_hardware::error::HwError::Timeout => ServoError::Timeout,
                other => ServoError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        ServoError::Timeout
    } else {
        ServoError::Hardware(s)
    }
}
