//! Maps `Box<dyn Error>` from trait boundaries to typed `GazeError`.
//!
//! The traits in `gaze_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `gaze_hardware::HwError` downcasting.

use crate::error::GazeError;
use gaze_traits::ChannelId;

/// Map a sensor-side error to a typed `GazeError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> GazeError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<gaze_hardware::HwError>() {
            return match hw {
                gaze_hardware::HwError::Timeout => GazeError::SensorTimeout,
                other => GazeError::SensorRead(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        GazeError::SensorTimeout
    } else {
        GazeError::SensorRead(s)
    }
}

/// Map an actuator-side error for `channel` to a typed `GazeError`.
pub fn map_actuator_error(channel: ChannelId, e: &(dyn std::error::Error + 'static)) -> GazeError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(gaze_hardware::HwError::InvalidChannel(n)) =
            e.downcast_ref::<gaze_hardware::HwError>()
        {
            return GazeError::UnknownChannel(ChannelId(*n));
        }
    }

    GazeError::ActuatorWrite {
        channel,
        reason: e.to_string(),
    }
}
