//! Human-readable error descriptions and structured JSON error formatting.

use gaze_core::error::{BuildError, GazeError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor => {
                "What happened: No current sensor was provided to the rig.\nLikely causes: The INA231 failed to open or was not wired into the builder.\nHow to fix: Ensure the sensor is created successfully and passed via with_sensor(...).".to_string()
            }
            BuildError::MissingActuator => {
                "What happened: No servo driver was provided to the rig.\nLikely causes: The PCA9685 failed to open or was not wired into the builder.\nHow to fix: Ensure the driver is created successfully and passed via with_actuator(...).".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Channels referenced by [gaze], [blink] or [calibration] that are not in actuator.channels.\nHow to fix: Edit the config file, then rerun. See etc/gaze_config.toml for a sample."
            ),
        };
    }

    if let Some(ge) = err.downcast_ref::<GazeError>() {
        return match ge {
            GazeError::SensorInit(e) => format!(
                "What happened: The current sensor could not be configured ({e}).\nLikely causes: Wrong I2C bus or address, missing power, or I2C disabled.\nHow to fix: Check [sensor] i2c_bus/address and the wiring, then rerun."
            ),
            GazeError::SensorTimeout => "What happened: Current sensor read timed out.\nLikely causes: Loose I2C wiring, bus contention, or the sensor lost power.\nHow to fix: Check the sensor connection and rerun `gaze self-check`.".to_string(),
            GazeError::SensorRead(e) => format!(
                "What happened: Current sensor read failed ({e}).\nLikely causes: I2C errors on the sensor bus.\nHow to fix: Check wiring and rerun with --log-level=debug for details."
            ),
            GazeError::ActuatorWrite { channel, reason } => format!(
                "What happened: Writing to servo {channel} failed ({reason}).\nLikely causes: Servo driver not powered, wrong address, or channel out of range.\nHow to fix: Check [actuator] address/channels and the servo supply."
            ),
            GazeError::NotCalibrated => "What happened: Bounds are not calibrated.\nLikely causes: Calibration was skipped or did not complete for every channel.\nHow to fix: Run `gaze calibrate` first, or set poses.require_calibration = false to use the full range.".to_string(),
            GazeError::Cancelled => "What happened: Operation cancelled.\nLikely causes: Ctrl-C was pressed.\nHow to fix: Nothing to fix; rerun the command when ready.".to_string(),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("open ina231") || lower.contains("open pca9685") {
        return "What happened: Failed to open the I2C bus.\nLikely causes: I2C disabled, wrong bus number, or insufficient permissions.\nHow to fix: Enable I2C, check [sensor]/[actuator] i2c_bus, and make sure the user is in the i2c group.".to_string();
    }

    if lower.contains("parse config") || lower.contains("read config") {
        return format!(
            "What happened: Could not load the configuration.\nLikely causes: Missing file or a TOML syntax error.\nHow to fix: Check the path given to --config. Original: {msg}"
        );
    }

    if lower.contains(" must ") || lower.contains("unknown channel") {
        return format!(
            "What happened: Configuration is invalid ({msg}).\nLikely causes: Out-of-range values or channels missing from actuator.channels.\nHow to fix: Edit the TOML config and try again."
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Short stable name for JSON output.
pub fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingSensor | BuildError::MissingActuator => "Build",
            BuildError::InvalidConfig(_) => "Config",
        };
    }
    match err.downcast_ref::<GazeError>() {
        Some(GazeError::SensorInit(_)) => "SensorInit",
        Some(GazeError::SensorRead(_)) => "SensorRead",
        Some(GazeError::SensorTimeout) => "SensorTimeout",
        Some(GazeError::ActuatorWrite { .. }) => "ActuatorWrite",
        Some(GazeError::UnknownChannel(_)) => "UnknownChannel",
        Some(GazeError::NotCalibrated) => "NotCalibrated",
        Some(GazeError::Config(_)) => "Config",
        Some(GazeError::State(_)) => "State",
        Some(GazeError::Cancelled) => "Cancelled",
        None => "Error",
    }
}

/// Stable exit codes; anything untyped is 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<GazeError>() {
        Some(GazeError::Cancelled) => 130,
        Some(GazeError::NotCalibrated) => 3,
        Some(GazeError::SensorInit(_)) => 4,
        Some(GazeError::SensorRead(_) | GazeError::SensorTimeout) => 5,
        Some(GazeError::ActuatorWrite { .. }) => 6,
        _ => 1,
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({ "reason": reason_name(err), "message": humanize(err) }).to_string()
}
