use gaze_traits::ChannelId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GazeError {
    #[error("sensor init failed: {0}")]
    SensorInit(String),
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("timeout waiting for sensor")]
    SensorTimeout,
    #[error("actuator write on {channel} failed: {reason}")]
    ActuatorWrite { channel: ChannelId, reason: String },
    #[error("unknown channel {0}")]
    UnknownChannel(ChannelId),
    #[error("bounds not calibrated; run calibration first")]
    NotCalibrated,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing current sensor")]
    MissingSensor,
    #[error("missing actuator driver")]
    MissingActuator,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
