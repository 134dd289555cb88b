use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("i2c error: {0}")]
    I2c(String),
    #[error("sensor did not acknowledge {0}")]
    Init(&'static str),
    #[error("channel {0} out of range for this driver")]
    InvalidChannel(u8),
    #[error("bus timeout")]
    Timeout,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
