pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::fmt;

/// Address of one actuator output (e.g. a PWM channel on a servo board).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u8);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

impl From<u8> for ChannelId {
    fn from(v: u8) -> Self {
        Self(v)
    }
}

/// Command accepted by an actuator channel.
///
/// `Continuous` releases the output (no held position); it is not the same
/// thing as `Fixed(0.0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleCommand {
    Fixed(f32),
    Continuous,
}

impl AngleCommand {
    pub fn degrees(&self) -> Option<f32> {
        match self {
            Self::Fixed(d) => Some(*d),
            Self::Continuous => None,
        }
    }
}

pub trait CurrentSensor {
    /// Configure the device. Failure here is fatal for the caller.
    fn init(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// One current reading in the sensor's reporting unit (raw register * 0.001).
    fn read_current(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}

/// Multi-channel actuator driver.
///
/// Methods take `&self` so several channels can be commanded from different
/// threads; implementations serialize bus access internally if they must.
pub trait Actuator: Send + Sync {
    fn set_angle(
        &self,
        channel: ChannelId,
        cmd: AngleCommand,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Last position the driver knows for `channel`, if any.
    fn angle(&self, channel: ChannelId) -> Option<f32>;
}

impl<T: CurrentSensor + ?Sized> CurrentSensor for Box<T> {
    fn init(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).init()
    }

    fn read_current(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_current()
    }
}
