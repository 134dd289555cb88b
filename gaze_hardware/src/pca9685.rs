//! PCA9685 16-channel PWM board driving hobby servos.

pub const DEFAULT_ADDRESS: u16 = 0x42;
pub const CHANNELS: u8 = 16;

const OSC_HZ: f32 = 25_000_000.0;
const COUNTS: f32 = 4096.0;

pub const REG_MODE1: u8 = 0x00;
pub const REG_LED0_ON_L: u8 = 0x06;
pub const REG_PRESCALE: u8 = 0xFE;

/// Pulse-width limits corresponding to 0° and 180°.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseRange {
    pub min_us: u16,
    pub max_us: u16,
}

impl Default for PulseRange {
    fn default() -> Self {
        Self {
            min_us: 500,
            max_us: 2500,
        }
    }
}

impl PulseRange {
    /// Linear angle → pulse width; the angle is limited to [0, 180] first.
    pub fn pulse_us(&self, degrees: f32) -> f32 {
        let d = if degrees.is_finite() {
            degrees.clamp(0.0, 180.0)
        } else {
            0.0
        };
        let span = f32::from(self.max_us) - f32::from(self.min_us);
        f32::from(self.min_us) + span * d / 180.0
    }

    /// Inverse of `pulse_us`.
    pub fn degrees(&self, pulse_us: f32) -> f32 {
        let span = f32::from(self.max_us) - f32::from(self.min_us);
        ((pulse_us - f32::from(self.min_us)) * 180.0 / span).clamp(0.0, 180.0)
    }
}

/// Prescaler for the requested PWM frequency.
pub fn prescale_for(pwm_hz: f32) -> u8 {
    let v = (OSC_HZ / (COUNTS * pwm_hz)).round() - 1.0;
    v.clamp(3.0, 255.0) as u8
}

/// 12-bit "off" count for a pulse width at `pwm_hz`.
pub fn off_count(pulse_us: f32, pwm_hz: f32) -> u16 {
    let period_us = 1_000_000.0 / pwm_hz;
    ((pulse_us / period_us) * COUNTS).round().clamp(0.0, COUNTS - 1.0) as u16
}

/// LEDn register block for a channel: ON_L, ON_H, OFF_L, OFF_H.
/// `None` produces the full-off pattern (output released).
pub fn channel_frame(channel: u8, off: Option<u16>) -> [u8; 5] {
    let reg = REG_LED0_ON_L + 4 * channel;
    match off {
        Some(count) => {
            let [hi, lo] = count.to_be_bytes();
            [reg, 0, 0, lo, hi & 0x0F]
        }
        None => [reg, 0, 0, 0, 0x10],
    }
}

#[cfg(feature = "hardware")]
pub use driver::Pca9685;

#[cfg(feature = "hardware")]
mod driver {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use gaze_traits::{AngleCommand, ChannelId};
    use rppal::i2c::I2c;
    use tracing::{debug, trace};

    use super::*;
    use crate::error::{HwError, Result};

    struct Inner {
        bus: I2c,
        positions: HashMap<ChannelId, f32>,
    }

    /// Servo board. Bus writes are serialized by an internal mutex, so a
    /// "simultaneous" multi-channel move is really a quick sequence.
    pub struct Pca9685 {
        inner: Mutex<Inner>,
        pulses: PulseRange,
        pwm_hz: f32,
    }

    impl Pca9685 {
        pub fn open(bus: u8, address: u16, pwm_hz: f32, pulses: PulseRange) -> Result<Self> {
            let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
            i2c.set_slave_address(address)
                .map_err(|e| HwError::I2c(e.to_string()))?;
            let w = |i2c: &mut I2c, bytes: &[u8]| {
                i2c.write(bytes).map_err(|e| HwError::I2c(e.to_string()))
            };
            // Prescale can only be written while asleep.
            w(&mut i2c, &[REG_MODE1, 0x10])?;
            w(&mut i2c, &[REG_PRESCALE, prescale_for(pwm_hz)])?;
            w(&mut i2c, &[REG_MODE1, 0x00])?;
            std::thread::sleep(Duration::from_millis(5));
            // Restart + register auto-increment.
            w(&mut i2c, &[REG_MODE1, 0xA0])?;
            debug!(address, pwm_hz, "pca9685 ready");
            Ok(Self {
                inner: Mutex::new(Inner {
                    bus: i2c,
                    positions: HashMap::new(),
                }),
                pulses,
                pwm_hz,
            })
        }
    }

    impl gaze_traits::Actuator for Pca9685 {
        fn set_angle(
            &self,
            channel: ChannelId,
            cmd: AngleCommand,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if channel.0 >= CHANNELS {
                return Err(HwError::InvalidChannel(channel.0).into());
            }
            let off = cmd
                .degrees()
                .map(|d| off_count(self.pulses.pulse_us(d), self.pwm_hz));
            let frame = channel_frame(channel.0, off);
            let mut inner = self
                .inner
                .lock()
                .map_err(|_| HwError::I2c("bus mutex poisoned".into()))?;
            inner
                .bus
                .write(&frame)
                .map_err(|e| HwError::I2c(e.to_string()))?;
            match cmd {
                AngleCommand::Fixed(d) => {
                    inner.positions.insert(channel, d.clamp(0.0, 180.0));
                }
                AngleCommand::Continuous => {
                    inner.positions.remove(&channel);
                }
            }
            trace!(%channel, ?off, "pca9685 write");
            Ok(())
        }

        fn angle(&self, channel: ChannelId) -> Option<f32> {
            self.inner
                .lock()
                .ok()
                .and_then(|g| g.positions.get(&channel).copied())
        }
    }
}
