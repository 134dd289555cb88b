//! INA231 current monitor: register codec plus an I²C driver behind `hardware`.
//!
//! The codec half is plain byte shuffling so it is usable (and tested) without
//! a bus attached.

pub const DEFAULT_ADDRESS: u16 = 0x40;

pub const REG_CONFIG: u8 = 0x00;
pub const REG_CURRENT: u8 = 0x04;
pub const REG_CALIBRATION: u8 = 0x05;

pub const CONFIG_VALUE: u16 = 0x4527;
pub const CALIBRATION_VALUE: u16 = 0x0A00;

/// Reading unit per raw LSB.
pub const LSB_SCALE: f32 = 0.001;

/// Register-write frame: register pointer followed by a big-endian word.
#[inline]
pub fn write_frame(reg: u8, value: u16) -> [u8; 3] {
    let [hi, lo] = value.to_be_bytes();
    [reg, hi, lo]
}

/// Frames sent during initialization, in order.
pub fn init_frames() -> [[u8; 3]; 2] {
    [
        write_frame(REG_CONFIG, CONFIG_VALUE),
        write_frame(REG_CALIBRATION, CALIBRATION_VALUE),
    ]
}

/// Decode the two current-register bytes (big-endian two's complement).
#[inline]
pub fn decode_current(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_be_bytes(bytes)) * LSB_SCALE
}

#[cfg(feature = "hardware")]
pub use driver::Ina231;

#[cfg(feature = "hardware")]
mod driver {
    use std::time::Duration;

    use rppal::i2c::I2c;
    use tracing::{debug, trace};

    use super::*;
    use crate::error::{HwError, Result};

    pub struct Ina231 {
        bus: I2c,
        settle: Duration,
    }

    impl Ina231 {
        pub fn open(bus: u8, address: u16, settle: Duration) -> Result<Self> {
            let mut i2c = I2c::with_bus(bus).map_err(|e| HwError::I2c(e.to_string()))?;
            i2c.set_slave_address(address)
                .map_err(|e| HwError::I2c(e.to_string()))?;
            Ok(Self { bus: i2c, settle })
        }

        pub fn configure(&mut self) -> Result<()> {
            let [config, calibration] = init_frames();
            self.bus
                .write(&config)
                .map_err(|_| HwError::Init("configuration write"))?;
            self.bus
                .write(&calibration)
                .map_err(|_| HwError::Init("calibration write"))?;
            std::thread::sleep(self.settle);
            debug!(settle_ms = self.settle.as_millis() as u64, "ina231 configured");
            Ok(())
        }

        pub fn read_raw(&mut self) -> Result<[u8; 2]> {
            let mut buf = [0u8; 2];
            self.bus
                .write_read(&[REG_CURRENT], &mut buf)
                .map_err(|e| HwError::I2c(e.to_string()))?;
            trace!(hi = buf[0], lo = buf[1], "ina231 raw read");
            Ok(buf)
        }
    }

    impl gaze_traits::CurrentSensor for Ina231 {
        fn init(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.configure().map_err(Into::into)
        }

        fn read_current(&mut self) -> std::result::Result<f32, Box<dyn std::error::Error + Send + Sync>> {
            Ok(decode_current(self.read_raw()?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn init_frames_match_register_map() {
        let [cfg, cal] = init_frames();
        assert_eq!(cfg, [0x00, 0x45, 0x27]);
        assert_eq!(cal, [0x05, 0x0A, 0x00]);
    }

    #[rstest]
    #[case([0x00, 0x00], 0.0)]
    #[case([0x1F, 0x40], 8.0)]
    #[case([0x00, 0x01], 0.001)]
    #[case([0xFF, 0xFF], -0.001)]
    #[case([0x80, 0x00], -32.768)]
    #[case([0x7F, 0xFF], 32.767)]
    fn decodes_twos_complement(#[case] bytes: [u8; 2], #[case] expected: f32) {
        assert!((decode_current(bytes) - expected).abs() < 1e-4);
    }
}
