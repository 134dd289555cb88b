pub mod error;
pub mod ina231;
pub mod pca9685;

use gaze_traits::{Actuator, AngleCommand, ChannelId, CurrentSensor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub use error::HwError;

/// Mechanical model shared by the simulated sensor and actuator.
///
/// Each channel has hard stops; commanding past a stop stalls the servo and
/// the supply current jumps from `idle_amps` to `stall_amps`.
#[derive(Debug)]
struct RigState {
    stops: HashMap<ChannelId, (f32, f32)>,
    positions: HashMap<ChannelId, AngleCommand>,
    idle_amps: f32,
    stall_amps: f32,
    fail_reads: u32,
}

/// Simulated eye mechanism; hand out a sensor and an actuator that observe
/// the same state.
#[derive(Debug, Clone)]
pub struct SimulatedRig {
    state: Arc<Mutex<RigState>>,
    write_delay: Duration,
}

impl SimulatedRig {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RigState {
                stops: HashMap::new(),
                positions: HashMap::new(),
                idle_amps: 1.5,
                stall_amps: 12.0,
                fail_reads: 0,
            })),
            write_delay: Duration::ZERO,
        }
    }

    /// Give `channel` mechanical stops at `min` and `max` degrees.
    pub fn with_stops(self, channel: ChannelId, min: f32, max: f32) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.stops.insert(channel, (min, max));
        }
        self
    }

    /// Start `channel` at a resting position.
    pub fn with_position(self, channel: ChannelId, degrees: f32) -> Self {
        if let Ok(mut s) = self.state.lock() {
            s.positions.insert(channel, AngleCommand::Fixed(degrees));
        }
        self
    }

    /// Make every actuator write block for `d` (bus latency).
    pub fn with_write_delay(mut self, d: Duration) -> Self {
        self.write_delay = d;
        self
    }

    /// Fail the next `n` current reads.
    pub fn fail_next_reads(&self, n: u32) {
        if let Ok(mut s) = self.state.lock() {
            s.fail_reads = n;
        }
    }

    /// Default topology: six servos with plausible eyelid / eyeball stops.
    pub fn eye_mechanism() -> Self {
        [
            (0u8, 60.0, 130.0),
            (1, 30.0, 150.0),
            (2, 70.0, 130.0),
            (3, 50.0, 130.0),
            (4, 40.0, 120.0),
            (5, 30.0, 140.0),
        ]
        .into_iter()
        .fold(Self::new(), |rig, (ch, lo, hi)| {
            rig.with_stops(ChannelId(ch), lo, hi)
                .with_position(ChannelId(ch), (lo + hi) / 2.0)
        })
    }

    pub fn sensor(&self) -> SimulatedSensor {
        SimulatedSensor { rig: self.clone() }
    }

    pub fn actuator(&self) -> SimulatedActuator {
        SimulatedActuator { rig: self.clone() }
    }

    pub fn position(&self, channel: ChannelId) -> Option<AngleCommand> {
        self.state
            .lock()
            .ok()
            .and_then(|s| s.positions.get(&channel).copied())
    }
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new()
    }
}

/// Simulated current sensor.
pub struct SimulatedSensor {
    rig: SimulatedRig,
}

impl CurrentSensor for SimulatedSensor {
    fn init(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!("simulated sensor ready");
        Ok(())
    }

    fn read_current(&mut self) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self
            .rig
            .state
            .lock()
            .map_err(|_| HwError::I2c("rig state poisoned".into()))?;
        if s.fail_reads > 0 {
            s.fail_reads -= 1;
            return Err(HwError::Timeout.into());
        }
        let stalled = s.positions.iter().any(|(ch, cmd)| {
            match (cmd.degrees(), s.stops.get(ch)) {
                (Some(d), Some(&(lo, hi))) => d < lo || d > hi,
                _ => false,
            }
        });
        Ok(if stalled { s.stall_amps } else { s.idle_amps })
    }
}

/// Simulated servo board.
pub struct SimulatedActuator {
    rig: SimulatedRig,
}

impl Actuator for SimulatedActuator {
    fn set_angle(
        &self,
        channel: ChannelId,
        cmd: AngleCommand,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if channel.0 >= pca9685::CHANNELS {
            return Err(HwError::InvalidChannel(channel.0).into());
        }
        if !self.rig.write_delay.is_zero() {
            std::thread::sleep(self.rig.write_delay);
        }
        let mut s = self
            .rig
            .state
            .lock()
            .map_err(|_| HwError::I2c("rig state poisoned".into()))?;
        s.positions.insert(channel, cmd);
        tracing::trace!(%channel, ?cmd, "simulated servo write");
        Ok(())
    }

    fn angle(&self, channel: ChannelId) -> Option<f32> {
        self.rig.position(channel).and_then(|c| c.degrees())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_stall_current() {
        let rig = SimulatedRig::new().with_stops(ChannelId(0), 20.0, 160.0);
        let act = rig.actuator();
        let mut sensor = rig.sensor();
        act.set_angle(ChannelId(0), AngleCommand::Fixed(90.0)).unwrap();
        let idle = sensor.read_current().unwrap();
        act.set_angle(ChannelId(0), AngleCommand::Fixed(165.0)).unwrap();
        let stalled = sensor.read_current().unwrap();
        assert!(stalled > idle);
    }

    #[test]
    fn test_release_is_not_a_position() {
        let rig = SimulatedRig::new();
        let act = rig.actuator();
        act.set_angle(ChannelId(1), AngleCommand::Fixed(45.0)).unwrap();
        assert_eq!(act.angle(ChannelId(1)), Some(45.0));
        act.set_angle(ChannelId(1), AngleCommand::Continuous).unwrap();
        assert_eq!(act.angle(ChannelId(1)), None);
    }

    #[test]
    fn test_injected_read_failures() {
        let rig = SimulatedRig::new();
        let mut sensor = rig.sensor();
        rig.fail_next_reads(2);
        assert!(sensor.read_current().is_err());
        assert!(sensor.read_current().is_err());
        assert!(sensor.read_current().is_ok());
    }

    #[test]
    fn test_rejects_out_of_range_channel() {
        let act = SimulatedRig::new().actuator();
        assert!(act.set_angle(ChannelId(16), AngleCommand::Fixed(0.0)).is_err());
    }
}
