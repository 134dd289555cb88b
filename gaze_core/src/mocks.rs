//! Test and helper mocks for gaze_core

use gaze_traits::{Actuator, AngleCommand, ChannelId, CurrentSensor};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A sensor whose readings come from a closure.
pub struct FnSensor<F> {
    read: F,
}

impl<F> FnSensor<F>
where
    F: FnMut() -> Result<f32, BoxError>,
{
    pub fn new(read: F) -> Self {
        Self { read }
    }
}

impl<F> CurrentSensor for FnSensor<F>
where
    F: FnMut() -> Result<f32, BoxError>,
{
    fn init(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn read_current(&mut self) -> Result<f32, BoxError> {
        (self.read)()
    }
}

/// A sensor whose `init` always fails.
pub struct DeadSensor;

impl CurrentSensor for DeadSensor {
    fn init(&mut self) -> Result<(), BoxError> {
        Err(Box::new(std::io::Error::other("no ack at sensor address")))
    }

    fn read_current(&mut self) -> Result<f32, BoxError> {
        Err(Box::new(std::io::Error::other("sensor not initialised")))
    }
}

#[derive(Debug, Default)]
struct Recorded {
    positions: HashMap<ChannelId, f32>,
    writes: Vec<(ChannelId, AngleCommand)>,
}

/// Actuator that records every accepted command.
///
/// Clones share the same log, so a test can keep one handle while the code
/// under test owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    log: Arc<Mutex<Recorded>>,
    delay: Duration,
    delays: HashMap<ChannelId, Duration>,
    failing: HashSet<ChannelId>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write blocks for `d`.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = d;
        self
    }

    /// Writes to `channel` block for `d` instead of the common delay.
    pub fn with_channel_delay(mut self, channel: ChannelId, d: Duration) -> Self {
        self.delays.insert(channel, d);
        self
    }

    /// Writes to `channel` always fail.
    pub fn with_failing(mut self, channel: ChannelId) -> Self {
        self.failing.insert(channel);
        self
    }

    pub fn with_position(self, channel: ChannelId, degrees: f32) -> Self {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .positions
            .insert(channel, degrees);
        self
    }

    /// All accepted writes, in order.
    pub fn writes(&self) -> Vec<(ChannelId, AngleCommand)> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writes
            .clone()
    }

    /// Accepted fixed angles for one channel, in order.
    pub fn angles(&self, channel: ChannelId) -> Vec<f32> {
        self.writes()
            .into_iter()
            .filter(|(c, _)| *c == channel)
            .filter_map(|(_, cmd)| cmd.degrees())
            .collect()
    }

    pub fn clear(&self) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .writes
            .clear();
    }
}

impl Actuator for RecordingActuator {
    fn set_angle(&self, channel: ChannelId, cmd: AngleCommand) -> Result<(), BoxError> {
        let delay = self.delays.get(&channel).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        if self.failing.contains(&channel) {
            return Err(Box::new(std::io::Error::other(format!(
                "{channel}: bus nack"
            ))));
        }
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        match cmd {
            AngleCommand::Fixed(d) => {
                log.positions.insert(channel, d);
            }
            AngleCommand::Continuous => {
                log.positions.remove(&channel);
            }
        }
        log.writes.push((channel, cmd));
        Ok(())
    }

    fn angle(&self, channel: ChannelId) -> Option<f32> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .positions
            .get(&channel)
            .copied()
    }
}
