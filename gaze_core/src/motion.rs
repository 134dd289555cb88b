//! Bounds-enforced move primitives.
//!
//! Every fixed angle leaves this module clamped to the channel's current
//! bounds. `move_many` fans out one worker per channel and waits on a
//! channel with a deadline; workers still writing at the deadline are
//! reported as pending and left to finish on their own.

use crate::bounds::BoundsTable;
use crate::config::MotionCfg;
use crate::error::GazeError;
use crate::hw_error::map_actuator_error;
use crossbeam_channel::RecvTimeoutError;
use gaze_traits::{Actuator, AngleCommand, ChannelId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What happened to a multi-channel move.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveReport {
    /// Clamped commands handed to workers.
    pub sent: Vec<(ChannelId, f32)>,
    pub confirmed: Vec<ChannelId>,
    pub failed: Vec<(ChannelId, GazeError)>,
    /// Still writing when the deadline passed.
    pub pending: Vec<ChannelId>,
    pub elapsed: Duration,
}

impl MoveReport {
    pub fn all_confirmed(&self) -> bool {
        self.failed.is_empty() && self.pending.is_empty()
    }

    pub fn deadline_exceeded(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[derive(Clone)]
pub struct MotionController {
    actuator: Arc<dyn Actuator>,
    bounds: BoundsTable,
    cfg: MotionCfg,
}

impl std::fmt::Debug for MotionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionController")
            .field("bounds", &self.bounds)
            .field("deadline", &self.cfg.deadline)
            .finish_non_exhaustive()
    }
}

impl MotionController {
    pub fn new(actuator: Arc<dyn Actuator>, bounds: BoundsTable, cfg: MotionCfg) -> Self {
        Self {
            actuator,
            bounds,
            cfg,
        }
    }

    pub fn bounds(&self) -> &BoundsTable {
        &self.bounds
    }

    pub fn deadline(&self) -> Duration {
        self.cfg.deadline
    }

    /// The angle `move_one` would send for `angle`.
    pub fn clamp(&self, channel: ChannelId, angle: f32) -> Result<f32, GazeError> {
        Ok(self.bounds.require(channel)?.clamp(angle))
    }

    /// Clamp, send, and return what was sent.
    pub fn move_one(&self, channel: ChannelId, angle: f32) -> Result<f32, GazeError> {
        let actual = self.clamp(channel, angle)?;
        if actual != angle {
            tracing::debug!(%channel, requested = angle, actual, "angle clamped");
        }
        self.actuator
            .set_angle(channel, AngleCommand::Fixed(actual))
            .map_err(|e| map_actuator_error(channel, e.as_ref()))?;
        Ok(actual)
    }

    /// `Fixed` is clamped like `move_one`; `Continuous` releases the channel.
    pub fn command(&self, channel: ChannelId, cmd: AngleCommand) -> Result<AngleCommand, GazeError> {
        match cmd {
            AngleCommand::Fixed(a) => self.move_one(channel, a).map(AngleCommand::Fixed),
            AngleCommand::Continuous => {
                self.bounds.require(channel)?;
                self.actuator
                    .set_angle(channel, AngleCommand::Continuous)
                    .map_err(|e| map_actuator_error(channel, e.as_ref()))?;
                Ok(AngleCommand::Continuous)
            }
        }
    }

    /// Move several channels at once and wait at most the configured deadline.
    ///
    /// When a channel appears more than once, the last request wins. Unknown
    /// channels are reported as failed without being dispatched.
    pub fn move_many(&self, moves: &[(ChannelId, f32)]) -> MoveReport {
        let started = Instant::now();
        let deadline = started + self.cfg.deadline;
        let mut report = MoveReport::default();

        let requests: BTreeMap<ChannelId, f32> = moves.iter().copied().collect();
        let (tx, rx) = crossbeam_channel::bounded(requests.len().max(1));
        let mut outstanding = BTreeSet::new();

        for (channel, angle) in requests {
            let actual = match self.clamp(channel, angle) {
                Ok(a) => a,
                Err(e) => {
                    report.failed.push((channel, e));
                    continue;
                }
            };
            let actuator = Arc::clone(&self.actuator);
            let tx = tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("move-{channel}"))
                .spawn(move || {
                    let res = actuator
                        .set_angle(channel, AngleCommand::Fixed(actual))
                        .map_err(|e| map_actuator_error(channel, e.as_ref()));
                    // Receiver is gone once the deadline passed; nothing to report to.
                    let _ = tx.send((channel, res));
                });
            match spawned {
                Ok(_) => {
                    report.sent.push((channel, actual));
                    outstanding.insert(channel);
                }
                Err(e) => report.failed.push((
                    channel,
                    GazeError::State(format!("failed to spawn move worker: {e}")),
                )),
            }
        }
        drop(tx);

        while !outstanding.is_empty() {
            match rx.recv_deadline(deadline) {
                Ok((channel, res)) => {
                    outstanding.remove(&channel);
                    match res {
                        Ok(()) => report.confirmed.push(channel),
                        Err(e) => {
                            tracing::warn!(%channel, error = %e, "actuator write failed");
                            report.failed.push((channel, e));
                        }
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::error!(pending = ?outstanding, "move workers exited without reporting");
                    break;
                }
            }
        }

        report.pending = outstanding.into_iter().collect();
        report.elapsed = started.elapsed();
        if report.deadline_exceeded() {
            tracing::warn!(
                pending = ?report.pending,
                deadline_ms = self.cfg.deadline.as_millis() as u64,
                "move deadline exceeded"
            );
        }
        report
    }

    /// Send every listed channel to its center.
    pub fn neutral(&self, channels: &[ChannelId]) -> MoveReport {
        let moves: Vec<(ChannelId, f32)> = channels
            .iter()
            .map(|&c| (c, self.bounds.get(c).map_or(f32::NAN, |b| b.center)))
            .collect();
        self.move_many(&moves)
    }
}
