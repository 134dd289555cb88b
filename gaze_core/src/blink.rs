//! Blink scheduling and the lid motion sequence.
//!
//! Independent of the gaze state machine and driven on disjoint channels.
//! `BlinkScheduler` decides *when* and *what kind*; `blink_sequence` turns a
//! kind into timed lid poses; `run_sequence` plays them.

use crate::bounds::BoundsTable;
use crate::cancel::{CancelToken, sleep_unless_cancelled};
use crate::config::{BlinkCfg, BoundSide};
use crate::error::GazeError;
use crate::motion::MotionController;
use crate::util::{chance, secs, uniform};
use gaze_traits::ChannelId;
use gaze_traits::clock::Clock;
use rand::Rng;
use rand::rngs::StdRng;
use std::time::Duration;

pub const PRE_TENSION_HOLD: Duration = Duration::from_millis(20);
pub const OVERSHOOT_HOLD: Duration = Duration::from_millis(50);
pub const SETTLE_HOLD: Duration = Duration::from_millis(100);
pub const DOUBLE_FIRST_HOLD_S: f32 = 0.10;
pub const DOUBLE_PAUSE: Duration = Duration::from_millis(150);
pub const DOUBLE_SECOND_HOLD_S: f32 = 0.12;
/// How often the blink loop checks whether a blink is due.
pub const POLL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlinkKind {
    /// One closure held for `hold_s` seconds.
    Single { hold_s: f32 },
    /// Two full blinks with short closures, separated by a pause.
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseKind {
    PreTension,
    Closed,
    /// Lids open between the two blinks of a double blink.
    Pause,
    Overshoot,
    Neutral,
}

/// One lid pose and how long to hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkPhase {
    pub kind: PhaseKind,
    pub angles: Vec<(ChannelId, f32)>,
    pub hold: Duration,
}

/// When the last blink happened and how long until the next one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlinkSchedule {
    pub last_blink: f32,
    pub next_interval: f32,
}

pub struct BlinkScheduler<R = StdRng> {
    cfg: BlinkCfg,
    rng: R,
    schedule: BlinkSchedule,
}

impl<R: Rng> BlinkScheduler<R> {
    /// First blink is due one drawn interval after `now` (seconds).
    pub fn new(cfg: BlinkCfg, mut rng: R, now: f32) -> Self {
        let next_interval = uniform(&mut rng, cfg.interval_min_s, cfg.interval_max_s);
        Self {
            cfg,
            rng,
            schedule: BlinkSchedule {
                last_blink: now,
                next_interval,
            },
        }
    }

    pub fn schedule(&self) -> BlinkSchedule {
        self.schedule
    }

    pub fn config(&self) -> &BlinkCfg {
        &self.cfg
    }

    pub fn is_due(&self, now: f32) -> bool {
        now - self.schedule.last_blink >= self.schedule.next_interval
    }

    /// If a blink is due at `now`, pick its kind and reschedule.
    pub fn poll(&mut self, now: f32) -> Option<BlinkKind> {
        if !self.is_due(now) {
            return None;
        }
        let kind = self.draw_kind();
        self.schedule = BlinkSchedule {
            last_blink: now,
            next_interval: uniform(&mut self.rng, self.cfg.interval_min_s, self.cfg.interval_max_s),
        };
        Some(kind)
    }

    /// A single blink with a drawn hold, for on-demand blinks.
    pub fn single(&mut self) -> BlinkKind {
        BlinkKind::Single {
            hold_s: uniform(&mut self.rng, self.cfg.hold_min_s, self.cfg.hold_max_s),
        }
    }

    fn draw_kind(&mut self) -> BlinkKind {
        if chance(&mut self.rng, self.cfg.double_prob) {
            BlinkKind::Double
        } else {
            self.single()
        }
    }
}

/// Lid poses for one blink. Neutral is each lid's calibrated center; the
/// closing direction is toward the lid's configured bound.
pub fn blink_sequence(
    kind: BlinkKind,
    cfg: &BlinkCfg,
    bounds: &BoundsTable,
) -> Result<Vec<BlinkPhase>, GazeError> {
    let mut lids = Vec::with_capacity(cfg.lids.len());
    for &(channel, side) in &cfg.lids {
        let b = bounds.require(channel)?;
        let toward = match side {
            BoundSide::Max => 1.0,
            BoundSide::Min => -1.0,
        };
        lids.push((channel, b.center, b.side(side), toward));
    }
    let pose = |f: &dyn Fn(f32, f32, f32) -> f32| -> Vec<(ChannelId, f32)> {
        lids.iter()
            .map(|&(c, neutral, closed, toward)| (c, f(neutral, closed, toward)))
            .collect()
    };

    let pre = BlinkPhase {
        kind: PhaseKind::PreTension,
        angles: pose(&|n, _, t| n + t * cfg.pre_tension_deg),
        hold: PRE_TENSION_HOLD,
    };
    let closed = |hold_s: f32| BlinkPhase {
        kind: PhaseKind::Closed,
        angles: pose(&|_, c, _| c),
        hold: secs(hold_s),
    };
    let overshoot = BlinkPhase {
        kind: PhaseKind::Overshoot,
        angles: pose(&|n, _, t| n - t * cfg.overshoot_deg),
        hold: OVERSHOOT_HOLD,
    };
    let neutral = |kind: PhaseKind, hold: Duration| BlinkPhase {
        kind,
        angles: pose(&|n, _, _| n),
        hold,
    };

    let single = |hold_s: f32| {
        [
            pre.clone(),
            closed(hold_s),
            overshoot.clone(),
            neutral(PhaseKind::Neutral, SETTLE_HOLD),
        ]
    };

    Ok(match kind {
        BlinkKind::Single { hold_s } => single(hold_s).to_vec(),
        BlinkKind::Double => {
            let mut phases = single(DOUBLE_FIRST_HOLD_S).to_vec();
            phases.push(neutral(PhaseKind::Pause, DOUBLE_PAUSE));
            phases.extend(single(DOUBLE_SECOND_HOLD_S));
            phases
        }
    })
}

/// What `run_sequence` managed to play.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceOutcome {
    pub phases_run: usize,
    pub cancelled: bool,
    /// Phases where at least one lid failed or missed the deadline.
    pub incomplete_moves: usize,
}

/// Play `phases` in order. Cancellation jumps straight to the final
/// (neutral) pose so lids are never left closed.
pub fn run_sequence<C: Clock + ?Sized>(
    phases: &[BlinkPhase],
    motion: &MotionController,
    clock: &C,
    token: &CancelToken,
) -> SequenceOutcome {
    let mut out = SequenceOutcome::default();
    for phase in phases {
        if token.is_cancelled() {
            out.cancelled = true;
            break;
        }
        let report = motion.move_many(&phase.angles);
        out.phases_run += 1;
        if !report.all_confirmed() {
            out.incomplete_moves += 1;
            tracing::warn!(phase = ?phase.kind, failed = report.failed.len(), pending = ?report.pending, "blink phase incomplete");
        }
        if !sleep_unless_cancelled(clock, phase.hold, token) {
            out.cancelled = true;
            break;
        }
    }
    if out.cancelled
        && let Some(last) = phases.last()
        && last.kind == PhaseKind::Neutral
    {
        let report = motion.move_many(&last.angles);
        if !report.all_confirmed() {
            out.incomplete_moves += 1;
        }
    }
    out
}

/// Counters from one blink loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlinkStats {
    pub singles: u64,
    pub doubles: u64,
    pub incomplete_moves: u64,
}

/// Blink whenever the scheduler says so until `token` is cancelled.
pub fn run_blink_loop<R: Rng, C: Clock + ?Sized>(
    scheduler: &mut BlinkScheduler<R>,
    motion: &MotionController,
    clock: &C,
    token: &CancelToken,
) -> Result<BlinkStats, GazeError> {
    for &(channel, _) in &scheduler.cfg.lids {
        motion.bounds().require(channel)?;
    }
    let epoch = clock.now();
    let mut stats = BlinkStats::default();
    tracing::info!(lids = scheduler.cfg.lids.len(), "blink loop started");

    while token.is_running() {
        let now = clock.secs_since(epoch);
        if let Some(kind) = scheduler.poll(now) {
            match kind {
                BlinkKind::Single { .. } => stats.singles += 1,
                BlinkKind::Double => stats.doubles += 1,
            }
            tracing::debug!(?kind, at_s = now, "blink");
            let phases = blink_sequence(kind, &scheduler.cfg, motion.bounds())?;
            let out = run_sequence(&phases, motion, clock, token);
            stats.incomplete_moves += out.incomplete_moves as u64;
            continue;
        }
        clock.sleep(POLL);
    }

    tracing::info!(
        singles = stats.singles,
        doubles = stats.doubles,
        "blink loop stopped"
    );
    Ok(stats)
}
