//! Fixation/saccade state machine for the eyeball pair.
//!
//! The engine is pure: `tick` takes the time in seconds since the loop
//! started plus the current bounds, and returns the angles to send. All
//! randomness comes from the engine's RNG, so a fixed seed replays the same
//! targets and durations. `run_gaze_loop` drives it against a clock and a
//! `MotionController`.

use crate::bounds::Bounds;
use crate::cancel::CancelToken;
use crate::config::GazeCfg;
use crate::error::GazeError;
use crate::motion::MotionController;
use crate::util::{chance, uniform};
use gaze_traits::clock::Clock;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

/// Kind of saccade target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Archetype {
    /// Small offset around center.
    CenterDrift,
    /// Wide horizontal look, vertical near center.
    HorizontalScan,
    /// Wide vertical look, horizontal near center.
    VerticalCheck,
    /// Off-center on both axes.
    DiagonalGlance,
    ReturnToCenter,
}

impl Archetype {
    /// Order matching `GazeCfg::weights`.
    pub const ALL: [Self; 5] = [
        Self::CenterDrift,
        Self::HorizontalScan,
        Self::VerticalCheck,
        Self::DiagonalGlance,
        Self::ReturnToCenter,
    ];
}

const DRIFT_DEG: f32 = 5.0;
const SCAN_HOLD_DEG: f32 = 2.0;
const SCAN_INSET_DEG: f32 = 10.0;
const CHECK_INSET_DEG: f32 = 5.0;

/// `0.5 * (1 - cos(pi * p))` for `p` clamped to [0, 1].
#[inline]
pub fn ease_in_out(progress: f32) -> f32 {
    0.5 * (1.0 - (PI * progress.clamp(0.0, 1.0)).cos())
}

/// Positions are `(vertical, horizontal)` in degrees; times are seconds
/// since the loop epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeState {
    pub current: (f32, f32),
    pub target: (f32, f32),
    pub saccade_active: bool,
    pub saccade_start: f32,
    pub saccade_duration: f32,
    /// When the last saccade started.
    pub last_move: f32,
    /// Time from `last_move` until the next saccade may start.
    pub fixation_interval: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaccadePlan {
    pub archetype: Archetype,
    pub target: (f32, f32),
    pub duration: f32,
}

/// Output of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GazeFrame {
    pub vertical: f32,
    pub horizontal: f32,
    /// Set on the tick a saccade begins.
    pub started: Option<SaccadePlan>,
    pub saccading: bool,
}

pub struct GazeEngine<R = StdRng> {
    cfg: GazeCfg,
    rng: R,
    archetypes: WeightedIndex<f32>,
    state: GazeState,
}

impl GazeEngine<StdRng> {
    /// Seeded from `cfg.seed`, or from OS entropy when unset.
    pub fn from_cfg(cfg: GazeCfg, start: (f32, f32)) -> Result<Self, GazeError> {
        let rng = match cfg.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(cfg, rng, start)
    }
}

impl<R: Rng> GazeEngine<R> {
    /// Start fixating at `start` at time 0.
    pub fn with_rng(cfg: GazeCfg, mut rng: R, start: (f32, f32)) -> Result<Self, GazeError> {
        let archetypes = WeightedIndex::new(cfg.weights)
            .map_err(|e| GazeError::Config(format!("gaze archetype weights: {e}")))?;
        let fixation_interval = draw_fixation(&cfg, &mut rng);
        Ok(Self {
            state: GazeState {
                current: start,
                target: start,
                saccade_active: false,
                saccade_start: 0.0,
                saccade_duration: 0.0,
                last_move: 0.0,
                fixation_interval,
            },
            cfg,
            rng,
            archetypes,
        })
    }

    pub fn state(&self) -> &GazeState {
        &self.state
    }

    pub fn config(&self) -> &GazeCfg {
        &self.cfg
    }

    /// Advance to `now` and return the angles to command.
    pub fn tick(&mut self, now: f32, v: &Bounds, h: &Bounds) -> GazeFrame {
        let s = &mut self.state;
        s.current = (v.clamp(s.current.0), h.clamp(s.current.1));

        let mut started = None;
        if !self.state.saccade_active
            && now - self.state.last_move >= self.state.fixation_interval
        {
            let plan = self.plan_saccade(v, h);
            let s = &mut self.state;
            s.target = plan.target;
            s.saccade_active = true;
            s.saccade_start = now;
            s.saccade_duration = plan.duration;
            s.last_move = now;
            started = Some(plan);
        }

        if self.state.saccade_active {
            let s = &mut self.state;
            let progress = if s.saccade_duration > 0.0 {
                (now - s.saccade_start) / s.saccade_duration
            } else {
                1.0
            };
            if progress >= 1.0 {
                s.current = s.target;
                s.saccade_active = false;
                s.fixation_interval = draw_fixation(&self.cfg, &mut self.rng);
            } else {
                let k = ease_in_out(progress) * self.cfg.smoothing;
                s.current.0 += (s.target.0 - s.current.0) * k;
                s.current.1 += (s.target.1 - s.current.1) * k;
            }
            return GazeFrame {
                vertical: v.clamp(self.state.current.0),
                horizontal: h.clamp(self.state.current.1),
                started,
                saccading: self.state.saccade_active,
            };
        }

        // Fixating: micro-movements accumulate, held inside the bounds.
        let j = self.cfg.jitter_deg;
        let dv = uniform(&mut self.rng, -j, j);
        let dh = uniform(&mut self.rng, -j, j);
        let s = &mut self.state;
        s.current = (v.clamp(s.current.0 + dv), h.clamp(s.current.1 + dh));
        GazeFrame {
            vertical: s.current.0,
            horizontal: s.current.1,
            started,
            saccading: false,
        }
    }

    /// Draw the next target and its duration from the current position.
    pub fn plan_saccade(&mut self, v: &Bounds, h: &Bounds) -> SaccadePlan {
        let archetype = Archetype::ALL[self.archetypes.sample(&mut self.rng)];
        let rng = &mut self.rng;
        let target = match archetype {
            Archetype::CenterDrift => (
                around(rng, v, v.center - DRIFT_DEG, v.center + DRIFT_DEG),
                around(rng, h, h.center - DRIFT_DEG, h.center + DRIFT_DEG),
            ),
            Archetype::HorizontalScan => (
                around(rng, v, v.center - SCAN_HOLD_DEG, v.center + SCAN_HOLD_DEG),
                around(rng, h, h.min + SCAN_INSET_DEG, h.max - SCAN_INSET_DEG),
            ),
            Archetype::VerticalCheck => (
                around(rng, v, v.min + CHECK_INSET_DEG, v.max - CHECK_INSET_DEG),
                around(rng, h, h.center - DRIFT_DEG, h.center + DRIFT_DEG),
            ),
            Archetype::DiagonalGlance => (
                around(rng, v, v.min + SCAN_INSET_DEG, v.max - SCAN_INSET_DEG),
                around(rng, h, h.min + SCAN_INSET_DEG, h.max - SCAN_INSET_DEG),
            ),
            Archetype::ReturnToCenter => (v.center, h.center),
        };
        let (cv, ch) = self.state.current;
        let distance = (target.0 - cv).hypot(target.1 - ch);
        SaccadePlan {
            archetype,
            target,
            duration: self.cfg.saccade_base_s + self.cfg.saccade_s_per_deg * distance,
        }
    }
}

/// Uniform draw from `[lo, hi]` intersected with `b`; an empty range gives its
/// midpoint.
fn around<R: Rng + ?Sized>(rng: &mut R, b: &Bounds, lo: f32, hi: f32) -> f32 {
    let lo = b.clamp(lo);
    let hi = b.clamp(hi);
    if lo < hi {
        uniform(rng, lo, hi)
    } else {
        b.clamp((lo + hi) / 2.0)
    }
}

fn draw_fixation<R: Rng + ?Sized>(cfg: &GazeCfg, rng: &mut R) -> f32 {
    let base = uniform(rng, cfg.fixation_min_s, cfg.fixation_max_s);
    if chance(rng, cfg.long_fixation_prob) {
        base * 2.0
    } else {
        base
    }
}

/// Counters from one gaze loop run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GazeStats {
    pub ticks: u64,
    pub saccades: u64,
    /// Ticks skipped because a write failed.
    pub write_errors: u64,
}

/// Drive `engine` every `cfg.tick` until `token` is cancelled.
///
/// Bounds are re-read each tick. A failed write is logged and the rest of
/// the tick skipped; the state machine keeps advancing.
pub fn run_gaze_loop<R: Rng, C: Clock + ?Sized>(
    engine: &mut GazeEngine<R>,
    motion: &MotionController,
    clock: &C,
    token: &CancelToken,
) -> Result<GazeStats, GazeError> {
    let (vc, hc) = (engine.cfg.vertical, engine.cfg.horizontal);
    let table = motion.bounds();
    table.require(vc)?;
    table.require(hc)?;
    let tick = engine.cfg.tick;
    let epoch = clock.now();
    let mut stats = GazeStats::default();
    tracing::info!(vertical = %vc, horizontal = %hc, "gaze loop started");

    while token.is_running() {
        let v = table.require(vc)?;
        let h = table.require(hc)?;
        let frame = engine.tick(clock.secs_since(epoch), &v, &h);
        stats.ticks += 1;
        if let Some(plan) = frame.started {
            stats.saccades += 1;
            tracing::debug!(
                archetype = ?plan.archetype,
                target_v = plan.target.0,
                target_h = plan.target.1,
                duration_s = plan.duration,
                "saccade"
            );
        }
        let written = motion
            .move_one(vc, frame.vertical)
            .and_then(|_| motion.move_one(hc, frame.horizontal));
        if let Err(e) = written {
            stats.write_errors += 1;
            tracing::warn!(error = %e, "gaze write failed; tick skipped");
        }
        clock.sleep(tick);
    }

    tracing::info!(
        ticks = stats.ticks,
        saccades = stats.saccades,
        write_errors = stats.write_errors,
        "gaze loop stopped"
    );
    Ok(stats)
}
