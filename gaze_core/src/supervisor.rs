//! Lifecycle owner for the rig.
//!
//! `Supervisor` wires the sensor, actuator and clock into the monitor,
//! calibrator, motion controller and behaviour loops, and owns every thread
//! it starts. Construct it through the type-state builder, which requires a
//! sensor and an actuator before `build()` is available.

use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::JoinHandle;

use gaze_traits::clock::{Clock, MonotonicClock};
use gaze_traits::{Actuator, ChannelId, CurrentSensor};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::blink::{BlinkScheduler, BlinkStats, SequenceOutcome, blink_sequence, run_blink_loop, run_sequence};
use crate::bounds::BoundsTable;
use crate::calibrator::{BoundsCalibrator, CalibrationReport, CalibrationRun};
use crate::cancel::{CancelToken, sleep_unless_cancelled};
use crate::config::{BoundSide, RigCfg};
use crate::context::RigContext;
use crate::error::{BuildError, GazeError, Result};
use crate::gaze::{GazeEngine, GazeStats, run_gaze_loop};
use crate::hw_error::map_hw_error;
use crate::monitor::{CurrentMonitor, SharedSensor};
use crate::motion::{MotionController, MoveReport};
use crate::sample_buffer::SampleBuffer;

type DynSensor = Box<dyn CurrentSensor + Send>;
type DynClock = Arc<dyn Clock + Send + Sync>;

/// Fixed pose directions for `look`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

impl std::str::FromStr for Direction {
    type Err = GazeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(GazeError::Config(format!("unknown direction '{other}'"))),
        }
    }
}

fn opposite(side: BoundSide) -> BoundSide {
    match side {
        BoundSide::Min => BoundSide::Max,
        BoundSide::Max => BoundSide::Min,
    }
}

/// Counters from a natural-mode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NaturalReport {
    pub gaze: GazeStats,
    pub blink: BlinkStats,
}

/// One-shot hardware sanity check.
#[derive(Debug, Clone)]
pub struct SelfCheck {
    pub amps: f32,
    pub neutral: MoveReport,
}

struct NaturalMode {
    token: CancelToken,
    gaze: JoinHandle<std::result::Result<GazeStats, GazeError>>,
    blink: JoinHandle<std::result::Result<BlinkStats, GazeError>>,
}

pub struct Supervisor {
    cfg: RigCfg,
    ctx: RigContext,
    sensor: SharedSensor<DynSensor>,
    sensor_ready: bool,
    actuator: Arc<dyn Actuator>,
    motion: MotionController,
    clock: DynClock,
    monitor: Option<CurrentMonitor>,
    natural: Option<NaturalMode>,
    blinks: BlinkScheduler<StdRng>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("channels", &self.cfg.channels)
            .field("sensor_ready", &self.sensor_ready)
            .field("monitor", &self.monitor.is_some())
            .field("natural", &self.natural.is_some())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    pub fn builder() -> SupervisorBuilder<Missing, Missing> {
        SupervisorBuilder::default()
    }

    pub fn config(&self) -> &RigCfg {
        &self.cfg
    }

    pub fn context(&self) -> &RigContext {
        &self.ctx
    }

    pub fn bounds(&self) -> &BoundsTable {
        &self.ctx.bounds
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.ctx.samples
    }

    pub fn motion(&self) -> &MotionController {
        &self.motion
    }

    /// Rig-wide running flag. Cancelling it stops every task.
    pub fn running(&self) -> CancelToken {
        self.ctx.running.clone()
    }

    /// Configure the current sensor. Nothing that reads current may start
    /// before this succeeds.
    pub fn init_sensor(&mut self) -> Result<()> {
        self.sensor.init().map_err(|e| {
            let err = GazeError::SensorInit(e.to_string());
            tracing::error!(error = %err, "sensor init failed");
            eyre::Report::new(err)
        })?;
        self.sensor_ready = true;
        tracing::info!("current sensor ready");
        Ok(())
    }

    pub fn sensor_ready(&self) -> bool {
        self.sensor_ready
    }

    /// Start background sampling into the shared buffer. Idempotent.
    pub fn start_monitor(&mut self) -> Result<()> {
        self.require_sensor()?;
        if self.monitor.as_ref().is_some_and(CurrentMonitor::is_running) {
            return Ok(());
        }
        let monitor = CurrentMonitor::spawn(
            self.sensor.clone(),
            self.ctx.samples.clone(),
            self.cfg.monitor.sample_rate_hz,
            self.clock.clone(),
            self.ctx.running.child(),
        );
        tracing::info!(period_ms = monitor.period().as_millis() as u64, "current monitor started");
        self.monitor = Some(monitor);
        Ok(())
    }

    pub fn stop_monitor(&mut self) {
        if let Some(m) = self.monitor.take() {
            m.stop();
            tracing::info!("current monitor stopped");
        }
    }

    pub fn monitor(&self) -> Option<&CurrentMonitor> {
        self.monitor.as_ref()
    }

    /// Calibrate every channel in the configured order.
    pub fn calibrate_all(&mut self) -> Result<CalibrationRun> {
        let mut cal = self.calibrator()?;
        Ok(cal.calibrate_all()?)
    }

    pub fn calibrate_channel(&mut self, channel: ChannelId) -> Result<CalibrationReport> {
        let mut cal = self.calibrator()?;
        Ok(cal.calibrate_channel(channel)?)
    }

    /// True when every channel in the calibration order has bounds.
    pub fn calibration_complete(&self) -> bool {
        let order = &self.cfg.calibration.order;
        !order.is_empty() && order.iter().all(|c| self.ctx.bounds.is_calibrated(*c))
    }

    /// Every channel to its center.
    pub fn neutral(&self) -> MoveReport {
        self.motion.neutral(&self.cfg.channels)
    }

    /// One on-demand single blink.
    pub fn blink(&mut self) -> Result<SequenceOutcome> {
        self.require_calibrated()?;
        self.require_idle()?;
        let kind = self.blinks.single();
        let phases = blink_sequence(kind, self.blinks.config(), &self.ctx.bounds)?;
        tracing::info!(?kind, "blink");
        Ok(run_sequence(&phases, &self.motion, &self.clock, &self.ctx.running.child()))
    }

    /// Drive the gaze pair to a fixed pose, hold it, and return to center.
    /// Returns the angle that was commanded.
    pub fn look(&mut self, direction: Direction) -> Result<f32> {
        self.require_calibrated()?;
        self.require_idle()?;
        let gaze = &self.cfg.gaze;
        let poses = &self.cfg.poses;
        let (channel, side) = match direction {
            Direction::Up => (gaze.vertical, poses.up),
            Direction::Down => (gaze.vertical, opposite(poses.up)),
            Direction::Left => (gaze.horizontal, poses.left),
            Direction::Right => (gaze.horizontal, opposite(poses.left)),
        };
        let target = self.ctx.bounds.require(channel)?.side(side);
        let sent = self.motion.move_one(channel, target)?;
        tracing::info!(%direction, %channel, angle = sent, "look");
        sleep_unless_cancelled(&self.clock, poses.look_hold, &self.ctx.running);
        let report = self.motion.neutral(&[gaze.vertical, gaze.horizontal]);
        if !report.all_confirmed() {
            tracing::warn!(?report, "return to center incomplete");
        }
        Ok(sent)
    }

    /// Start the gaze and blink loops on their own threads.
    pub fn start_natural(&mut self) -> Result<()> {
        self.require_calibrated()?;
        self.require_idle()?;
        let token = self.ctx.running.child();

        let v = self.ctx.bounds.require(self.cfg.gaze.vertical)?;
        let h = self.ctx.bounds.require(self.cfg.gaze.horizontal)?;
        let mut engine = GazeEngine::from_cfg(self.cfg.gaze.clone(), (v.center, h.center))?;
        let blink_rng = match self.cfg.gaze.seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(1)),
            None => StdRng::from_entropy(),
        };
        let mut scheduler = BlinkScheduler::new(self.cfg.blink.clone(), blink_rng, 0.0);

        let gaze = {
            let (motion, clock, token) = (self.motion.clone(), self.clock.clone(), token.clone());
            std::thread::Builder::new()
                .name("gaze".into())
                .spawn(move || run_gaze_loop(&mut engine, &motion, &clock, &token))
                .map_err(|e| GazeError::State(format!("failed to spawn gaze loop: {e}")))?
        };
        let blink = {
            let (motion, clock, token) = (self.motion.clone(), self.clock.clone(), token.clone());
            std::thread::Builder::new()
                .name("blink".into())
                .spawn(move || run_blink_loop(&mut scheduler, &motion, &clock, &token))
        };
        let blink = match blink {
            Ok(h) => h,
            Err(e) => {
                token.cancel();
                let _ = gaze.join();
                return Err(GazeError::State(format!("failed to spawn blink loop: {e}")).into());
            }
        };

        tracing::info!(seed = ?self.cfg.gaze.seed, "natural mode started");
        self.natural = Some(NaturalMode { token, gaze, blink });
        Ok(())
    }

    /// True while both natural-mode loops are still alive. A loop that
    /// exited on its own still needs `stop_natural` to collect it.
    pub fn is_natural_running(&self) -> bool {
        self.natural
            .as_ref()
            .is_some_and(|m| !m.gaze.is_finished() && !m.blink.is_finished())
    }

    /// Stop both loops, wait for them, and return to neutral.
    pub fn stop_natural(&mut self) -> Result<NaturalReport> {
        let Some(mode) = self.natural.take() else {
            return Err(GazeError::State("natural mode is not running".into()).into());
        };
        let report = join_natural(mode)?;
        let neutral = self.neutral();
        if !neutral.all_confirmed() {
            tracing::warn!(?neutral, "return to neutral incomplete");
        }
        tracing::info!(?report, "natural mode stopped");
        Ok(report)
    }

    /// Read one current sample and move everything to neutral.
    pub fn self_check(&mut self) -> Result<SelfCheck> {
        self.require_sensor()?;
        let amps = self
            .sensor
            .read_current()
            .map_err(|e| eyre::Report::new(map_hw_error(e.as_ref())))?;
        Ok(SelfCheck {
            amps,
            neutral: self.neutral(),
        })
    }

    /// Stop every task and park all channels at center. The supervisor's
    /// running flag stays cancelled afterwards.
    pub fn shutdown(&mut self) -> MoveReport {
        if let Some(mode) = self.natural.take()
            && let Err(e) = join_natural(mode)
        {
            tracing::warn!(error = %e, "natural mode did not stop cleanly");
        }
        self.ctx.running.cancel();
        self.stop_monitor();
        let report = self.neutral();
        tracing::info!(all_confirmed = report.all_confirmed(), "rig shut down");
        report
    }

    fn calibrator(&self) -> Result<BoundsCalibrator<SharedSensor<DynSensor>>> {
        self.require_sensor()?;
        self.require_idle()?;
        Ok(BoundsCalibrator::new(
            self.sensor.clone(),
            self.actuator.clone(),
            self.ctx.bounds.clone(),
            self.cfg.calibration.clone(),
            self.clock.clone(),
            self.ctx.running.child(),
        ))
    }

    fn require_sensor(&self) -> Result<()> {
        if self.sensor_ready {
            Ok(())
        } else {
            Err(GazeError::State("sensor not initialised".into()).into())
        }
    }

    fn require_calibrated(&self) -> Result<()> {
        if self.cfg.poses.require_calibration && !self.calibration_complete() {
            return Err(GazeError::NotCalibrated.into());
        }
        Ok(())
    }

    fn require_idle(&self) -> Result<()> {
        if self.natural.is_some() {
            return Err(GazeError::State("natural mode is running".into()).into());
        }
        Ok(())
    }
}

fn join_natural(mode: NaturalMode) -> Result<NaturalReport> {
    mode.token.cancel();
    let gaze = mode
        .gaze
        .join()
        .map_err(|_| GazeError::State("gaze loop panicked".into()))?;
    let blink = mode
        .blink
        .join()
        .map_err(|_| GazeError::State("blink loop panicked".into()))?;
    Ok(NaturalReport {
        gaze: gaze?,
        blink: blink?,
    })
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Some(mode) = self.natural.take() {
            mode.token.cancel();
            let _ = mode.gaze.join();
            let _ = mode.blink.join();
        }
        // CurrentMonitor joins its own thread on drop.
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Supervisor`. `build()` exists once sensor and actuator are set.
pub struct SupervisorBuilder<S, A> {
    sensor: Option<DynSensor>,
    actuator: Option<Arc<dyn Actuator>>,
    cfg: Option<RigCfg>,
    clock: Option<DynClock>,
    _s: PhantomData<S>,
    _a: PhantomData<A>,
}

impl Default for SupervisorBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            actuator: None,
            cfg: None,
            clock: None,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<S, A> SupervisorBuilder<S, A> {
    pub fn with_config(mut self, cfg: RigCfg) -> Self {
        self.cfg = Some(cfg);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: impl Clock + Send + Sync + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Validate and build regardless of the type state.
    pub fn try_build(self) -> Result<Supervisor> {
        let sensor = self
            .sensor
            .ok_or_else(|| eyre::Report::new(BuildError::MissingSensor))?;
        let actuator = self
            .actuator
            .ok_or_else(|| eyre::Report::new(BuildError::MissingActuator))?;
        let cfg = self.cfg.unwrap_or_default();
        validate(&cfg).map_err(|m| eyre::Report::new(BuildError::InvalidConfig(m)))?;
        let clock: DynClock = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));

        let ctx = RigContext::new(cfg.channels.iter().copied(), cfg.monitor.buffer_capacity);
        let motion = MotionController::new(actuator.clone(), ctx.bounds.clone(), cfg.motion.clone());
        let blink_rng = match cfg.gaze.seed {
            Some(s) => StdRng::seed_from_u64(s.wrapping_add(2)),
            None => StdRng::from_entropy(),
        };
        let blinks = BlinkScheduler::new(cfg.blink.clone(), blink_rng, 0.0);

        Ok(Supervisor {
            ctx,
            sensor: SharedSensor::new(sensor),
            sensor_ready: false,
            actuator,
            motion,
            clock,
            monitor: None,
            natural: None,
            blinks,
            cfg,
        })
    }
}

impl<A> SupervisorBuilder<Missing, A> {
    pub fn with_sensor(
        self,
        sensor: impl CurrentSensor + Send + 'static,
    ) -> SupervisorBuilder<Set, A> {
        SupervisorBuilder {
            sensor: Some(Box::new(sensor)),
            actuator: self.actuator,
            cfg: self.cfg,
            clock: self.clock,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<S> SupervisorBuilder<S, Missing> {
    pub fn with_actuator(self, actuator: impl Actuator + 'static) -> SupervisorBuilder<S, Set> {
        SupervisorBuilder {
            sensor: self.sensor,
            actuator: Some(Arc::new(actuator)),
            cfg: self.cfg,
            clock: self.clock,
            _s: PhantomData,
            _a: PhantomData,
        }
    }
}

impl SupervisorBuilder<Set, Set> {
    pub fn build(self) -> Result<Supervisor> {
        self.try_build()
    }
}

/// Cross-section checks the runtime structs need; the TOML layer checks the
/// rest.
fn validate(cfg: &RigCfg) -> std::result::Result<(), String> {
    if cfg.channels.is_empty() {
        return Err("no channels configured".into());
    }
    let known = |c: &ChannelId| cfg.channels.contains(c);
    if let Some(c) = cfg.calibration.order.iter().find(|c| !known(c)) {
        return Err(format!("calibration order names unknown channel {c}"));
    }
    if let Some(c) = [cfg.gaze.vertical, cfg.gaze.horizontal].iter().find(|c| !known(c)) {
        return Err(format!("gaze channel {c} is not configured"));
    }
    if cfg.gaze.vertical == cfg.gaze.horizontal {
        return Err("gaze vertical and horizontal channels must differ".into());
    }
    for (lid, _) in &cfg.blink.lids {
        if !known(lid) {
            return Err(format!("lid channel {lid} is not configured"));
        }
        if *lid == cfg.gaze.vertical || *lid == cfg.gaze.horizontal {
            return Err(format!("lid channel {lid} overlaps the gaze pair"));
        }
    }
    if cfg.monitor.sample_rate_hz == 0 {
        return Err("sample_rate_hz must be > 0".into());
    }
    if !(cfg.calibration.step_deg > 0.0) {
        return Err("calibration step must be > 0".into());
    }
    Ok(())
}
