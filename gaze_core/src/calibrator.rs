//! Current-feedback discovery of each channel's safe travel.
//!
//! A channel is swept clockwise from its resting angle until the supply
//! current crosses the channel threshold (the servo is pushing against its
//! stop), then counter-clockwise. Each tripped angle is pulled back by the
//! bounce margin. A sweep that reaches the end of travel without tripping is
//! not an error: the bound is the end of travel and the report says so.

use crate::bounds::{Bounds, BoundsTable, MAX_ANGLE, MIN_ANGLE};
use crate::cancel::{CancelToken, sleep_unless_cancelled};
use crate::config::{CalibrationCfg, RestPolicy, ReverseOrigin, SensorFaultPolicy};
use crate::error::GazeError;
use crate::hw_error::{map_actuator_error, map_hw_error};
use gaze_traits::clock::Clock;
use gaze_traits::{Actuator, AngleCommand, ChannelId, CurrentSensor};
use std::sync::Arc;

/// How one sweep direction ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SweepOutcome {
    /// Current exceeded the threshold at this commanded angle.
    Tripped(f32),
    /// Reached the end of travel without tripping.
    NoLimit,
}

impl SweepOutcome {
    pub fn trip_angle(&self) -> Option<f32> {
        match self {
            Self::Tripped(a) => Some(*a),
            Self::NoLimit => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationReport {
    pub channel: ChannelId,
    pub start_angle: f32,
    pub bounds: Bounds,
    /// `None` means no limit was detected clockwise.
    pub max_trip: Option<f32>,
    pub min_trip: Option<f32>,
    /// Current reads that failed during the sweeps.
    pub sensor_faults: u32,
}

impl CalibrationReport {
    pub fn limits_found(&self) -> bool {
        self.max_trip.is_some() && self.min_trip.is_some()
    }
}

/// Result of calibrating every channel in the configured order.
#[derive(Debug, Default)]
pub struct CalibrationRun {
    pub reports: Vec<CalibrationReport>,
    /// Channels whose calibration aborted; they keep their previous bounds.
    pub failed: Vec<(ChannelId, GazeError)>,
}

pub struct BoundsCalibrator<S> {
    sensor: S,
    actuator: Arc<dyn Actuator>,
    bounds: BoundsTable,
    cfg: CalibrationCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    cancel: CancelToken,
}

impl<S: CurrentSensor> BoundsCalibrator<S> {
    pub fn new(
        sensor: S,
        actuator: Arc<dyn Actuator>,
        bounds: BoundsTable,
        cfg: CalibrationCfg,
        clock: Arc<dyn Clock + Send + Sync>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            sensor,
            actuator,
            bounds,
            cfg,
            clock,
            cancel,
        }
    }

    pub fn config(&self) -> &CalibrationCfg {
        &self.cfg
    }

    /// Calibrate every channel in `order`, pausing between channels and
    /// centering finished pair siblings.
    ///
    /// A channel that fails (actuator error, unknown id) is logged and
    /// skipped; cancellation aborts the whole run.
    pub fn calibrate_all(&mut self) -> Result<CalibrationRun, GazeError> {
        let order = self.cfg.order.clone();
        let mut run = CalibrationRun::default();
        tracing::info!(channels = ?order, "calibration started");

        for (i, &channel) in order.iter().enumerate() {
            if i > 0
                && !sleep_unless_cancelled(&self.clock, self.cfg.channel_pause, &self.cancel)
            {
                return Err(GazeError::Cancelled);
            }
            match self.calibrate_channel(channel) {
                Ok(report) => run.reports.push(report),
                Err(GazeError::Cancelled) => {
                    tracing::warn!(%channel, "calibration cancelled");
                    return Err(GazeError::Cancelled);
                }
                Err(e) => {
                    tracing::error!(%channel, error = %e, "channel calibration failed");
                    run.failed.push((channel, e));
                }
            }
        }

        tracing::info!(
            calibrated = run.reports.len(),
            failed = run.failed.len(),
            "calibration finished"
        );
        Ok(run)
    }

    /// Sweep one channel both ways, record its bounds and park it, then
    /// center any pair sibling that already has bounds.
    pub fn calibrate_channel(&mut self, channel: ChannelId) -> Result<CalibrationReport, GazeError> {
        let previous = self.bounds.require(channel)?;
        let start_angle = match self.actuator.angle(channel) {
            Some(a) if a.is_finite() => a.clamp(MIN_ANGLE, MAX_ANGLE),
            _ => {
                tracing::warn!(%channel, center = previous.center, "start angle unknown; sweeping from center");
                previous.center
            }
        };
        let threshold = self.cfg.threshold_for(channel);
        let margin = self.cfg.margin_for(channel);
        let mut faults = 0u32;
        tracing::info!(%channel, start_angle, threshold, margin, "calibrating channel");

        let up = self.sweep_up(channel, start_angle, threshold, &mut faults)?;
        let max_bound = up.trip_angle().map_or(MAX_ANGLE, |a| a - margin);
        if up == SweepOutcome::NoLimit {
            tracing::warn!(%channel, "no clockwise limit detected; using end of travel");
        }

        let origin = match self.cfg.reverse_origin {
            ReverseOrigin::Max => max_bound.clamp(MIN_ANGLE, MAX_ANGLE),
            ReverseOrigin::Start => start_angle,
        };
        let down = self.sweep_down(channel, origin, threshold, &mut faults)?;
        let min_bound = down.trip_angle().map_or(MIN_ANGLE, |a| a + margin);
        if down == SweepOutcome::NoLimit {
            tracing::warn!(%channel, "no counter-clockwise limit detected; using end of travel");
        }

        let bounds = Bounds::from_limits(min_bound, max_bound);
        self.bounds.record(channel, bounds)?;
        tracing::info!(
            %channel,
            min = bounds.min,
            max = bounds.max,
            center = bounds.center,
            sensor_faults = faults,
            "bounds recorded"
        );

        let rest = match self.cfg.rest_for(channel) {
            RestPolicy::Max => bounds.max,
            RestPolicy::Min => bounds.min,
            RestPolicy::Center => bounds.center,
        };
        if let Err(e) = self.write(channel, rest) {
            tracing::warn!(%channel, angle = rest, error = %e, "failed to park channel");
        }
        self.center_calibrated_siblings(channel);

        Ok(CalibrationReport {
            channel,
            start_angle,
            bounds,
            max_trip: up.trip_angle(),
            min_trip: down.trip_angle(),
            sensor_faults: faults,
        })
    }

    fn sweep_up(
        &mut self,
        channel: ChannelId,
        start: f32,
        threshold: f32,
        faults: &mut u32,
    ) -> Result<SweepOutcome, GazeError> {
        let mut angle = start;
        while angle < MAX_ANGLE {
            self.check_running()?;
            angle = (angle + self.cfg.step_deg).min(MAX_ANGLE);
            self.write(channel, angle)?;
            self.clock.sleep(self.cfg.settle);
            if self.tripped(channel, angle, threshold, faults) {
                tracing::debug!(%channel, angle, "clockwise trip");
                return Ok(SweepOutcome::Tripped(angle));
            }
        }
        Ok(SweepOutcome::NoLimit)
    }

    fn sweep_down(
        &mut self,
        channel: ChannelId,
        origin: f32,
        threshold: f32,
        faults: &mut u32,
    ) -> Result<SweepOutcome, GazeError> {
        self.check_running()?;
        self.write(channel, origin)?;
        self.clock.sleep(self.cfg.settle);

        let mut angle = origin;
        let mut steps = 0u32;
        while angle > MIN_ANGLE {
            self.check_running()?;
            angle = (angle - self.cfg.step_deg).max(MIN_ANGLE);
            steps += 1;
            self.write(channel, angle)?;
            self.clock.sleep(self.cfg.settle);
            let tripped = self.tripped(channel, angle, threshold, faults);
            if steps <= self.cfg.grace_steps {
                continue;
            }
            if tripped {
                tracing::debug!(%channel, angle, steps, "counter-clockwise trip");
                return Ok(SweepOutcome::Tripped(angle));
            }
        }
        Ok(SweepOutcome::NoLimit)
    }

    /// One direct current read compared against `threshold`.
    fn tripped(&mut self, channel: ChannelId, angle: f32, threshold: f32, faults: &mut u32) -> bool {
        match self.sensor.read_current() {
            Ok(amps) => {
                tracing::trace!(%channel, angle, amps, "sweep step");
                amps > threshold
            }
            Err(e) => {
                *faults += 1;
                let err = map_hw_error(e.as_ref());
                tracing::warn!(%channel, angle, error = %err, policy = ?self.cfg.sensor_fault, "current read failed during sweep");
                self.cfg.sensor_fault == SensorFaultPolicy::FailSafe
            }
        }
    }

    /// Move every calibrated pair sibling of `channel` to its center.
    pub fn center_calibrated_siblings(&self, channel: ChannelId) {
        let siblings: Vec<ChannelId> = self.cfg.siblings(channel).collect();
        for sibling in siblings {
            if !self.bounds.is_calibrated(sibling) {
                continue;
            }
            let Some(b) = self.bounds.get(sibling) else {
                continue;
            };
            tracing::debug!(%channel, %sibling, center = b.center, "centering pair sibling");
            if let Err(e) = self.write(sibling, b.center) {
                tracing::warn!(%sibling, error = %e, "failed to center pair sibling");
            }
        }
    }

    fn write(&self, channel: ChannelId, angle: f32) -> Result<(), GazeError> {
        self.actuator
            .set_angle(channel, AngleCommand::Fixed(angle))
            .map_err(|e| map_actuator_error(channel, e.as_ref()))
    }

    fn check_running(&self) -> Result<(), GazeError> {
        if self.cancel.is_cancelled() {
            Err(GazeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{FnSensor, RecordingActuator};
    use gaze_traits::clock::test_clock::TestClock;

    type BoxError = Box<dyn std::error::Error + Send + Sync>;

    const CH: ChannelId = ChannelId(0);

    fn cfg(margin: f32) -> CalibrationCfg {
        CalibrationCfg {
            bounce_margin_deg: margin,
            overrides: Default::default(),
            order: vec![CH],
            pairs: vec![],
            ..CalibrationCfg::default()
        }
    }

    fn calibrator<F>(
        act: &RecordingActuator,
        read: F,
        cfg: CalibrationCfg,
    ) -> (BoundsCalibrator<FnSensor<F>>, BoundsTable)
    where
        F: FnMut() -> Result<f32, BoxError>,
    {
        let table = BoundsTable::new([CH, ChannelId(1)]);
        let cal = BoundsCalibrator::new(
            FnSensor::new(read),
            Arc::new(act.clone()),
            table.clone(),
            cfg,
            Arc::new(TestClock::new()),
            CancelToken::new(),
        );
        (cal, table)
    }

    #[test]
    fn trip_at_150_gives_max_147() {
        let act = RecordingActuator::new().with_position(CH, 90.0);
        let observer = act.clone();
        let (mut cal, table) = calibrator(
            &act,
            move || Ok(if observer.angle(CH) == Some(150.0) { 9.0 } else { 1.0 }),
            cfg(3.0),
        );
        let report = cal.calibrate_channel(CH).unwrap();
        assert_eq!(report.start_angle, 90.0);
        assert_eq!(report.max_trip, Some(150.0));
        assert_eq!(report.bounds.max, 147.0);
        assert_eq!(report.min_trip, None);
        assert_eq!(report.bounds.min, 0.0);
        assert_eq!(report.bounds.center, 73.5);
        assert!(table.is_calibrated(CH));
        assert_eq!(table.get(CH), Some(report.bounds));
        // Parked at center by default.
        assert_eq!(act.angles(CH).last().copied(), Some(73.5));
    }

    #[test]
    fn no_trip_reports_full_range() {
        let act = RecordingActuator::new().with_position(CH, 45.0);
        let (mut cal, _) = calibrator(&act, || Ok(0.5), cfg(5.0));
        let report = cal.calibrate_channel(CH).unwrap();
        assert_eq!(report.bounds.max, 180.0);
        assert_eq!(report.bounds.min, 0.0);
        assert!(!report.limits_found());
        // Reached both ends of travel.
        let angles = act.angles(CH);
        assert!(angles.contains(&180.0));
        assert!(angles.contains(&0.0));
    }

    #[test]
    fn grace_window_suppresses_early_trips() {
        let act = RecordingActuator::new().with_position(CH, 90.0);
        let (mut cal, _) = calibrator(&act, || Ok(20.0), cfg(0.0));
        let report = cal.calibrate_channel(CH).unwrap();
        assert_eq!(report.max_trip, Some(91.0));
        // 20 unchecked steps down from 91, trip on the 21st.
        assert_eq!(report.min_trip, Some(70.0));
        assert_eq!(report.bounds.min, 70.0);
        assert_eq!(report.bounds.max, 91.0);
    }

    #[test]
    fn read_failures_follow_the_fault_policy() {
        let act = RecordingActuator::new().with_position(CH, 90.0);
        let failing = || -> Result<f32, BoxError> { Err("i2c nack".into()) };

        let (mut open, _) = calibrator(&act, failing, cfg(5.0));
        let report = open.calibrate_channel(CH).unwrap();
        assert_eq!((report.bounds.min, report.bounds.max), (0.0, 180.0));
        // 90 steps up, 180 steps down.
        assert_eq!(report.sensor_faults, 270);

        let act = RecordingActuator::new().with_position(CH, 90.0);
        let safe_cfg = CalibrationCfg {
            sensor_fault: SensorFaultPolicy::FailSafe,
            ..cfg(5.0)
        };
        let (mut safe, _) = calibrator(&act, failing, safe_cfg);
        let report = safe.calibrate_channel(CH).unwrap();
        assert_eq!(report.max_trip, Some(91.0));
        assert_eq!(report.bounds.max, 86.0);
        assert_eq!(report.min_trip, Some(65.0));
        assert_eq!(report.bounds.min, 70.0);
    }

    #[test]
    fn reverse_sweep_from_start_returns_to_start_first() {
        let act = RecordingActuator::new().with_position(CH, 90.0);
        let observer = act.clone();
        let from_start = CalibrationCfg {
            reverse_origin: ReverseOrigin::Start,
            ..cfg(3.0)
        };
        let (mut cal, _) = calibrator(
            &act,
            move || Ok(if observer.angle(CH) == Some(100.0) { 9.0 } else { 1.0 }),
            from_start,
        );
        let report = cal.calibrate_channel(CH).unwrap();
        assert_eq!(report.bounds.max, 97.0);
        let angles = act.angles(CH);
        let trip_idx = angles.iter().position(|a| *a == 100.0).unwrap();
        assert_eq!(angles[trip_idx + 1], 90.0);
        assert_eq!(angles[trip_idx + 2], 89.0);
    }

    #[test]
    fn unknown_start_angle_uses_center() {
        let act = RecordingActuator::new();
        let (mut cal, _) = calibrator(&act, || Ok(0.0), cfg(5.0));
        let report = cal.calibrate_channel(CH).unwrap();
        assert_eq!(report.start_angle, 90.0);
        assert_eq!(act.angles(CH).first().copied(), Some(91.0));
    }

    #[test]
    fn crossed_limits_collapse_to_midpoint() {
        let act = RecordingActuator::new().with_position(CH, 90.0);
        // Trips on the first step each way; a 30 degree margin crosses them.
        let cfg = CalibrationCfg {
            grace_steps: 0,
            ..cfg(30.0)
        };
        let (mut cal, _) = calibrator(&act, || Ok(50.0), cfg);
        let report = cal.calibrate_channel(CH).unwrap();
        assert!(report.bounds.is_valid());
        assert_eq!(report.bounds.min, report.bounds.max);
    }

    #[test]
    fn cancelled_token_aborts_before_moving() {
        let act = RecordingActuator::new().with_position(CH, 90.0);
        let (mut cal, table) = calibrator(&act, || Ok(0.0), cfg(5.0));
        cal.cancel.cancel();
        assert_eq!(cal.calibrate_channel(CH), Err(GazeError::Cancelled));
        assert!(act.writes().is_empty());
        assert!(!table.is_calibrated(CH));
    }

    #[test]
    fn unknown_channel_is_rejected() {
        let act = RecordingActuator::new();
        let (mut cal, _) = calibrator(&act, || Ok(0.0), cfg(5.0));
        assert_eq!(
            cal.calibrate_channel(ChannelId(7)),
            Err(GazeError::UnknownChannel(ChannelId(7)))
        );
    }

    #[test]
    fn calibrate_all_centers_sibling_and_skips_failed_channels() {
        let act = RecordingActuator::new()
            .with_position(CH, 90.0)
            .with_position(ChannelId(1), 90.0);
        let observer = act.clone();
        let cfg = CalibrationCfg {
            order: vec![CH, ChannelId(1)],
            pairs: vec![(CH, ChannelId(1))],
            overrides: [(
                CH,
                crate::config::ChannelCal {
                    rest: RestPolicy::Max,
                    ..Default::default()
                },
            )]
            .into_iter()
            .collect(),
            ..cfg(2.0)
        };
        let (mut cal, table) = calibrator(
            &act,
            move || {
                let high = [CH, ChannelId(1)]
                    .iter()
                    .any(|c| observer.angle(*c).is_some_and(|a| !(30.0..=150.0).contains(&a)));
                Ok(if high { 12.0 } else { 1.0 })
            },
            cfg,
        );
        let run = cal.calibrate_all().unwrap();
        assert!(run.failed.is_empty());
        assert_eq!(run.reports.len(), 2);
        assert!(table.all_calibrated());
        let b0 = table.get(CH).unwrap();
        assert_eq!((b0.min, b0.max), (31.0, 149.0));
        // ch0 parked at max, then centered once ch1 finished.
        let last0 = act.angles(CH);
        assert_eq!(last0[last0.len() - 2], b0.max);
        assert_eq!(last0.last().copied(), Some(b0.center));
    }
}
