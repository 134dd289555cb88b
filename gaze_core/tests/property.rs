use gaze_core::bounds::{Bounds, BoundsTable};
use gaze_core::calibrator::BoundsCalibrator;
use gaze_core::cancel::CancelToken;
use gaze_core::config::{CalibrationCfg, MotionCfg};
use gaze_core::mocks::{FnSensor, RecordingActuator};
use gaze_core::MotionController;
use gaze_hardware::SimulatedRig;
use gaze_traits::{Actuator, ChannelId};
use gaze_traits::clock::test_clock::TestClock;
use proptest::prelude::*;
use std::sync::Arc;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Whatever is requested, the driver only ever sees angles inside the bounds.
    #[test]
    fn move_one_never_leaves_bounds(
        lo in 0.0f32..180.0,
        hi in 0.0f32..180.0,
        requests in prop::collection::vec(-720.0f32..720.0, 1..40),
    ) {
        let act = RecordingActuator::new();
        let table = BoundsTable::new([ChannelId(0)]);
        let mc = MotionController::new(Arc::new(act.clone()), table.clone(), MotionCfg::default());
        let b = Bounds::from_limits(lo, hi);
        // Bounds are only written by calibration; sweep against a sensor that
        // trips outside `b`.
        let observer = act.clone();
        let cal_cfg = CalibrationCfg {
            step_deg: 0.5,
            bounce_margin_deg: 0.0,
            grace_steps: 0,
            order: vec![ChannelId(0)],
            pairs: vec![],
            overrides: Default::default(),
            ..CalibrationCfg::default()
        };
        let act0 = act.clone().with_position(ChannelId(0), b.center);
        let mut cal = BoundsCalibrator::new(
            FnSensor::new(move || {
                let a = observer.angle(ChannelId(0)).unwrap_or(90.0);
                Ok(if a > b.max || a < b.min { 50.0 } else { 0.0 })
            }),
            Arc::new(act0),
            table.clone(),
            cal_cfg,
            Arc::new(TestClock::new()),
            CancelToken::new(),
        );
        cal.calibrate_channel(ChannelId(0)).unwrap();
        let recorded = table.get(ChannelId(0)).unwrap();
        prop_assert!(recorded.is_valid());

        for r in requests {
            let sent = mc.move_one(ChannelId(0), r).unwrap();
            prop_assert!(recorded.min <= sent && sent <= recorded.max);
            prop_assert_eq!(mc.clamp(ChannelId(0), sent).unwrap(), sent);
        }
    }

    #[test]
    fn calibrated_bounds_hold_the_invariant(
        lo in 5.0f32..85.0,
        span in 25.0f32..90.0,
        start_frac in 0.1f32..0.9,
        margin in 1.0f32..10.0,
    ) {
        let hi = (lo + span).min(175.0);
        let start = (lo + (hi - lo) * start_frac).round();
        let rig = SimulatedRig::new()
            .with_stops(ChannelId(0), lo, hi)
            .with_position(ChannelId(0), start);
        let table = BoundsTable::new([ChannelId(0)]);
        let cfg = CalibrationCfg {
            bounce_margin_deg: margin,
            grace_steps: 0,
            order: vec![ChannelId(0)],
            pairs: vec![],
            overrides: Default::default(),
            ..CalibrationCfg::default()
        };
        let mut cal = BoundsCalibrator::new(
            rig.sensor(),
            Arc::new(rig.actuator()),
            table.clone(),
            cfg,
            Arc::new(TestClock::new()),
            CancelToken::new(),
        );
        let report = cal.calibrate_channel(ChannelId(0)).unwrap();
        let b = report.bounds;
        prop_assert!(b.is_valid());
        prop_assert!(b.max <= hi);
        prop_assert!(b.min >= lo);
        prop_assert!(report.limits_found());
    }
}
