//! End-to-end runs of the supervisor against the simulated eye mechanism.

use gaze_core::config::RigCfg;
use gaze_core::{Direction, GazeError, Supervisor};
use gaze_hardware::SimulatedRig;
use gaze_traits::clock::test_clock::TestClock;
use gaze_traits::{AngleCommand, ChannelId};
use std::time::Duration;

/// Hard stops of `SimulatedRig::eye_mechanism`.
const STOPS: [(u8, f32, f32); 6] = [
    (0, 60.0, 130.0),
    (1, 30.0, 150.0),
    (2, 70.0, 130.0),
    (3, 50.0, 130.0),
    (4, 40.0, 120.0),
    (5, 30.0, 140.0),
];

fn supervisor(rig: &SimulatedRig, cfg: RigCfg) -> Supervisor {
    let mut sup = Supervisor::builder()
        .with_sensor(rig.sensor())
        .with_actuator(rig.actuator())
        .with_config(cfg)
        .with_clock(TestClock::new())
        .build()
        .expect("build supervisor");
    sup.init_sensor().expect("simulated sensor init");
    sup
}

/// Stock config with zero waits so a real clock can run it quickly.
fn fast_cfg() -> RigCfg {
    let mut cfg = RigCfg::default();
    cfg.calibration.settle = Duration::ZERO;
    cfg.calibration.channel_pause = Duration::ZERO;
    cfg.poses.look_hold = Duration::from_millis(10);
    cfg.gaze.seed = Some(7);
    cfg
}

fn position(rig: &SimulatedRig, ch: u8) -> f32 {
    match rig.position(ChannelId(ch)) {
        Some(AngleCommand::Fixed(d)) => d,
        other => panic!("{ch} has no fixed position: {other:?}"),
    }
}

#[test]
fn calibration_finds_every_stop_inside_the_margin() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, RigCfg::default());

    let run = sup.calibrate_all().expect("calibration");
    assert!(run.failed.is_empty(), "{:?}", run.failed);
    assert_eq!(run.reports.len(), 6);
    assert!(sup.calibration_complete());
    assert!(sup.bounds().all_calibrated());

    for (ch, lo, hi) in STOPS {
        let b = sup.bounds().get(ChannelId(ch)).unwrap();
        assert!(b.is_valid());
        // Trips one step past each stop, pulled back by the 5 degree margin.
        assert_eq!((b.min, b.max), (lo + 4.0, hi - 4.0), "channel {ch}");
    }

    // Order is 0,1,4,5,3,2: ch0 parks at max then is centered after ch1,
    // ch4 parks at min then is centered after ch5.
    let center = |ch| sup.bounds().get(ChannelId(ch)).unwrap().center;
    assert_eq!(position(&rig, 0), center(0));
    assert_eq!(position(&rig, 4), center(4));
    assert_eq!(position(&rig, 2), center(2));
}

#[test]
fn behaviours_refuse_before_calibration() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, fast_cfg());

    for err in [
        sup.blink().unwrap_err(),
        sup.look(Direction::Up).unwrap_err(),
        sup.start_natural().unwrap_err(),
    ] {
        assert_eq!(err.downcast_ref::<GazeError>(), Some(&GazeError::NotCalibrated));
    }
    assert!(!sup.is_natural_running());
}

#[test]
fn look_uses_configured_bound_and_returns_to_center() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, fast_cfg());
    sup.calibrate_all().unwrap();

    let up = sup.look(Direction::Up).unwrap();
    assert_eq!(up, 126.0);
    let right = sup.look(Direction::Right).unwrap();
    assert_eq!(right, 54.0);
    assert_eq!(position(&rig, 2), 100.0);
    assert_eq!(position(&rig, 3), 90.0);
}

#[test]
fn look_without_calibration_when_allowed_uses_full_range() {
    let rig = SimulatedRig::eye_mechanism();
    let mut cfg = fast_cfg();
    cfg.poses.require_calibration = false;
    let mut sup = supervisor(&rig, cfg);
    assert_eq!(sup.look(Direction::Down).unwrap(), 0.0);
}

#[test]
fn blink_closes_and_reopens_lids() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, fast_cfg());
    sup.calibrate_all().unwrap();
    let out = sup.blink().unwrap();
    assert_eq!(out.phases_run, 4);
    assert!(!out.cancelled);
    assert_eq!(out.incomplete_moves, 0);
    for ch in [0u8, 1, 4, 5] {
        let b = sup.bounds().get(ChannelId(ch)).unwrap();
        assert_eq!(position(&rig, ch), b.center);
    }
}

#[test]
fn natural_mode_runs_until_stopped() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = Supervisor::builder()
        .with_sensor(rig.sensor())
        .with_actuator(rig.actuator())
        .with_config(fast_cfg())
        .build()
        .unwrap();
    sup.init_sensor().unwrap();
    sup.calibrate_all().unwrap();

    sup.start_natural().unwrap();
    assert!(sup.is_natural_running());
    assert!(sup.start_natural().is_err());
    assert!(sup.blink().is_err());
    std::thread::sleep(Duration::from_millis(300));
    let report = sup.stop_natural().unwrap();
    assert!(report.gaze.ticks >= 5, "{report:?}");
    assert_eq!(report.gaze.write_errors, 0);
    assert!(!sup.is_natural_running());

    // Every channel was returned to center.
    for (ch, b) in sup.bounds().snapshot() {
        assert_eq!(position(&rig, ch.0), b.center);
    }
}

#[test]
fn shutdown_cancels_everything_and_parks_at_center() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = Supervisor::builder()
        .with_sensor(rig.sensor())
        .with_actuator(rig.actuator())
        .with_config(fast_cfg())
        .build()
        .unwrap();
    sup.init_sensor().unwrap();
    sup.calibrate_all().unwrap();
    sup.start_monitor().unwrap();
    sup.start_natural().unwrap();

    let report = sup.shutdown();
    assert!(report.all_confirmed());
    assert!(sup.running().is_cancelled());
    assert!(sup.monitor().is_none());
    assert!(!sup.is_natural_running());

    // Calibrating after shutdown is cancelled immediately.
    let err = sup.calibrate_all().unwrap_err();
    assert_eq!(err.downcast_ref::<GazeError>(), Some(&GazeError::Cancelled));
}

#[test]
fn ctrl_c_style_cancel_aborts_calibration() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, RigCfg::default());
    sup.running().cancel();
    let err = sup.calibrate_all().unwrap_err();
    assert_eq!(err.downcast_ref::<GazeError>(), Some(&GazeError::Cancelled));
    assert!(!sup.calibration_complete());
}

#[test]
fn self_check_reads_idle_current() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, RigCfg::default());
    let check = sup.self_check().unwrap();
    assert_eq!(check.amps, 1.5);
    assert!(check.neutral.all_confirmed());
    assert_eq!(position(&rig, 3), 90.0);
}

#[test]
fn calibrating_one_channel_at_a_time_still_centers_the_pair() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = supervisor(&rig, fast_cfg());

    let first = sup.calibrate_channel(ChannelId(0)).expect("ch0");
    // Rest policy for ch0 is max; its sibling has no bounds yet.
    assert_eq!(position(&rig, 0), first.bounds.max);

    sup.calibrate_channel(ChannelId(1)).expect("ch1");
    assert_eq!(position(&rig, 0), first.bounds.center);
    assert!(!sup.calibration_complete());
}

#[test]
fn natural_mode_reports_stopped_once_its_loops_exit() {
    let rig = SimulatedRig::eye_mechanism();
    let mut sup = Supervisor::builder()
        .with_sensor(rig.sensor())
        .with_actuator(rig.actuator())
        .with_config(fast_cfg())
        .build()
        .unwrap();
    sup.init_sensor().unwrap();
    sup.calibrate_all().unwrap();
    sup.start_natural().unwrap();
    assert!(sup.is_natural_running());

    // Cancelling the rig token ends both loops without stop_natural.
    sup.running().cancel();
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while sup.is_natural_running() && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(!sup.is_natural_running());
    assert!(sup.stop_natural().is_ok());
}
