use gaze_core::config::RigCfg;
use gaze_core::error::BuildError;
use gaze_core::mocks::{DeadSensor, FnSensor, RecordingActuator};
use gaze_core::{GazeError, Supervisor};
use gaze_traits::ChannelId;
use rstest::rstest;

#[rstest]
fn builder_missing_sensor_yields_typed_build_error() {
    let err = Supervisor::builder()
        .with_actuator(RecordingActuator::new())
        .try_build()
        .expect_err("should fail with MissingSensor");

    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingSensor) => {}
        other => panic!("expected MissingSensor, got: {other:?}"),
    }
}

#[rstest]
fn builder_missing_actuator_yields_typed_build_error() {
    let err = Supervisor::builder()
        .with_sensor(FnSensor::new(|| Ok(0.0)))
        .try_build()
        .expect_err("should fail with MissingActuator");

    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::MissingActuator)
    ));
}

#[rstest]
#[case::lid_on_gaze_pair(|c: &mut RigCfg| c.blink.lids.push((ChannelId(2), gaze_core::config::BoundSide::Max)), "overlaps the gaze pair")]
#[case::unknown_gaze_channel(|c: &mut RigCfg| c.gaze.horizontal = ChannelId(12), "not configured")]
#[case::same_gaze_channels(|c: &mut RigCfg| c.gaze.horizontal = c.gaze.vertical, "must differ")]
#[case::unknown_order(|c: &mut RigCfg| c.calibration.order.push(ChannelId(9)), "unknown channel")]
#[case::no_channels(|c: &mut RigCfg| c.channels.clear(), "no channels")]
#[case::zero_rate(|c: &mut RigCfg| c.monitor.sample_rate_hz = 0, "sample_rate_hz")]
fn builder_rejects_inconsistent_config(#[case] edit: fn(&mut RigCfg), #[case] needle: &str) {
    let mut cfg = RigCfg::default();
    edit(&mut cfg);
    let err = Supervisor::builder()
        .with_sensor(FnSensor::new(|| Ok(0.0)))
        .with_actuator(RecordingActuator::new())
        .with_config(cfg)
        .build()
        .expect_err("config should be rejected");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::InvalidConfig(msg)) => assert!(msg.contains(needle), "{msg}"),
        other => panic!("expected InvalidConfig, got: {other:?}"),
    }
}

#[test]
fn sensor_init_failure_is_fatal_and_typed() {
    let mut sup = Supervisor::builder()
        .with_sensor(DeadSensor)
        .with_actuator(RecordingActuator::new())
        .build()
        .unwrap();
    let err = sup.init_sensor().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GazeError>(),
        Some(GazeError::SensorInit(_))
    ));
    assert!(!sup.sensor_ready());

    // Nothing that reads current may start.
    for err in [
        sup.start_monitor().unwrap_err(),
        sup.calibrate_all().map(|_| ()).unwrap_err(),
        sup.self_check().map(|_| ()).unwrap_err(),
    ] {
        assert!(matches!(err.downcast_ref::<GazeError>(), Some(GazeError::State(_))));
    }
}

#[rstest]
fn unbounded_blink_interval_does_not_panic_the_builder() {
    let mut cfg = RigCfg::default();
    cfg.blink.interval_max_s = f32::INFINITY;
    cfg.blink.hold_max_s = f32::INFINITY;
    cfg.gaze.fixation_max_s = f32::INFINITY;
    let built = Supervisor::builder()
        .with_sensor(FnSensor::new(|| Ok(0.0)))
        .with_actuator(RecordingActuator::new())
        .with_config(cfg)
        .try_build();
    assert!(built.is_ok());
}
