#![no_main]
use gaze_core::Supervisor;
use gaze_core::config::RigCfg;
use gaze_core::mocks::{FnSensor, RecordingActuator};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    let Ok(cfg) = gaze_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    // A config that validates must map onto the runtime types and through the
    // builder's own checks without panicking.
    let rig = RigCfg::from(&cfg);
    let _ = Supervisor::builder()
        .with_sensor(FnSensor::new(|| Ok(0.0)))
        .with_actuator(RecordingActuator::new())
        .with_config(rig)
        .try_build();
});
