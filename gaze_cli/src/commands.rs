//! Backend assembly and one function per subcommand.

use crate::cli::Commands;
use eyre::Result;
use gaze_core::cancel::sleep_unless_cancelled;
use gaze_core::config::RigCfg;
use gaze_core::{CalibrationRun, CancelToken, Direction, MoveReport, Supervisor};
use gaze_traits::clock::{Clock, MonotonicClock};
use serde_json::{Value, json};
use std::fmt::Write as _;
use std::time::Duration;

/// What a command prints: a human summary and its JSON form.
#[derive(Debug)]
pub struct Output {
    pub text: String,
    pub json: Value,
}

#[cfg(not(feature = "hardware"))]
pub fn build_supervisor(_cfg: &gaze_config::Config, rig: RigCfg) -> Result<Supervisor> {
    let sim = gaze_hardware::SimulatedRig::eye_mechanism();
    // Test hook: make the first N current reads fail.
    if let Some(n) = std::env::var("GAZE_TEST_SIM_FAIL_READS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
    {
        sim.fail_next_reads(n);
    }
    tracing::info!(backend = "sim", "building rig");
    Supervisor::builder()
        .with_sensor(sim.sensor())
        .with_actuator(sim.actuator())
        .with_config(rig)
        .build()
}

#[cfg(feature = "hardware")]
pub fn build_supervisor(cfg: &gaze_config::Config, rig: RigCfg) -> Result<Supervisor> {
    use eyre::WrapErr;
    use gaze_hardware::ina231::Ina231;
    use gaze_hardware::pca9685::{Pca9685, PulseRange};

    let sensor = Ina231::open(
        cfg.sensor.i2c_bus,
        cfg.sensor.address,
        Duration::from_millis(cfg.sensor.init_settle_ms),
    )
    .wrap_err("open ina231")?;
    let actuator = Pca9685::open(
        cfg.actuator.i2c_bus,
        cfg.actuator.address,
        cfg.actuator.pwm_hz,
        PulseRange {
            min_us: cfg.actuator.min_pulse_us,
            max_us: cfg.actuator.max_pulse_us,
        },
    )
    .wrap_err("open pca9685")?;
    tracing::info!(
        backend = "i2c",
        sensor_addr = cfg.sensor.address,
        servo_addr = cfg.actuator.address,
        "building rig"
    );
    Supervisor::builder()
        .with_sensor(sensor)
        .with_actuator(actuator)
        .with_config(rig)
        .build()
}

/// Apply command-line overrides that change how the rig is built.
pub fn apply_overrides(rig: &mut RigCfg, cmd: &Commands) {
    if let Commands::Natural {
        seed,
        skip_calibration,
        ..
    } = cmd
    {
        if seed.is_some() {
            rig.gaze.seed = *seed;
        }
        if *skip_calibration {
            rig.poses.require_calibration = false;
        }
    }
}

pub fn run(sup: &mut Supervisor, cmd: &Commands) -> Result<Output> {
    match cmd {
        Commands::Calibrate => calibrate(sup),
        Commands::Neutral => Ok(neutral(&sup.neutral())),
        Commands::Blink => {
            calibrate(sup)?;
            let out = sup.blink()?;
            Ok(Output {
                text: format!(
                    "blink: {} phases{}",
                    out.phases_run,
                    if out.cancelled { " (cancelled)" } else { "" }
                ),
                json: json!({
                    "command": "blink",
                    "phases": out.phases_run,
                    "cancelled": out.cancelled,
                    "incomplete_moves": out.incomplete_moves,
                }),
            })
        }
        Commands::Look { direction } => {
            calibrate(sup)?;
            let direction = Direction::from(*direction);
            let angle = sup.look(direction)?;
            Ok(Output {
                text: format!("look {direction}: {angle:.1} deg, back to center"),
                json: json!({ "command": "look", "direction": direction.to_string(), "angle": angle }),
            })
        }
        Commands::Natural {
            seconds,
            skip_calibration,
            ..
        } => natural(sup, *seconds, *skip_calibration),
        Commands::Monitor { seconds } => monitor(sup, *seconds),
        Commands::SelfCheck => {
            let check = sup.self_check()?;
            Ok(Output {
                text: format!(
                    "self-check ok: {:.3} A idle, {} channel(s) at neutral",
                    check.amps,
                    check.neutral.confirmed.len()
                ),
                json: json!({
                    "command": "self-check",
                    "amps": check.amps,
                    "neutral_confirmed": check.neutral.all_confirmed(),
                }),
            })
        }
    }
}

fn calibrate(sup: &mut Supervisor) -> Result<Output> {
    let run = sup.calibrate_all()?;
    if let Some((ch, e)) = run.failed.first() {
        return Err(eyre::eyre!(
            "calibration failed on {} channel(s); first: {ch}: {e}",
            run.failed.len()
        ));
    }
    Ok(calibration_output(&run))
}

fn calibration_output(run: &CalibrationRun) -> Output {
    let mut text = String::from("channel    min     max  center  faults\n");
    let mut rows = Vec::with_capacity(run.reports.len());
    for r in &run.reports {
        let b = r.bounds;
        let _ = writeln!(
            text,
            "{:<7} {:>6.1} {:>7.1} {:>7.1} {:>7}{}",
            r.channel.to_string(),
            b.min,
            b.max,
            b.center,
            r.sensor_faults,
            if r.limits_found() { "" } else { "  (no stall found)" }
        );
        rows.push(json!({
            "channel": r.channel.0,
            "min": b.min,
            "max": b.max,
            "center": b.center,
            "max_trip": r.max_trip,
            "min_trip": r.min_trip,
            "sensor_faults": r.sensor_faults,
        }));
    }
    Output {
        text: text.trim_end().to_string(),
        json: json!({ "command": "calibrate", "channels": rows }),
    }
}

fn neutral(report: &MoveReport) -> Output {
    Output {
        text: format!(
            "neutral: {} confirmed, {} failed, {} pending",
            report.confirmed.len(),
            report.failed.len(),
            report.pending.len()
        ),
        json: json!({
            "command": "neutral",
            "confirmed": report.confirmed.len(),
            "failed": report.failed.len(),
            "pending": report.pending.len(),
        }),
    }
}

/// Sleep for `seconds` (or until cancelled when `None`). Returns false if
/// the wait was cut short.
fn wait(clock: &MonotonicClock, seconds: Option<f64>, running: &CancelToken) -> bool {
    match seconds {
        Some(s) => {
            let d = Duration::try_from_secs_f64(s.max(0.0)).unwrap_or(Duration::MAX);
            sleep_unless_cancelled(clock, d, running)
        }
        None => {
            while sleep_unless_cancelled(clock, Duration::from_secs(1), running) {}
            false
        }
    }
}

fn natural(sup: &mut Supervisor, seconds: Option<f64>, skip_calibration: bool) -> Result<Output> {
    if !skip_calibration {
        calibrate(sup)?;
    }
    sup.start_natural()?;
    let clock = MonotonicClock::new();
    let started = clock.now();
    let completed = wait(&clock, seconds, &sup.running());
    let report = sup.stop_natural()?;
    let ran_s = clock.secs_since(started);
    Ok(Output {
        text: format!(
            "natural mode ran {ran_s:.1}s: {} saccades, {} blinks ({} double){}",
            report.gaze.saccades,
            report.blink.singles + report.blink.doubles,
            report.blink.doubles,
            if completed { "" } else { ", stopped by Ctrl-C" }
        ),
        json: json!({
            "command": "natural",
            "seconds": ran_s,
            "ticks": report.gaze.ticks,
            "saccades": report.gaze.saccades,
            "write_errors": report.gaze.write_errors,
            "blinks_single": report.blink.singles,
            "blinks_double": report.blink.doubles,
            "interrupted": !completed,
        }),
    })
}

fn monitor(sup: &mut Supervisor, seconds: f64) -> Result<Output> {
    sup.start_monitor()?;
    let clock = MonotonicClock::new();
    wait(&clock, Some(seconds), &sup.running());
    let failures = sup.monitor().map_or(0, |m| m.read_failures());
    sup.stop_monitor();

    let samples = sup.samples().snapshot();
    let n = samples.len();
    let peak = samples.iter().map(|s| s.amps).fold(0.0f32, f32::max);
    let mean = if n == 0 {
        0.0
    } else {
        samples.iter().map(|s| s.amps).sum::<f32>() / n as f32
    };
    Ok(Output {
        text: format!("{n} samples, mean {mean:.3} A, peak {peak:.3} A, {failures} failed reads"),
        json: json!({
            "command": "monitor",
            "samples": n,
            "mean_amps": mean,
            "peak_amps": peak,
            "read_failures": failures,
        }),
    })
}
