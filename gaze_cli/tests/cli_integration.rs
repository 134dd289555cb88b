use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Stock rig with the waits removed so the sim backend finishes quickly
fn write_fast_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[sensor]
sample_rate_hz = 100

[calibration]
# the simulated servos settle instantly
settle_ms = 0
channel_pause_ms = 0

[poses]
look_hold_ms = 10

[gaze]
seed = 5
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["neutral"], 0, "6 confirmed", "stdout")]
#[case(&["calibrate"], 0, "ch3", "stdout")]
#[case(&["look", "up"], 0, "look up: 126.0", "stdout")]
#[case(&["look", "right"], 0, "look right: 54.0", "stdout")]
#[case(&["blink"], 0, "blink: 4 phases", "stdout")]
#[case(&["monitor", "--seconds", "0.2"], 0, "samples", "stdout")]
#[case(&["natural", "--seconds", "0.3"], 0, "natural mode ran", "stdout")]
#[case(&["natural", "--seconds", "0.2", "--skip-calibration"], 0, "saccades", "stdout")]
#[case(&["look", "sideways"], 2, "invalid value", "stderr")]
#[case(&["--log-level", "loud", "neutral"], 1, "invalid log level", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let mut cmd = Command::cargo_bin("gaze").unwrap();

    // Always include a config to avoid relying on the default path
    cmd.arg("--config").arg(&cfg);
    cmd.env_remove("RUST_LOG");
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn sensor_timeout_bubbles_to_cli() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let mut cmd = Command::cargo_bin("gaze").unwrap();
    cmd.env("GAZE_TEST_SIM_FAIL_READS", "1");
    cmd.arg("--config").arg(&cfg).arg("self-check");
    cmd.assert().code(5).stderr(predicate::str::contains(
        "What happened: Current sensor read timed out",
    ));
}

#[rstest]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[gaze]\nvertical = 3\nhorizontal = 3\n").unwrap();

    let mut cmd = Command::cargo_bin("gaze").unwrap();
    cmd.arg("--config").arg(&path).arg("neutral");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Configuration is invalid"))
        .stderr(predicate::str::contains("must differ"));
}

#[rstest]
fn json_output_is_one_object_per_run() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let out = Command::cargo_bin("gaze")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("calibrate")
        .output()
        .unwrap();
    assert!(out.status.success());

    let stdout = String::from_utf8(out.stdout).unwrap();
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).expect("stdout is JSON");
    assert_eq!(v["command"], "calibrate");
    let channels = v["channels"].as_array().unwrap();
    assert_eq!(channels.len(), 6);
    let ch2 = channels.iter().find(|c| c["channel"] == 2).unwrap();
    assert_eq!(ch2["min"].as_f64(), Some(74.0));
    assert_eq!(ch2["max"].as_f64(), Some(126.0));
}

#[rstest]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_fast_config(&dir);

    let out = Command::cargo_bin("gaze")
        .unwrap()
        .env("GAZE_TEST_SIM_FAIL_READS", "1")
        .args(["--json", "--log-level", "off", "--config"])
        .arg(&cfg)
        .arg("self-check")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(5));
    let stderr = String::from_utf8(out.stderr).unwrap();
    let line = stderr.lines().last().unwrap();
    let v: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(v["reason"], "SensorTimeout");
}

#[rstest]
fn file_logging_writes_json_lines() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("logs").join("gaze.log");
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        format!(
            "[logging]\nfile = {:?}\nlevel = \"info\"\nrotation = \"never\"\n",
            log.to_string_lossy()
        ),
    )
    .unwrap();

    Command::cargo_bin("gaze")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("neutral")
        .assert()
        .success();

    let text = fs::read_to_string(&log).unwrap();
    let first = text.lines().next().expect("at least one log line");
    let v: serde_json::Value = serde_json::from_str(first).unwrap();
    assert!(v.get("level").is_some());
}

#[rstest]
#[case("debug", 0, "DEBUG")]
#[case("loud", 1, "invalid log level")]
fn console_level_falls_back_to_config(#[case] level: &str, #[case] code: i32, #[case] needle: &str) {
    let dir = tempdir().unwrap();
    let path = write_fast_config(&dir);
    let mut toml = fs::read_to_string(&path).unwrap();
    toml.push_str(&format!("\n[logging]\nlevel = \"{level}\"\n"));
    fs::write(&path, toml).unwrap();

    Command::cargo_bin("gaze")
        .unwrap()
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(&path)
        .arg("neutral")
        .assert()
        .code(code)
        .stderr(predicate::str::contains(needle));
}
