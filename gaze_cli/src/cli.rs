//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use gaze_core::Direction;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Whether the user asked for JSON output (controls structured error output).
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

/// Used when `--config` is not given and this file exists.
pub const DEFAULT_CONFIG: &str = "etc/gaze_config.toml";

#[derive(Parser, Debug)]
#[command(name = "gaze", version, about = "Animatronic eye rig CLI")]
pub struct Cli {
    /// Path to config TOML; falls back to etc/gaze_config.toml, then built-in defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log as JSON lines and print results as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace|off); defaults to
    /// [logging].level, then info
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// `look` directions as accepted on the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum LookArg {
    Up,
    Down,
    Left,
    Right,
}

impl From<LookArg> for Direction {
    fn from(a: LookArg) -> Self {
        match a {
            LookArg::Up => Self::Up,
            LookArg::Down => Self::Down,
            LookArg::Left => Self::Left,
            LookArg::Right => Self::Right,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sweep every channel against the current threshold and record its bounds
    Calibrate,
    /// Move every channel to its center
    Neutral,
    /// Calibrate, then blink once
    Blink,
    /// Calibrate, then hold a fixed pose and return to center
    Look {
        #[arg(value_enum)]
        direction: LookArg,
    },
    /// Run saccades and blinks until Ctrl-C or the time limit
    Natural {
        /// Stop after this many seconds (default: run until Ctrl-C)
        #[arg(long, value_name = "SECS")]
        seconds: Option<f64>,
        /// Fixed RNG seed (overrides gaze.seed)
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,
        /// Use the full 0..180 range instead of calibrating first
        #[arg(long, action = ArgAction::SetTrue)]
        skip_calibration: bool,
    },
    /// Sample the current sensor and print a summary
    Monitor {
        /// Sampling duration
        #[arg(long, value_name = "SECS", default_value_t = 5.0)]
        seconds: f64,
    },
    /// Quick health check (sensor read + neutral pose)
    SelfCheck,
}
