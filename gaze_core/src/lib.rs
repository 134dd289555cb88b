#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Calibration and bounds-enforced motion for a current-sensed servo rig
//! (hardware-agnostic).
//!
//! All hardware interactions go through `gaze_traits::CurrentSensor` and
//! `gaze_traits::Actuator`.
//!
//! ## Architecture
//!
//! - **Sampling**: `CurrentMonitor` fills a fixed-capacity `SampleBuffer`
//! - **Calibration**: `BoundsCalibrator` sweeps each channel against a current
//!   threshold and records `Bounds` in the shared `BoundsTable`
//! - **Motion**: `MotionController` clamps every command to those bounds;
//!   `move_many` dispatches concurrently with a deadline
//! - **Behaviour**: `GazeEngine` (fixations and saccades) and
//!   `BlinkScheduler` (lid sequences) drive the motion controller
//! - **Lifecycle**: `Supervisor` owns the threads and the running flag
//!
//! Tasks share state through an explicit `RigContext`; there are no globals.

pub mod blink;
pub mod bounds;
pub mod calibrator;
pub mod cancel;
pub mod config;
pub mod context;
pub mod conversions;
pub mod error;
pub mod gaze;
pub mod hw_error;
pub mod mocks;
pub mod monitor;
pub mod motion;
pub mod sample_buffer;
pub mod supervisor;
pub mod util;

pub use blink::{BlinkKind, BlinkPhase, BlinkScheduler, PhaseKind};
pub use bounds::{Bounds, BoundsTable};
pub use calibrator::{BoundsCalibrator, CalibrationReport, CalibrationRun, SweepOutcome};
pub use cancel::CancelToken;
pub use config::RigCfg;
pub use context::RigContext;
pub use error::{BuildError, GazeError, Result};
pub use gaze::{Archetype, GazeEngine, GazeFrame, GazeState};
pub use monitor::{CurrentMonitor, SharedSensor};
pub use motion::{MotionController, MoveReport};
pub use sample_buffer::{Sample, SampleBuffer};
pub use supervisor::{Direction, NaturalReport, SelfCheck, Supervisor, SupervisorBuilder};
