//! Runtime configuration for the rig.
//!
//! These are the structs the calibrator, motion controller and behaviour
//! loops consume. They are separate from the TOML schema in `gaze_config`;
//! see `conversions` for the mapping.

use gaze_traits::ChannelId;
use std::collections::BTreeMap;
use std::time::Duration;

pub use gaze_config::{BoundSide, RestPolicy, ReverseOrigin, SensorFaultPolicy};

/// Current sampling cadence and history size.
#[derive(Debug, Clone)]
pub struct MonitorCfg {
    pub sample_rate_hz: u32,
    pub buffer_capacity: usize,
}

impl Default for MonitorCfg {
    fn default() -> Self {
        Self {
            sample_rate_hz: 20,
            buffer_capacity: crate::sample_buffer::DEFAULT_CAPACITY,
        }
    }
}

/// Per-channel overrides of the calibration defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelCal {
    pub threshold: Option<f32>,
    pub bounce_margin_deg: Option<f32>,
    pub rest: RestPolicy,
}

#[derive(Debug, Clone)]
pub struct CalibrationCfg {
    /// Current above this (sensor units) counts as a stall.
    pub default_threshold: f32,
    pub step_deg: f32,
    /// Wait after each step before reading current.
    pub settle: Duration,
    pub bounce_margin_deg: f32,
    /// Counter-clockwise steps never checked against the threshold.
    pub grace_steps: u32,
    pub reverse_origin: ReverseOrigin,
    pub sensor_fault: SensorFaultPolicy,
    pub order: Vec<ChannelId>,
    pub pairs: Vec<(ChannelId, ChannelId)>,
    pub channel_pause: Duration,
    pub overrides: BTreeMap<ChannelId, ChannelCal>,
}

impl Default for CalibrationCfg {
    fn default() -> Self {
        let overrides = [
            (0, None, RestPolicy::Max),
            (2, Some(8.0), RestPolicy::Center),
            (3, Some(10.0), RestPolicy::Center),
            (4, None, RestPolicy::Min),
        ]
        .into_iter()
        .map(|(ch, threshold, rest)| {
            (
                ChannelId(ch),
                ChannelCal {
                    threshold,
                    bounce_margin_deg: None,
                    rest,
                },
            )
        })
        .collect();
        Self {
            default_threshold: 7.0,
            step_deg: 1.0,
            settle: Duration::from_millis(5),
            bounce_margin_deg: 5.0,
            grace_steps: 20,
            reverse_origin: ReverseOrigin::Max,
            sensor_fault: SensorFaultPolicy::FailOpen,
            order: [0u8, 1, 4, 5, 3, 2].into_iter().map(ChannelId).collect(),
            pairs: vec![
                (ChannelId(0), ChannelId(1)),
                (ChannelId(4), ChannelId(5)),
            ],
            channel_pause: Duration::from_millis(1000),
            overrides,
        }
    }
}

impl CalibrationCfg {
    pub fn threshold_for(&self, channel: ChannelId) -> f32 {
        self.overrides
            .get(&channel)
            .and_then(|o| o.threshold)
            .unwrap_or(self.default_threshold)
    }

    pub fn margin_for(&self, channel: ChannelId) -> f32 {
        self.overrides
            .get(&channel)
            .and_then(|o| o.bounce_margin_deg)
            .unwrap_or(self.bounce_margin_deg)
    }

    pub fn rest_for(&self, channel: ChannelId) -> RestPolicy {
        self.overrides
            .get(&channel)
            .map(|o| o.rest)
            .unwrap_or_default()
    }

    /// Siblings of `channel` across all configured pairs.
    pub fn siblings(&self, channel: ChannelId) -> impl Iterator<Item = ChannelId> + '_ {
        self.pairs.iter().filter_map(move |&(a, b)| {
            if a == channel {
                Some(b)
            } else if b == channel {
                Some(a)
            } else {
                None
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct MotionCfg {
    /// Upper bound on how long `move_many` waits for its workers.
    pub deadline: Duration,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(100),
        }
    }
}

/// Saccade and fixation tuning. Times are seconds as `f32` because every
/// one of them is drawn or scaled at runtime.
#[derive(Debug, Clone)]
pub struct GazeCfg {
    pub vertical: ChannelId,
    pub horizontal: ChannelId,
    pub tick: Duration,
    pub fixation_min_s: f32,
    pub fixation_max_s: f32,
    pub long_fixation_prob: f32,
    pub saccade_base_s: f32,
    pub saccade_s_per_deg: f32,
    pub smoothing: f32,
    pub jitter_deg: f32,
    pub seed: Option<u64>,
    /// Archetype weights in `Archetype::ALL` order.
    pub weights: [f32; 5],
}

impl Default for GazeCfg {
    fn default() -> Self {
        Self {
            vertical: ChannelId(2),
            horizontal: ChannelId(3),
            tick: Duration::from_millis(20),
            fixation_min_s: 0.8,
            fixation_max_s: 4.0,
            long_fixation_prob: 0.05,
            saccade_base_s: 0.1,
            saccade_s_per_deg: 0.003,
            smoothing: 0.3,
            jitter_deg: 0.5,
            seed: None,
            weights: [0.40, 0.25, 0.20, 0.10, 0.05],
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlinkCfg {
    /// Lid channels and the bound each reaches when closed.
    pub lids: Vec<(ChannelId, BoundSide)>,
    pub interval_min_s: f32,
    pub interval_max_s: f32,
    pub double_prob: f32,
    pub pre_tension_deg: f32,
    pub overshoot_deg: f32,
    pub hold_min_s: f32,
    pub hold_max_s: f32,
}

impl Default for BlinkCfg {
    fn default() -> Self {
        Self {
            lids: vec![
                (ChannelId(0), BoundSide::Max),
                (ChannelId(1), BoundSide::Min),
                (ChannelId(4), BoundSide::Min),
                (ChannelId(5), BoundSide::Max),
            ],
            interval_min_s: 1.2,
            interval_max_s: 7.0,
            double_prob: 0.15,
            pre_tension_deg: 2.0,
            overshoot_deg: 3.0,
            hold_min_s: 0.12,
            hold_max_s: 0.18,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoseCfg {
    pub look_hold: Duration,
    pub up: BoundSide,
    pub left: BoundSide,
    pub require_calibration: bool,
}

impl Default for PoseCfg {
    fn default() -> Self {
        Self {
            look_hold: Duration::from_millis(1000),
            up: BoundSide::Max,
            left: BoundSide::Max,
            require_calibration: true,
        }
    }
}

/// Everything the supervisor needs, in one place.
#[derive(Debug, Clone)]
pub struct RigCfg {
    pub channels: Vec<ChannelId>,
    pub monitor: MonitorCfg,
    pub calibration: CalibrationCfg,
    pub motion: MotionCfg,
    pub gaze: GazeCfg,
    pub blink: BlinkCfg,
    pub poses: PoseCfg,
}

impl Default for RigCfg {
    fn default() -> Self {
        Self {
            channels: (0u8..6).map(ChannelId).collect(),
            monitor: MonitorCfg::default(),
            calibration: CalibrationCfg::default(),
            motion: MotionCfg::default(),
            gaze: GazeCfg::default(),
            blink: BlinkCfg::default(),
            poses: PoseCfg::default(),
        }
    }
}
