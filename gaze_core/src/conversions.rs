//! `From` implementations bridging `gaze_config` types to `gaze_core` types.

use crate::config::{
    BlinkCfg, CalibrationCfg, ChannelCal, GazeCfg, MonitorCfg, MotionCfg, PoseCfg, RigCfg,
};
use gaze_traits::ChannelId;
use std::time::Duration;

// ── MonitorCfg ───────────────────────────────────────────────────────────────

impl From<&gaze_config::Sensor> for MonitorCfg {
    fn from(c: &gaze_config::Sensor) -> Self {
        Self {
            sample_rate_hz: c.sample_rate_hz,
            buffer_capacity: c.buffer_capacity,
        }
    }
}

// ── CalibrationCfg ───────────────────────────────────────────────────────────

impl From<&gaze_config::ChannelOverride> for ChannelCal {
    fn from(c: &gaze_config::ChannelOverride) -> Self {
        Self {
            threshold: c.threshold,
            bounce_margin_deg: c.bounce_margin_deg,
            rest: c.rest,
        }
    }
}

impl From<&gaze_config::Calibration> for CalibrationCfg {
    fn from(c: &gaze_config::Calibration) -> Self {
        Self {
            default_threshold: c.default_threshold,
            step_deg: c.step_deg,
            settle: Duration::from_millis(c.settle_ms),
            bounce_margin_deg: c.bounce_margin_deg,
            grace_steps: c.grace_steps,
            reverse_origin: c.reverse_origin,
            sensor_fault: c.sensor_fault,
            order: c.order.iter().copied().map(ChannelId).collect(),
            pairs: c
                .pairs
                .iter()
                .map(|[a, b]| (ChannelId(*a), ChannelId(*b)))
                .collect(),
            channel_pause: Duration::from_millis(c.channel_pause_ms),
            overrides: c
                .channels
                .iter()
                .map(|o| (ChannelId(o.id), ChannelCal::from(o)))
                .collect(),
        }
    }
}

// ── MotionCfg ────────────────────────────────────────────────────────────────

impl From<&gaze_config::Motion> for MotionCfg {
    fn from(c: &gaze_config::Motion) -> Self {
        Self {
            deadline: Duration::from_millis(c.deadline_ms),
        }
    }
}

// ── GazeCfg ──────────────────────────────────────────────────────────────────

impl From<&gaze_config::Gaze> for GazeCfg {
    fn from(c: &gaze_config::Gaze) -> Self {
        let w = c.weights;
        Self {
            vertical: ChannelId(c.vertical),
            horizontal: ChannelId(c.horizontal),
            tick: Duration::from_millis(c.tick_ms),
            fixation_min_s: c.fixation_min_s,
            fixation_max_s: c.fixation_max_s,
            long_fixation_prob: c.long_fixation_prob,
            saccade_base_s: c.saccade_base_s,
            saccade_s_per_deg: c.saccade_s_per_deg,
            smoothing: c.smoothing,
            jitter_deg: c.jitter_deg,
            seed: c.seed,
            weights: [
                w.center_drift,
                w.horizontal_scan,
                w.vertical_check,
                w.diagonal_glance,
                w.return_to_center,
            ],
        }
    }
}

// ── BlinkCfg ─────────────────────────────────────────────────────────────────

impl From<&gaze_config::Blink> for BlinkCfg {
    fn from(c: &gaze_config::Blink) -> Self {
        Self {
            lids: c
                .lids
                .iter()
                .map(|l| (ChannelId(l.channel), l.close))
                .collect(),
            interval_min_s: c.interval_min_s,
            interval_max_s: c.interval_max_s,
            double_prob: c.double_prob,
            pre_tension_deg: c.pre_tension_deg,
            overshoot_deg: c.overshoot_deg,
            hold_min_s: c.hold_min_s,
            hold_max_s: c.hold_max_s,
        }
    }
}

// ── PoseCfg ──────────────────────────────────────────────────────────────────

impl From<&gaze_config::Poses> for PoseCfg {
    fn from(c: &gaze_config::Poses) -> Self {
        Self {
            look_hold: Duration::from_millis(c.look_hold_ms),
            up: c.up,
            left: c.left,
            require_calibration: c.require_calibration,
        }
    }
}

// ── RigCfg ───────────────────────────────────────────────────────────────────

impl From<&gaze_config::Config> for RigCfg {
    fn from(c: &gaze_config::Config) -> Self {
        Self {
            channels: c.actuator.channels.iter().copied().map(ChannelId).collect(),
            monitor: (&c.sensor).into(),
            calibration: (&c.calibration).into(),
            motion: (&c.motion).into(),
            gaze: (&c.gaze).into(),
            blink: (&c.blink).into(),
            poses: (&c.poses).into(),
        }
    }
}
