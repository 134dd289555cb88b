#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the eye rig.
//!
//! `Config` and its sections are deserialized from TOML and checked by
//! `Config::validate`. Every section has defaults, so an empty document
//! describes the stock six-servo mechanism.
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

/// Which calibrated bound a pose or lid refers to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BoundSide {
    Min,
    Max,
}

/// Where a channel parks right after its own calibration.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RestPolicy {
    #[default]
    Center,
    Min,
    Max,
}

/// Starting point of the counter-clockwise sweep.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReverseOrigin {
    /// Start from the freshly discovered max bound.
    #[default]
    Max,
    /// Return to the resting angle first, then sweep down from there.
    Start,
}

/// What a failed current read means while sweeping.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SensorFaultPolicy {
    /// Treat as a zero reading and keep stepping.
    #[default]
    FailOpen,
    /// Treat as a trip at the current angle.
    FailSafe,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Sensor {
    pub i2c_bus: u8,
    pub address: u16,
    pub sample_rate_hz: u32,
    pub buffer_capacity: usize,
    /// Wait after writing config/calibration registers.
    pub init_settle_ms: u64,
}

impl Default for Sensor {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x40,
            sample_rate_hz: 20,
            buffer_capacity: 1000,
            init_settle_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Actuator {
    pub i2c_bus: u8,
    pub address: u16,
    pub pwm_hz: f32,
    pub min_pulse_us: u16,
    pub max_pulse_us: u16,
    /// Every channel the rig owns; the bounds table has one entry per item.
    pub channels: Vec<u8>,
}

impl Default for Actuator {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x42,
            pwm_hz: 50.0,
            min_pulse_us: 500,
            max_pulse_us: 2500,
            channels: (0..6).collect(),
        }
    }
}

/// Per-channel calibration overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelOverride {
    pub id: u8,
    pub threshold: Option<f32>,
    pub bounce_margin_deg: Option<f32>,
    #[serde(default)]
    pub rest: RestPolicy,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Calibration {
    pub default_threshold: f32,
    pub step_deg: f32,
    pub settle_ms: u64,
    pub bounce_margin_deg: f32,
    /// Counter-clockwise steps that are never checked against the threshold.
    pub grace_steps: u32,
    pub reverse_origin: ReverseOrigin,
    pub sensor_fault: SensorFaultPolicy,
    pub order: Vec<u8>,
    /// Sibling channels that must not both sit at center until both are done.
    pub pairs: Vec<[u8; 2]>,
    pub channel_pause_ms: u64,
    #[serde(rename = "channel")]
    pub channels: Vec<ChannelOverride>,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            default_threshold: 7.0,
            step_deg: 1.0,
            settle_ms: 5,
            bounce_margin_deg: 5.0,
            grace_steps: 20,
            reverse_origin: ReverseOrigin::Max,
            sensor_fault: SensorFaultPolicy::FailOpen,
            order: vec![0, 1, 4, 5, 3, 2],
            pairs: vec![[0, 1], [4, 5]],
            channel_pause_ms: 1000,
            channels: vec![
                ChannelOverride {
                    id: 0,
                    threshold: None,
                    bounce_margin_deg: None,
                    rest: RestPolicy::Max,
                },
                ChannelOverride {
                    id: 2,
                    threshold: Some(8.0),
                    bounce_margin_deg: None,
                    rest: RestPolicy::Center,
                },
                ChannelOverride {
                    id: 3,
                    threshold: Some(10.0),
                    bounce_margin_deg: None,
                    rest: RestPolicy::Center,
                },
                ChannelOverride {
                    id: 4,
                    threshold: None,
                    bounce_margin_deg: None,
                    rest: RestPolicy::Min,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Motion {
    /// Bounded wait for a multi-channel move.
    pub deadline_ms: u64,
}

impl Default for Motion {
    fn default() -> Self {
        Self { deadline_ms: 100 }
    }
}

/// Relative weights of the saccade target archetypes.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ArchetypeWeights {
    pub center_drift: f32,
    pub horizontal_scan: f32,
    pub vertical_check: f32,
    pub diagonal_glance: f32,
    pub return_to_center: f32,
}

impl Default for ArchetypeWeights {
    fn default() -> Self {
        Self {
            center_drift: 0.40,
            horizontal_scan: 0.25,
            vertical_check: 0.20,
            diagonal_glance: 0.10,
            return_to_center: 0.05,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Gaze {
    pub vertical: u8,
    pub horizontal: u8,
    pub tick_ms: u64,
    pub fixation_min_s: f32,
    pub fixation_max_s: f32,
    pub long_fixation_prob: f32,
    pub saccade_base_s: f32,
    pub saccade_s_per_deg: f32,
    /// Fraction of the remaining gap closed per tick (scaled by easing).
    pub smoothing: f32,
    pub jitter_deg: f32,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
    pub weights: ArchetypeWeights,
}

impl Default for Gaze {
    fn default() -> Self {
        Self {
            vertical: 2,
            horizontal: 3,
            tick_ms: 20,
            fixation_min_s: 0.8,
            fixation_max_s: 4.0,
            long_fixation_prob: 0.05,
            saccade_base_s: 0.1,
            saccade_s_per_deg: 0.003,
            smoothing: 0.3,
            jitter_deg: 0.5,
            seed: None,
            weights: ArchetypeWeights::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Lid {
    pub channel: u8,
    /// Bound the lid reaches when fully closed.
    pub close: BoundSide,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Blink {
    pub lids: Vec<Lid>,
    pub interval_min_s: f32,
    pub interval_max_s: f32,
    pub double_prob: f32,
    pub pre_tension_deg: f32,
    pub overshoot_deg: f32,
    pub hold_min_s: f32,
    pub hold_max_s: f32,
}

impl Default for Blink {
    fn default() -> Self {
        Self {
            lids: vec![
                Lid {
                    channel: 0,
                    close: BoundSide::Max,
                },
                Lid {
                    channel: 1,
                    close: BoundSide::Min,
                },
                Lid {
                    channel: 4,
                    close: BoundSide::Min,
                },
                Lid {
                    channel: 5,
                    close: BoundSide::Max,
                },
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Poses {
    pub look_hold_ms: u64,
    /// Bound of the vertical channel that means "up".
    pub up: BoundSide,
    /// Bound of the horizontal channel that means "left".
    pub left: BoundSide,
    /// Refuse blink/look/natural until every channel is calibrated.
    pub require_calibration: bool,
}

impl Default for Poses {
    fn default() -> Self {
        Self {
            look_hold_ms: 1000,
            up: BoundSide::Max,
            left: BoundSide::Max,
            require_calibration: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sensor: Sensor,
    pub actuator: Actuator,
    pub calibration: Calibration,
    pub motion: Motion,
    pub gaze: Gaze,
    pub blink: Blink,
    pub poses: Poses,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {:?}: {}", path, e))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("parse config {:?}: {}", path, e))?;
    cfg.validate()?;
    Ok(cfg)
}

fn is_prob(p: f32) -> bool {
    (0.0..=1.0).contains(&p)
}

impl Config {
    /// Channels that belong to the rig.
    fn known(&self) -> HashSet<u8> {
        self.actuator.channels.iter().copied().collect()
    }

    /// Every float setting, by key. Comparisons alone let `inf` through.
    fn float_settings(&self) -> Vec<(String, f32)> {
        let (cal, g, b) = (&self.calibration, &self.gaze, &self.blink);
        let w = g.weights;
        let mut out: Vec<(String, f32)> = vec![
            ("actuator.pwm_hz".into(), self.actuator.pwm_hz),
            ("calibration.default_threshold".into(), cal.default_threshold),
            ("calibration.step_deg".into(), cal.step_deg),
            ("calibration.bounce_margin_deg".into(), cal.bounce_margin_deg),
            ("gaze.fixation_min_s".into(), g.fixation_min_s),
            ("gaze.fixation_max_s".into(), g.fixation_max_s),
            ("gaze.long_fixation_prob".into(), g.long_fixation_prob),
            ("gaze.saccade_base_s".into(), g.saccade_base_s),
            ("gaze.saccade_s_per_deg".into(), g.saccade_s_per_deg),
            ("gaze.smoothing".into(), g.smoothing),
            ("gaze.jitter_deg".into(), g.jitter_deg),
            ("gaze.weights.center_drift".into(), w.center_drift),
            ("gaze.weights.horizontal_scan".into(), w.horizontal_scan),
            ("gaze.weights.vertical_check".into(), w.vertical_check),
            ("gaze.weights.diagonal_glance".into(), w.diagonal_glance),
            ("gaze.weights.return_to_center".into(), w.return_to_center),
            ("blink.interval_min_s".into(), b.interval_min_s),
            ("blink.interval_max_s".into(), b.interval_max_s),
            ("blink.double_prob".into(), b.double_prob),
            ("blink.pre_tension_deg".into(), b.pre_tension_deg),
            ("blink.overshoot_deg".into(), b.overshoot_deg),
            ("blink.hold_min_s".into(), b.hold_min_s),
            ("blink.hold_max_s".into(), b.hold_max_s),
        ];
        for o in &cal.channels {
            if let Some(t) = o.threshold {
                out.push((format!("calibration.channel {}: threshold", o.id), t));
            }
            if let Some(m) = o.bounce_margin_deg {
                out.push((format!("calibration.channel {}: bounce_margin_deg", o.id), m));
            }
        }
        out
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if let Some((key, _)) = self
            .float_settings()
            .into_iter()
            .find(|(_, v)| !v.is_finite())
        {
            eyre::bail!("{key} must be a finite number");
        }

        // Sensor
        if self.sensor.sample_rate_hz == 0 {
            eyre::bail!("sensor.sample_rate_hz must be > 0");
        }
        if self.sensor.buffer_capacity == 0 {
            eyre::bail!("sensor.buffer_capacity must be >= 1");
        }
        if self.sensor.init_settle_ms < 100 {
            eyre::bail!("sensor.init_settle_ms must be >= 100");
        }

        // Actuator
        if self.actuator.min_pulse_us >= self.actuator.max_pulse_us {
            eyre::bail!("actuator.min_pulse_us must be < actuator.max_pulse_us");
        }
        if !(self.actuator.pwm_hz > 0.0 && self.actuator.pwm_hz <= 1600.0) {
            eyre::bail!("actuator.pwm_hz must be in (0, 1600]");
        }
        if self.actuator.channels.is_empty() {
            eyre::bail!("actuator.channels must not be empty");
        }
        let known = self.known();
        if known.len() != self.actuator.channels.len() {
            eyre::bail!("actuator.channels contains duplicates");
        }
        if let Some(ch) = self.actuator.channels.iter().find(|c| **c >= 16) {
            eyre::bail!("actuator.channels: channel {ch} out of range (0..16)");
        }

        // Calibration
        let cal = &self.calibration;
        if !(cal.default_threshold > 0.0) {
            eyre::bail!("calibration.default_threshold must be > 0");
        }
        if !(cal.step_deg > 0.0 && cal.step_deg <= 45.0) {
            eyre::bail!("calibration.step_deg must be in (0, 45]");
        }
        if !(cal.bounce_margin_deg >= 0.0 && cal.bounce_margin_deg < 90.0) {
            eyre::bail!("calibration.bounce_margin_deg must be in [0, 90)");
        }
        let mut seen = HashSet::new();
        for ch in &cal.order {
            if !known.contains(ch) {
                eyre::bail!("calibration.order: unknown channel {ch}");
            }
            if !seen.insert(*ch) {
                eyre::bail!("calibration.order: channel {ch} listed twice");
            }
        }
        for [a, b] in &cal.pairs {
            if a == b {
                eyre::bail!("calibration.pairs: channel {a} paired with itself");
            }
            if !known.contains(a) || !known.contains(b) {
                eyre::bail!("calibration.pairs: unknown channel in [{a}, {b}]");
            }
        }
        for o in &cal.channels {
            if !known.contains(&o.id) {
                eyre::bail!("calibration.channel: unknown channel {}", o.id);
            }
            if let Some(t) = o.threshold
                && !(t > 0.0)
            {
                eyre::bail!("calibration.channel {}: threshold must be > 0", o.id);
            }
            if let Some(m) = o.bounce_margin_deg
                && !(0.0..90.0).contains(&m)
            {
                eyre::bail!(
                    "calibration.channel {}: bounce_margin_deg must be in [0, 90)",
                    o.id
                );
            }
        }

        // Motion
        if self.motion.deadline_ms == 0 {
            eyre::bail!("motion.deadline_ms must be >= 1");
        }

        // Gaze
        let g = &self.gaze;
        if g.vertical == g.horizontal {
            eyre::bail!("gaze.vertical and gaze.horizontal must differ");
        }
        if !known.contains(&g.vertical) || !known.contains(&g.horizontal) {
            eyre::bail!("gaze channels must be listed in actuator.channels");
        }
        if g.tick_ms == 0 {
            eyre::bail!("gaze.tick_ms must be >= 1");
        }
        if !(g.fixation_min_s > 0.0 && g.fixation_min_s <= g.fixation_max_s) {
            eyre::bail!("gaze.fixation_min_s must be > 0 and <= fixation_max_s");
        }
        if !is_prob(g.long_fixation_prob) {
            eyre::bail!("gaze.long_fixation_prob must be in [0.0, 1.0]");
        }
        if g.saccade_base_s <= 0.0 || g.saccade_s_per_deg < 0.0 {
            eyre::bail!("gaze.saccade_base_s must be > 0 and saccade_s_per_deg >= 0");
        }
        if !(g.smoothing > 0.0 && g.smoothing <= 1.0) {
            eyre::bail!("gaze.smoothing must be in (0.0, 1.0]");
        }
        if g.jitter_deg < 0.0 {
            eyre::bail!("gaze.jitter_deg must be >= 0");
        }
        let w = g.weights;
        let ws = [
            w.center_drift,
            w.horizontal_scan,
            w.vertical_check,
            w.diagonal_glance,
            w.return_to_center,
        ];
        if ws.iter().any(|x| !(*x >= 0.0)) || ws.iter().sum::<f32>() <= 0.0 {
            eyre::bail!("gaze.weights must be >= 0 with a positive sum");
        }

        // Blink
        let b = &self.blink;
        let mut lid_seen = HashSet::new();
        for lid in &b.lids {
            if !known.contains(&lid.channel) {
                eyre::bail!("blink.lids: unknown channel {}", lid.channel);
            }
            if lid.channel == g.vertical || lid.channel == g.horizontal {
                eyre::bail!("blink.lids: channel {} is a gaze channel", lid.channel);
            }
            if !lid_seen.insert(lid.channel) {
                eyre::bail!("blink.lids: channel {} listed twice", lid.channel);
            }
        }
        if !(b.interval_min_s > 0.0 && b.interval_min_s <= b.interval_max_s) {
            eyre::bail!("blink.interval_min_s must be > 0 and <= interval_max_s");
        }
        if !(b.hold_min_s > 0.0 && b.hold_min_s <= b.hold_max_s) {
            eyre::bail!("blink.hold_min_s must be > 0 and <= hold_max_s");
        }
        if !is_prob(b.double_prob) {
            eyre::bail!("blink.double_prob must be in [0.0, 1.0]");
        }
        if b.pre_tension_deg < 0.0 || b.overshoot_deg < 0.0 {
            eyre::bail!("blink.pre_tension_deg and blink.overshoot_deg must be >= 0");
        }

        Ok(())
    }
}
