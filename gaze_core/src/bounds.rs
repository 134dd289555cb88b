//! Per-channel safe travel range.
//!
//! `BoundsTable` is created with full-range defaults for every configured
//! channel, written only by the calibrator, and read by every move.

use crate::error::GazeError;
use gaze_config::BoundSide;
use gaze_traits::ChannelId;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

pub const MIN_ANGLE: f32 = 0.0;
pub const MAX_ANGLE: f32 = 180.0;

/// `{min, center, max}` in degrees with `0 <= min <= center <= max <= 180`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
    pub center: f32,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: MIN_ANGLE,
            max: MAX_ANGLE,
            center: (MIN_ANGLE + MAX_ANGLE) / 2.0,
        }
    }
}

impl Bounds {
    /// Build from sweep results, forcing the invariant.
    ///
    /// Limits are clamped into `[0, 180]`; crossed limits (a margin larger
    /// than the gap between the stops) collapse to their midpoint.
    pub fn from_limits(min: f32, max: f32) -> Self {
        let fix = |v: f32, fallback: f32| {
            if v.is_finite() {
                v.clamp(MIN_ANGLE, MAX_ANGLE)
            } else {
                fallback
            }
        };
        let mut min = fix(min, MIN_ANGLE);
        let mut max = fix(max, MAX_ANGLE);
        if min > max {
            let mid = (min + max) / 2.0;
            tracing::warn!(min, max, mid, "crossed limits collapsed to midpoint");
            min = mid;
            max = mid;
        }
        Self {
            min,
            max,
            center: (min + max) / 2.0,
        }
    }

    /// Nearest allowed angle. Non-finite input goes to center.
    #[inline]
    pub fn clamp(&self, angle: f32) -> f32 {
        if angle.is_finite() {
            angle.clamp(self.min, self.max)
        } else {
            self.center
        }
    }

    pub fn side(&self, side: BoundSide) -> f32 {
        match side {
            BoundSide::Min => self.min,
            BoundSide::Max => self.max,
        }
    }

    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    pub fn is_valid(&self) -> bool {
        MIN_ANGLE <= self.min
            && self.min <= self.center
            && self.center <= self.max
            && self.max <= MAX_ANGLE
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    bounds: Bounds,
    calibrated: bool,
}

/// Shared channel -> bounds map. Clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct BoundsTable {
    inner: Arc<RwLock<BTreeMap<ChannelId, Entry>>>,
}

impl BoundsTable {
    /// One default entry per channel. No entries are added or removed later.
    pub fn new(channels: impl IntoIterator<Item = ChannelId>) -> Self {
        let map = channels
            .into_iter()
            .map(|c| (c, Entry::default()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    pub fn get(&self, channel: ChannelId) -> Option<Bounds> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .map(|e| e.bounds)
    }

    /// Like `get`, but an unconfigured channel is an error.
    pub fn require(&self, channel: ChannelId) -> Result<Bounds, GazeError> {
        self.get(channel).ok_or(GazeError::UnknownChannel(channel))
    }

    pub fn contains(&self, channel: ChannelId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&channel)
    }

    pub fn is_calibrated(&self, channel: ChannelId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&channel)
            .is_some_and(|e| e.calibrated)
    }

    pub fn all_calibrated(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .all(|e| e.calibrated)
    }

    pub fn channels(&self) -> Vec<ChannelId> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    /// Every channel with its bounds, ascending by channel.
    pub fn snapshot(&self) -> Vec<(ChannelId, Bounds)> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(c, e)| (*c, e.bounds))
            .collect()
    }

    /// Store calibrated bounds. Unknown channels are rejected.
    pub(crate) fn record(&self, channel: ChannelId, bounds: Bounds) -> Result<(), GazeError> {
        let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = map
            .get_mut(&channel)
            .ok_or(GazeError::UnknownChannel(channel))?;
        entry.bounds = bounds;
        entry.calibrated = true;
        Ok(())
    }
}
