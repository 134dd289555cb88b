//! Fixed-capacity ring of current samples.
//!
//! One writer (the current monitor) appends; any number of readers take
//! snapshots. Readers may see a slightly stale view but never a torn entry.

use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

pub const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: Instant,
    /// Reading in the sensor's unit (raw register * 0.001).
    pub amps: f32,
}

#[derive(Debug, Clone)]
pub struct SampleBuffer {
    inner: Arc<RwLock<VecDeque<Sample>>>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SampleBuffer {
    /// Capacity is clamped to at least 1.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append, evicting the oldest sample when full.
    pub(crate) fn push(&self, sample: Sample) {
        let mut q = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if q.len() == self.capacity {
            q.pop_front();
        }
        q.push_back(sample);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latest(&self) -> Option<Sample> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .back()
            .copied()
    }

    /// All samples, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sample(t0: Instant, i: u64) -> Sample {
        Sample {
            at: t0 + Duration::from_millis(i * 50),
            amps: i as f32,
        }
    }

    #[test]
    fn overflow_keeps_most_recent_in_arrival_order() {
        let cap = 8;
        let buf = SampleBuffer::with_capacity(cap);
        let t0 = Instant::now();
        for i in 0..=cap as u64 {
            buf.push(sample(t0, i));
        }
        assert_eq!(buf.len(), cap);
        let amps: Vec<f32> = buf.snapshot().iter().map(|s| s.amps).collect();
        assert_eq!(amps, (1..=cap as u64).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn never_exceeds_capacity() {
        let buf = SampleBuffer::with_capacity(3);
        let t0 = Instant::now();
        for i in 0..100 {
            buf.push(sample(t0, i));
            assert!(buf.len() <= 3);
        }
        assert_eq!(buf.latest().map(|s| s.amps), Some(99.0));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let buf = SampleBuffer::with_capacity(0);
        assert_eq!(buf.capacity(), 1);
        assert!(buf.is_empty());
        buf.push(sample(Instant::now(), 1));
        buf.push(sample(Instant::now(), 2));
        assert_eq!(buf.snapshot().len(), 1);
    }

    #[test]
    fn readers_share_the_writer_view() {
        let writer = SampleBuffer::with_capacity(4);
        let reader = writer.clone();
        writer.push(sample(Instant::now(), 7));
        assert_eq!(reader.latest().map(|s| s.amps), Some(7.0));
    }
}
