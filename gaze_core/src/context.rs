//! Shared state handed to every task instead of process-wide globals.

use crate::bounds::BoundsTable;
use crate::cancel::CancelToken;
use crate::sample_buffer::SampleBuffer;
use gaze_traits::ChannelId;

#[derive(Debug, Clone)]
pub struct RigContext {
    pub samples: SampleBuffer,
    pub bounds: BoundsTable,
    /// Rig-wide running flag; every task token is a child of this one.
    pub running: CancelToken,
}

impl RigContext {
    pub fn new(channels: impl IntoIterator<Item = ChannelId>, sample_capacity: usize) -> Self {
        Self {
            samples: SampleBuffer::with_capacity(sample_capacity),
            bounds: BoundsTable::new(channels),
            running: CancelToken::new(),
        }
    }
}
