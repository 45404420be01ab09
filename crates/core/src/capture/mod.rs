//! Captured frames and the sources that produce them

mod pcap;

pub use pcap::{PcapHeader, PcapReader, LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL};

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;

use crate::Result;

/// One raw link-layer frame as recorded in the trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    /// Captured bytes, starting at the link-layer header
    pub data: Bytes,

    /// Capture time since the Unix epoch
    pub timestamp: Duration,

    /// Length of the frame on the wire (may exceed `data.len()` when truncated by snaplen)
    pub original_len: u32,
}

impl CapturedFrame {
    pub fn new(data: Bytes, timestamp: Duration) -> Self {
        let original_len = data.len() as u32;
        Self { data, timestamp, original_len }
    }
}

/// Yields captured frames in file order
pub trait FrameSource: Send {
    /// Link type of the frames produced, as recorded in the trace header
    fn link_type(&self) -> u32;

    /// Next frame, or `None` at end of trace
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// In-memory frame source, mostly useful for tests and synthetic traces
#[derive(Debug, Default)]
pub struct MemoryFrameSource {
    link_type: u32,
    frames: VecDeque<CapturedFrame>,
}

impl MemoryFrameSource {
    pub fn new(link_type: u32, frames: impl IntoIterator<Item = CapturedFrame>) -> Self {
        Self {
            link_type,
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemoryFrameSource {
    fn link_type(&self) -> u32 {
        self.link_type
    }

    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        Ok(self.frames.pop_front())
    }
}
