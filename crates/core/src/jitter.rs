//! Per-flow jitter buffer
//!
//! Two modes are supported:
//! - `Passthrough` releases every packet as soon as it arrives, in arrival
//!   order.
//! - `Reorder` holds up to `depth` packets sorted by logical sequence number.
//!   When a push takes it past the depth, the oldest packets are released
//!   until `depth` remain.
//!
//! Sequence numbers are 16 bits and wrap. Each one is extended to a logical
//! index by picking the value within ±2^15 of the highest index seen so far,
//! so 65534, 65535, 0, 1 sort in that order. Gaps are never filled: whatever
//! is available is released. A duplicate sequence number inside the window
//! replaces the retained packet (last write wins).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::packet::MediaPacket;
use crate::RtpSequenceNumber;

/// Default jitter buffer target latency in milliseconds
pub const DEFAULT_TARGET_LATENCY_MS: u32 = 60;

/// Default nominal packet interval in milliseconds (20ms audio frames)
pub const DEFAULT_PACKET_INTERVAL_MS: u32 = 20;

/// Buffering strategy for a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferMode {
    /// Release packets immediately, in arrival order
    #[default]
    Passthrough,

    /// Sort packets by sequence number within a bounded window
    Reorder,
}

/// Jitter buffer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterBufferConfig {
    pub mode: BufferMode,

    /// Target latency in milliseconds
    pub target_latency_ms: u32,

    /// Nominal interval between packets in milliseconds
    pub packet_interval_ms: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            mode: BufferMode::Passthrough,
            target_latency_ms: DEFAULT_TARGET_LATENCY_MS,
            packet_interval_ms: DEFAULT_PACKET_INTERVAL_MS,
        }
    }
}

impl JitterBufferConfig {
    pub fn reorder(target_latency_ms: u32, packet_interval_ms: u32) -> Self {
        Self {
            mode: BufferMode::Reorder,
            target_latency_ms,
            packet_interval_ms,
        }
    }

    /// Number of packets the reorder window holds before releasing
    pub fn depth(&self) -> usize {
        let interval = self.packet_interval_ms.max(1);
        (self.target_latency_ms.div_ceil(interval) as usize).max(1)
    }
}

/// Statistics for one jitter buffer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JitterBufferStats {
    /// Number of packets currently in the buffer
    pub buffered_packets: usize,

    /// Total packets received
    pub packets_received: u64,

    /// Total packets released to the mixer
    pub packets_released: u64,

    /// Packets that replaced a retained packet with the same sequence number
    pub duplicates: u64,

    /// Packets older than something already released
    pub late_packets: u64,

    /// Sequence discontinuities seen at release time
    pub gaps: u64,

    /// Largest number of packets held at once
    pub max_buffered: usize,
}

/// Jitter buffer for one flow
#[derive(Debug)]
pub struct JitterBuffer {
    config: JitterBufferConfig,

    /// Reorder window threshold in packets
    depth: usize,

    /// Packets stored by logical index
    packets: BTreeMap<i64, MediaPacket>,

    /// Highest logical index seen
    highest_index: Option<i64>,

    /// Highest logical index released
    last_released: Option<i64>,

    stats: JitterBufferStats,
}

impl JitterBuffer {
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            depth: config.depth(),
            config,
            packets: BTreeMap::new(),
            highest_index: None,
            last_released: None,
            stats: JitterBufferStats::default(),
        }
    }

    pub fn mode(&self) -> BufferMode {
        self.config.mode
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Add a packet and return whatever became ready for the mixer
    pub fn push(&mut self, packet: MediaPacket) -> Vec<MediaPacket> {
        self.stats.packets_received += 1;
        let index = self.logical_index(packet.sequence_number());

        if self.last_released.is_some_and(|last| index <= last) {
            self.stats.late_packets += 1;
            debug!(
                "Late packet seq={} (index {} <= last released {:?})",
                packet.sequence_number(), index, self.last_released
            );
        }

        match self.config.mode {
            BufferMode::Passthrough => {
                self.note_release(index);
                self.stats.packets_released += 1;
                vec![packet]
            }
            BufferMode::Reorder => {
                if self.packets.insert(index, packet).is_some() {
                    self.stats.duplicates += 1;
                    trace!("Duplicate packet at index {}, keeping the newest", index);
                }
                self.stats.max_buffered = self.stats.max_buffered.max(self.packets.len());
                self.stats.buffered_packets = self.packets.len();

                let excess = self.packets.len().saturating_sub(self.depth);
                self.release_oldest(excess)
            }
        }
    }

    /// Release everything still held, oldest first
    pub fn flush(&mut self) -> Vec<MediaPacket> {
        if !self.packets.is_empty() {
            debug!("Flushing {} buffered packets", self.packets.len());
        }
        self.release_oldest(self.packets.len())
    }

    /// Get the current buffer statistics
    pub fn get_stats(&self) -> JitterBufferStats {
        self.stats.clone()
    }

    /// Extend a 16-bit sequence number to a logical index that accounts for wraparound
    pub fn logical_index(&mut self, seq: RtpSequenceNumber) -> i64 {
        let index = match self.highest_index {
            None => seq as i64,
            Some(highest) => {
                let delta = seq.wrapping_sub(highest as u16) as i16;
                highest + delta as i64
            }
        };

        if self.highest_index.is_none_or(|highest| index > highest) {
            if self.highest_index.is_some_and(|highest| (index >> 16) != (highest >> 16)) {
                debug!("Detected sequence wraparound at seq={} (index {})", seq, index);
            }
            self.highest_index = Some(index);
        }

        index
    }

    fn release_oldest(&mut self, count: usize) -> Vec<MediaPacket> {
        let mut released = Vec::with_capacity(count);

        while released.len() < count {
            let Some((index, packet)) = self.packets.pop_first() else {
                break;
            };
            self.note_release(index);
            released.push(packet);
        }

        if !released.is_empty() {
            self.stats.packets_released += released.len() as u64;
            trace!("Released {} packets, {} held", released.len(), self.packets.len());
        }
        self.stats.buffered_packets = self.packets.len();
        released
    }

    fn note_release(&mut self, index: i64) {
        match self.last_released {
            Some(last) if index > last + 1 => {
                self.stats.gaps += 1;
                debug!("Sequence gap: {} packet(s) missing before index {}", index - last - 1, index);
                self.last_released = Some(index);
            }
            Some(last) if index <= last => {}
            _ => self.last_released = Some(index),
        }
    }
}
