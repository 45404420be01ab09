//! Core library for rtpmix
//!
//! Rebuilds the audio of a two-party call from a packet trace: frames are
//! read from a pcap file, the UDP payloads of two RTP flows are picked out by
//! source port, sequenced through a per-flow jitter buffer and interleaved
//! into one raw stereo stream (left, right).
//!
//! The library is organized into several modules:
//!
//! - `capture`: captured frames and the pcap reader
//! - `impairment`: optional loss/jitter simulation ahead of the demuxer
//! - `demux`: link/IPv4/UDP header parsing at fixed offset profiles
//! - `router`: static source port to flow mapping
//! - `packet`: RTP header decoding
//! - `jitter`: passthrough and reordering jitter buffers
//! - `mixer`: stereo interleaving and the output sink
//! - `pipeline`: the staged pipeline that ties everything together

mod error;

pub mod capture;
pub mod config;
pub mod demux;
pub mod events;
pub mod impairment;
pub mod jitter;
pub mod mixer;
pub mod packet;
pub mod pipeline;
pub mod router;
pub mod stats;

pub use error::Error;

pub use capture::{CapturedFrame, FrameSource, MemoryFrameSource, PcapReader};
pub use config::MergeConfig;
pub use demux::{FrameDemuxer, LinkProfile, OffsetProfile, TransportPayload};
pub use events::StatusEvent;
pub use impairment::{ImpairmentConfig, ImpairmentSimulator};
pub use jitter::{BufferMode, JitterBuffer, JitterBufferConfig};
pub use mixer::{ChannelQueue, StereoMixer, StereoSink};
pub use packet::{MediaPacket, RtpHeader};
pub use pipeline::{MergeOutcome, MergePipeline};
pub use router::{FlowId, FlowRouter};
pub use stats::MergeStats;

/// Typedef for RTP timestamp values
pub type RtpTimestamp = u32;

/// Typedef for RTP sequence numbers
pub type RtpSequenceNumber = u16;

/// Typedef for RTP synchronization source identifier
pub type RtpSsrc = u32;

/// Result type for rtpmix operations
pub type Result<T> = std::result::Result<T, Error>;

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        BufferMode, CapturedFrame, Error, FlowId, FrameSource, LinkProfile,
        MergeConfig, MergePipeline, MergeStats, PcapReader, Result, StatusEvent,
    };
}
