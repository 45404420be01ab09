//! Run statistics

use serde::Serialize;
use std::fmt;

use crate::impairment::ImpairmentStats;
use crate::jitter::JitterBufferStats;
use crate::mixer::MixerStats;
use crate::router::FlowId;

/// Counters gathered by the ingest stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Frames received by the demuxer
    pub frames: u64,

    /// Frames that were not complete IPv4/UDP datagrams
    pub not_applicable: u64,

    /// Payloads from ports outside the flow table
    pub unrouted: u64,

    /// Routed payloads that failed RTP decoding
    pub invalid_packets: u64,

    /// Decoded packets per flow
    pub packets: [u64; 2],
}

/// Everything a merge run counted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Records read from the trace
    pub frames_read: u64,

    /// Present only when impairment was enabled
    pub impairment: Option<ImpairmentStats>,

    pub ingest: IngestStats,

    /// Jitter buffer counters per flow
    pub jitter: [JitterBufferStats; 2],

    pub mixer: MixerStats,

    pub bytes_written: u64,
}

impl MergeStats {
    pub fn packets(&self, flow: FlowId) -> u64 {
        self.ingest.packets[flow.index()]
    }

    pub fn jitter_stats(&self, flow: FlowId) -> &JitterBufferStats {
        &self.jitter[flow.index()]
    }
}

impl fmt::Display for MergeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "frames read:        {}", self.frames_read)?;
        if let Some(imp) = &self.impairment {
            writeln!(
                f,
                "impairment:         {} dropped, {} delayed, {} delivered",
                imp.dropped, imp.delayed, imp.delivered
            )?;
        }
        writeln!(f, "not IPv4/UDP:       {}", self.ingest.not_applicable)?;
        writeln!(f, "unrouted payloads:  {}", self.ingest.unrouted)?;
        writeln!(f, "invalid packets:    {}", self.ingest.invalid_packets)?;
        for flow in FlowId::ALL {
            let jitter = self.jitter_stats(flow);
            writeln!(
                f,
                "{:<5} packets:      {} (gaps {}, late {}, duplicates {})",
                flow.to_string(),
                self.packets(flow),
                jitter.gaps,
                jitter.late_packets,
                jitter.duplicates
            )?;
        }
        writeln!(
            f,
            "trailing discarded: left {} / right {} bytes",
            self.mixer.trailing_discarded[0], self.mixer.trailing_discarded[1]
        )?;
        write!(f, "bytes written:      {}", self.bytes_written)
    }
}
