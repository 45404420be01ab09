//! Status notifications published while a merge runs
//!
//! Purely observational: nothing in the pipeline waits on subscribers, and
//! events are dropped when nobody listens.

use std::fmt;

use crate::router::FlowId;

/// Capacity of the status broadcast channel
pub const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// First payload routed to a flow
    FlowStarted { flow: FlowId, port: u16 },

    /// End of trace reached for a flow that had started
    FlowEnded { flow: FlowId, packets: u64 },

    /// A routed payload could not be decoded
    ParseError { flow: FlowId, reason: String },

    /// Every stage finished and the sink is closed
    TraceFinished { frames: u64, bytes_written: u64 },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::FlowStarted { flow, port } => {
                write!(f, "Audio stream started on {} flow from port {}", flow, port)
            }
            StatusEvent::FlowEnded { flow, packets } => {
                write!(f, "Audio stream on {} flow ended after {} packets", flow, packets)
            }
            StatusEvent::ParseError { flow, reason } => {
                write!(f, "Dropped undecodable packet on {} flow: {}", flow, reason)
            }
            StatusEvent::TraceFinished { frames, bytes_written } => {
                write!(f, "Trace parsing completed: {} frames, {} bytes written", frames, bytes_written)
            }
        }
    }
}
