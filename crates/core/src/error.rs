use thiserror::Error;
use std::io;

/// Error type for trace merging operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed frame or header
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid RTP packet format
    #[error("Invalid RTP packet format: {0}")]
    InvalidPacket(String),

    /// Buffer too small
    #[error("Buffer too small for RTP packet: need {required} but have {available}")]
    BufferTooSmall {
        required: usize,
        available: usize,
    },

    /// Payload arrived from a port that is not mapped to a flow
    #[error("Unrouted packet from source port {0}")]
    Unrouted(u16),

    /// Invalid or missing configuration option
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error reading the trace or writing the output
    #[error("IO error: {0}")]
    IoError(String),

    /// Trace container is unreadable or malformed
    #[error("Trace error: {0}")]
    Trace(String),

    /// Write attempted after the sink was closed
    #[error("Sink is closed")]
    SinkClosed,

    /// A pipeline stage stopped unexpectedly
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl Error {
    /// Whether the error is local to one packet and the run can continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::ParseError(_) | Error::InvalidPacket(_) | Error::BufferTooSmall { .. } | Error::Unrouted(_)
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}
