//! RTP packet decoding
//!
//! Parses the RFC 3550 fixed header of a routed UDP payload and exposes the
//! media bytes that follow it. Payload bytes are never decoded or transcoded.

use bytes::{Buf, Bytes};
use bitvec::prelude::*;
use std::fmt;

use crate::error::Error;
use crate::{Result, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version (always 2 in practice)
pub const RTP_VERSION: u8 = 2;

/// Minimum header size (without CSRC or extensions)
pub const RTP_MIN_HEADER_SIZE: usize = 12;

/// RTP header according to RFC 3550
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (should be 2)
    pub version: u8,

    /// Padding flag
    pub padding: bool,

    /// Extension flag
    pub extension: bool,

    /// CSRC count (number of contributing sources)
    pub cc: u8,

    /// Marker bit
    pub marker: bool,

    /// Payload type
    pub payload_type: u8,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source identifier
    pub ssrc: RtpSsrc,
}

impl RtpHeader {
    /// Create a version 2 header with no optional fields
    pub fn new(payload_type: u8, sequence_number: RtpSequenceNumber,
               timestamp: RtpTimestamp, ssrc: RtpSsrc) -> Self {
        Self {
            version: RTP_VERSION,
            padding: false,
            extension: false,
            cc: 0,
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        }
    }

    /// Parse the fixed header, then skip the CSRC list and header extension.
    ///
    /// On success `buf` is positioned at the first payload byte.
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < RTP_MIN_HEADER_SIZE {
            return Err(Error::BufferTooSmall {
                required: RTP_MIN_HEADER_SIZE,
                available: buf.remaining(),
            });
        }

        // version (2 bits), padding, extension, CSRC count (4 bits)
        let first_byte = buf.get_u8();
        let bits = first_byte.view_bits::<Msb0>();

        let version = bits[0..2].load_be::<u8>();
        if version != RTP_VERSION {
            return Err(Error::InvalidPacket(format!("Invalid RTP version: {}", version)));
        }

        let padding = bits[2];
        let extension = bits[3];
        let cc = bits[4..8].load_be::<u8>();

        // marker (1 bit), payload type (7 bits)
        let second_byte = buf.get_u8();
        let bits = second_byte.view_bits::<Msb0>();

        let marker = bits[0];
        let payload_type = bits[1..8].load_be::<u8>();

        let sequence_number = buf.get_u16();
        let timestamp = buf.get_u32();
        let ssrc = buf.get_u32();

        let csrc_len = cc as usize * 4;
        if buf.remaining() < csrc_len {
            return Err(Error::BufferTooSmall {
                required: csrc_len,
                available: buf.remaining(),
            });
        }
        buf.advance(csrc_len);

        if extension {
            if buf.remaining() < 4 {
                return Err(Error::BufferTooSmall {
                    required: 4,
                    available: buf.remaining(),
                });
            }

            let _profile = buf.get_u16();
            let ext_length = buf.get_u16() as usize * 4; // Length in 32-bit words

            if buf.remaining() < ext_length {
                return Err(Error::BufferTooSmall {
                    required: ext_length,
                    available: buf.remaining(),
                });
            }
            buf.advance(ext_length);
        }

        Ok(Self {
            version,
            padding,
            extension,
            cc,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        })
    }
}

/// A decoded RTP packet: header plus the raw media bytes
#[derive(Clone, PartialEq, Eq)]
pub struct MediaPacket {
    /// RTP header
    pub header: RtpHeader,

    /// Media bytes, exactly as captured
    pub payload: Bytes,
}

impl MediaPacket {
    pub fn new(header: RtpHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    pub fn sequence_number(&self) -> RtpSequenceNumber {
        self.header.sequence_number
    }

    /// Decode a UDP payload as an RTP packet.
    ///
    /// The payload is sliced out of `data` without copying.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut buf = data;
        let header = RtpHeader::parse(&mut buf)?;

        let padding_bytes = if header.padding {
            let padding = *buf.as_ref().last().unwrap_or(&0) as usize;
            if padding == 0 || padding > buf.len() {
                return Err(Error::InvalidPacket(format!(
                    "Invalid padding value: {} with {} bytes remaining",
                    padding, buf.len()
                )));
            }
            padding
        } else {
            0
        };

        let payload_len = buf.len() - padding_bytes;
        let payload = buf.slice(0..payload_len);

        Ok(Self { header, payload })
    }
}

impl fmt::Debug for MediaPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaPacket")
            .field("seq", &self.header.sequence_number)
            .field("ssrc", &format_args!("{:08x}", self.header.ssrc))
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
