//! Classic libpcap trace reader
//!
//! Supports microsecond and nanosecond timestamp resolution in either byte
//! order.
//!
//! [`PcapReader::open`] reads the entire file into memory up front; records
//! are then handed out one at a time, in file order, as zero-copy slices of
//! that buffer. Memory use is therefore proportional to the trace size.

use bytes::{Buf, Bytes};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::{CapturedFrame, FrameSource};
use crate::error::Error;
use crate::Result;

/// Size of the pcap global header
pub const PCAP_GLOBAL_HEADER_SIZE: usize = 24;

/// Size of each per-record header
pub const PCAP_RECORD_HEADER_SIZE: usize = 16;

/// DLT_EN10MB
pub const LINKTYPE_ETHERNET: u32 = 1;

/// DLT_LINUX_SLL (Linux "cooked" capture)
pub const LINKTYPE_LINUX_SLL: u32 = 113;

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Parsed pcap global header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcapHeader {
    /// Multi-byte fields are big-endian
    pub big_endian: bool,

    /// Record timestamps carry nanoseconds instead of microseconds
    pub nanosecond: bool,

    pub version_major: u16,
    pub version_minor: u16,
    pub snaplen: u32,
    pub link_type: u32,
}

impl PcapHeader {
    fn parse(buf: &mut Bytes) -> Result<Self> {
        if buf.remaining() < PCAP_GLOBAL_HEADER_SIZE {
            return Err(Error::Trace(format!(
                "Trace too short for pcap header: {} bytes",
                buf.remaining()
            )));
        }

        let magic = buf.get_u32_le();
        let (big_endian, nanosecond) = match magic {
            MAGIC_MICROS => (false, false),
            MAGIC_NANOS => (false, true),
            m if m.swap_bytes() == MAGIC_MICROS => (true, false),
            m if m.swap_bytes() == MAGIC_NANOS => (true, true),
            other => {
                return Err(Error::Trace(format!("Not a pcap trace (magic {:08x})", other)));
            }
        };

        let mut reader = FieldReader { buf, big_endian };
        let version_major = reader.u16();
        let version_minor = reader.u16();
        let _thiszone = reader.u32();
        let _sigfigs = reader.u32();
        let snaplen = reader.u32();
        let link_type = reader.u32();

        Ok(Self {
            big_endian,
            nanosecond,
            version_major,
            version_minor,
            snaplen,
            link_type,
        })
    }
}

/// Reads fields honoring the trace byte order
struct FieldReader<'a> {
    buf: &'a mut Bytes,
    big_endian: bool,
}

impl FieldReader<'_> {
    fn u16(&mut self) -> u16 {
        if self.big_endian { self.buf.get_u16() } else { self.buf.get_u16_le() }
    }

    fn u32(&mut self) -> u32 {
        if self.big_endian { self.buf.get_u32() } else { self.buf.get_u32_le() }
    }
}

/// Sequential reader over an in-memory pcap trace
#[derive(Debug)]
pub struct PcapReader {
    header: PcapHeader,
    remaining: Bytes,
    records_read: u64,
}

impl PcapReader {
    /// Parse the global header of a trace held in memory
    pub fn from_bytes(data: Bytes) -> Result<Self> {
        let mut remaining = data;
        let header = PcapHeader::parse(&mut remaining)?;
        debug!(
            "Opened pcap trace v{}.{} link_type={} snaplen={} nanos={}",
            header.version_major, header.version_minor, header.link_type,
            header.snaplen, header.nanosecond
        );

        Ok(Self {
            header,
            remaining,
            records_read: 0,
        })
    }

    /// Read a trace file from disk
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            Error::IoError(format!("Failed to read trace {}: {}", path.display(), e))
        })?;
        Self::from_bytes(Bytes::from(data))
    }

    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    /// Number of records returned so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    fn read_record(&mut self) -> Result<Option<CapturedFrame>> {
        if !self.remaining.has_remaining() {
            return Ok(None);
        }

        if self.remaining.remaining() < PCAP_RECORD_HEADER_SIZE {
            return Err(Error::Trace(format!(
                "Truncated record header after record {}",
                self.records_read
            )));
        }

        let mut reader = FieldReader {
            buf: &mut self.remaining,
            big_endian: self.header.big_endian,
        };
        let ts_sec = reader.u32();
        let ts_frac = reader.u32();
        let incl_len = reader.u32() as usize;
        let original_len = reader.u32();

        if self.remaining.remaining() < incl_len {
            return Err(Error::Trace(format!(
                "Truncated record {}: need {} bytes but have {}",
                self.records_read + 1,
                incl_len,
                self.remaining.remaining()
            )));
        }

        let data = self.remaining.split_to(incl_len);
        let nanos = if self.header.nanosecond { ts_frac } else { ts_frac.saturating_mul(1000) };
        let timestamp = Duration::new(ts_sec as u64, 0) + Duration::from_nanos(nanos as u64);

        self.records_read += 1;
        Ok(Some(CapturedFrame {
            data,
            timestamp,
            original_len,
        }))
    }
}

impl FrameSource for PcapReader {
    fn link_type(&self) -> u32 {
        self.header.link_type
    }

    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        self.read_record()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global_header_le(magic: u32, link_type: u32) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&magic.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&link_type.to_le_bytes());
        out
    }

    fn record_le(ts_sec: u32, ts_frac: u32, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&ts_sec.to_le_bytes());
        out.extend_from_slice(&ts_frac.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn test_reads_records_in_order() {
        let mut trace = global_header_le(MAGIC_MICROS, LINKTYPE_ETHERNET);
        trace.extend(record_le(10, 500, b"first"));
        trace.extend(record_le(11, 0, b"second"));

        let mut reader = PcapReader::from_bytes(Bytes::from(trace)).unwrap();
        assert_eq!(reader.link_type(), LINKTYPE_ETHERNET);

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.data, Bytes::from_static(b"first"));
        assert_eq!(first.timestamp, Duration::new(10, 500_000));

        let second = reader.next_frame().unwrap().unwrap();
        assert_eq!(second.data, Bytes::from_static(b"second"));

        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.records_read(), 2);
    }

    #[test]
    fn test_big_endian_nanosecond_trace() {
        let mut trace = Vec::new();
        trace.extend_from_slice(&MAGIC_NANOS.to_be_bytes());
        trace.extend_from_slice(&2u16.to_be_bytes());
        trace.extend_from_slice(&4u16.to_be_bytes());
        trace.extend_from_slice(&[0u8; 8]);
        trace.extend_from_slice(&65535u32.to_be_bytes());
        trace.extend_from_slice(&LINKTYPE_LINUX_SLL.to_be_bytes());
        trace.extend_from_slice(&3u32.to_be_bytes());
        trace.extend_from_slice(&7u32.to_be_bytes());
        trace.extend_from_slice(&2u32.to_be_bytes());
        trace.extend_from_slice(&60u32.to_be_bytes());
        trace.extend_from_slice(&[0xaa, 0xbb]);

        let mut reader = PcapReader::from_bytes(Bytes::from(trace)).unwrap();
        assert!(reader.header().big_endian);
        assert!(reader.header().nanosecond);
        assert_eq!(reader.link_type(), LINKTYPE_LINUX_SLL);

        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp, Duration::new(3, 7));
        assert_eq!(frame.original_len, 60);
        assert_eq!(frame.data.len(), 2);
    }

    #[test]
    fn test_rejects_unknown_magic() {
        let trace = global_header_le(0x0a0d_0d0a, LINKTYPE_ETHERNET);
        let err = PcapReader::from_bytes(Bytes::from(trace)).unwrap_err();
        assert!(matches!(err, Error::Trace(_)));
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut trace = global_header_le(MAGIC_MICROS, LINKTYPE_ETHERNET);
        let mut record = record_le(1, 0, b"abcdef");
        record.truncate(record.len() - 2);
        trace.extend(record);

        let mut reader = PcapReader::from_bytes(Bytes::from(trace)).unwrap();
        assert!(matches!(reader.next_frame(), Err(Error::Trace(_))));
    }
}
