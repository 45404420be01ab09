//! Link/network/transport header demultiplexing
//!
//! Frames are inspected at fixed offsets taken from an [`OffsetProfile`].
//! Anything that is not a complete IPv4/UDP datagram is reported as
//! [`DemuxOutcome::NotApplicable`] and skipped by the pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::capture::{CapturedFrame, LINKTYPE_ETHERNET, LINKTYPE_LINUX_SLL};
use crate::error::Error;
use crate::Result;

/// EtherType for IPv4
pub const ETHERTYPE_IPV4: u16 = 0x0800;

/// IP protocol number for UDP
pub const IP_PROTOCOL_UDP: u8 = 17;

/// Size of the UDP header
pub const UDP_HEADER_SIZE: usize = 8;

/// Byte offsets of the fields the demuxer inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetProfile {
    pub ethertype_offset: usize,
    pub ip_header_start: usize,
    pub protocol_offset: usize,
    pub udp_header_start: usize,
}

impl OffsetProfile {
    /// Plain Ethernet II with a 20-byte IPv4 header
    pub const ETHERNET: Self = Self {
        ethertype_offset: 12,
        ip_header_start: 14,
        protocol_offset: 23,
        udp_header_start: 34,
    };

    /// Ethernet with one 802.1Q VLAN tag
    pub const VLAN: Self = Self {
        ethertype_offset: 16,
        ip_header_start: 18,
        protocol_offset: 27,
        udp_header_start: 38,
    };

    /// Linux cooked capture (SLL)
    pub const LINUX_SLL: Self = Self {
        ethertype_offset: 14,
        ip_header_start: 16,
        protocol_offset: 25,
        udp_header_start: 36,
    };
}

/// Named offset profiles selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkProfile {
    /// Pick from the trace link type
    #[default]
    Auto,
    Ethernet,
    Vlan,
    LinuxSll,
}

impl LinkProfile {
    /// Resolve to concrete offsets for a trace with the given link type
    pub fn resolve(self, link_type: u32) -> Result<OffsetProfile> {
        match self {
            LinkProfile::Ethernet => Ok(OffsetProfile::ETHERNET),
            LinkProfile::Vlan => Ok(OffsetProfile::VLAN),
            LinkProfile::LinuxSll => Ok(OffsetProfile::LINUX_SLL),
            LinkProfile::Auto => match link_type {
                LINKTYPE_ETHERNET => Ok(OffsetProfile::ETHERNET),
                LINKTYPE_LINUX_SLL => Ok(OffsetProfile::LINUX_SLL),
                other => Err(Error::Config(format!(
                    "Cannot pick a link profile for link type {}; set one explicitly",
                    other
                ))),
            },
        }
    }
}

impl fmt::Display for LinkProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LinkProfile::Auto => "auto",
            LinkProfile::Ethernet => "ethernet",
            LinkProfile::Vlan => "vlan",
            LinkProfile::LinuxSll => "linux-sll",
        };
        f.write_str(name)
    }
}

/// UDP payload extracted from a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPayload {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Bytes,
}

/// Why a frame was not demultiplexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Truncated,
    NotIpv4,
    NotUdp,
    BadUdpLength,
}

/// Result of demultiplexing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxOutcome {
    Payload(TransportPayload),
    NotApplicable(SkipReason),
}

/// Extracts UDP payloads at a fixed offset profile
#[derive(Debug, Clone, Copy)]
pub struct FrameDemuxer {
    profile: OffsetProfile,
}

impl FrameDemuxer {
    pub fn new(profile: OffsetProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> OffsetProfile {
        self.profile
    }

    /// Demultiplex one frame. Pure: the same frame always yields the same outcome.
    pub fn demux(&self, frame: &CapturedFrame) -> DemuxOutcome {
        let data = &frame.data;
        let p = &self.profile;

        let udp_start = p.udp_header_start;
        if data.len() < udp_start + UDP_HEADER_SIZE
            || data.len() < p.ethertype_offset + 2
            || data.len() <= p.protocol_offset
            || data.len() <= p.ip_header_start
        {
            return DemuxOutcome::NotApplicable(SkipReason::Truncated);
        }

        let ethertype = read_u16(data, p.ethertype_offset);
        if ethertype != ETHERTYPE_IPV4 || data[p.ip_header_start] >> 4 != 4 {
            return DemuxOutcome::NotApplicable(SkipReason::NotIpv4);
        }

        if data[p.protocol_offset] != IP_PROTOCOL_UDP {
            return DemuxOutcome::NotApplicable(SkipReason::NotUdp);
        }

        let source_port = read_u16(data, udp_start);
        let destination_port = read_u16(data, udp_start + 2);
        let udp_length = read_u16(data, udp_start + 4) as usize;

        if udp_length < UDP_HEADER_SIZE {
            return DemuxOutcome::NotApplicable(SkipReason::BadUdpLength);
        }

        let payload_start = udp_start + UDP_HEADER_SIZE;
        let payload_end = payload_start + (udp_length - UDP_HEADER_SIZE);
        if payload_end > data.len() {
            return DemuxOutcome::NotApplicable(SkipReason::Truncated);
        }

        DemuxOutcome::Payload(TransportPayload {
            source_port,
            destination_port,
            payload: data.slice(payload_start..payload_end),
        })
    }
}

fn read_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}
