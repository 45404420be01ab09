//! Synthetic trace builders shared by the integration tests

#![allow(dead_code)]

use bytes::Bytes;
use std::time::Duration;

use rtpmix_core::CapturedFrame;

pub const LEFT_PORT: u16 = 8000;
pub const RIGHT_PORT: u16 = 40376;
pub const PAYLOAD_LEN: usize = 160;

/// Set up a simple test logger
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Byte a leg fills its payload with, so the output can be traced back
pub fn fill_byte(port: u16, seq: u16) -> u8 {
    if port == RIGHT_PORT { 0x80 | (seq as u8 & 0x7f) } else { seq as u8 & 0x7f }
}

pub fn rtp_packet(seq: u16, payload: &[u8]) -> Vec<u8> {
    let mut rtp = vec![0x80, 0x08];
    rtp.extend_from_slice(&seq.to_be_bytes());
    rtp.extend_from_slice(&(seq as u32 * 160).to_be_bytes());
    rtp.extend_from_slice(&0x0bad_cafeu32.to_be_bytes());
    rtp.extend_from_slice(payload);
    rtp
}

/// IPv4 + UDP datagram with the given payload
pub fn ipv4_udp(protocol: u8, src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let total_len = (20 + 8 + payload.len()) as u16;
    let mut out = vec![0x45, 0xb8];
    out.extend_from_slice(&total_len.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0x40, 0, 64, protocol, 0, 0]);
    out.extend_from_slice(&[192, 168, 1, 10, 192, 168, 1, 20]);
    out.extend_from_slice(&src_port.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&((payload.len() + 8) as u16).to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(payload);
    out
}

pub fn ethernet(ethertype: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02];
    out.extend_from_slice(&ethertype.to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub fn vlan_ethernet(vlan: u16, body: &[u8]) -> Vec<u8> {
    let mut out = vec![0x02, 0, 0, 0, 0, 0x01, 0x02, 0, 0, 0, 0, 0x02];
    out.extend_from_slice(&0x8100u16.to_be_bytes());
    out.extend_from_slice(&vlan.to_be_bytes());
    out.extend_from_slice(&0x0800u16.to_be_bytes());
    out.extend_from_slice(body);
    out
}

/// Ethernet frame carrying one RTP packet whose payload is `len` copies of `fill_byte`
pub fn rtp_frame(src_port: u16, seq: u16, len: usize) -> CapturedFrame {
    let payload = vec![fill_byte(src_port, seq); len];
    let udp = ipv4_udp(17, src_port, 5004, &rtp_packet(seq, &payload));
    frame(ethernet(0x0800, &udp), seq)
}

pub fn frame(data: Vec<u8>, n: u16) -> CapturedFrame {
    CapturedFrame::new(Bytes::from(data), Duration::from_millis(1_700_000_000_000 + n as u64 * 20))
}

/// Both legs with sequence numbers `seqs`, arriving L0, R0, L1, R1, ...
pub fn interleaved_call(seqs: impl IntoIterator<Item = u16>) -> Vec<CapturedFrame> {
    seqs.into_iter()
        .flat_map(|seq| [rtp_frame(LEFT_PORT, seq, PAYLOAD_LEN), rtp_frame(RIGHT_PORT, seq, PAYLOAD_LEN)])
        .collect()
}

/// Expected output for matched packets in the given order
pub fn expected_stereo(left: &[u16], right: &[u16], len: usize) -> Vec<u8> {
    let left_bytes = left.iter().flat_map(|seq| vec![fill_byte(LEFT_PORT, *seq); len]);
    let right_bytes = right.iter().flat_map(|seq| vec![fill_byte(RIGHT_PORT, *seq); len]);
    left_bytes.zip(right_bytes).flat_map(|(l, r)| [l, r]).collect()
}

/// Serialize frames as a little-endian microsecond pcap trace
pub fn pcap_bytes(link_type: u32, frames: &[CapturedFrame]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&link_type.to_le_bytes());

    for frame in frames {
        out.extend_from_slice(&(frame.timestamp.as_secs() as u32).to_le_bytes());
        out.extend_from_slice(&frame.timestamp.subsec_micros().to_le_bytes());
        out.extend_from_slice(&(frame.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&frame.original_len.to_le_bytes());
        out.extend_from_slice(&frame.data);
    }
    out
}

/// Unique path in the system temp directory
pub fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("rtpmix-{}-{}", uuid::Uuid::new_v4(), name))
}
