//! Property tests for the reorder buffer and the frame parsers

use bytes::Bytes;
use proptest::prelude::*;
use std::time::Duration;

use rtpmix_core::demux::DemuxOutcome;
use rtpmix_core::{
    CapturedFrame, FrameDemuxer, JitterBuffer, JitterBufferConfig, MediaPacket, OffsetProfile,
    RtpHeader,
};

fn packet(seq: u16) -> MediaPacket {
    MediaPacket::new(RtpHeader::new(0, seq, 0, 7), Bytes::from(vec![seq as u8; 2]))
}

proptest! {
    #[test]
    fn reorder_releases_in_logical_order(
        base in any::<u16>(),
        offsets in Just((0u16..40).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        // Window larger than the burst: everything is released by the flush
        let mut jitter = JitterBuffer::new(JitterBufferConfig::reorder(800, 20));
        let mut released = Vec::new();

        for offset in &offsets {
            released.extend(jitter.push(packet(base.wrapping_add(*offset))));
        }
        released.extend(jitter.flush());

        // Sorting is only well defined relative to the first packet
        let first = base.wrapping_add(offsets[0]);
        let expected: Vec<u16> = {
            let mut logical: Vec<i32> = offsets
                .iter()
                .map(|o| base.wrapping_add(*o).wrapping_sub(first) as i16 as i32)
                .collect();
            logical.sort_unstable();
            logical.into_iter().map(|d| first.wrapping_add(d as u16)).collect()
        };

        let order: Vec<u16> = released.iter().map(|p| p.sequence_number()).collect();
        prop_assert_eq!(order, expected);
        prop_assert!(jitter.is_empty());
    }

    #[test]
    fn demux_never_panics(data in proptest::collection::vec(any::<u8>(), 0..128)) {
        let frame = CapturedFrame::new(Bytes::from(data), Duration::ZERO);

        for profile in [OffsetProfile::ETHERNET, OffsetProfile::VLAN, OffsetProfile::LINUX_SLL] {
            let demuxer = FrameDemuxer::new(profile);
            let outcome = demuxer.demux(&frame);
            prop_assert_eq!(&outcome, &demuxer.demux(&frame));

            if let DemuxOutcome::Payload(p) = outcome {
                prop_assert!(p.payload.len() <= frame.data.len());
            }
        }
    }

    #[test]
    fn rtp_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let bytes = Bytes::from(data);
        if let Ok(packet) = MediaPacket::decode(bytes.clone()) {
            prop_assert_eq!(packet.header.version, 2);
            prop_assert!(packet.payload.len() + 12 <= bytes.len());
        }
    }
}
