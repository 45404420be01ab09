//! Stereo interleaving of the two released channels and the output sink

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::Error;
use crate::Result;

/// Released payload bytes of one channel that are still waiting for a partner
#[derive(Debug, Default)]
pub struct ChannelQueue {
    pending: BytesMut,
    bytes_in: u64,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, payload: &[u8]) {
        self.pending.extend_from_slice(payload);
        self.bytes_in += payload.len() as u64;
    }

    /// Bytes waiting to be mixed
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total bytes ever pushed
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    fn take(&mut self, n: usize) -> BytesMut {
        self.pending.split_to(n)
    }

    fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }
}

/// Mixer counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MixerStats {
    /// Stereo frames (left, right byte pairs) produced
    pub stereo_frames: u64,

    /// Unmatched bytes dropped at end of stream, per channel
    pub trailing_discarded: [u64; 2],
}

/// Interleaves equal-length prefixes of the left and right channel queues
#[derive(Debug, Default)]
pub struct StereoMixer {
    stats: MixerStats,
}

impl StereoMixer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mix as much as both channels allow.
    ///
    /// Output byte `2i` comes from `left`, `2i + 1` from `right`. The excess of
    /// the longer queue stays queued.
    pub fn mix(&mut self, left: &mut ChannelQueue, right: &mut ChannelQueue) -> Option<Bytes> {
        let n = left.len().min(right.len());
        if n == 0 {
            return None;
        }

        let left_bytes = left.take(n);
        let right_bytes = right.take(n);

        let mut out = BytesMut::with_capacity(n * 2);
        for (l, r) in left_bytes.iter().zip(right_bytes.iter()) {
            out.put_u8(*l);
            out.put_u8(*r);
        }

        self.stats.stereo_frames += n as u64;
        trace!("Mixed {} stereo frames", n);
        Some(out.freeze())
    }

    /// Final mix at end of stream. Unmatched trailing bytes are discarded.
    pub fn finish(&mut self, left: &mut ChannelQueue, right: &mut ChannelQueue) -> Option<Bytes> {
        let out = self.mix(left, right);

        let discarded = [left.clear(), right.clear()];
        if discarded.iter().any(|d| *d > 0) {
            debug!(
                "Discarding unmatched trailing bytes: left={} right={}",
                discarded[0], discarded[1]
            );
        }
        self.stats.trailing_discarded[0] += discarded[0] as u64;
        self.stats.trailing_discarded[1] += discarded[1] as u64;

        out
    }

    pub fn get_stats(&self) -> MixerStats {
        self.stats.clone()
    }
}

/// Output sink. Writes are accepted only while the sink is open.
#[derive(Debug)]
pub struct StereoSink<W> {
    writer: Option<W>,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> StereoSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Some(writer),
            bytes_written: 0,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(Error::SinkClosed)?;
        writer.write_all(data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    /// Flush and shut down the writer, handing it back.
    ///
    /// Returns `None` if the sink was already closed.
    pub async fn close(&mut self) -> Result<Option<W>> {
        match self.writer.take() {
            Some(mut writer) => {
                writer.flush().await?;
                writer.shutdown().await?;
                debug!("Sink closed after {} bytes", self.bytes_written);
                Ok(Some(writer))
            }
            None => Ok(None),
        }
    }
}
