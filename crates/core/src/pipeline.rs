//! The merge pipeline
//!
//! Stages run as tokio tasks connected by bounded mpsc channels:
//!
//! ```text
//! source (driver loop) -> [impairment] -> ingest -> mixer -> sink
//! ```
//!
//! The ingest stage owns the demuxer, the router and one jitter buffer per
//! flow. The mixer stage owns the per-channel queues and the sink, so each
//! jitter buffer has a single producer and the sink a single writer. When the
//! source is exhausted every channel closes in turn; each stage flushes what
//! it holds before exiting, and the sink is closed last.

use std::fmt;
use tokio::io::{AsyncWrite, BufWriter};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tracing::{debug, debug_span, error, info, trace, warn, Instrument};

use crate::capture::{CapturedFrame, FrameSource, PcapReader};
use crate::config::MergeConfig;
use crate::demux::{DemuxOutcome, FrameDemuxer};
use crate::error::Error;
use crate::events::{StatusEvent, STATUS_CHANNEL_CAPACITY};
use crate::impairment::ImpairmentSimulator;
use crate::jitter::{JitterBuffer, JitterBufferConfig, JitterBufferStats};
use crate::mixer::{ChannelQueue, MixerStats, StereoMixer, StereoSink};
use crate::packet::MediaPacket;
use crate::router::{FlowId, FlowRouter};
use crate::stats::{IngestStats, MergeStats};
use crate::Result;

/// A packet released by a jitter buffer, on its way to the mixer
#[derive(Debug, Clone)]
pub struct Released {
    pub flow: FlowId,
    pub packet: MediaPacket,
}

/// Demux, route, decode and buffer
pub struct IngestStage {
    demuxer: FrameDemuxer,
    router: FlowRouter,
    buffers: [JitterBuffer; 2],
    events: broadcast::Sender<StatusEvent>,
    stats: IngestStats,
}

impl IngestStage {
    pub fn new(
        demuxer: FrameDemuxer,
        router: FlowRouter,
        jitter: JitterBufferConfig,
        events: broadcast::Sender<StatusEvent>,
    ) -> Self {
        Self {
            demuxer,
            router,
            buffers: [JitterBuffer::new(jitter), JitterBuffer::new(jitter)],
            events,
            stats: IngestStats::default(),
        }
    }

    /// Process one frame. Per-packet problems are counted and skipped.
    pub fn handle_frame(&mut self, frame: &CapturedFrame) -> Vec<Released> {
        self.stats.frames += 1;

        let payload = match self.demuxer.demux(frame) {
            DemuxOutcome::Payload(payload) => payload,
            DemuxOutcome::NotApplicable(reason) => {
                self.stats.not_applicable += 1;
                trace!("Skipping frame at {:?}: {:?}", frame.timestamp, reason);
                return Vec::new();
            }
        };

        let routed = match self.router.route(payload) {
            Ok(routed) => routed,
            Err(e) => {
                self.stats.unrouted += 1;
                trace!("{}", e);
                return Vec::new();
            }
        };

        let flow = routed.flow;
        if routed.first {
            self.publish(StatusEvent::FlowStarted { flow, port: self.router.port(flow) });
        }

        let packet = match MediaPacket::decode(routed.payload) {
            Ok(packet) => packet,
            Err(e) => {
                self.stats.invalid_packets += 1;
                debug!("Dropping non-RTP payload on {} flow: {}", flow, e);
                self.publish(StatusEvent::ParseError { flow, reason: e.to_string() });
                return Vec::new();
            }
        };

        self.stats.packets[flow.index()] += 1;
        self.buffers[flow.index()]
            .push(packet)
            .into_iter()
            .map(|packet| Released { flow, packet })
            .collect()
    }

    /// End of trace: flush both jitter buffers
    pub fn finish(&mut self) -> Vec<Released> {
        let mut released = Vec::new();

        for flow in FlowId::ALL {
            released.extend(
                self.buffers[flow.index()]
                    .flush()
                    .into_iter()
                    .map(|packet| Released { flow, packet }),
            );

            if self.router.has_started(flow) {
                let packets = self.stats.packets[flow.index()];
                debug!("Audio stream on {} flow ended after {} packets", flow, packets);
                self.publish(StatusEvent::FlowEnded { flow, packets });
            }
        }

        released
    }

    pub fn stats(&self) -> IngestStats {
        self.stats.clone()
    }

    pub fn jitter_stats(&self) -> [JitterBufferStats; 2] {
        [self.buffers[0].get_stats(), self.buffers[1].get_stats()]
    }

    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<CapturedFrame>,
        output: mpsc::Sender<Released>,
    ) -> (IngestStats, [JitterBufferStats; 2]) {
        'frames: while let Some(frame) = input.recv().await {
            for released in self.handle_frame(&frame) {
                if output.send(released).await.is_err() {
                    warn!("Mixer stopped, ending ingest early");
                    break 'frames;
                }
            }
        }

        for released in self.finish() {
            if output.send(released).await.is_err() {
                break;
            }
        }

        (self.stats(), self.jitter_stats())
    }

    fn publish(&self, event: StatusEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// What the mixer stage hands back when it is done
#[derive(Debug)]
pub struct MixerOutput<W> {
    pub stats: MixerStats,
    pub bytes_written: u64,
    pub writer: W,
}

/// Interleave released packets and write them to the sink
pub struct MixerStage<W> {
    queues: [ChannelQueue; 2],
    mixer: StereoMixer,
    sink: StereoSink<W>,
}

impl<W: AsyncWrite + Unpin + Send> MixerStage<W> {
    pub fn new(writer: W) -> Self {
        Self {
            queues: [ChannelQueue::new(), ChannelQueue::new()],
            mixer: StereoMixer::new(),
            sink: StereoSink::new(writer),
        }
    }

    pub async fn push(&mut self, released: Released) -> Result<()> {
        self.queues[released.flow.index()].push(&released.packet.payload);

        let [left, right] = &mut self.queues;
        if let Some(out) = self.mixer.mix(left, right) {
            self.sink.write(&out).await?;
        }
        Ok(())
    }

    /// Final mix, then close the sink
    pub async fn finish(mut self) -> Result<MixerOutput<W>> {
        let [left, right] = &mut self.queues;
        if let Some(out) = self.mixer.finish(left, right) {
            self.sink.write(&out).await?;
        }

        let bytes_written = self.sink.bytes_written();
        let writer = self.sink.close().await?.ok_or(Error::SinkClosed)?;

        Ok(MixerOutput {
            stats: self.mixer.get_stats(),
            bytes_written,
            writer,
        })
    }

    pub async fn run(mut self, mut input: mpsc::Receiver<Released>) -> Result<MixerOutput<W>> {
        while let Some(released) = input.recv().await {
            if let Err(e) = self.push(released).await {
                error!("Sink write failed after {} bytes: {}", self.sink.bytes_written(), e);
                // Keep what was already written
                let _ = self.sink.close().await;
                return Err(e);
            }
        }

        self.finish().await
    }
}

/// Result of a successful merge
pub struct MergeOutcome<W> {
    pub stats: MergeStats,
    pub writer: W,
}

impl<W> fmt::Debug for MergeOutcome<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOutcome").field("stats", &self.stats).finish()
    }
}

/// Rebuilds a stereo stream from a two-leg RTP trace
pub struct MergePipeline {
    config: MergeConfig,
    events: broadcast::Sender<StatusEvent>,
}

impl MergePipeline {
    /// Create a pipeline. Invalid configuration is rejected here.
    pub fn new(config: MergeConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Ok(Self { config, events })
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Receive status notifications for subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    /// Read the configured trace file and write the configured output file
    pub async fn run_files(&self) -> Result<MergeStats> {
        let (input, output) = self.config.paths()?;

        let source = PcapReader::open(&input).await?;
        let file = tokio::fs::File::create(&output).await.map_err(|e| {
            Error::IoError(format!("Failed to create output {}: {}", output.display(), e))
        })?;

        info!("Merging {} into {}", input.display(), output.display());
        let outcome = self.run(source, BufWriter::new(file)).await?;
        Ok(outcome.stats)
    }

    /// Run the whole pipeline from `source` into `writer`.
    ///
    /// The writer is flushed and shut down before this returns, also when
    /// the source fails part-way.
    pub async fn run<S, W>(&self, mut source: S, writer: W) -> Result<MergeOutcome<W>>
    where
        S: FrameSource,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let profile = self.config.link_profile.resolve(source.link_type())?;
        let router = FlowRouter::new(self.config.left_port, self.config.right_port)?;
        debug!(
            "Pipeline setup: profile={} {:?}, mode={:?}, ports={}/{}",
            self.config.link_profile, profile, self.config.buffer_mode,
            self.config.left_port, self.config.right_port
        );

        let capacity = self.config.channel_capacity;
        let (frame_tx, frame_rx) = mpsc::channel(capacity);
        let (released_tx, released_rx) = mpsc::channel(capacity);

        let ingest = IngestStage::new(
            FrameDemuxer::new(profile),
            router,
            self.config.jitter_config(),
            self.events.clone(),
        );

        let mixer_handle = tokio::spawn(
            MixerStage::new(writer).run(released_rx).instrument(debug_span!("mixer")),
        );

        let (ingest_rx, impairment_handle) = match self.config.impairment_config() {
            Some(impairment) => {
                info!(
                    "Impairment enabled: loss={} jitter={}",
                    impairment.loss_probability, impairment.jitter_probability
                );
                let (tx, rx) = mpsc::channel(capacity);
                let handle = tokio::spawn(
                    ImpairmentSimulator::new(impairment)
                        .run(frame_rx, tx)
                        .instrument(debug_span!("impairment")),
                );
                (rx, Some(handle))
            }
            None => (frame_rx, None),
        };

        let ingest_handle =
            tokio::spawn(ingest.run(ingest_rx, released_tx).instrument(debug_span!("ingest")));

        let (frames_read, source_result) = drive_source(&mut source, frame_tx).await;

        let impairment = match impairment_handle {
            Some(handle) => Some(handle.await.map_err(join_error)?),
            None => None,
        };
        let (ingest_stats, jitter) = ingest_handle.await.map_err(join_error)?;
        let mixer_output = mixer_handle.await.map_err(join_error)??;

        // Output up to the failure has been flushed and closed by now
        source_result?;

        let stats = MergeStats {
            frames_read,
            impairment,
            ingest: ingest_stats,
            jitter,
            mixer: mixer_output.stats,
            bytes_written: mixer_output.bytes_written,
        };

        info!(
            "Trace parsing completed: {} frames, {} bytes written",
            stats.frames_read, stats.bytes_written
        );
        let _ = self.events.send(StatusEvent::TraceFinished {
            frames: stats.frames_read,
            bytes_written: stats.bytes_written,
        });

        Ok(MergeOutcome {
            stats,
            writer: mixer_output.writer,
        })
    }
}

/// Pull frames from the source and push them downstream until end of trace.
///
/// Returns the number of frames read and whether the source failed.
async fn drive_source<S: FrameSource>(
    source: &mut S,
    output: mpsc::Sender<CapturedFrame>,
) -> (u64, Result<()>) {
    let mut frames = 0u64;

    loop {
        match source.next_frame() {
            Ok(Some(frame)) => {
                frames += 1;
                if output.send(frame).await.is_err() {
                    warn!("Pipeline stopped accepting frames after {}", frames);
                    return (frames, Ok(()));
                }
            }
            Ok(None) => {
                debug!("End of trace after {} frames", frames);
                return (frames, Ok(()));
            }
            Err(e) => {
                error!("Trace read failed after {} frames: {}", frames, e);
                return (frames, Err(e));
            }
        }
    }
}

fn join_error(e: JoinError) -> Error {
    Error::Pipeline(format!("Stage task failed: {}", e))
}
