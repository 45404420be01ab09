//! Network impairment simulation
//!
//! Sits between the frame source and the demuxer and replays the trace on its
//! capture timeline: a frame captured `t` after the first one is due `t` after
//! the simulator saw the first frame. Each frame is dropped with the
//! configured loss probability, or, independently, delayed past its due time
//! by one packet interval plus a random extra of up to half an interval.
//! Delayed frames are delivered from scheduled tasks, so the frames due in
//! the next slot or so can overtake them.
//!
//! Replaying on the timeline means an impaired run takes as long as the
//! captured call.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace, warn};

use crate::capture::CapturedFrame;

/// Impairment settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImpairmentConfig {
    /// Probability in [0, 1] that a frame is dropped
    pub loss_probability: f64,

    /// Probability in [0, 1] that a frame is delayed
    pub jitter_probability: f64,

    /// Nominal inter-packet interval
    pub packet_interval: Duration,

    /// Seed for reproducible runs
    pub seed: Option<u64>,
}

impl ImpairmentConfig {
    /// Whether this configuration changes the frame stream at all
    pub fn is_active(&self) -> bool {
        self.loss_probability > 0.0 || self.jitter_probability > 0.0
    }
}

/// What happens to one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impairment {
    Forward,
    Drop,
    Delay(Duration),
}

/// Impairment counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImpairmentStats {
    pub frames_in: u64,
    pub dropped: u64,
    pub delayed: u64,
    pub delivered: u64,
}

pub struct ImpairmentSimulator {
    config: ImpairmentConfig,
    rng: StdRng,

    /// Pending delayed deliveries; each task yields whether its frame was delivered
    pending: JoinSet<bool>,

    stats: ImpairmentStats,
}

impl ImpairmentSimulator {
    pub fn new(config: ImpairmentConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            rng,
            pending: JoinSet::new(),
            stats: ImpairmentStats::default(),
        }
    }

    /// Decide the fate of the next frame
    pub fn decide(&mut self) -> Impairment {
        if self.rng.gen_bool(self.config.loss_probability) {
            return Impairment::Drop;
        }

        if self.rng.gen_bool(self.config.jitter_probability) {
            let interval = self.config.packet_interval;
            let max_extra = interval.as_micros() as u64 / 2;
            let extra = Duration::from_micros(self.rng.gen_range(0..=max_extra));
            return Impairment::Delay(interval + extra);
        }

        Impairment::Forward
    }

    /// Forward frames from `input` to `output` until the input closes, then
    /// wait for every pending delayed delivery before returning.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<CapturedFrame>,
        output: mpsc::Sender<CapturedFrame>,
    ) -> ImpairmentStats {
        // (wall clock, capture time) of the first frame
        let mut timeline: Option<(Instant, Duration)> = None;

        while let Some(frame) = input.recv().await {
            self.stats.frames_in += 1;
            self.reap_finished();

            let (start, origin) = *timeline.get_or_insert_with(|| (Instant::now(), frame.timestamp));
            let due = start + frame.timestamp.saturating_sub(origin);

            match self.decide() {
                Impairment::Drop => {
                    self.stats.dropped += 1;
                    trace!("Impairment dropped frame at {:?}", frame.timestamp);
                }
                Impairment::Forward => {
                    sleep_until(due).await;
                    if output.send(frame).await.is_err() {
                        warn!("Downstream closed, cancelling {} pending deliveries", self.pending.len());
                        self.pending.abort_all();
                        break;
                    }
                    self.stats.delivered += 1;
                }
                Impairment::Delay(delay) => {
                    self.stats.delayed += 1;
                    let tx = output.clone();
                    self.pending.spawn(async move {
                        sleep_until(due + delay).await;
                        tx.send(frame).await.is_ok()
                    });
                }
            }
        }

        debug!("Input finished, awaiting {} delayed deliveries", self.pending.len());
        while let Some(result) = self.pending.join_next().await {
            self.record_delivery(result);
        }

        debug!(
            "Impairment done: in={} dropped={} delayed={} delivered={}",
            self.stats.frames_in, self.stats.dropped, self.stats.delayed, self.stats.delivered
        );
        self.stats
    }

    fn reap_finished(&mut self) {
        while let Some(result) = self.pending.try_join_next() {
            self.record_delivery(result);
        }
    }

    fn record_delivery(&mut self, result: Result<bool, tokio::task::JoinError>) {
        match result {
            Ok(true) => self.stats.delivered += 1,
            Ok(false) => trace!("Delayed frame found downstream closed"),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("Delayed delivery task failed: {}", e),
        }
    }
}
