//! Merge configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::demux::LinkProfile;
use crate::error::Error;
use crate::impairment::ImpairmentConfig;
use crate::jitter::{BufferMode, JitterBufferConfig, DEFAULT_PACKET_INTERVAL_MS, DEFAULT_TARGET_LATENCY_MS};
use crate::Result;

/// Default source port of the left leg
pub const DEFAULT_LEFT_PORT: u16 = 8000;

/// Default source port of the right leg
pub const DEFAULT_RIGHT_PORT: u16 = 40376;

/// Default capacity of the channels between pipeline stages
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Configuration for one merge run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Trace file to read
    pub input: Option<PathBuf>,

    /// Raw stereo file to write
    pub output: Option<PathBuf>,

    /// Source port of the left channel
    pub left_port: u16,

    /// Source port of the right channel
    pub right_port: u16,

    /// Link-layer offset profile
    pub link_profile: LinkProfile,

    pub buffer_mode: BufferMode,

    /// Jitter buffer target latency in milliseconds
    pub target_latency_ms: u32,

    /// Nominal packet interval in milliseconds
    pub packet_interval_ms: u32,

    /// Probability of dropping a frame before demux
    pub loss_probability: f64,

    /// Probability of delaying a frame before demux
    pub jitter_probability: f64,

    /// Seed for the impairment simulator
    pub seed: Option<u64>,

    /// Capacity of the channels between pipeline stages
    pub channel_capacity: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            left_port: DEFAULT_LEFT_PORT,
            right_port: DEFAULT_RIGHT_PORT,
            link_profile: LinkProfile::Auto,
            buffer_mode: BufferMode::Passthrough,
            target_latency_ms: DEFAULT_TARGET_LATENCY_MS,
            packet_interval_ms: DEFAULT_PACKET_INTERVAL_MS,
            loss_probability: 0.0,
            jitter_probability: 0.0,
            seed: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl MergeConfig {
    /// Check every option that does not depend on the trace itself
    pub fn validate(&self) -> Result<()> {
        if self.left_port == 0 || self.right_port == 0 {
            return Err(Error::Config("Flow ports must be non-zero".to_string()));
        }
        if self.left_port == self.right_port {
            return Err(Error::Config(format!(
                "Left and right flows cannot share source port {}",
                self.left_port
            )));
        }
        if self.packet_interval_ms == 0 {
            return Err(Error::Config("Packet interval must be at least 1ms".to_string()));
        }
        check_probability("loss probability", self.loss_probability)?;
        check_probability("jitter probability", self.jitter_probability)?;
        if self.channel_capacity == 0 {
            return Err(Error::Config("Channel capacity must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Validate and return the trace and output paths
    pub fn paths(&self) -> Result<(PathBuf, PathBuf)> {
        let input = self
            .input
            .clone()
            .ok_or_else(|| Error::Config("Missing trace path".to_string()))?;
        let output = self
            .output
            .clone()
            .ok_or_else(|| Error::Config("Missing output path".to_string()))?;
        if input == output {
            return Err(Error::Config("Trace and output paths must differ".to_string()));
        }
        Ok((input, output))
    }

    pub fn jitter_config(&self) -> JitterBufferConfig {
        JitterBufferConfig {
            mode: self.buffer_mode,
            target_latency_ms: self.target_latency_ms,
            packet_interval_ms: self.packet_interval_ms,
        }
    }

    /// Impairment settings, or `None` when no impairment is requested
    pub fn impairment_config(&self) -> Option<ImpairmentConfig> {
        let config = ImpairmentConfig {
            loss_probability: self.loss_probability,
            jitter_probability: self.jitter_probability,
            packet_interval: Duration::from_millis(self.packet_interval_ms as u64),
            seed: self.seed,
        };
        config.is_active().then_some(config)
    }
}

fn check_probability(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!("{} must be within [0, 1], got {}", name, value)));
    }
    Ok(())
}
