//! Command-line arguments and the optional TOML config file

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

use crate::logging::{parse_log_level, LoggingConfig};
use rtpmix_core::{BufferMode, LinkProfile, MergeConfig};

/// Rebuild a stereo raw audio file from the two RTP legs of a pcap trace
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Trace file to read (classic pcap)
    #[arg(short, long, env = "RTPMIX_INPUT")]
    pub input: Option<PathBuf>,

    /// Raw stereo output file
    #[arg(short, long, env = "RTPMIX_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Source port of the left channel
    #[arg(long, env = "RTPMIX_LEFT_PORT")]
    pub left_port: Option<u16>,

    /// Source port of the right channel
    #[arg(long, env = "RTPMIX_RIGHT_PORT")]
    pub right_port: Option<u16>,

    /// Link-layer header layout of the trace
    #[arg(long, value_enum, env = "RTPMIX_PROFILE")]
    pub profile: Option<ProfileArg>,

    /// Jitter buffer mode
    #[arg(short, long, value_enum, env = "RTPMIX_MODE")]
    pub mode: Option<ModeArg>,

    /// Reorder window target latency (ms)
    #[arg(long, env = "RTPMIX_LATENCY_MS")]
    pub latency_ms: Option<u32>,

    /// Nominal packet interval (ms)
    #[arg(long, env = "RTPMIX_INTERVAL_MS")]
    pub interval_ms: Option<u32>,

    /// Simulated loss probability (0.0 - 1.0)
    #[arg(long, env = "RTPMIX_LOSS")]
    pub loss: Option<f64>,

    /// Simulated jitter probability (0.0 - 1.0)
    #[arg(long, env = "RTPMIX_JITTER")]
    pub jitter: Option<f64>,

    /// Seed for the impairment simulator
    #[arg(long, env = "RTPMIX_SEED")]
    pub seed: Option<u64>,

    /// TOML file with defaults; explicit arguments win
    #[arg(short, long, env = "RTPMIX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RTPMIX_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Log span enter/exit events
    #[arg(long)]
    pub log_spans: bool,
}

impl Args {
    /// Logging setup requested on the command line
    pub fn logging_config(&self) -> anyhow::Result<LoggingConfig> {
        let mut config = LoggingConfig::new(parse_log_level(&self.log_level)?);
        if self.json_logs {
            config = config.with_json().with_file_info();
        }
        if self.log_spans {
            config = config.with_spans();
        }
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProfileArg {
    Auto,
    Ethernet,
    Vlan,
    LinuxSll,
}

impl From<ProfileArg> for LinkProfile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::Auto => LinkProfile::Auto,
            ProfileArg::Ethernet => LinkProfile::Ethernet,
            ProfileArg::Vlan => LinkProfile::Vlan,
            ProfileArg::LinuxSll => LinkProfile::LinuxSll,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Passthrough,
    Reorder,
}

impl From<ModeArg> for BufferMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Passthrough => BufferMode::Passthrough,
            ModeArg::Reorder => BufferMode::Reorder,
        }
    }
}

/// Parse a TOML config file. Missing keys take their defaults.
pub fn load_config_file(path: &Path) -> anyhow::Result<MergeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config file {}", path.display()))
}

impl Args {
    /// Build the merge configuration: file (or defaults) first, then explicit arguments
    pub fn merge_config(&self) -> anyhow::Result<MergeConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_file(path)?,
            None => MergeConfig::default(),
        };
        self.apply_to(&mut config);
        Ok(config)
    }

    fn apply_to(&self, config: &mut MergeConfig) {
        if let Some(input) = &self.input {
            config.input = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        if let Some(port) = self.left_port {
            config.left_port = port;
        }
        if let Some(port) = self.right_port {
            config.right_port = port;
        }
        if let Some(profile) = self.profile {
            config.link_profile = profile.into();
        }
        if let Some(mode) = self.mode {
            config.buffer_mode = mode.into();
        }
        if let Some(latency) = self.latency_ms {
            config.target_latency_ms = latency;
        }
        if let Some(interval) = self.interval_ms {
            config.packet_interval_ms = interval;
        }
        if let Some(loss) = self.loss {
            config.loss_probability = loss;
        }
        if let Some(jitter) = self.jitter {
            config.jitter_probability = jitter;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("rtpmix").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_without_arguments() {
        let config = parse(&["-i", "call.pcap", "-o", "call.raw"]).merge_config().unwrap();

        assert_eq!(config.input, Some(PathBuf::from("call.pcap")));
        assert_eq!(config.left_port, 8000);
        assert_eq!(config.right_port, 40376);
        assert_eq!(config.buffer_mode, BufferMode::Passthrough);
        assert!(config.impairment_config().is_none());
    }

    #[test]
    fn test_explicit_arguments() {
        let args = parse(&[
            "--left-port", "5004", "--right-port", "5006", "--profile", "linux-sll",
            "--mode", "reorder", "--latency-ms", "100", "--loss", "0.05", "--seed", "7",
        ]);
        let config = args.merge_config().unwrap();

        assert_eq!(config.left_port, 5004);
        assert_eq!(config.right_port, 5006);
        assert_eq!(config.link_profile, LinkProfile::LinuxSll);
        assert_eq!(config.jitter_config().depth(), 5);
        assert_eq!(config.loss_probability, 0.05);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn test_config_file_overridden_by_arguments() {
        let path = std::env::temp_dir().join(format!("rtpmix-settings-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "left_port = 6000\nright_port = 6002\nbuffer_mode = \"reorder\"\nlink_profile = \"vlan\"\n",
        )
        .unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "--right-port", "7000"]);
        let config = args.merge_config().unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.left_port, 6000);
        assert_eq!(config.right_port, 7000);
        assert_eq!(config.buffer_mode, BufferMode::Reorder);
        assert_eq!(config.link_profile, LinkProfile::Vlan);
        assert_eq!(config.target_latency_ms, 60);
    }

    #[test]
    fn test_bad_config_file_reported() {
        let args = parse(&["--config", "/nonexistent/rtpmix.toml"]);
        let err = args.merge_config().unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_logging_flags() {
        let config = parse(&["--log-level", "debug", "--log-spans"]).logging_config().unwrap();
        assert_eq!(config.level, tracing::Level::DEBUG);
        assert!(config.log_spans);
        assert!(!config.json);

        let config = parse(&["--json-logs"]).logging_config().unwrap();
        assert!(config.json);
        assert!(!config.log_spans);

        assert!(parse(&["--log-level", "chatty"]).logging_config().is_err());
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let result = Args::try_parse_from(["rtpmix", "--profile", "token-ring"]);
        assert!(result.is_err());
    }
}
