use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for procscope.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Sampling configuration.
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Instance metadata lookup configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Kernel log stream configuration.
    #[serde(default)]
    pub dmesg: DmesgConfig,
}

/// Sampling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Sampling interval. Default: 5s.
    #[serde(default = "default_sample_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Output channel capacity; when full, new samples are dropped.
    /// Default: 1.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_sample_interval(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Instance metadata lookup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetadataConfig {
    /// Disable to skip the lookup entirely; compute-unit figures become NaN.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Endpoint returning the current instance type as plain text.
    #[serde(default = "default_metadata_endpoint")]
    pub endpoint: String,

    /// Request timeout. Default: 10s.
    #[serde(default = "default_metadata_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            endpoint: default_metadata_endpoint(),
            timeout: default_metadata_timeout(),
        }
    }
}

/// Kernel log stream configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DmesgConfig {
    /// Enable streaming of kernel ring buffer messages.
    #[serde(default)]
    pub enabled: bool,

    /// Ring buffer poll interval. Default: 15s.
    #[serde(default = "default_dmesg_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Message channel capacity. Default: 64.
    #[serde(default = "default_dmesg_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DmesgConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: default_dmesg_poll_interval(),
            channel_capacity: default_dmesg_channel_capacity(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.monitor.interval.is_zero() {
            bail!("monitor.interval must be positive");
        }

        if self.monitor.channel_capacity == 0 {
            bail!("monitor.channel_capacity must be positive");
        }

        if self.metadata.enabled && self.metadata.endpoint.is_empty() {
            bail!("metadata.endpoint is required when metadata lookup is enabled");
        }

        if self.dmesg.enabled && self.dmesg.poll_interval.is_zero() {
            bail!("dmesg.poll_interval must be positive");
        }

        if self.dmesg.enabled && self.dmesg.channel_capacity == 0 {
            bail!("dmesg.channel_capacity must be positive");
        }

        Ok(())
    }
}

fn default_sample_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_channel_capacity() -> usize {
    1
}

fn default_true() -> bool {
    true
}

fn default_metadata_endpoint() -> String {
    "http://169.254.169.254/latest/meta-data/instance-type".to_string()
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dmesg_poll_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_dmesg_channel_capacity() -> usize {
    64
}
