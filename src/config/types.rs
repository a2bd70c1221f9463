//! Configuration types

use crate::capture::MAX_PACKETS;
use crate::telemetry::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Contents of a pktchain config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LogConfig,
    pub capture: CaptureConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Starting point written by `config init`
    pub fn template() -> Self {
        Self {
            capture: CaptureConfig {
                interface: Some("eth0".to_string()),
                ..CaptureConfig::default()
            },
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Live capture on this interface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    /// Replay this pcap file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    pub read_timeout_ms: u64,
    pub snaplen: usize,
    /// Frames asked of the source per bulk dispatch
    pub batch_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            file: None,
            read_timeout_ms: 1000,
            snaplen: 65535,
            batch_capacity: MAX_PACKETS,
        }
    }
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Interface(String),
    File(PathBuf),
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// The configured source, if exactly one is set
    pub fn source(&self) -> Option<SourceSpec> {
        match (&self.interface, &self.file) {
            (Some(name), None) => Some(SourceSpec::Interface(name.clone())),
            (None, Some(path)) => Some(SourceSpec::File(path.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print each frame's bytes after its summary
    pub hex_dump: bool,
    /// Stop after this many packets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Print counters on exit
    pub stats: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            hex_dump: false,
            count: None,
            stats: true,
        }
    }
}
