use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, ClipstitchError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub probe: ProbeConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Path to ffprobe binary
    pub binary_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Kill the encode and report a timeout after this many seconds.
    /// None means the process may run indefinitely.
    pub timeout_secs: Option<u64>,
    /// Append a -YYYYMMDD-HHMMSS suffix to the output filename so repeated
    /// smart-concat runs never collide. Off unless asked for.
    pub timestamp_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe: ProbeConfig {
                binary_path: "ffprobe".to_string(),
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                timeout_secs: None,
                timestamp_output: false,
            },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ClipstitchError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| ClipstitchError::Config(format!("Failed to parse config file: {}", e)))
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ClipstitchError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ClipstitchError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }
}
