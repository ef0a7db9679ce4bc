use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::error::{ClipstitchError, Result};

/// Pixel geometry of a probed video stream. Immutable once probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectCategory {
    Landscape,
    Portrait,
    Square,
}

impl Dimensions {
    pub fn category(&self) -> AspectCategory {
        if self.width > self.height {
            AspectCategory::Landscape
        } else if self.height > self.width {
            AspectCategory::Portrait
        } else {
            AspectCategory::Square
        }
    }
}

/// Trait seam for dimension probing so planning can be tested without
/// launching any external process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProberTrait: Send + Sync {
    /// Probe a locator (file path or HTTP(S) URL) for its video dimensions.
    async fn probe(&self, locator: &str) -> Result<Dimensions>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// Concrete ffprobe-based prober.
pub struct FfprobeProber {
    config: ProbeConfig,
}

impl FfprobeProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Check if the probe binary is available
    pub async fn check_availability(&self) -> Result<()> {
        let output = Command::new(&self.config.binary_path)
            .arg("-version")
            .output()
            .await
            .map_err(|e| ClipstitchError::Probe(format!("ffprobe not found: {}", e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ClipstitchError::Probe(
                "ffprobe version check failed".to_string(),
            ))
        }
    }
}

#[async_trait]
impl MediaProberTrait for FfprobeProber {
    async fn probe(&self, locator: &str) -> Result<Dimensions> {
        debug!("Probing dimensions of {}", locator);

        let output = Command::new(&self.config.binary_path)
            .arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_streams")
            .arg("-select_streams")
            .arg("v:0")
            .arg(locator)
            .output()
            .await
            .map_err(|e| ClipstitchError::Probe(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ClipstitchError::Probe(format!(
                "ffprobe failed for {}: {}",
                locator, stderr
            )));
        }

        let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|e| ClipstitchError::Probe(format!("Malformed ffprobe output: {}", e)))?;

        let stream = parsed.streams.first().ok_or_else(|| {
            ClipstitchError::Probe(format!("No video stream found in {}", locator))
        })?;

        if stream.width == 0 || stream.height == 0 {
            return Err(ClipstitchError::Probe(format!(
                "Zero-sized video stream in {} ({}x{})",
                locator, stream.width, stream.height
            )));
        }

        let dims = Dimensions {
            width: stream.width,
            height: stream.height,
        };
        debug!("{} is {}x{} ({:?})", locator, dims.width, dims.height, dims.category());
        Ok(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_category() {
        let landscape = Dimensions { width: 1920, height: 1080 };
        let portrait = Dimensions { width: 1080, height: 1920 };
        let square = Dimensions { width: 1080, height: 1080 };

        assert_eq!(landscape.category(), AspectCategory::Landscape);
        assert_eq!(portrait.category(), AspectCategory::Portrait);
        assert_eq!(square.category(), AspectCategory::Square);
    }

    #[test]
    fn test_probe_output_parsing() {
        let json = r#"{"streams": [{"width": 1280, "height": 720, "codec_type": "video"}]}"#;
        let parsed: ProbeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.streams[0].width, 1280);
        assert_eq!(parsed.streams[0].height, 720);
    }

    #[test]
    fn test_probe_output_missing_stream() {
        let json = r#"{"streams": []}"#;
        let parsed: ProbeOutput = serde_json::from_str(json).unwrap();
        assert!(parsed.streams.is_empty());
    }
}
