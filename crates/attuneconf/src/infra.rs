//! Process-level configuration: paths, logging, and the audio device.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem paths used by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where rendered session audio lands when no explicit path is given.
    /// Default: ~/.local/share/attune/renders
    #[serde(default = "PathsConfig::default_render_dir")]
    pub render_dir: PathBuf,
}

impl PathsConfig {
    fn default_render_dir() -> PathBuf {
        directories::BaseDirs::new()
            .map(|dirs| dirs.data_local_dir().join("attune/renders"))
            .unwrap_or_else(|| PathBuf::from(".local/share/attune/renders"))
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            render_dir: Self::default_render_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter directive handed to the tracing subscriber.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Tone synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output sample rate for rendering.
    /// Default: 48000
    #[serde(default = "AudioConfig::default_sample_rate")]
    pub sample_rate: u32,

    /// Length of each gain ramp in milliseconds.
    /// Default: 100
    #[serde(default = "AudioConfig::default_ramp_ms")]
    pub ramp_ms: u32,

    /// Smallest gain an exponential ramp targets. Must be > 0.
    /// Default: 0.0001
    #[serde(default = "AudioConfig::default_gain_floor")]
    pub gain_floor: f32,

    /// Whether the simulated audio device grants permission.
    /// Default: true
    #[serde(default = "AudioConfig::default_grant")]
    pub grant_permission: bool,
}

impl AudioConfig {
    fn default_sample_rate() -> u32 {
        48000
    }

    fn default_ramp_ms() -> u32 {
        100
    }

    fn default_gain_floor() -> f32 {
        0.0001
    }

    fn default_grant() -> bool {
        true
    }

    /// Ramp length in seconds on the audio clock.
    pub fn ramp_secs(&self) -> f64 {
        self.ramp_ms as f64 / 1000.0
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: Self::default_sample_rate(),
            ramp_ms: Self::default_ramp_ms(),
            gain_floor: Self::default_gain_floor(),
            grant_permission: Self::default_grant(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_defaults() {
        let audio = AudioConfig::default();
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.ramp_ms, 100);
        assert!(audio.gain_floor > 0.0);
        assert!((audio.ramp_secs() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_render_dir_default() {
        let paths = PathsConfig::default();
        assert!(paths.render_dir.to_string_lossy().contains("attune"));
    }
}
