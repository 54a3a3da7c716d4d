//! Configuration loading for attune.
//!
//! Shared by the session core and the `attune` binary, so it stays small and
//! free of audio or async dependencies.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/attune/config.toml` (system)
//! 2. `~/.config/attune/config.toml` (user)
//! 3. `./attune.toml` (local override, or the path given on the command line)
//! 4. Environment variables (`ATTUNE_*`, plus `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! render_dir = "~/attune/renders"
//!
//! [telemetry]
//! log_level = "debug"
//!
//! [audio]
//! sample_rate = 44100
//! ramp_ms = 80
//!
//! [sessions.unhooking]
//! total_fragments = 6
//!
//! [sessions.liberation]
//! crossing_dwell_secs = 30
//!
//! [tones]
//! calm = 180.0
//! ```

pub mod infra;
pub mod loader;
pub mod sessions;

pub use infra::{AudioConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use sessions::{
    BreathOfSourceConfig, LiberationConfig, SessionsConfig, TonesConfig, UnhookingConfig,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete attune configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttuneConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub sessions: SessionsConfig,

    #[serde(default)]
    pub tones: TonesConfig,
}

impl AttuneConfig {
    /// Load configuration from all standard sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration, letting `config_path` replace `./attune.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged)?;
        loader::apply_env_overrides(&mut config, &mut sources);
        config.validate()?;

        Ok((config, sources))
    }

    /// Reject values that would break the audio or session invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.audio.sample_rate == 0 {
            return Err(ConfigError::Invalid("audio.sample_rate must be > 0".into()));
        }
        if !(self.audio.gain_floor > 0.0 && self.audio.gain_floor < 1.0) {
            return Err(ConfigError::Invalid(
                "audio.gain_floor must be between 0 and 1 (exclusive)".into(),
            ));
        }
        let unhooking = &self.sessions.unhooking;
        if !(0.0..=1.0).contains(&unhooking.fog_threshold) {
            return Err(ConfigError::Invalid(
                "sessions.unhooking.fog_threshold must be within [0, 1]".into(),
            ));
        }
        if unhooking.fog_step <= 0.0 {
            return Err(ConfigError::Invalid(
                "sessions.unhooking.fog_step must be > 0".into(),
            ));
        }
        if let Some((name, hz)) = self.tones.iter().find(|(_, hz)| !(**hz > 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "tone {name} has non-positive frequency {hz}"
            )));
        }
        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# attune configuration\n\n");

        output.push_str("[paths]\n");
        output.push_str(&format!(
            "render_dir = \"{}\"\n",
            self.paths.render_dir.display()
        ));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        output.push_str("\n[audio]\n");
        output.push_str(&format!("sample_rate = {}\n", self.audio.sample_rate));
        output.push_str(&format!("ramp_ms = {}\n", self.audio.ramp_ms));
        output.push_str(&format!("gain_floor = {}\n", self.audio.gain_floor));
        output.push_str(&format!(
            "grant_permission = {}\n",
            self.audio.grant_permission
        ));

        output.push_str("\n[sessions.unhooking]\n");
        let unhooking = &self.sessions.unhooking;
        output.push_str(&format!("total_fragments = {}\n", unhooking.total_fragments));
        output.push_str(&format!("fog_step = {}\n", unhooking.fog_step));
        output.push_str(&format!("fog_threshold = {}\n", unhooking.fog_threshold));

        output.push_str("\n[sessions.liberation]\n");
        let liberation = &self.sessions.liberation;
        output.push_str(&format!("arousal_limit = {}\n", liberation.arousal_limit));
        output.push_str(&format!(
            "crossing_dwell_secs = {}\n",
            liberation.crossing_dwell_secs
        ));

        output.push_str("\n[sessions.breath_of_source]\n");
        output.push_str(&format!(
            "required_cycles = {}\n",
            self.sessions.breath_of_source.required_cycles
        ));

        output.push_str("\n[tones]\n");
        for (name, hz) in &self.tones {
            output.push_str(&format!("{} = {:?}\n", name, hz));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AttuneConfig::default();
        assert_eq!(config.audio.sample_rate, 48000);
        assert_eq!(config.sessions.unhooking.total_fragments, 8);
        assert!(config.tones.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_to_toml_roundtrips() {
        let mut config = AttuneConfig::default();
        config.tones.insert("calm".to_string(), 180.0);
        let text = config.to_toml();
        assert!(text.contains("[audio]"));
        assert!(text.contains("[sessions.unhooking]"));
        assert!(text.contains("calm = 180.0"));

        let table: toml::Table = text.parse().unwrap();
        let reparsed = loader::from_table(table).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_validate_rejects_zero_floor() {
        let mut config = AttuneConfig::default();
        config.audio.gain_floor = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bad_tone() {
        let mut config = AttuneConfig::default();
        config.tones.insert("void".to_string(), -3.0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("void"));
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attune.toml");
        std::fs::write(
            &path,
            "[sessions.unhooking]\ntotal_fragments = 3\n\n[tones]\ncalm = 180.0\n",
        )
        .unwrap();

        let (config, sources) = AttuneConfig::load_with_sources_from(Some(&path)).unwrap();
        assert_eq!(config.sessions.unhooking.total_fragments, 3);
        assert_eq!(config.tones.get("calm"), Some(&180.0));
        assert!(sources.files.contains(&path));
    }
}
