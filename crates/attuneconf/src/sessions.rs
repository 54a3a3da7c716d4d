//! Session tuning - seeds the guard thresholds of each guided module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Frequency overrides keyed by tone mode name, in Hz.
///
/// Entries replace the frequency of a built-in mode or add a new one.
pub type TonesConfig = BTreeMap<String, f32>;

/// Tuning for the unhooking module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnhookingConfig {
    /// Fragments that must be cleared before leaving the fog.
    /// Default: 8
    #[serde(default = "UnhookingConfig::default_total_fragments")]
    pub total_fragments: u32,

    /// Fog removed by one clearing breath.
    /// Default: 0.2
    #[serde(default = "UnhookingConfig::default_fog_step")]
    pub fog_step: f32,

    /// Fog intensity at or below which the clearing counts as done.
    /// Default: 0.1
    #[serde(default = "UnhookingConfig::default_fog_threshold")]
    pub fog_threshold: f32,
}

impl UnhookingConfig {
    fn default_total_fragments() -> u32 {
        8
    }

    fn default_fog_step() -> f32 {
        0.2
    }

    fn default_fog_threshold() -> f32 {
        0.1
    }
}

impl Default for UnhookingConfig {
    fn default() -> Self {
        Self {
            total_fragments: Self::default_total_fragments(),
            fog_step: Self::default_fog_step(),
            fog_threshold: Self::default_fog_threshold(),
        }
    }
}

/// Tuning for the liberation module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiberationConfig {
    /// Arousal level at which the fear stage refuses to advance.
    /// Default: 7
    #[serde(default = "LiberationConfig::default_arousal_limit")]
    pub arousal_limit: u8,

    /// Seconds the crossing stage dwells before advancing on its own.
    /// Zero leaves the advance to the user.
    /// Default: 0
    #[serde(default = "LiberationConfig::default_crossing_dwell_secs")]
    pub crossing_dwell_secs: u64,
}

impl LiberationConfig {
    fn default_arousal_limit() -> u8 {
        7
    }

    fn default_crossing_dwell_secs() -> u64 {
        0
    }
}

impl Default for LiberationConfig {
    fn default() -> Self {
        Self {
            arousal_limit: Self::default_arousal_limit(),
            crossing_dwell_secs: Self::default_crossing_dwell_secs(),
        }
    }
}

/// Tuning for the breath-of-source module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathOfSourceConfig {
    /// Breath cycles needed before the first three lessons can complete.
    /// Counted over the whole session.
    /// Default: 5
    #[serde(default = "BreathOfSourceConfig::default_required_cycles")]
    pub required_cycles: u32,
}

impl BreathOfSourceConfig {
    fn default_required_cycles() -> u32 {
        5
    }
}

impl Default for BreathOfSourceConfig {
    fn default() -> Self {
        Self {
            required_cycles: Self::default_required_cycles(),
        }
    }
}

/// Per-module tuning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default)]
    pub unhooking: UnhookingConfig,

    #[serde(default)]
    pub liberation: LiberationConfig,

    #[serde(default)]
    pub breath_of_source: BreathOfSourceConfig,
}
