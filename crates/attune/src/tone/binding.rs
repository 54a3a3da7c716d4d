//! Static mode → frequency table.

use std::collections::BTreeMap;

use attuneconf::TonesConfig;
use serde::Serialize;

/// Level used for modes that only come from configuration.
pub const DEFAULT_LEVEL: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ToneSpec {
    pub frequency: f32,
    /// Linear gain while the tone sounds.
    pub level: f32,
}

/// Immutable lookup from mode name to tone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToneBinding {
    tones: BTreeMap<String, ToneSpec>,
}

const BUILTIN: &[(&str, f32, f32)] = &[
    // quiet baseline of the unhooking calm field, -25 dBFS
    ("calm", 174.0, 0.056),
    // solfeggio
    ("foundation", 174.0, 0.2),
    ("liberation", 396.0, 0.2),
    ("rebirth", 417.0, 0.2),
    ("love", 528.0, 0.2),
    ("connection", 639.0, 0.2),
    ("truth", 741.0, 0.2),
    ("awakening", 852.0, 0.2),
    ("source", 963.0, 0.2),
    ("schumann", 7.83, 0.3),
    // breathing modes
    ("forest", 528.0, 0.3),
    ("ocean", 432.0, 0.3),
    ("atmosphere", 639.0, 0.3),
    ("magnetic", 7.83, 0.3),
    // celestial bodies
    ("sun", 963.0, 0.4),
    ("moon", 336.0, 0.4),
    // shared concert pitch of the collective circle
    ("circle", 440.0, 0.2),
];

impl ToneBinding {
    pub fn builtin() -> Self {
        let tones = BUILTIN
            .iter()
            .map(|&(name, frequency, level)| (name.to_string(), ToneSpec { frequency, level }))
            .collect();
        Self { tones }
    }

    /// Built-in table with configured frequencies applied on top. Existing
    /// modes keep their level.
    pub fn with_overrides(overrides: &TonesConfig) -> Self {
        let mut binding = Self::builtin();
        for (name, &frequency) in overrides {
            binding
                .tones
                .entry(name.to_lowercase())
                .and_modify(|spec| spec.frequency = frequency)
                .or_insert(ToneSpec {
                    frequency,
                    level: DEFAULT_LEVEL,
                });
        }
        binding
    }

    pub fn lookup(&self, mode: &str) -> Option<ToneSpec> {
        self.tones.get(mode).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ToneSpec)> {
        self.tones.iter().map(|(name, spec)| (name.as_str(), *spec))
    }

    pub fn len(&self) -> usize {
        self.tones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tones.is_empty()
    }
}

impl Default for ToneBinding {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_frequencies() {
        let binding = ToneBinding::builtin();
        assert_eq!(binding.lookup("forest").map(|t| t.frequency), Some(528.0));
        assert_eq!(binding.lookup("ocean").map(|t| t.frequency), Some(432.0));
        assert_eq!(binding.lookup("magnetic").map(|t| t.frequency), Some(7.83));
        assert_eq!(binding.lookup("moon").map(|t| t.frequency), Some(336.0));
        assert_eq!(binding.lookup("circle").map(|t| t.frequency), Some(440.0));
        assert!(binding.lookup("idle").is_none());
        assert_eq!(binding.len(), BUILTIN.len());
    }

    #[test]
    fn test_overrides() {
        let mut overrides = TonesConfig::new();
        overrides.insert("Calm".to_string(), 180.0);
        overrides.insert("sunrise".to_string(), 444.0);

        let binding = ToneBinding::with_overrides(&overrides);
        let calm = binding.lookup("calm").unwrap();
        assert_eq!(calm.frequency, 180.0);
        assert_eq!(calm.level, 0.056);
        assert_eq!(
            binding.lookup("sunrise"),
            Some(ToneSpec { frequency: 444.0, level: DEFAULT_LEVEL })
        );
    }

    #[test]
    fn test_every_module_mode_is_bound() {
        use crate::module::{ModuleDefinition, ModuleKind};
        use crate::stage::Stage;
        use attuneconf::SessionsConfig;

        let binding = ToneBinding::builtin();
        for kind in ModuleKind::ALL {
            let def = ModuleDefinition::for_kind(kind, &SessionsConfig::default());
            for stage in std::iter::once(Stage::Intro).chain(def.stages.iter().copied()) {
                if let Some(mode) = def.tone_mode(stage) {
                    assert!(binding.lookup(mode).is_some(), "{kind}/{stage}: {mode}");
                }
            }
        }
    }
}
