//! Earth: step onto the ground, align with the planetary pulse, and
//! synchronise breath before integrating.

use attuneconf::SessionsConfig;

use crate::module::{Action, Guard, ModuleDefinition, ModuleKind, TableBuilder, Tuning};
use crate::stage::{EventKind, Stage};

pub const STAGES: [Stage; 4] = [Stage::Ground, Stage::Pulse, Stage::Sync, Stage::Integration];

pub fn definition(config: &SessionsConfig) -> ModuleDefinition {
    TableBuilder::new(ModuleKind::Earth, &STAGES, Tuning::from_config(config))
        .internal(Stage::Ground, EventKind::StepIn, Action::ConnectGround)
        .guard_next(Stage::Ground, Guard::GroundConnected)
        .internal(Stage::Pulse, EventKind::PulseSync, Action::AlignPulse)
        .guard_next(Stage::Pulse, Guard::PulseAligned)
        .internal(Stage::Sync, EventKind::BreathSync, Action::SyncBreath)
        .guard_next(Stage::Sync, Guard::BreathSynced)
        .tone(Stage::Ground, "forest")
        .tone(Stage::Pulse, "magnetic")
        .tone(Stage::Sync, "ocean")
        .tone(Stage::Integration, "sun")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earth_guards() {
        let def = definition(&SessionsConfig::default());
        for (stage, guard) in [
            (Stage::Ground, Guard::GroundConnected),
            (Stage::Pulse, Guard::PulseAligned),
            (Stage::Sync, Guard::BreathSynced),
        ] {
            let next = def.transition(stage, EventKind::Next).unwrap();
            assert_eq!(next.guard, Some(guard));
        }
        let complete = def.transition(Stage::Integration, EventKind::Complete).unwrap();
        assert_eq!(complete.guard, None);
    }

    #[test]
    fn test_earth_tones_cover_every_stage() {
        let def = definition(&SessionsConfig::default());
        for stage in STAGES {
            assert!(def.tone_mode(stage).is_some(), "{stage} has no tone");
        }
    }
}
