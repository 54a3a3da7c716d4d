//! Liberation: face fear, cross the threshold, expand, integrate.
//!
//! Unlike the other modules, RESUME returns to the stage that was paused.
//! The crossing stage can be configured to advance on its own after a dwell
//! time; by default it waits for the user.

use std::time::Duration;

use attuneconf::SessionsConfig;

use crate::module::{
    Action, Guard, ModuleDefinition, ModuleKind, ResumePolicy, TableBuilder, Tuning,
};
use crate::stage::{EventKind, Stage};

pub const STAGES: [Stage; 4] = [Stage::Fear, Stage::Crossing, Stage::Expansion, Stage::Integration];

pub fn definition(config: &SessionsConfig) -> ModuleDefinition {
    TableBuilder::new(ModuleKind::Liberation, &STAGES, Tuning::from_config(config))
        .resume(ResumePolicy::History)
        .start_guard(Guard::DeviceOk)
        .internal(Stage::Intro, EventKind::DeviceCheck, Action::RecordDeviceCheck)
        .internal(Stage::Fear, EventKind::ArousalUpdate, Action::RecordArousal)
        .internal(Stage::Fear, EventKind::Comfort, Action::RecordComfort)
        .guard_next(Stage::Fear, Guard::ComfortOk)
        .dwell(
            Stage::Crossing,
            Duration::from_secs(config.liberation.crossing_dwell_secs),
        )
        .tone(Stage::Intro, "love")
        .tone(Stage::Fear, "foundation")
        .tone(Stage::Crossing, "connection")
        .tone(Stage::Expansion, "truth")
        .tone(Stage::Integration, "source")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liberation_table() {
        let def = definition(&SessionsConfig::default());
        assert_eq!(def.resume, ResumePolicy::History);
        assert_eq!(
            def.transition(Stage::Intro, EventKind::Start).unwrap().guard,
            Some(Guard::DeviceOk)
        );
    }

    #[test]
    fn test_crossing_waits_for_user_by_default() {
        let def = definition(&SessionsConfig::default());
        assert!(def.dwell(Stage::Crossing).is_none());
        assert!(def.transition(Stage::Crossing, EventKind::Next).is_some());
    }

    #[test]
    fn test_crossing_dwell_enabled_by_config() {
        let mut config = SessionsConfig::default();
        config.liberation.crossing_dwell_secs = 45;
        let def = definition(&config);
        assert_eq!(def.dwell(Stage::Crossing), Some(Duration::from_secs(45)));
    }
}
