//! Collective: join the circle, breathe together, reach coherence and
//! witness.

use attuneconf::SessionsConfig;

use crate::module::{Action, Guard, ModuleDefinition, ModuleKind, TableBuilder, Tuning};
use crate::stage::{EventKind, Stage};

pub const STAGES: [Stage; 4] = [Stage::Circle, Stage::BreathSync, Stage::Coherence, Stage::Witness];

pub fn definition(config: &SessionsConfig) -> ModuleDefinition {
    let mut builder = TableBuilder::new(ModuleKind::Collective, &STAGES, Tuning::from_config(config))
        .internal(Stage::Circle, EventKind::JoinCircle, Action::JoinCircle)
        .guard_next(Stage::Circle, Guard::CircleJoined)
        .internal(Stage::BreathSync, EventKind::SyncBreath, Action::SyncBreath)
        .guard_next(Stage::BreathSync, Guard::BreathSynced)
        .internal(Stage::Coherence, EventKind::CoherenceAchieved, Action::AchieveCoherence)
        .guard_next(Stage::Coherence, Guard::CoherenceReached);
    for stage in STAGES {
        builder = builder.tone(stage, "circle");
    }
    builder.build()
}
