//! Unhooking: clear the broadcast fog fragment by fragment, then breathe the
//! remaining haze away.
//!
//! ```text
//! intro ─START─▶ fog ─NEXT[all fragments]─▶ recognition ─NEXT─▶ clearing ─NEXT[fog ≤ t]─▶ calm ─COMPLETE─▶ complete
//! ```

use attuneconf::SessionsConfig;

use crate::module::{Action, Guard, ModuleDefinition, ModuleKind, TableBuilder, Tuning};
use crate::stage::{EventKind, Stage};

pub const STAGES: [Stage; 4] = [Stage::Fog, Stage::Recognition, Stage::Clearing, Stage::Calm];

pub fn definition(config: &SessionsConfig) -> ModuleDefinition {
    TableBuilder::new(ModuleKind::Unhooking, &STAGES, Tuning::from_config(config))
        .start_action(Action::ResetFog)
        .internal(Stage::Fog, EventKind::ClearFragment, Action::ClearFragment)
        .guard_next(Stage::Fog, Guard::AllFragmentsCleared)
        .internal(Stage::Clearing, EventKind::BreathClear, Action::BreathClear)
        .guard_next(Stage::Clearing, Guard::FogCleared)
        // quiet baseline only once the chatter is gone
        .tone(Stage::Calm, "calm")
        .build()
}
