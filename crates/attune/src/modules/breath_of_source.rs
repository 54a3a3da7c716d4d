//! Breath of source: five breathing lessons.
//!
//! Lessons advance on COMPLETE_LESSON and the last one ends the module with
//! COMPLETE_MODULE. The first three lessons each need the session's breath
//! cycle count to reach `required_cycles`; the count is never reset, so
//! once the first lesson is earned the next two only need the event.
//! BACK from the first lesson returns to the orientation intro, and a
//! paused session may still be marked complete. There is no tone.

use attuneconf::SessionsConfig;

use crate::module::{Action, Guard, ModuleDefinition, ModuleKind, TableBuilder, Tuning};
use crate::stage::{EventKind, Stage};

pub const STAGES: [Stage; 5] = [
    Stage::Lesson1,
    Stage::Lesson2,
    Stage::Lesson3,
    Stage::Lesson4,
    Stage::Lesson5,
];

/// Lessons gated on breath cycles.
const BREATHING_LESSONS: [Stage; 3] = [Stage::Lesson1, Stage::Lesson2, Stage::Lesson3];

pub fn definition(config: &SessionsConfig) -> ModuleDefinition {
    let mut builder =
        TableBuilder::new(ModuleKind::BreathOfSource, &STAGES, Tuning::from_config(config))
            .advance_on(EventKind::CompleteLesson, EventKind::CompleteModule)
            .start_guard(Guard::ComfortOk)
            .start_action(Action::BeginLessons)
            .internal(Stage::Intro, EventKind::Comfort, Action::RecordComfort)
            .advance_action(Action::CompleteLesson)
            .back_action(Action::PreviousLesson)
            .back_to_intro()
            .finish_from_paused();
    for stage in BREATHING_LESSONS {
        builder = builder
            .internal(stage, EventKind::BreathCycle, Action::CountBreathCycle)
            .guard_next(stage, Guard::EnoughCycles);
    }
    builder.build()
}
