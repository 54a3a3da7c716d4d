//! Stage and event vocabulary shared by every guided module.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named point in a guided session.
///
/// Each module uses a subset; the table in its [`ModuleDefinition`] decides
/// which ones are reachable.
///
/// [`ModuleDefinition`]: crate::ModuleDefinition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Intro,
    // unhooking
    Fog,
    Recognition,
    Clearing,
    Calm,
    // earth
    Ground,
    Pulse,
    Sync,
    // liberation
    Fear,
    Crossing,
    Expansion,
    // earth + liberation
    Integration,
    // collective
    Circle,
    BreathSync,
    Coherence,
    Witness,
    // breath of source
    Lesson1,
    Lesson2,
    Lesson3,
    Lesson4,
    Lesson5,
    Paused,
    Complete,
    Exit,
}

impl Stage {
    /// Terminal stages accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Exit)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Intro => "intro",
            Stage::Fog => "fog",
            Stage::Recognition => "recognition",
            Stage::Clearing => "clearing",
            Stage::Calm => "calm",
            Stage::Ground => "ground",
            Stage::Pulse => "pulse",
            Stage::Sync => "sync",
            Stage::Fear => "fear",
            Stage::Crossing => "crossing",
            Stage::Expansion => "expansion",
            Stage::Integration => "integration",
            Stage::Circle => "circle",
            Stage::BreathSync => "breath_sync",
            Stage::Coherence => "coherence",
            Stage::Witness => "witness",
            Stage::Lesson1 => "lesson1",
            Stage::Lesson2 => "lesson2",
            Stage::Lesson3 => "lesson3",
            Stage::Lesson4 => "lesson4",
            Stage::Lesson5 => "lesson5",
            Stage::Paused => "paused",
            Stage::Complete => "complete",
            Stage::Exit => "exit",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A discrete input from the host shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Start,
    Next,
    Back,
    Pause,
    Resume,
    Abort,
    Complete,
    ClearFragment,
    BreathClear,
    StepIn,
    PulseSync,
    BreathSync,
    JoinCircle,
    SyncBreath,
    CoherenceAchieved,
    BreathCycle,
    CompleteLesson,
    CompleteModule,
    AudioPermission { granted: bool },
    DeviceCheck { ok: bool },
    ArousalUpdate { level: u8 },
    Comfort { ok: bool },
}

/// Payload-free discriminant of an [`Event`], used as the table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Start,
    Next,
    Back,
    Pause,
    Resume,
    Abort,
    Complete,
    ClearFragment,
    BreathClear,
    StepIn,
    PulseSync,
    BreathSync,
    JoinCircle,
    SyncBreath,
    CoherenceAchieved,
    BreathCycle,
    CompleteLesson,
    CompleteModule,
    AudioPermission,
    DeviceCheck,
    ArousalUpdate,
    Comfort,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Start => EventKind::Start,
            Event::Next => EventKind::Next,
            Event::Back => EventKind::Back,
            Event::Pause => EventKind::Pause,
            Event::Resume => EventKind::Resume,
            Event::Abort => EventKind::Abort,
            Event::Complete => EventKind::Complete,
            Event::ClearFragment => EventKind::ClearFragment,
            Event::BreathClear => EventKind::BreathClear,
            Event::StepIn => EventKind::StepIn,
            Event::PulseSync => EventKind::PulseSync,
            Event::BreathSync => EventKind::BreathSync,
            Event::JoinCircle => EventKind::JoinCircle,
            Event::SyncBreath => EventKind::SyncBreath,
            Event::CoherenceAchieved => EventKind::CoherenceAchieved,
            Event::BreathCycle => EventKind::BreathCycle,
            Event::CompleteLesson => EventKind::CompleteLesson,
            Event::CompleteModule => EventKind::CompleteModule,
            Event::AudioPermission { .. } => EventKind::AudioPermission,
            Event::DeviceCheck { .. } => EventKind::DeviceCheck,
            Event::ArousalUpdate { .. } => EventKind::ArousalUpdate,
            Event::Comfort { .. } => EventKind::Comfort,
        }
    }
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Start => "START",
            EventKind::Next => "NEXT",
            EventKind::Back => "BACK",
            EventKind::Pause => "PAUSE",
            EventKind::Resume => "RESUME",
            EventKind::Abort => "ABORT",
            EventKind::Complete => "COMPLETE",
            EventKind::ClearFragment => "CLEAR_FRAGMENT",
            EventKind::BreathClear => "BREATH_CLEAR",
            EventKind::StepIn => "STEP_IN",
            EventKind::PulseSync => "PULSE_SYNC",
            EventKind::BreathSync => "BREATH_SYNC",
            EventKind::JoinCircle => "JOIN_CIRCLE",
            EventKind::SyncBreath => "SYNC_BREATH",
            EventKind::CoherenceAchieved => "COHERENCE_ACHIEVED",
            EventKind::BreathCycle => "BREATH_CYCLE",
            EventKind::CompleteLesson => "COMPLETE_LESSON",
            EventKind::CompleteModule => "COMPLETE_MODULE",
            EventKind::AudioPermission => "AUDIO_PERMISSION",
            EventKind::DeviceCheck => "DEVICE_CHECK",
            EventKind::ArousalUpdate => "AROUSAL_UPDATE",
            EventKind::Comfort => "COMFORT",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseEventError {
    #[error("unknown event '{0}'")]
    Unknown(String),

    #[error("event {0} needs a value, e.g. {1}")]
    MissingValue(EventKind, &'static str),

    #[error("event {event} cannot take value '{value}'")]
    BadValue { event: EventKind, value: String },

    #[error("event {0} takes no value")]
    UnexpectedValue(EventKind),
}

/// Parses the host-shell spelling of an event.
///
/// Names are case-insensitive and accept either `snake_case` or
/// `SCREAMING_SNAKE_CASE`; payload events take `name=value`:
/// `next`, `CLEAR_FRAGMENT`, `audio_permission=true`, `arousal=5`.
impl FromStr for Event {
    type Err = ParseEventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, value) = match s.trim().split_once('=') {
            Some((name, value)) => (name.trim(), Some(value.trim())),
            None => (s.trim(), None),
        };

        let simple = |event: Event| match value {
            Some(_) => Err(ParseEventError::UnexpectedValue(event.kind())),
            None => Ok(event),
        };

        match name.to_ascii_lowercase().as_str() {
            "start" => simple(Event::Start),
            "next" => simple(Event::Next),
            "back" => simple(Event::Back),
            "pause" => simple(Event::Pause),
            "resume" => simple(Event::Resume),
            "abort" => simple(Event::Abort),
            "complete" => simple(Event::Complete),
            "clear_fragment" => simple(Event::ClearFragment),
            "breath_clear" => simple(Event::BreathClear),
            "step_in" => simple(Event::StepIn),
            "pulse_sync" => simple(Event::PulseSync),
            "breath_sync" => simple(Event::BreathSync),
            "join_circle" => simple(Event::JoinCircle),
            "sync_breath" => simple(Event::SyncBreath),
            "coherence_achieved" => simple(Event::CoherenceAchieved),
            "breath_cycle" => simple(Event::BreathCycle),
            "complete_lesson" => simple(Event::CompleteLesson),
            "complete_module" => simple(Event::CompleteModule),
            "audio_permission" => {
                let granted = parse_value(EventKind::AudioPermission, value, "audio_permission=true")?;
                Ok(Event::AudioPermission { granted })
            }
            "device_check" => {
                let ok = parse_value(EventKind::DeviceCheck, value, "device_check=true")?;
                Ok(Event::DeviceCheck { ok })
            }
            "arousal" | "arousal_update" => {
                let level = parse_value(EventKind::ArousalUpdate, value, "arousal=4")?;
                Ok(Event::ArousalUpdate { level })
            }
            "comfort" | "comfort_check" => {
                let ok = parse_value(EventKind::Comfort, value, "comfort=false")?;
                Ok(Event::Comfort { ok })
            }
            _ => Err(ParseEventError::Unknown(s.trim().to_string())),
        }
    }
}

fn parse_value<T: FromStr>(
    event: EventKind,
    value: Option<&str>,
    example: &'static str,
) -> Result<T, ParseEventError> {
    let raw = value.ok_or(ParseEventError::MissingValue(event, example))?;
    raw.parse().map_err(|_| ParseEventError::BadValue {
        event,
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Complete.is_terminal());
        assert!(Stage::Exit.is_terminal());
        assert!(!Stage::Paused.is_terminal());
        assert!(!Stage::Intro.is_terminal());
    }

    #[test]
    fn test_parse_simple_events() {
        assert_eq!("next".parse::<Event>(), Ok(Event::Next));
        assert_eq!("CLEAR_FRAGMENT".parse::<Event>(), Ok(Event::ClearFragment));
        assert_eq!(" Breath_Clear ".parse::<Event>(), Ok(Event::BreathClear));
    }

    #[test]
    fn test_parse_payload_events() {
        assert_eq!(
            "audio_permission=false".parse::<Event>(),
            Ok(Event::AudioPermission { granted: false })
        );
        assert_eq!(
            "arousal=5".parse::<Event>(),
            Ok(Event::ArousalUpdate { level: 5 })
        );
        assert_eq!(
            "device_check = true".parse::<Event>(),
            Ok(Event::DeviceCheck { ok: true })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            "teleport".parse::<Event>(),
            Err(ParseEventError::Unknown("teleport".to_string()))
        );
        assert!(matches!(
            "arousal".parse::<Event>(),
            Err(ParseEventError::MissingValue(EventKind::ArousalUpdate, _))
        ));
        assert!(matches!(
            "arousal=lots".parse::<Event>(),
            Err(ParseEventError::BadValue { .. })
        ));
        assert_eq!(
            "next=1".parse::<Event>(),
            Err(ParseEventError::UnexpectedValue(EventKind::Next))
        );
    }

    #[test]
    fn test_parse_circle_and_lesson_events() {
        assert_eq!("JOIN_CIRCLE".parse::<Event>(), Ok(Event::JoinCircle));
        assert_eq!("breath_cycle".parse::<Event>(), Ok(Event::BreathCycle));
        assert_eq!(
            "comfort_check=true".parse::<Event>(),
            Ok(Event::Comfort { ok: true })
        );
        assert_eq!(Stage::BreathSync.to_string(), "breath_sync");
        assert_eq!(Event::CompleteLesson.kind().as_str(), "COMPLETE_LESSON");
    }

    #[test]
    fn test_event_kind_names() {
        assert_eq!(Event::ArousalUpdate { level: 2 }.kind().as_str(), "AROUSAL_UPDATE");
        assert_eq!(Stage::Recognition.to_string(), "recognition");
    }
}
