//! Session identity and the counters guards read from.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one run of a guided session: `<prefix>_<unix-millis>_<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate(prefix: &str, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}_{}_{}", prefix, at.timestamp_millis(), &suffix[..9]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fragment and fog counters of the unhooking module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnhookingProgress {
    pub fragments_cleared: u32,
    pub total_fragments: u32,
    /// Always within [0, 1].
    pub fog_intensity: f32,
}

impl UnhookingProgress {
    pub fn new(total_fragments: u32) -> Self {
        Self {
            fragments_cleared: 0,
            total_fragments,
            fog_intensity: 1.0,
        }
    }

    /// Saturates at `total_fragments`.
    pub fn clear_fragment(&mut self) {
        self.fragments_cleared = (self.fragments_cleared + 1).min(self.total_fragments);
    }

    pub fn breath_clear(&mut self, step: f32) {
        // Snap float residue so five 0.2 steps land on exactly 0.0
        let next = ((self.fog_intensity - step) * 1e6).round() / 1e6;
        self.fog_intensity = next.clamp(0.0, 1.0);
    }

    pub fn reset_fog(&mut self) {
        self.fog_intensity = 1.0;
    }

    pub fn all_fragments_cleared(&self) -> bool {
        self.fragments_cleared >= self.total_fragments
    }

    pub fn fog_cleared(&self, threshold: f32) -> bool {
        self.fog_intensity <= threshold
    }
}

/// Grounding flags of the earth module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarthProgress {
    pub ground_connected: bool,
    pub pulse_aligned: bool,
    pub breath_synced: bool,
}

/// Comfort readings of the liberation module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiberationProgress {
    pub device_ok: bool,
    pub comfortable: bool,
    /// 0..=10
    pub arousal_level: u8,
}

impl Default for LiberationProgress {
    fn default() -> Self {
        Self {
            device_ok: true,
            comfortable: true,
            arousal_level: 0,
        }
    }
}

pub const MAX_AROUSAL: u8 = 10;

/// Circle flags of the collective module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveProgress {
    pub circle_joined: bool,
    pub breath_synced: bool,
    pub coherence_reached: bool,
    /// Includes the local participant.
    pub participant_count: u32,
}

impl Default for CollectiveProgress {
    fn default() -> Self {
        Self {
            circle_joined: false,
            breath_synced: false,
            coherence_reached: false,
            participant_count: 1,
        }
    }
}

impl CollectiveProgress {
    pub fn join_circle(&mut self) {
        self.circle_joined = true;
        self.participant_count = self.participant_count.saturating_add(1);
    }
}

pub const LESSON_COUNT: u8 = 5;

/// Lesson counters of the breath-of-source module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreathProgress {
    /// Cumulative over the whole session.
    pub breath_cycles: u32,
    /// 1-based, 0 before START.
    pub current_lesson: u8,
    pub completed_lessons: Vec<u8>,
    pub comfortable: bool,
}

impl Default for BreathProgress {
    fn default() -> Self {
        Self {
            breath_cycles: 0,
            current_lesson: 0,
            completed_lessons: Vec::new(),
            comfortable: true,
        }
    }
}

impl BreathProgress {
    pub fn count_cycle(&mut self) {
        self.breath_cycles = self.breath_cycles.saturating_add(1);
    }

    /// Records the current lesson as done and moves to the next one.
    pub fn complete_lesson(&mut self) {
        let lesson = self.current_lesson;
        if lesson > 0 && !self.completed_lessons.contains(&lesson) {
            self.completed_lessons.push(lesson);
        }
        self.current_lesson = (lesson + 1).min(LESSON_COUNT);
    }

    pub fn previous_lesson(&mut self) {
        self.current_lesson = self.current_lesson.saturating_sub(1);
    }
}

/// Module-specific counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", rename_all = "snake_case")]
pub enum Progress {
    Unhooking(UnhookingProgress),
    Earth(EarthProgress),
    Liberation(LiberationProgress),
    Collective(CollectiveProgress),
    BreathOfSource(BreathProgress),
}

/// Mutable record of one session run.
///
/// Only the sequencer that owns it mutates it; everyone else gets `&`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Assigned by START.
    pub session_id: Option<SessionId>,
    pub started_at: Option<DateTime<Utc>>,
    pub audio_granted: bool,
    pub progress: Progress,
}

impl SessionContext {
    pub fn new(progress: Progress) -> Self {
        Self {
            session_id: None,
            started_at: None,
            audio_granted: false,
            progress,
        }
    }

    pub fn unhooking(&self) -> Option<&UnhookingProgress> {
        match &self.progress {
            Progress::Unhooking(p) => Some(p),
            _ => None,
        }
    }

    pub fn earth(&self) -> Option<&EarthProgress> {
        match &self.progress {
            Progress::Earth(p) => Some(p),
            _ => None,
        }
    }

    pub fn liberation(&self) -> Option<&LiberationProgress> {
        match &self.progress {
            Progress::Liberation(p) => Some(p),
            _ => None,
        }
    }

    pub fn collective(&self) -> Option<&CollectiveProgress> {
        match &self.progress {
            Progress::Collective(p) => Some(p),
            _ => None,
        }
    }

    pub fn breath(&self) -> Option<&BreathProgress> {
        match &self.progress {
            Progress::BreathOfSource(p) => Some(p),
            _ => None,
        }
    }
}
