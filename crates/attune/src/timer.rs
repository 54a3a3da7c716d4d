//! Auto-advance timer keyed by stage generation.
//!
//! The sequencer bumps its generation on every committed stage change. A
//! pending advance remembers the generation it was armed under and only
//! fires while that generation is still current, so a dwell timer can never
//! push a stage the user already left via BACK, PAUSE or ABORT.

use std::time::Instant;

use tracing::{debug, warn};

use crate::stage::{Event, Stage};

#[derive(Debug, Clone, PartialEq)]
struct PendingAdvance {
    generation: u64,
    stage: Stage,
    due: Instant,
    event: Event,
}

/// At most one pending auto-advance.
#[derive(Debug, Default)]
pub struct AutoAdvance {
    pending: Option<PendingAdvance>,
}

impl AutoAdvance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer, replacing any earlier one.
    pub fn arm(&mut self, generation: u64, stage: Stage, due: Instant, event: Event) {
        debug!("arming auto-advance from {} (generation {})", stage, generation);
        self.pending = Some(PendingAdvance {
            generation,
            stage,
            due,
            event,
        });
    }

    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!(
                "cancelled auto-advance from {} (generation {})",
                pending.stage, pending.generation
            );
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.due)
    }

    /// Take the pending event if it is due and still belongs to the current
    /// generation. A due timer from an older generation is dropped.
    pub fn take_due(&mut self, now: Instant, generation: u64) -> Option<Event> {
        if self.pending.as_ref().map_or(true, |p| p.due > now) {
            return None;
        }
        let pending = self.pending.take()?;
        if pending.generation != generation {
            warn!(
                "dropping stale auto-advance armed in {} (generation {}, now {})",
                pending.stage, pending.generation, generation
            );
            return None;
        }
        Some(pending.event)
    }
}
