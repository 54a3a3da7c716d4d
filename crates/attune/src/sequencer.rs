//! Stage sequencer: owns the current stage and the session counters.
//!
//! Every input goes through [`StageSequencer::dispatch_at`]:
//!
//! 1. terminal stage, or no table entry for `(stage, event)` → ignored
//! 2. guard fails → blocked (silent, retryable)
//! 3. actions mutate the context
//! 4. a non-internal target commits: generation bump, timer re-arm,
//!    transition record, snapshot broadcast
//!
//! Events are applied strictly in call order; nothing is coalesced.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::context::SessionContext;
use crate::module::{Guard, ModuleDefinition, ModuleKind, ResumePolicy, Target};
use crate::stage::{Event, Stage};
use crate::telemetry::{TransitionRecord, TransitionSink};
use crate::timer::AutoAdvance;

/// What a dispatched event did. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Transitioned { from: Stage, to: Stage },
    /// Internal transition: counters changed, stage did not.
    Updated,
    /// A guard refused; the same event may succeed later.
    Blocked(Guard),
    /// No table entry for this stage and event.
    Ignored,
}

impl Outcome {
    pub fn changed_stage(&self) -> bool {
        matches!(self, Outcome::Transitioned { .. })
    }
}

/// Read-only view broadcast to observers after every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSnapshot {
    pub module: ModuleKind,
    pub stage: Stage,
    pub generation: u64,
    pub context: SessionContext,
}

pub struct StageSequencer {
    definition: ModuleDefinition,
    stage: Stage,
    context: SessionContext,
    /// Stage left by the last PAUSE, for history resume.
    paused_from: Option<Stage>,
    generation: u64,
    timer: AutoAdvance,
    log: Vec<TransitionRecord>,
    sink: Arc<dyn TransitionSink>,
    watch: watch::Sender<StageSnapshot>,
}

impl StageSequencer {
    pub fn new(definition: ModuleDefinition, sink: Arc<dyn TransitionSink>) -> Self {
        let stage = definition.initial;
        let context = definition.fresh_context();
        let (watch, _rx) = watch::channel(StageSnapshot {
            module: definition.kind,
            stage,
            generation: 0,
            context: context.clone(),
        });

        Self {
            definition,
            stage,
            context,
            paused_from: None,
            generation: 0,
            timer: AutoAdvance::new(),
            log: Vec::new(),
            sink,
            watch,
        }
    }

    /// Begin the session. Only meaningful in the initial stage; elsewhere it
    /// is ignored like any other unlisted event.
    pub fn start(&mut self) -> Outcome {
        self.start_at(Instant::now())
    }

    pub fn start_at(&mut self, now: Instant) -> Outcome {
        self.dispatch_at(Event::Start, now)
    }

    pub fn dispatch(&mut self, event: Event) -> Outcome {
        self.dispatch_at(event, Instant::now())
    }

    /// Apply `event`, with `now` used to arm any auto-advance timer.
    pub fn dispatch_at(&mut self, event: Event, now: Instant) -> Outcome {
        let kind = event.kind();

        if self.stage.is_terminal() {
            debug!("{}: {} ignored in terminal stage {}", self.definition.kind, kind, self.stage);
            return Outcome::Ignored;
        }

        let Some(transition) = self.definition.transition(self.stage, kind) else {
            debug!("{}: no transition for {} in {}", self.definition.kind, kind, self.stage);
            return Outcome::Ignored;
        };

        if let Some(guard) = transition.guard {
            if !guard.check(&self.context, &self.definition.tuning) {
                debug!("{}: {} in {} blocked by {:?}", self.definition.kind, kind, self.stage, guard);
                return Outcome::Blocked(guard);
            }
        }

        let target = transition.target;
        let wall = Utc::now();
        for action in transition.actions.clone() {
            action.apply(
                &mut self.context,
                &event,
                &self.definition.tuning,
                self.definition.kind,
                wall,
            );
        }

        let to = match target {
            Target::Stay => {
                self.publish();
                return Outcome::Updated;
            }
            Target::Stage(stage) => stage,
            Target::Resume => match self.definition.resume {
                ResumePolicy::Initial => self.definition.initial,
                ResumePolicy::History => self.paused_from.unwrap_or(self.definition.initial),
            },
        };

        Outcome::Transitioned {
            from: self.stage,
            to: self.commit(to, event, now),
        }
    }

    /// Fire the pending auto-advance if it is due and still current.
    pub fn poll_timers(&mut self, now: Instant) -> Option<Outcome> {
        let event = self.timer.take_due(now, self.generation)?;
        debug!("{}: auto-advance fired in {}", self.definition.kind, self.stage);
        Some(self.dispatch_at(event, now))
    }

    /// Deadline of the pending auto-advance, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    fn commit(&mut self, to: Stage, event: Event, now: Instant) -> Stage {
        let from = self.stage;

        if to == Stage::Paused {
            self.paused_from = Some(from);
        } else if from == Stage::Paused {
            self.paused_from = None;
        }

        self.stage = to;
        self.generation += 1;
        self.timer.cancel();
        if let Some(dwell) = self.definition.dwell(to) {
            self.timer.arm(self.generation, to, now + dwell, Event::Next);
        }

        let record = TransitionRecord {
            module: self.definition.kind,
            session_id: self.context.session_id.as_ref().map(|id| id.to_string()),
            from,
            to,
            event: event.kind(),
            generation: self.generation,
            at: Utc::now(),
        };

        if to == Stage::Exit {
            // Aborted sessions keep nothing
            self.context = self.definition.fresh_context();
        }

        info!("{}: {} --{}--> {}", self.definition.kind, from, record.event, to);
        self.sink.record(&record);
        self.log.push(record);
        self.publish();
        to
    }

    fn publish(&self) {
        self.watch.send_replace(self.snapshot());
    }

    pub fn snapshot(&self) -> StageSnapshot {
        StageSnapshot {
            module: self.definition.kind,
            stage: self.stage,
            generation: self.generation,
            context: self.context.clone(),
        }
    }

    /// Observe every change. The receiver starts at the current snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StageSnapshot> {
        self.watch.subscribe()
    }

    pub fn current_stage(&self) -> Stage {
        self.stage
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn definition(&self) -> &ModuleDefinition {
        &self.definition
    }

    /// Incremented on every committed stage change.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Every committed transition, oldest first.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.log
    }

    pub fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::ModuleKind;
    use crate::telemetry::NullSink;
    use attuneconf::SessionsConfig;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockSink {
        records: Mutex<Vec<TransitionRecord>>,
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
            }
        }

        fn records(&self) -> Vec<TransitionRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl TransitionSink for MockSink {
        fn record(&self, record: &TransitionRecord) {
            self.records.lock().unwrap().push(record.clone());
        }
    }

    fn sequencer(kind: ModuleKind) -> StageSequencer {
        StageSequencer::new(
            ModuleDefinition::for_kind(kind, &SessionsConfig::default()),
            Arc::new(NullSink),
        )
    }

    fn liberation_with_dwell(secs: u64) -> StageSequencer {
        let mut config = SessionsConfig::default();
        config.liberation.crossing_dwell_secs = secs;
        StageSequencer::new(
            ModuleDefinition::for_kind(ModuleKind::Liberation, &config),
            Arc::new(NullSink),
        )
    }

    fn unhooking_in_clearing() -> StageSequencer {
        let mut seq = sequencer(ModuleKind::Unhooking);
        seq.start();
        for _ in 0..8 {
            seq.dispatch(Event::ClearFragment);
        }
        seq.dispatch(Event::Next);
        seq.dispatch(Event::Next);
        assert_eq!(seq.current_stage(), Stage::Clearing);
        seq
    }

    #[test]
    fn test_start_enters_fog() {
        let mut seq = sequencer(ModuleKind::Unhooking);
        assert_eq!(seq.current_stage(), Stage::Intro);
        assert!(seq.context().session_id.is_none());

        let outcome = seq.start();

        assert_eq!(outcome, Outcome::Transitioned { from: Stage::Intro, to: Stage::Fog });
        assert_eq!(seq.current_stage(), Stage::Fog);
        let progress = seq.context().unhooking().unwrap();
        assert_eq!(progress.fragments_cleared, 0);
        assert_eq!(progress.fog_intensity, 1.0);
        assert!(seq.context().session_id.as_ref().unwrap().as_str().starts_with("unhook_"));
        assert!(seq.context().started_at.is_some());
    }

    #[test]
    fn test_start_twice_is_ignored() {
        let mut seq = sequencer(ModuleKind::Unhooking);
        seq.start();
        let id = seq.context().session_id.clone();
        assert_eq!(seq.start(), Outcome::Ignored);
        assert_eq!(seq.context().session_id, id);
    }

    #[test]
    fn test_unlisted_events_are_pure_noops() {
        for kind in ModuleKind::ALL {
            let mut seq = sequencer(kind);
            seq.start();
            let stage = seq.current_stage();
            let before = seq.context().clone();
            let generation = seq.generation();

            for event in [Event::Resume, Event::Back, Event::Start, Event::AudioPermission { granted: true }] {
                assert_eq!(seq.dispatch(event), Outcome::Ignored, "{kind}: {event:?}");
            }

            assert_eq!(seq.current_stage(), stage);
            assert_eq!(seq.context(), &before);
            assert_eq!(seq.generation(), generation);
        }
    }

    #[test]
    fn test_fragment_guard_boundary() {
        let mut seq = sequencer(ModuleKind::Unhooking);
        seq.start();

        for _ in 0..7 {
            assert_eq!(seq.dispatch(Event::ClearFragment), Outcome::Updated);
        }
        assert_eq!(seq.dispatch(Event::Next), Outcome::Blocked(Guard::AllFragmentsCleared));
        assert_eq!(seq.current_stage(), Stage::Fog);

        seq.dispatch(Event::ClearFragment);
        // one past the total still saturates at the total
        seq.dispatch(Event::ClearFragment);
        assert_eq!(seq.context().unhooking().unwrap().fragments_cleared, 8);

        assert_eq!(
            seq.dispatch(Event::Next),
            Outcome::Transitioned { from: Stage::Fog, to: Stage::Recognition }
        );
    }

    #[test]
    fn test_fog_guard_boundary() {
        let mut seq = unhooking_in_clearing();

        for _ in 0..4 {
            seq.dispatch(Event::BreathClear);
        }
        // 0.2 remaining is above the 0.1 threshold
        assert_eq!(seq.dispatch(Event::Next), Outcome::Blocked(Guard::FogCleared));

        seq.dispatch(Event::BreathClear);
        assert_eq!(seq.context().unhooking().unwrap().fog_intensity, 0.0);
        assert_eq!(
            seq.dispatch(Event::Next),
            Outcome::Transitioned { from: Stage::Clearing, to: Stage::Calm }
        );
    }

    #[test]
    fn test_back_returns_one_stage() {
        let mut seq = unhooking_in_clearing();
        seq.dispatch(Event::Back);
        assert_eq!(seq.current_stage(), Stage::Recognition);
        seq.dispatch(Event::Back);
        assert_eq!(seq.current_stage(), Stage::Fog);
        assert_eq!(seq.dispatch(Event::Back), Outcome::Ignored);
    }

    #[test]
    fn test_abort_from_every_forward_stage() {
        let mut depth = 0;
        loop {
            let mut seq = sequencer(ModuleKind::Earth);
            seq.start();
            let mut reached = 0;
            while reached < depth {
                for event in [Event::StepIn, Event::PulseSync, Event::BreathSync] {
                    seq.dispatch(event);
                }
                if !seq.dispatch(Event::Next).changed_stage() {
                    break;
                }
                reached += 1;
            }
            if reached < depth {
                break;
            }

            let from = seq.current_stage();
            assert_eq!(seq.dispatch(Event::Abort), Outcome::Transitioned { from, to: Stage::Exit });
            assert!(seq.is_finished());
            depth += 1;
        }
        assert_eq!(depth, 4);
    }

    #[test]
    fn test_abort_discards_context() {
        let mut seq = sequencer(ModuleKind::Unhooking);
        seq.start();
        seq.dispatch(Event::ClearFragment);
        seq.dispatch(Event::Abort);
        assert_eq!(seq.context(), &seq.definition().fresh_context());
        assert_eq!(seq.dispatch(Event::Start), Outcome::Ignored);
    }

    #[test]
    fn test_pause_resume_returns_to_intro() {
        let mut seq = unhooking_in_clearing();
        seq.dispatch(Event::BreathClear);

        seq.dispatch(Event::Pause);
        assert_eq!(seq.current_stage(), Stage::Paused);
        assert_eq!(seq.dispatch(Event::Next), Outcome::Ignored);

        seq.dispatch(Event::Resume);
        assert_eq!(seq.current_stage(), Stage::Intro);
        // counters survive the pause
        assert_eq!(seq.context().unhooking().unwrap().fragments_cleared, 8);

        // starting again resets the fog and skips straight past the fragments
        seq.start();
        assert_eq!(seq.context().unhooking().unwrap().fog_intensity, 1.0);
        assert!(seq.dispatch(Event::Next).changed_stage());
    }

    #[test]
    fn test_liberation_resume_uses_history() {
        let mut seq = sequencer(ModuleKind::Liberation);
        seq.start();
        seq.dispatch(Event::Next);
        assert_eq!(seq.current_stage(), Stage::Crossing);

        seq.dispatch(Event::Pause);
        seq.dispatch(Event::Resume);
        assert_eq!(seq.current_stage(), Stage::Crossing);
    }

    #[test]
    fn test_liberation_comfort_guard() {
        let mut seq = sequencer(ModuleKind::Liberation);
        seq.start();

        seq.dispatch(Event::ArousalUpdate { level: 7 });
        assert_eq!(seq.dispatch(Event::Next), Outcome::Blocked(Guard::ComfortOk));
        seq.dispatch(Event::ArousalUpdate { level: 6 });
        seq.dispatch(Event::Comfort { ok: false });
        assert_eq!(seq.dispatch(Event::Next), Outcome::Blocked(Guard::ComfortOk));
        seq.dispatch(Event::Comfort { ok: true });
        assert!(seq.dispatch(Event::Next).changed_stage());
    }

    #[test]
    fn test_liberation_device_check_gates_start() {
        let mut seq = sequencer(ModuleKind::Liberation);
        seq.dispatch(Event::DeviceCheck { ok: false });
        assert_eq!(seq.start(), Outcome::Blocked(Guard::DeviceOk));
        assert!(seq.context().session_id.is_none());
        seq.dispatch(Event::DeviceCheck { ok: true });
        assert!(seq.start().changed_stage());
    }

    #[test]
    fn test_auto_advance_fires_once_due() {
        let base = Instant::now();
        let mut seq = liberation_with_dwell(45);
        seq.start_at(base);
        seq.dispatch_at(Event::Next, base);
        assert_eq!(seq.next_deadline(), Some(base + Duration::from_secs(45)));

        assert_eq!(seq.poll_timers(base + Duration::from_secs(44)), None);
        let fired = seq.poll_timers(base + Duration::from_secs(45));
        assert_eq!(
            fired,
            Some(Outcome::Transitioned { from: Stage::Crossing, to: Stage::Expansion })
        );
        assert_eq!(seq.next_deadline(), None);
    }

    #[test]
    fn test_no_timer_without_dwell() {
        let base = Instant::now();
        let mut seq = sequencer(ModuleKind::Liberation);
        seq.start_at(base);
        seq.dispatch_at(Event::Next, base);
        assert_eq!(seq.current_stage(), Stage::Crossing);
        assert_eq!(seq.next_deadline(), None);
        assert_eq!(seq.poll_timers(base + Duration::from_secs(3600)), None);
        assert_eq!(seq.current_stage(), Stage::Crossing);
    }

    #[test]
    fn test_back_cancels_auto_advance() {
        let base = Instant::now();
        let mut seq = liberation_with_dwell(45);
        seq.start_at(base);
        seq.dispatch_at(Event::Next, base);
        seq.dispatch_at(Event::Back, base + Duration::from_secs(10));
        assert_eq!(seq.current_stage(), Stage::Fear);

        assert_eq!(seq.poll_timers(base + Duration::from_secs(60)), None);
        assert_eq!(seq.current_stage(), Stage::Fear);
    }

    #[test]
    fn test_reentering_rearms_from_new_time() {
        let base = Instant::now();
        let mut seq = liberation_with_dwell(45);
        seq.start_at(base);
        seq.dispatch_at(Event::Next, base);
        seq.dispatch_at(Event::Pause, base + Duration::from_secs(30));
        seq.dispatch_at(Event::Resume, base + Duration::from_secs(40));
        assert_eq!(seq.current_stage(), Stage::Crossing);

        // the first arming would have fired at 45s
        assert_eq!(seq.poll_timers(base + Duration::from_secs(50)), None);
        assert!(seq.poll_timers(base + Duration::from_secs(85)).is_some());
        assert_eq!(seq.current_stage(), Stage::Expansion);
    }

    #[test]
    fn test_terminal_stage_absorbs_everything() {
        let mut seq = sequencer(ModuleKind::Earth);
        seq.start();
        seq.dispatch(Event::Abort);
        let generation = seq.generation();
        for event in [Event::Start, Event::Resume, Event::Next, Event::Abort] {
            assert_eq!(seq.dispatch(event), Outcome::Ignored);
        }
        assert_eq!(seq.generation(), generation);
    }

    #[test]
    fn test_sink_and_log_see_commits_only() {
        let sink = Arc::new(MockSink::new());
        let mut seq = StageSequencer::new(
            ModuleDefinition::for_kind(ModuleKind::Unhooking, &SessionsConfig::default()),
            sink.clone(),
        );
        seq.start();
        seq.dispatch(Event::ClearFragment);
        seq.dispatch(Event::Next);
        seq.dispatch(Event::Pause);

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].to, Stage::Fog);
        assert_eq!(records[1].to, Stage::Paused);
        assert_eq!(records[1].generation, 2);
        assert_eq!(seq.transitions(), records.as_slice());
        assert!(records[0].session_id.as_ref().unwrap().starts_with("unhook_"));
    }

    #[test]
    fn test_subscribers_see_updates() {
        let mut seq = sequencer(ModuleKind::Unhooking);
        let mut rx = seq.subscribe();
        assert_eq!(rx.borrow_and_update().stage, Stage::Intro);

        seq.start();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().stage, Stage::Fog);

        seq.dispatch(Event::ClearFragment);
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.context.unhooking().unwrap().fragments_cleared, 1);

        seq.dispatch(Event::Resume);
        assert!(!rx.has_changed().unwrap());
    }
}
