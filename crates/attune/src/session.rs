//! A sequencer and a tone engine wired together.
//!
//! The session watches the sequencer's snapshot channel and, whenever the
//! stage moves, asks the tone engine for that stage's mode. Terminal stages
//! stop the tone.

use std::sync::Arc;
use std::time::Instant;

use attuneconf::AttuneConfig;
use tokio::sync::watch;
use tracing::debug;

use crate::context::SessionContext;
use crate::module::{ModuleDefinition, ModuleKind};
use crate::sequencer::{Outcome, StageSequencer, StageSnapshot};
use crate::stage::{Event, Stage};
use crate::telemetry::TransitionSink;
use crate::tone::{AudioBackend, PermissionState, ToneBinding, ToneEngine, ToneSettings};

pub struct GuidedSession<B: AudioBackend> {
    sequencer: StageSequencer,
    tone: ToneEngine<B>,
    observer: watch::Receiver<StageSnapshot>,
}

impl<B: AudioBackend> GuidedSession<B> {
    pub fn new(sequencer: StageSequencer, tone: ToneEngine<B>) -> Self {
        let observer = sequencer.subscribe();
        Self {
            sequencer,
            tone,
            observer,
        }
    }

    /// Build a session for `kind` with tunings and tones taken from `config`.
    pub fn from_config(
        kind: ModuleKind,
        config: &AttuneConfig,
        backend: B,
        sink: Arc<dyn TransitionSink>,
    ) -> Self {
        let definition = ModuleDefinition::for_kind(kind, &config.sessions);
        let tone = ToneEngine::new(
            backend,
            ToneBinding::with_overrides(&config.tones),
            ToneSettings::from(&config.audio),
        );
        Self::new(StageSequencer::new(definition, sink), tone)
    }

    pub fn dispatch(&mut self, event: Event) -> Outcome {
        self.dispatch_at(event, Instant::now())
    }

    pub fn dispatch_at(&mut self, event: Event, now: Instant) -> Outcome {
        let outcome = self.sequencer.dispatch_at(event, now);
        self.sync_tone();
        outcome
    }

    /// Fire any due auto-advance.
    pub fn poll_at(&mut self, now: Instant) -> Option<Outcome> {
        let outcome = self.sequencer.poll_timers(now);
        self.sync_tone();
        outcome
    }

    /// Request audio (from a user gesture) and report the answer to the
    /// sequencer as an `AUDIO_PERMISSION` event.
    pub fn grant_audio_at(&mut self, now: Instant) -> PermissionState {
        let state = self.tone.request_permission();
        self.sequencer.dispatch_at(
            Event::AudioPermission {
                granted: state == PermissionState::Granted,
            },
            now,
        );

        // The stage may not have changed, but the tone still needs its mode.
        let stage = self.sequencer.current_stage();
        self.apply_stage(stage);
        self.observer.borrow_and_update();
        state
    }

    fn sync_tone(&mut self) {
        if !self.observer.has_changed().unwrap_or(false) {
            return;
        }
        let stage = self.observer.borrow_and_update().stage;
        self.apply_stage(stage);
    }

    fn apply_stage(&mut self, stage: Stage) {
        if stage.is_terminal() {
            debug!("{}: terminal stage {}, stopping tone", self.kind(), stage);
            self.tone.stop();
            return;
        }
        let mode = self.sequencer.definition().tone_mode(stage);
        self.tone.set_mode(mode);
    }

    pub fn kind(&self) -> ModuleKind {
        self.sequencer.definition().kind
    }

    pub fn current_stage(&self) -> Stage {
        self.sequencer.current_stage()
    }

    pub fn context(&self) -> &SessionContext {
        self.sequencer.context()
    }

    pub fn sequencer(&self) -> &StageSequencer {
        &self.sequencer
    }

    pub fn tone(&self) -> &ToneEngine<B> {
        &self.tone
    }

    pub fn tone_mut(&mut self) -> &mut ToneEngine<B> {
        &mut self.tone
    }

    pub fn is_finished(&self) -> bool {
        self.sequencer.is_finished()
    }
}
