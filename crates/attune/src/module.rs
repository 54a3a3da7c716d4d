//! Transition tables for guided modules.
//!
//! A module is a linear run of working stages framed by `intro`, the
//! `paused` side-state and the terminal `complete`/`exit`. The shared shape
//! is generated by [`TableBuilder`]; each module adds its guards, counter
//! actions and tone modes on top. Modules whose lessons advance on their
//! own event names (`COMPLETE_LESSON` rather than `NEXT`) say so through
//! [`TableBuilder::advance_on`].

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use attuneconf::SessionsConfig;
use serde::{Deserialize, Serialize};

use crate::context::{Progress, SessionContext, MAX_AROUSAL};
use crate::stage::{Event, EventKind, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Unhooking,
    Earth,
    Liberation,
    Collective,
    BreathOfSource,
}

impl ModuleKind {
    pub const ALL: [ModuleKind; 5] = [
        ModuleKind::Unhooking,
        ModuleKind::Earth,
        ModuleKind::Liberation,
        ModuleKind::Collective,
        ModuleKind::BreathOfSource,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::Unhooking => "unhooking",
            ModuleKind::Earth => "earth",
            ModuleKind::Liberation => "liberation",
            ModuleKind::Collective => "collective",
            ModuleKind::BreathOfSource => "breath_of_source",
        }
    }

    /// Prefix of generated session ids.
    pub fn session_prefix(self) -> &'static str {
        match self {
            ModuleKind::Unhooking => "unhook",
            ModuleKind::Earth => "earth",
            ModuleKind::Liberation => "lib",
            ModuleKind::Collective => "collective",
            ModuleKind::BreathOfSource => "breath_source",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModuleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown module '{}'", s.trim()))
    }
}

/// Thresholds the guards compare against.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuning {
    pub total_fragments: u32,
    pub fog_step: f32,
    pub fog_threshold: f32,
    pub arousal_limit: u8,
    pub required_cycles: u32,
}

impl Tuning {
    pub fn from_config(config: &SessionsConfig) -> Self {
        Self {
            total_fragments: config.unhooking.total_fragments,
            fog_step: config.unhooking.fog_step,
            fog_threshold: config.unhooking.fog_threshold,
            arousal_limit: config.liberation.arousal_limit,
            required_cycles: config.breath_of_source.required_cycles,
        }
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::from_config(&SessionsConfig::default())
    }
}

/// Predicate over the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Guard {
    AllFragmentsCleared,
    FogCleared,
    GroundConnected,
    PulseAligned,
    BreathSynced,
    DeviceOk,
    ComfortOk,
    CircleJoined,
    CoherenceReached,
    EnoughCycles,
}

impl Guard {
    pub fn check(self, context: &SessionContext, tuning: &Tuning) -> bool {
        match (self, &context.progress) {
            (Guard::AllFragmentsCleared, Progress::Unhooking(p)) => p.all_fragments_cleared(),
            (Guard::FogCleared, Progress::Unhooking(p)) => p.fog_cleared(tuning.fog_threshold),
            (Guard::GroundConnected, Progress::Earth(p)) => p.ground_connected,
            (Guard::PulseAligned, Progress::Earth(p)) => p.pulse_aligned,
            (Guard::BreathSynced, Progress::Earth(p)) => p.breath_synced,
            (Guard::BreathSynced, Progress::Collective(p)) => p.breath_synced,
            (Guard::DeviceOk, Progress::Liberation(p)) => p.device_ok,
            (Guard::ComfortOk, Progress::Liberation(p)) => {
                p.comfortable && p.arousal_level < tuning.arousal_limit
            }
            (Guard::ComfortOk, Progress::BreathOfSource(p)) => p.comfortable,
            (Guard::CircleJoined, Progress::Collective(p)) => p.circle_joined,
            (Guard::CoherenceReached, Progress::Collective(p)) => p.coherence_reached,
            (Guard::EnoughCycles, Progress::BreathOfSource(p)) => {
                p.breath_cycles >= tuning.required_cycles
            }
            // A guard wired to the wrong module never passes
            _ => false,
        }
    }
}

/// Context mutation run when a transition commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Fresh session id and start time.
    StampSession,
    ResetFog,
    ClearFragment,
    BreathClear,
    ConnectGround,
    AlignPulse,
    SyncBreath,
    RecordAudioGrant,
    RecordDeviceCheck,
    RecordArousal,
    RecordComfort,
    JoinCircle,
    AchieveCoherence,
    CountBreathCycle,
    /// Points the lesson counter at lesson one.
    BeginLessons,
    CompleteLesson,
    PreviousLesson,
}

impl Action {
    /// Applies the action. Payload actions read their value from `event`
    /// and do nothing if the event carries a different payload.
    pub(crate) fn apply(
        self,
        context: &mut SessionContext,
        event: &Event,
        tuning: &Tuning,
        kind: ModuleKind,
        now: chrono::DateTime<chrono::Utc>,
    ) {
        match (self, &mut context.progress) {
            (Action::StampSession, _) => {
                context.session_id = Some(crate::context::SessionId::generate(
                    kind.session_prefix(),
                    now,
                ));
                context.started_at = Some(now);
            }
            (Action::RecordAudioGrant, _) => {
                if let Event::AudioPermission { granted } = event {
                    context.audio_granted = *granted;
                }
            }
            (Action::ResetFog, Progress::Unhooking(p)) => p.reset_fog(),
            (Action::ClearFragment, Progress::Unhooking(p)) => p.clear_fragment(),
            (Action::BreathClear, Progress::Unhooking(p)) => p.breath_clear(tuning.fog_step),
            (Action::ConnectGround, Progress::Earth(p)) => p.ground_connected = true,
            (Action::AlignPulse, Progress::Earth(p)) => p.pulse_aligned = true,
            (Action::SyncBreath, Progress::Earth(p)) => p.breath_synced = true,
            (Action::SyncBreath, Progress::Collective(p)) => p.breath_synced = true,
            (Action::JoinCircle, Progress::Collective(p)) => p.join_circle(),
            (Action::AchieveCoherence, Progress::Collective(p)) => p.coherence_reached = true,
            (Action::CountBreathCycle, Progress::BreathOfSource(p)) => p.count_cycle(),
            (Action::BeginLessons, Progress::BreathOfSource(p)) => p.current_lesson = 1,
            (Action::CompleteLesson, Progress::BreathOfSource(p)) => p.complete_lesson(),
            (Action::PreviousLesson, Progress::BreathOfSource(p)) => p.previous_lesson(),
            (Action::RecordDeviceCheck, Progress::Liberation(p)) => {
                if let Event::DeviceCheck { ok } = event {
                    p.device_ok = *ok;
                }
            }
            (Action::RecordArousal, Progress::Liberation(p)) => {
                if let Event::ArousalUpdate { level } = event {
                    p.arousal_level = (*level).min(MAX_AROUSAL);
                }
            }
            (Action::RecordComfort, Progress::Liberation(p)) => {
                if let Event::Comfort { ok } = event {
                    p.comfortable = *ok;
                }
            }
            (Action::RecordComfort, Progress::BreathOfSource(p)) => {
                if let Event::Comfort { ok } = event {
                    p.comfortable = *ok;
                }
            }
            (action, _) => {
                tracing::debug!("{:?} has no effect on {} counters", action, kind);
            }
        }
    }
}

/// Where a transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Internal transition: actions only, stage unchanged.
    Stay,
    Stage(Stage),
    /// Leave `paused` according to the module's [`ResumePolicy`].
    Resume,
}

/// What RESUME does when leaving `paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumePolicy {
    /// Back to the initial stage; the user starts over with counters intact.
    Initial,
    /// Back to the stage that was paused.
    History,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub target: Target,
    pub guard: Option<Guard>,
    pub actions: Vec<Action>,
}

/// Complete description of one guided module.
#[derive(Debug, Clone)]
pub struct ModuleDefinition {
    pub kind: ModuleKind,
    pub initial: Stage,
    /// Working stages in order.
    pub stages: Vec<Stage>,
    pub resume: ResumePolicy,
    pub tuning: Tuning,
    table: HashMap<(Stage, EventKind), Transition>,
    dwell: HashMap<Stage, Duration>,
    tone_modes: HashMap<Stage, &'static str>,
}

impl ModuleDefinition {
    /// Built-in definition of `kind`, tuned from config.
    pub fn for_kind(kind: ModuleKind, config: &SessionsConfig) -> Self {
        match kind {
            ModuleKind::Unhooking => crate::modules::unhooking::definition(config),
            ModuleKind::Earth => crate::modules::earth::definition(config),
            ModuleKind::Liberation => crate::modules::liberation::definition(config),
            ModuleKind::Collective => crate::modules::collective::definition(config),
            ModuleKind::BreathOfSource => crate::modules::breath_of_source::definition(config),
        }
    }

    /// Table entry for `(stage, event)`. `None` means the event is a no-op.
    pub fn transition(&self, stage: Stage, event: EventKind) -> Option<&Transition> {
        self.table.get(&(stage, event))
    }

    /// Events with an entry in `stage`, in a stable order.
    pub fn accepted_events(&self, stage: Stage) -> Vec<EventKind> {
        let mut events: Vec<EventKind> = self
            .table
            .keys()
            .filter(|(s, _)| *s == stage)
            .map(|(_, e)| *e)
            .collect();
        events.sort_by_key(|e| e.as_str());
        events
    }

    /// How long `stage` dwells before a NEXT is issued on its own.
    pub fn dwell(&self, stage: Stage) -> Option<Duration> {
        self.dwell.get(&stage).copied()
    }

    /// Tone mode that should sound while `stage` is current.
    pub fn tone_mode(&self, stage: Stage) -> Option<&'static str> {
        self.tone_modes.get(&stage).copied()
    }

    pub fn fresh_context(&self) -> SessionContext {
        let progress = match self.kind {
            ModuleKind::Unhooking => Progress::Unhooking(crate::context::UnhookingProgress::new(
                self.tuning.total_fragments,
            )),
            ModuleKind::Earth => Progress::Earth(Default::default()),
            ModuleKind::Liberation => Progress::Liberation(Default::default()),
            ModuleKind::Collective => Progress::Collective(Default::default()),
            ModuleKind::BreathOfSource => Progress::BreathOfSource(Default::default()),
        };
        SessionContext::new(progress)
    }

    /// The stage a committed START lands on.
    pub fn first_stage(&self) -> Stage {
        self.stages.first().copied().unwrap_or(Stage::Complete)
    }
}

/// Generates the shared linear shape of a module table.
pub struct TableBuilder {
    kind: ModuleKind,
    stages: Vec<Stage>,
    resume: ResumePolicy,
    tuning: Tuning,
    start_guard: Option<Guard>,
    start_actions: Vec<Action>,
    next_guards: HashMap<Stage, Guard>,
    advance: EventKind,
    finish: EventKind,
    advance_actions: Vec<Action>,
    back_actions: Vec<Action>,
    back_to_intro: bool,
    finish_from_paused: bool,
    internal: Vec<(Stage, EventKind, Action)>,
    dwell: HashMap<Stage, Duration>,
    tone_modes: HashMap<Stage, &'static str>,
}

impl TableBuilder {
    pub fn new(kind: ModuleKind, stages: &[Stage], tuning: Tuning) -> Self {
        Self {
            kind,
            stages: stages.to_vec(),
            resume: ResumePolicy::Initial,
            tuning,
            start_guard: None,
            start_actions: vec![Action::StampSession],
            next_guards: HashMap::new(),
            advance: EventKind::Next,
            finish: EventKind::Complete,
            advance_actions: Vec::new(),
            back_actions: Vec::new(),
            back_to_intro: false,
            finish_from_paused: false,
            internal: Vec::new(),
            dwell: HashMap::new(),
            tone_modes: HashMap::new(),
        }
    }

    pub fn resume(mut self, policy: ResumePolicy) -> Self {
        self.resume = policy;
        self
    }

    pub fn start_guard(mut self, guard: Guard) -> Self {
        self.start_guard = Some(guard);
        self
    }

    pub fn start_action(mut self, action: Action) -> Self {
        self.start_actions.push(action);
        self
    }

    /// Guard on the NEXT (or COMPLETE, for the last stage) leaving `stage`.
    pub fn guard_next(mut self, stage: Stage, guard: Guard) -> Self {
        self.next_guards.insert(stage, guard);
        self
    }

    /// Replaces NEXT and COMPLETE as the forward events.
    pub fn advance_on(mut self, advance: EventKind, finish: EventKind) -> Self {
        self.advance = advance;
        self.finish = finish;
        self
    }

    /// Runs on every forward transition, the finishing one included.
    pub fn advance_action(mut self, action: Action) -> Self {
        self.advance_actions.push(action);
        self
    }

    pub fn back_action(mut self, action: Action) -> Self {
        self.back_actions.push(action);
        self
    }

    /// BACK from the first working stage returns to `intro`.
    pub fn back_to_intro(mut self) -> Self {
        self.back_to_intro = true;
        self
    }

    /// The finish event also ends the session from `paused`.
    pub fn finish_from_paused(mut self) -> Self {
        self.finish_from_paused = true;
        self
    }

    /// `event` in `stage` runs `action` without changing stage.
    pub fn internal(mut self, stage: Stage, event: EventKind, action: Action) -> Self {
        self.internal.push((stage, event, action));
        self
    }

    pub fn dwell(mut self, stage: Stage, after: Duration) -> Self {
        if !after.is_zero() {
            self.dwell.insert(stage, after);
        }
        self
    }

    pub fn tone(mut self, stage: Stage, mode: &'static str) -> Self {
        self.tone_modes.insert(stage, mode);
        self
    }

    pub fn build(self) -> ModuleDefinition {
        let mut table = HashMap::new();
        let first = self.stages.first().copied().unwrap_or(Stage::Complete);

        table.insert(
            (Stage::Intro, EventKind::Start),
            Transition {
                target: Target::Stage(first),
                guard: self.start_guard,
                actions: self.start_actions.clone(),
            },
        );
        table.insert(
            (Stage::Intro, EventKind::AudioPermission),
            stay(Action::RecordAudioGrant),
        );

        for (i, &stage) in self.stages.iter().enumerate() {
            let guard = self.next_guards.get(&stage).copied();
            let (event, target) = match self.stages.get(i + 1) {
                Some(&next) => (self.advance, next),
                None => (self.finish, Stage::Complete),
            };
            table.insert(
                (stage, event),
                Transition {
                    target: Target::Stage(target),
                    guard,
                    actions: self.advance_actions.clone(),
                },
            );

            let previous = match i {
                0 if self.back_to_intro => Some(Stage::Intro),
                0 => None,
                _ => Some(self.stages[i - 1]),
            };
            if let Some(previous) = previous {
                table.insert(
                    (stage, EventKind::Back),
                    Transition {
                        target: Target::Stage(previous),
                        guard: None,
                        actions: self.back_actions.clone(),
                    },
                );
            }
            table.insert((stage, EventKind::Pause), go(Stage::Paused, None));
            table.insert((stage, EventKind::Abort), go(Stage::Exit, None));
        }

        table.insert(
            (Stage::Paused, EventKind::Resume),
            Transition {
                target: Target::Resume,
                guard: None,
                actions: Vec::new(),
            },
        );
        table.insert((Stage::Paused, EventKind::Abort), go(Stage::Exit, None));
        if self.finish_from_paused {
            table.insert((Stage::Paused, self.finish), go(Stage::Complete, None));
        }

        for (stage, event, action) in self.internal {
            table
                .entry((stage, event))
                .and_modify(|t: &mut Transition| t.actions.push(action))
                .or_insert_with(|| stay(action));
        }

        ModuleDefinition {
            kind: self.kind,
            initial: Stage::Intro,
            stages: self.stages,
            resume: self.resume,
            tuning: self.tuning,
            table,
            dwell: self.dwell,
            tone_modes: self.tone_modes,
        }
    }
}

fn go(stage: Stage, guard: Option<Guard>) -> Transition {
    Transition {
        target: Target::Stage(stage),
        guard,
        actions: Vec::new(),
    }
}

fn stay(action: Action) -> Transition {
    Transition {
        target: Target::Stay,
        guard: None,
        actions: vec![action],
    }
}
