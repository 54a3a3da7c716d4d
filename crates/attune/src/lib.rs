//! attune: guided sensory sessions.
//!
//! A session walks a fixed sequence of stages. Each module (unhooking,
//! earth, liberation) is a static transition table; the [`StageSequencer`]
//! interprets it, keeping counters, guards and auto-advance timers, and
//! broadcasts a snapshot after every change. The [`ToneEngine`] keeps one
//! drone oscillator tuned to the current stage, crossfading on every move.
//! [`GuidedSession`] wires the two together.
//!
//! ```no_run
//! use std::sync::Arc;
//! use attune::{Event, GuidedSession, ModuleKind, OfflineRenderer, TracingSink};
//! use attuneconf::AttuneConfig;
//!
//! let config = AttuneConfig::load().unwrap();
//! let backend = OfflineRenderer::new(config.audio.sample_rate);
//! let mut session =
//!     GuidedSession::from_config(ModuleKind::Earth, &config, backend, Arc::new(TracingSink));
//! session.dispatch(Event::Start);
//! ```

pub mod context;
pub mod module;
pub mod modules;
pub mod script;
pub mod sequencer;
pub mod session;
pub mod stage;
pub mod telemetry;
pub mod timer;
pub mod tone;

pub use context::{SessionContext, SessionId};
pub use module::{Guard, ModuleDefinition, ModuleKind, ResumePolicy};
pub use sequencer::{Outcome, StageSequencer, StageSnapshot};
pub use session::GuidedSession;
pub use stage::{Event, EventKind, ParseEventError, Stage};
pub use telemetry::{ChannelSink, FanoutSink, NullSink, TracingSink, TransitionRecord, TransitionSink};
pub use tone::{
    AudioBackend, AudioError, OfflineRenderer, PermissionState, ToneBinding, ToneEngine,
    ToneSettings, ToneSpec,
};
