//! Tone engine: keeps exactly one oscillator aligned with the current mode.
//!
//! The oscillator is created once audio permission is granted and is then
//! only retuned. Switching between two audible tones fades out, jumps the
//! frequency while silent, and fades back in, all as exponential ramps so
//! nothing clicks. Ramps target [`ToneSettings::floor`] instead of zero.
//!
//! Without permission every call is a logged no-op and the session carries
//! on in silence.

pub mod backend;
pub mod binding;
pub mod offline;

pub use backend::{AudioBackend, AudioError, VoiceId, Waveform};
pub use binding::{ToneBinding, ToneSpec};
pub use offline::OfflineRenderer;

use attuneconf::AudioConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSettings {
    /// Length of one gain ramp, in seconds.
    pub ramp: f64,
    /// Gain that stands in for silence.
    pub floor: f32,
    pub waveform: Waveform,
}

impl From<&AudioConfig> for ToneSettings {
    fn from(config: &AudioConfig) -> Self {
        Self {
            ramp: config.ramp_secs(),
            floor: config.gain_floor,
            waveform: Waveform::Sine,
        }
    }
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self::from(&AudioConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    /// Not asked yet.
    Prompt,
    Granted,
    Denied,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTone {
    voice: VoiceId,
    /// Frequency the oscillator is (or will be, once ramps finish) set to.
    frequency: f32,
    /// Tone being faded towards; `None` while fading to or resting at the floor.
    sounding: Option<ToneSpec>,
    /// When the last fade-out reaches the floor.
    quiet_from: f64,
    /// Frequency in effect until `switch_at`.
    previous_frequency: f32,
    /// When the last scheduled frequency change lands.
    switch_at: f64,
}

pub struct ToneEngine<B: AudioBackend> {
    backend: B,
    binding: ToneBinding,
    settings: ToneSettings,
    permission: PermissionState,
    active: Option<ActiveTone>,
    mode: Option<String>,
}

impl<B: AudioBackend> ToneEngine<B> {
    pub fn new(backend: B, binding: ToneBinding, settings: ToneSettings) -> Self {
        Self {
            backend,
            binding,
            settings,
            permission: PermissionState::Prompt,
            active: None,
            mode: None,
        }
    }

    /// Ask the backend to start audio. Call from inside a user gesture.
    ///
    /// Creates the oscillator on success and applies any mode requested
    /// while permission was pending. Calling again once granted does nothing;
    /// calling again after a denial asks again.
    pub fn request_permission(&mut self) -> PermissionState {
        if self.permission == PermissionState::Granted {
            return self.permission;
        }

        match self.backend.resume() {
            Ok(()) => {
                info!("audio permission granted");
                self.permission = PermissionState::Granted;
                if self.ensure_voice().is_some() {
                    self.apply_mode();
                }
            }
            Err(e) => {
                warn!("audio unavailable, continuing without sound: {}", e);
                self.permission = PermissionState::Denied;
            }
        }

        self.permission
    }

    /// Make `mode` the audible tone. Modes missing from the binding (and
    /// `None`) fade to silence but keep the oscillator running.
    pub fn set_mode(&mut self, mode: Option<&str>) {
        self.mode = mode.map(str::to_string);

        if self.permission != PermissionState::Granted {
            debug!("tone mode {:?} recorded, audio not permitted", mode);
            return;
        }

        self.apply_mode();
    }

    /// Fade out and release the oscillator. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.mode = None;
        let Some(active) = self.active.take() else {
            return;
        };

        let now = self.backend.current_time();
        let end = now + self.settings.ramp;
        let result = self
            .backend
            .cancel_and_hold(active.voice, now)
            .and_then(|_| {
                self.backend
                    .exponential_ramp_to(active.voice, self.settings.floor, end)
            })
            .and_then(|_| self.backend.stop_voice(active.voice, end))
            .and_then(|_| self.backend.release(active.voice));

        match result {
            Ok(()) => info!("tone stopped"),
            Err(e) => warn!("failed to stop tone cleanly: {}", e),
        }
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Mode most recently requested.
    pub fn mode(&self) -> Option<&str> {
        self.mode.as_deref()
    }

    /// Tone the engine is currently fading towards, if any.
    pub fn sounding(&self) -> Option<ToneSpec> {
        self.active.and_then(|a| a.sounding)
    }

    pub fn voice(&self) -> Option<VoiceId> {
        self.active.map(|a| a.voice)
    }

    pub fn binding(&self) -> &ToneBinding {
        &self.binding
    }

    pub fn settings(&self) -> &ToneSettings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn ensure_voice(&mut self) -> Option<VoiceId> {
        if let Some(active) = self.active {
            return Some(active.voice);
        }

        let frequency = self
            .mode
            .as_deref()
            .and_then(|m| self.binding.lookup(m))
            .map_or(440.0, |spec| spec.frequency);

        match self
            .backend
            .create_voice(self.settings.waveform, frequency, self.settings.floor)
        {
            Ok(voice) => {
                debug!("created tone voice {:?} at {} Hz", voice, frequency);
                self.active = Some(ActiveTone {
                    voice,
                    frequency,
                    sounding: None,
                    quiet_from: f64::NEG_INFINITY,
                    previous_frequency: frequency,
                    switch_at: f64::NEG_INFINITY,
                });
                Some(voice)
            }
            Err(e) => {
                warn!("could not create tone voice: {}", e);
                None
            }
        }
    }

    fn apply_mode(&mut self) {
        let target = self.mode.as_deref().and_then(|m| self.binding.lookup(m));
        if target.is_none() {
            if let Some(mode) = self.mode.as_deref() {
                debug!("no tone bound to mode {}, fading to silence", mode);
            }
        }

        if self.ensure_voice().is_none() {
            return;
        }

        if let Err(e) = self.retune(target) {
            warn!("tone retune failed: {}", e);
        }
    }

    fn retune(&mut self, target: Option<ToneSpec>) -> Result<(), AudioError> {
        let Some(mut active) = self.active else {
            return Ok(());
        };
        if active.sounding == target {
            return Ok(());
        }

        let now = self.backend.current_time();
        let ramp = self.settings.ramp;
        let floor = self.settings.floor;
        let voice = active.voice;

        // Last write wins: anything still scheduled from an earlier change
        // is dropped here.
        self.backend.cancel_and_hold(voice, now)?;
        if now < active.switch_at {
            // the pending retune was cancelled too; the old pitch still holds
            active.frequency = active.previous_frequency;
            active.switch_at = f64::NEG_INFINITY;
        }

        match target {
            None => {
                self.backend.exponential_ramp_to(voice, floor, now + ramp)?;
                active.quiet_from = now + ramp;
            }
            Some(spec) if spec.frequency == active.frequency => {
                self.backend
                    .exponential_ramp_to(voice, spec.level.max(floor), now + ramp)?;
            }
            Some(spec) => {
                let audible = active.sounding.is_some() || now < active.quiet_from;
                let switch_at = if audible {
                    self.backend.exponential_ramp_to(voice, floor, now + ramp)?;
                    now + ramp
                } else {
                    now
                };
                self.backend.set_frequency_at(voice, spec.frequency, switch_at)?;
                self.backend
                    .exponential_ramp_to(voice, spec.level.max(floor), switch_at + ramp)?;
                active.previous_frequency = active.frequency;
                active.frequency = spec.frequency;
                active.switch_at = switch_at;
            }
        }

        debug!(
            "retuned voice {:?} to {:?} at {:.3}s",
            voice,
            target.map(|t| t.frequency),
            now
        );
        active.sounding = target;
        self.active = Some(active);
        Ok(())
    }
}

impl<B: AudioBackend> Drop for ToneEngine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
