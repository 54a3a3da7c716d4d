//! The audio resource a [`ToneEngine`] drives.
//!
//! Modelled on a Web-Audio style graph: a voice is one oscillator feeding one
//! gain node, and every parameter change is scheduled against the backend's
//! own clock rather than applied immediately.
//!
//! [`ToneEngine`]: super::ToneEngine

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoiceId(pub u32);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    /// One sample at `phase` (radians, any range).
    pub fn sample(self, phase: f64) -> f64 {
        use std::f64::consts::{PI, TAU};
        let p = phase.rem_euclid(TAU);
        match self {
            Waveform::Sine => p.sin(),
            Waveform::Square => {
                if p < PI {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => p / PI - 1.0,
            Waveform::Triangle => {
                if p < PI {
                    2.0 * p / PI - 1.0
                } else {
                    3.0 - 2.0 * p / PI
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio permission denied")]
    PermissionDenied,

    #[error("audio device unavailable: {0}")]
    Unavailable(String),

    #[error("unknown voice {0:?}")]
    UnknownVoice(VoiceId),

    #[error("invalid automation value {value} for {param}")]
    InvalidValue { param: &'static str, value: f64 },

    #[error("failed to write audio: {0}")]
    Write(#[from] hound::Error),
}

/// Scheduling interface to an audio device.
///
/// All times are seconds on the backend clock ([`current_time`]). Calls are
/// fire-and-forget: they schedule work and return without waiting for it.
///
/// [`current_time`]: AudioBackend::current_time
pub trait AudioBackend {
    /// Ask the platform to start producing sound. Must be called from a user
    /// gesture on platforms with an autoplay policy.
    fn resume(&mut self) -> Result<(), AudioError>;

    fn current_time(&self) -> f64;

    /// Create and start an oscillator + gain pair.
    fn create_voice(
        &mut self,
        waveform: Waveform,
        frequency: f32,
        gain: f32,
    ) -> Result<VoiceId, AudioError>;

    /// Jump the oscillator frequency at `at`.
    fn set_frequency_at(&mut self, voice: VoiceId, hz: f32, at: f64) -> Result<(), AudioError>;

    /// Jump the gain at `at`.
    fn set_gain_at(&mut self, voice: VoiceId, value: f32, at: f64) -> Result<(), AudioError>;

    /// Exponential gain ramp from the previous scheduled value, ending at
    /// `end`. `value` must be > 0.
    fn exponential_ramp_to(&mut self, voice: VoiceId, value: f32, end: f64)
        -> Result<(), AudioError>;

    /// Drop everything scheduled after `at` on both parameters and hold the
    /// values they have at `at`.
    fn cancel_and_hold(&mut self, voice: VoiceId, at: f64) -> Result<(), AudioError>;

    /// Stop the oscillator at `at`. A stopped voice cannot restart.
    fn stop_voice(&mut self, voice: VoiceId, at: f64) -> Result<(), AudioError>;

    /// Disconnect the voice once it has stopped.
    fn release(&mut self, voice: VoiceId) -> Result<(), AudioError>;
}
