//! Deterministic offline audio backend.
//!
//! Keeps the same automation timeline a browser audio graph would, on a clock
//! that only moves when told to, and synthesizes the result on demand. Used
//! by tests to inspect what would be audible and by the CLI to render a
//! session to WAV.

use std::path::Path;

use tracing::debug;

use super::backend::{AudioBackend, AudioError, VoiceId, Waveform};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Point {
    Set { value: f64, time: f64 },
    ExpRamp { value: f64, end: f64 },
}

impl Point {
    fn time(&self) -> f64 {
        match *self {
            Point::Set { time, .. } => time,
            Point::ExpRamp { end, .. } => end,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            Point::Set { value, .. } | Point::ExpRamp { value, .. } => value,
        }
    }
}

/// Scheduled values of one parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Automation {
    points: Vec<Point>,
}

impl Automation {
    pub fn new(initial: f64) -> Self {
        Self {
            points: vec![Point::Set {
                value: initial,
                time: f64::NEG_INFINITY,
            }],
        }
    }

    fn insert(&mut self, point: Point) {
        let at = self.points.partition_point(|p| p.time() <= point.time());
        self.points.insert(at, point);
    }

    pub fn set(&mut self, value: f64, time: f64) {
        self.insert(Point::Set { value, time });
    }

    pub fn exponential_ramp(&mut self, value: f64, end: f64) {
        self.insert(Point::ExpRamp { value, end });
    }

    /// Value at `t`. An exponential ramp runs from the previous point to its
    /// end time; one that would cross or touch zero holds the previous value
    /// until its end.
    pub fn value_at(&self, t: f64) -> f64 {
        let mut value = self.points[0].value();
        let mut since = self.points[0].time();

        for point in &self.points[1..] {
            if point.time() <= t {
                value = point.value();
                since = point.time();
                continue;
            }
            if let Point::ExpRamp { value: target, end } = *point {
                if value > 0.0 && target > 0.0 && since.is_finite() && end > since {
                    let fraction = (t - since) / (end - since);
                    return value * (target / value).powf(fraction);
                }
            }
            break;
        }

        value
    }

    /// Drop everything after `t` and pin the value it had at `t`.
    pub fn cancel_and_hold(&mut self, t: f64) {
        let held = self.value_at(t);
        self.points.retain(|p| p.time() <= t);
        self.points.push(Point::Set { value: held, time: t });
    }

    /// Time of the last scheduled change.
    pub fn settles_at(&self) -> f64 {
        self.points.last().map(Point::time).unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct VoiceState {
    pub id: VoiceId,
    pub waveform: Waveform,
    pub created_at: f64,
    pub frequency: Automation,
    pub gain: Automation,
    pub stop_at: Option<f64>,
    pub released: bool,
}

impl VoiceState {
    fn is_running(&self, t: f64) -> bool {
        t >= self.created_at && self.stop_at.map_or(true, |stop| t < stop)
    }
}

#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    sample_rate: u32,
    now: f64,
    grant: bool,
    running: bool,
    next_id: u32,
    voices: Vec<VoiceState>,
}

impl OfflineRenderer {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            now: 0.0,
            grant: true,
            running: false,
            next_id: 0,
            voices: Vec::new(),
        }
    }

    /// Simulate a platform that refuses to start audio.
    pub fn denying(sample_rate: u32) -> Self {
        Self {
            grant: false,
            ..Self::new(sample_rate)
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Move the clock forward.
    pub fn advance(&mut self, seconds: f64) {
        if seconds > 0.0 {
            self.now += seconds;
        }
    }

    /// Every voice ever created, including released ones.
    pub fn voices(&self) -> &[VoiceState] {
        &self.voices
    }

    /// Voices created and not yet released.
    pub fn live_voices(&self) -> usize {
        self.voices.iter().filter(|v| !v.released).count()
    }

    pub fn voice(&self, id: VoiceId) -> Option<&VoiceState> {
        self.voices.iter().find(|v| v.id == id)
    }

    /// Gain of `voice` at `t`, zero once stopped.
    pub fn gain_at(&self, id: VoiceId, t: f64) -> f32 {
        self.voice(id)
            .filter(|v| v.is_running(t))
            .map_or(0.0, |v| v.gain.value_at(t) as f32)
    }

    pub fn frequency_at(&self, id: VoiceId, t: f64) -> f32 {
        self.voice(id).map_or(0.0, |v| v.frequency.value_at(t) as f32)
    }

    /// Frequencies sounding above `threshold` gain at `t`.
    pub fn audible_at(&self, t: f64, threshold: f32) -> Vec<f32> {
        self.voices
            .iter()
            .filter(|v| v.is_running(t) && v.gain.value_at(t) as f32 > threshold)
            .map(|v| v.frequency.value_at(t) as f32)
            .collect()
    }

    /// Synthesize `[0, now)` as mono samples.
    pub fn render(&self) -> Vec<f32> {
        let rate = self.sample_rate as f64;
        let frames = (self.now * rate).round() as usize;
        let mut out = vec![0.0f32; frames];

        for voice in &self.voices {
            let mut phase = 0.0f64;
            for (n, slot) in out.iter_mut().enumerate() {
                let t = n as f64 / rate;
                if !voice.is_running(t) {
                    continue;
                }
                let hz = voice.frequency.value_at(t);
                let gain = voice.gain.value_at(t);
                *slot += (voice.waveform.sample(phase) * gain) as f32;
                phase += std::f64::consts::TAU * hz / rate;
            }
        }

        out
    }

    /// Render and write a 16-bit mono WAV file.
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<usize, AudioError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let samples = self.render();
        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &samples {
            let int_sample = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(int_sample)?;
        }
        writer.finalize()?;

        Ok(samples.len())
    }

    fn voice_mut(&mut self, id: VoiceId) -> Result<&mut VoiceState, AudioError> {
        self.voices
            .iter_mut()
            .find(|v| v.id == id && !v.released)
            .ok_or(AudioError::UnknownVoice(id))
    }

    fn ensure_running(&self) -> Result<(), AudioError> {
        if self.running {
            Ok(())
        } else if self.grant {
            Err(AudioError::Unavailable("audio context not resumed".into()))
        } else {
            Err(AudioError::PermissionDenied)
        }
    }
}

impl AudioBackend for OfflineRenderer {
    fn resume(&mut self) -> Result<(), AudioError> {
        if !self.grant {
            return Err(AudioError::PermissionDenied);
        }
        self.running = true;
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.now
    }

    fn create_voice(
        &mut self,
        waveform: Waveform,
        frequency: f32,
        gain: f32,
    ) -> Result<VoiceId, AudioError> {
        self.ensure_running()?;
        let id = VoiceId(self.next_id);
        self.next_id += 1;
        debug!("offline: voice {:?} created at {:.3}s", id, self.now);
        self.voices.push(VoiceState {
            id,
            waveform,
            created_at: self.now,
            frequency: Automation::new(frequency as f64),
            gain: Automation::new(gain as f64),
            stop_at: None,
            released: false,
        });
        Ok(id)
    }

    fn set_frequency_at(&mut self, voice: VoiceId, hz: f32, at: f64) -> Result<(), AudioError> {
        if !(hz > 0.0) {
            return Err(AudioError::InvalidValue {
                param: "frequency",
                value: hz as f64,
            });
        }
        self.voice_mut(voice)?.frequency.set(hz as f64, at);
        Ok(())
    }

    fn set_gain_at(&mut self, voice: VoiceId, value: f32, at: f64) -> Result<(), AudioError> {
        self.voice_mut(voice)?.gain.set(value as f64, at);
        Ok(())
    }

    fn exponential_ramp_to(
        &mut self,
        voice: VoiceId,
        value: f32,
        end: f64,
    ) -> Result<(), AudioError> {
        if !(value > 0.0) {
            return Err(AudioError::InvalidValue {
                param: "gain",
                value: value as f64,
            });
        }
        self.voice_mut(voice)?.gain.exponential_ramp(value as f64, end);
        Ok(())
    }

    fn cancel_and_hold(&mut self, voice: VoiceId, at: f64) -> Result<(), AudioError> {
        let state = self.voice_mut(voice)?;
        state.gain.cancel_and_hold(at);
        state.frequency.cancel_and_hold(at);
        Ok(())
    }

    fn stop_voice(&mut self, voice: VoiceId, at: f64) -> Result<(), AudioError> {
        let state = self.voice_mut(voice)?;
        state.stop_at = Some(state.stop_at.map_or(at, |earlier| earlier.min(at)));
        Ok(())
    }

    fn release(&mut self, voice: VoiceId) -> Result<(), AudioError> {
        let now = self.now;
        let state = self.voice_mut(voice)?;
        if state.stop_at.is_none() {
            state.stop_at = Some(now);
        }
        state.released = true;
        Ok(())
    }
}
