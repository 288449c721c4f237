//! Per-string voice model
//!
//! One voice per string, so polyphony is bounded by the instrument itself.
//! Deadlines are stored on the frame clock and checked by
//! [`VoiceScheduler::advance`](super::VoiceScheduler::advance); nothing here
//! runs on a timer.

use serde::Serialize;

use crate::config::VoiceConfig;

/// Lifecycle of a single string's voice
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VoiceState {
    #[default]
    Idle,
    /// Ringing until the automatic release deadline
    Sounding { release_at_ms: f64 },
    /// Release tail, idle again at `until_ms`
    Releasing { until_ms: f64 },
}

/// Voice for one string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Voice {
    pub string: usize,
    pub state: VoiceState,
    /// Onset time of the last accepted trigger
    pub last_onset_ms: Option<f64>,
    pub frequency_hz: f32,
    pub gain: f32,
    pub fret: u8,
}

impl Voice {
    pub fn new(string: usize) -> Self {
        Self {
            string,
            state: VoiceState::Idle,
            last_onset_ms: None,
            frequency_hz: 0.0,
            gain: 0.0,
            fret: 0,
        }
    }

    pub fn is_sounding(&self) -> bool {
        !matches!(self.state, VoiceState::Idle)
    }
}

/// Attack/decay/sustain/release shape shared by all voices
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnvelopeParams {
    pub attack_ms: f32,
    pub decay_ms: f32,
    pub sustain_level: f32,
    pub release_ms: f32,
}

impl EnvelopeParams {
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self {
            attack_ms: config.attack_ms.max(0.0),
            decay_ms: config.decay_ms.max(0.0),
            sustain_level: config.sustain_level.clamp(0.0, 1.0),
            release_ms: config.release_ms.max(0.0),
        }
    }
}

impl Default for EnvelopeParams {
    fn default() -> Self {
        Self::from_config(&VoiceConfig::default())
    }
}

/// Velocity-to-gain curve
///
/// # Arguments
/// * `velocity` - Normalized strum velocity, clamped to [0, 1]
/// * `min_gain`, `max_gain` - Output range before master volume
/// * `gamma` - Curve exponent; values below 1 keep soft strums audible
///
/// # Returns
/// `lerp(min_gain, max_gain, velocity^gamma)`
///
/// # Examples
/// ```
/// use air_guitar::audio::voice::velocity_gain;
///
/// assert!((velocity_gain(1.0, 0.1, 0.9, 0.9) - 0.9).abs() < 1e-6);
/// assert!((velocity_gain(0.0, 0.1, 0.9, 0.9) - 0.1).abs() < 1e-6);
/// ```
pub fn velocity_gain(velocity: f32, min_gain: f32, max_gain: f32, gamma: f32) -> f32 {
    let shaped = velocity.clamp(0.0, 1.0).powf(gamma);
    min_gain + (max_gain - min_gain) * shaped
}
