// Audio module - voice scheduling and low-latency plucked-string output

pub mod scheduler;
pub mod synth;
pub mod voice;

#[cfg(not(target_os = "android"))]
pub mod engine_cpal;

use serde::{Deserialize, Serialize};

// Re-export commonly used types for convenience
#[cfg(not(target_os = "android"))]
pub use engine_cpal::AudioOutputEngine;
pub use scheduler::{StringSet, VoiceScheduler};
pub use synth::{render_timeline, SynthBank};
pub use voice::{EnvelopeParams, Voice, VoiceState};

/// Command sent from the frame cadence to the audio-output collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum VoiceCommand {
    /// Pluck `string` at `frequency_hz` once `delay_ms` has elapsed
    Trigger {
        string: usize,
        frequency_hz: f32,
        gain: f32,
        delay_ms: f32,
    },
    /// Enter the release stage of `string`
    Release { string: usize },
    /// Master volume; already folded into trigger gains
    SetVolume { volume: f32 },
    Mute { muted: bool },
    StopAll,
}

/// Why a trigger was turned into a no-op
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRejection {
    /// String index outside 0..=5
    InvalidString,
    /// Fret carries the mute sentinel
    MutedString,
    /// Fret beyond the playable range
    InvalidFret,
    /// Within the debounce interval of the string's last onset
    Debounced,
    /// Global mute is active
    GlobalMute,
}

impl TriggerRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerRejection::InvalidString => "invalid_string",
            TriggerRejection::MutedString => "muted_string",
            TriggerRejection::InvalidFret => "invalid_fret",
            TriggerRejection::Debounced => "debounced",
            TriggerRejection::GlobalMute => "global_mute",
        }
    }
}
