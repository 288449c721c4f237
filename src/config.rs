//! Configuration management for dynamic parameter tuning
//!
//! This module provides runtime configuration loading from JSON files,
//! enabling fast iteration without recompilation. Thresholds for strum
//! detection, recognizer cadence, arbitration and voice shaping can all be
//! adjusted via the config file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::landmarks::Handedness;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub hands: HandsConfig,
    pub normalizer: NormalizerConfig,
    pub gesture: GestureConfig,
    pub recognition: RecognitionConfig,
    pub arbitration: ArbitrationConfig,
    pub voice: VoiceConfig,
    pub audio: AudioConfig,
}

/// Which tracked hand strums and which one frets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandsConfig {
    /// Hand whose fingertip trajectory drives strum detection
    pub strumming_hand: Handedness,
}

impl Default for HandsConfig {
    fn default() -> Self {
        Self {
            strumming_hand: Handedness::Right,
        }
    }
}

impl HandsConfig {
    pub fn fretting_hand(&self) -> Handedness {
        self.strumming_hand.other()
    }
}

/// Landmark normalization and smoothing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// EMA weight of the newest sample
    pub smoothing_alpha: f32,
    /// Substitute scale when the palm width is degenerate
    pub min_scale: f32,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            min_scale: 1e-3,
        }
    }
}

/// Strum detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Fingertip speed (image units per second) that starts a strum
    pub speed_threshold: f32,
    /// Speed mapped to full velocity
    pub max_speed: f32,
    /// Minimum interval between two strum events
    pub debounce_ms: f64,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            speed_threshold: 0.15,
            max_speed: 3.0,
            debounce_ms: 50.0,
        }
    }
}

/// Remote recognizer connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Disable to run geometric-only without a recognizer
    pub enabled: bool,
    /// WebSocket endpoint of the recognizer
    pub url: String,
    /// Minimum interval between published fretting-hand vectors
    pub publish_interval_ms: f64,
    /// Per-request response timeout
    pub request_timeout_ms: u64,
    /// First reconnect delay, doubled per attempt
    pub backoff_base_ms: u64,
    /// Upper bound on the reconnect delay
    pub backoff_max_ms: u64,
    /// Reconnect attempts before going offline
    pub max_reconnect_attempts: u32,
    /// Random spread applied to each delay (fraction of the delay)
    pub backoff_jitter: f64,
    /// Probe interval while offline
    pub offline_probe_interval_ms: u64,
    /// Maximum age of a result before it is ignored
    pub staleness_window_ms: f64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "ws://127.0.0.1:8000/ws/inference".to_string(),
            publish_interval_ms: 200.0,
            request_timeout_ms: 1000,
            backoff_base_ms: 250,
            backoff_max_ms: 8000,
            max_reconnect_attempts: 6,
            backoff_jitter: 0.1,
            offline_probe_interval_ms: 15_000,
            staleness_window_ms: 500.0,
        }
    }
}

/// Fingering arbitration thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Confidence at or above which the recognizer fingering is used
    pub confidence_threshold: f32,
    /// Confidence below which the presentation layer is warned
    pub low_confidence_threshold: f32,
    /// Catalog chord used as geometric fingering (open strings when unset)
    pub fallback_chord: Option<String>,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            low_confidence_threshold: 0.40,
            fallback_chord: None,
        }
    }
}

/// Voice gain and envelope shaping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub min_gain: f32,
    pub max_gain: f32,
    /// Velocity curve exponent (< 1 lifts soft strums)
    pub velocity_gamma: f32,
    pub master_volume: f32,
    /// Minimum interval between two triggers of the same string
    pub debounce_ms: f64,
    /// Time a note rings before automatic release
    pub sustain_ms: f64,
    /// Onset offset between consecutive strings of a strum
    pub strum_stagger_ms: f64,
    pub attack_ms: f32,
    pub decay_ms: f32,
    pub sustain_level: f32,
    pub release_ms: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            min_gain: 0.15,
            max_gain: 0.9,
            velocity_gamma: 0.9,
            master_volume: 0.8,
            debounce_ms: 50.0,
            sustain_ms: 1200.0,
            strum_stagger_ms: 15.0,
            attack_ms: 5.0,
            decay_ms: 120.0,
            sustain_level: 0.6,
            release_ms: 250.0,
        }
    }
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate used when the device does not dictate one
    pub sample_rate: u32,
    /// Capacity of the lock-free voice command queue
    pub command_queue_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            command_queue_capacity: 256,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The loaded configuration, or the defaults when the file is missing or
    /// its JSON is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/air_guitar.json")
    }
}
