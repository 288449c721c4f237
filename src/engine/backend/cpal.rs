//! CPAL-based audio backend for desktop platforms (Linux, macOS, Windows)
//!
//! A thin adapter from the orchestrator's [`AudioBackend`] trait onto
//! [`AudioOutputEngine`], which owns the stream and the command queue.

use crate::audio::{AudioOutputEngine, EnvelopeParams, VoiceCommand};
use crate::config::{AudioConfig, VoiceConfig};
use crate::error::AudioError;

use super::AudioBackend;

/// CPAL-based audio backend that delegates to AudioOutputEngine
pub struct CpalBackend {
    engine: AudioOutputEngine,
}

impl CpalBackend {
    /// Create a new CPAL backend
    pub fn new(audio_config: &AudioConfig, voice_config: &VoiceConfig) -> Self {
        Self {
            engine: AudioOutputEngine::new(audio_config, EnvelopeParams::from_config(voice_config)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    pub fn dropped_commands(&self) -> u64 {
        self.engine.dropped_commands()
    }
}

impl AudioBackend for CpalBackend {
    fn start(&mut self) -> Result<(), AudioError> {
        self.engine.start()
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.engine.stop()
    }

    fn submit(&mut self, command: VoiceCommand, _at_ms: f64) -> Result<(), AudioError> {
        self.engine.push(command)
    }

    fn is_running(&self) -> bool {
        self.engine.is_running()
    }

    fn name(&self) -> &'static str {
        "cpal"
    }

    fn queue_occupancy_percent(&self) -> Option<f32> {
        self.engine
            .is_running()
            .then(|| self.engine.queue_occupancy_percent())
    }
}
