//! Backend abstractions for the audio-output collaborator.

use std::time::Instant;

use crate::audio::VoiceCommand;
use crate::error::AudioError;

/// Trait implemented by audio-output backends.
///
/// Backends are owned by the frame orchestrator and driven from the frame
/// cadence only. `submit` must never block: a backend that cannot accept a
/// command reports an error and the command is dropped.
pub trait AudioBackend {
    fn start(&mut self) -> Result<(), AudioError>;
    fn stop(&mut self) -> Result<(), AudioError>;

    /// Hand over one command produced at frame time `at_ms`.
    fn submit(&mut self, command: VoiceCommand, at_ms: f64) -> Result<(), AudioError>;

    fn is_running(&self) -> bool;
    fn name(&self) -> &'static str;

    /// Fill level of the backend's command queue, if it has one
    fn queue_occupancy_percent(&self) -> Option<f32> {
        None
    }
}

impl<T: AudioBackend + ?Sized> AudioBackend for Box<T> {
    fn start(&mut self) -> Result<(), AudioError> {
        (**self).start()
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        (**self).stop()
    }

    fn submit(&mut self, command: VoiceCommand, at_ms: f64) -> Result<(), AudioError> {
        (**self).submit(command, at_ms)
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn queue_occupancy_percent(&self) -> Option<f32> {
        (**self).queue_occupancy_percent()
    }
}

/// Trait representing a monotonic time source used to time frame ticks.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use cpal::CpalBackend;

mod desktop_stub;
pub use desktop_stub::{CommandLog, DesktopStubBackend, StubTimeSource};
