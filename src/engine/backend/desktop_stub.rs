use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::VoiceCommand;
use crate::error::AudioError;

use super::{AudioBackend, TimeSource};

/// Shared record of every command a [`DesktopStubBackend`] accepted.
///
/// Cloning yields another view of the same log, so tests and the CLI can
/// inspect it after the backend moved into an orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<(f64, VoiceCommand)>>>,
}

impl CommandLog {
    fn push(&self, at_ms: f64, command: VoiceCommand) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((at_ms, command));
        }
    }

    /// Copy of all `(at_ms, command)` entries in submission order
    pub fn entries(&self) -> Vec<(f64, VoiceCommand)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn commands(&self) -> Vec<VoiceCommand> {
        self.entries().into_iter().map(|(_, c)| c).collect()
    }

    /// Strings of every accepted trigger, in order
    pub fn triggered_strings(&self) -> Vec<usize> {
        self.entries()
            .into_iter()
            .filter_map(|(_, command)| match command {
                VoiceCommand::Trigger { string, .. } => Some(string),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Desktop stub backend used for deterministic testing and CLI tooling.
///
/// Simulates the output lifecycle without audio I/O and records commands.
pub struct DesktopStubBackend {
    running: bool,
    log: CommandLog,
}

impl DesktopStubBackend {
    pub fn new() -> Self {
        Self {
            running: false,
            log: CommandLog::default(),
        }
    }

    /// Stub that accepts commands without an explicit `start`
    pub fn started() -> Self {
        Self {
            running: true,
            log: CommandLog::default(),
        }
    }

    pub fn log(&self) -> CommandLog {
        self.log.clone()
    }
}

impl Default for DesktopStubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for DesktopStubBackend {
    fn start(&mut self) -> Result<(), AudioError> {
        if self.running {
            return Err(AudioError::AlreadyRunning);
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if !self.running {
            return Err(AudioError::NotRunning);
        }
        self.running = false;
        Ok(())
    }

    fn submit(&mut self, command: VoiceCommand, at_ms: f64) -> Result<(), AudioError> {
        if !self.running {
            return Err(AudioError::NotRunning);
        }
        self.log.push(at_ms, command);
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn name(&self) -> &'static str {
        "desktop_stub"
    }
}

/// Deterministic time source for desktop runs.
///
/// Each call to `now()` advances by a fixed step to guarantee monotonic,
/// reproducible tick durations even when nothing is measured for real.
pub struct StubTimeSource {
    start: Instant,
    offset_us: AtomicU64,
    step_us: u64,
}

impl StubTimeSource {
    pub fn new() -> Self {
        Self::with_step(Duration::from_micros(500))
    }

    pub fn with_step(step: Duration) -> Self {
        Self {
            start: Instant::now(),
            offset_us: AtomicU64::new(0),
            step_us: step.as_micros() as u64,
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let us = self.offset_us.fetch_add(self.step_us, Ordering::SeqCst);
        self.start + Duration::from_micros(us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_lifecycle() {
        let mut backend = DesktopStubBackend::new();
        assert_eq!(
            backend.submit(VoiceCommand::StopAll, 0.0),
            Err(AudioError::NotRunning)
        );
        backend.start().unwrap();
        assert_eq!(backend.start(), Err(AudioError::AlreadyRunning));
        backend.stop().unwrap();
        assert_eq!(backend.stop(), Err(AudioError::NotRunning));
    }

    #[test]
    fn test_log_is_shared() {
        let mut backend = DesktopStubBackend::started();
        let log = backend.log();
        backend
            .submit(
                VoiceCommand::Trigger {
                    string: 3,
                    frequency_hz: 196.0,
                    gain: 0.5,
                    delay_ms: 0.0,
                },
                16.0,
            )
            .unwrap();
        backend.submit(VoiceCommand::Release { string: 3 }, 32.0).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.triggered_strings(), vec![3]);
        assert_eq!(log.entries()[1].0, 32.0);

        log.clear();
        assert!(backend.log().is_empty());
    }

    #[test]
    fn test_stub_time_source_is_monotonic() {
        let time = StubTimeSource::with_step(Duration::from_millis(2));
        let a = time.now();
        let b = time.now();
        assert_eq!(b.duration_since(a), Duration::from_millis(2));
    }
}
