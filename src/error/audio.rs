// Errors raised by the audio-output collaborator

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Error code range: 1001-1005. Trigger rejections are not errors; see
/// [`crate::audio::TriggerRejection`].
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    pub const ALREADY_RUNNING: i32 = 1001;
    pub const NOT_RUNNING: i32 = 1002;
    pub const STREAM_OPEN_FAILED: i32 = 1003;
    /// Command ring between frame cadence and audio callback is full
    pub const QUEUE_FULL: i32 = 1004;
    pub const HARDWARE_ERROR: i32 = 1005;
}

/// Log an audio error raised while `context` was running.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "[AudioOutput] {} failed: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Failures of the output backend lifecycle and its command queue
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    AlreadyRunning,
    NotRunning,
    /// No usable output device or config
    StreamOpenFailed { reason: String },
    /// The command was dropped; the voice it carried never sounds
    QueueFull { capacity: usize },
    HardwareError { details: String },
}

impl AudioError {
    /// Whether retrying on a later frame can succeed without a restart
    pub fn is_transient(&self) -> bool {
        matches!(self, AudioError::QueueFull { .. })
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::AlreadyRunning => AudioErrorCodes::ALREADY_RUNNING,
            AudioError::NotRunning => AudioErrorCodes::NOT_RUNNING,
            AudioError::StreamOpenFailed { .. } => AudioErrorCodes::STREAM_OPEN_FAILED,
            AudioError::QueueFull { .. } => AudioErrorCodes::QUEUE_FULL,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::AlreadyRunning => "Audio output already running".to_string(),
            AudioError::NotRunning => "Audio output not running".to_string(),
            AudioError::StreamOpenFailed { reason } => {
                format!("Failed to open output stream: {}", reason)
            }
            AudioError::QueueFull { capacity } => {
                format!("Voice command queue full ({} slots)", capacity)
            }
            AudioError::HardwareError { details } => format!("Output device error: {}", details),
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message(), self.code())
    }
}

impl std::error::Error for AudioError {}
