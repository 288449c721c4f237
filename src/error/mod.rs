// Error types for the air guitar pipeline
//
// Each area of the pipeline owns a typed error enum with stable numeric codes.
// None of these ever halt a frame tick: the orchestrator turns them into
// skipped work, logs them, and records them in telemetry.

mod audio;
mod input;
mod recognition;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use input::{log_input_error, InputError, InputErrorCodes};
pub use recognition::{log_recognition_error, RecognitionError, RecognitionErrorCodes, WireErrorCode};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so telemetry and the CLI can report them
/// uniformly.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
