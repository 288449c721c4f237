// Input defect types: malformed landmark sets and frame timing

use crate::error::ErrorCode;
use log::debug;
use std::fmt;

/// Input error code constants
///
/// Error code range: 3001-3003
pub struct InputErrorCodes {}

impl InputErrorCodes {
    /// Landmark set does not contain exactly 21 points
    pub const LANDMARK_COUNT: i32 = 3001;

    /// A landmark coordinate is NaN or infinite
    pub const NON_FINITE: i32 = 3002;

    /// Elapsed time between two samples was not positive
    pub const NON_MONOTONIC: i32 = 3003;
}

/// Log an input defect
///
/// Input defects are expected under jitter and partial detections, so they
/// are logged at debug level only.
pub fn log_input_error(err: &InputError, context: &str) {
    debug!(
        "Input rejected in {}: code={}, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Per-frame input defects
///
/// Always handled locally by skipping the affected hand for the frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InputError {
    /// Wrong number of landmarks for a hand
    LandmarkCount { expected: usize, actual: usize },

    /// Landmark coordinate is not finite
    NonFinite { landmark: usize },

    /// Sample timestamp did not advance
    NonMonotonic { previous_ms: f64, current_ms: f64 },
}

impl ErrorCode for InputError {
    fn code(&self) -> i32 {
        match self {
            InputError::LandmarkCount { .. } => InputErrorCodes::LANDMARK_COUNT,
            InputError::NonFinite { .. } => InputErrorCodes::NON_FINITE,
            InputError::NonMonotonic { .. } => InputErrorCodes::NON_MONOTONIC,
        }
    }

    fn message(&self) -> String {
        match self {
            InputError::LandmarkCount { expected, actual } => {
                format!("Expected {} landmarks, got {}", expected, actual)
            }
            InputError::NonFinite { landmark } => {
                format!("Landmark {} has a non-finite coordinate", landmark)
            }
            InputError::NonMonotonic {
                previous_ms,
                current_ms,
            } => format!(
                "Timestamp {:.3}ms does not advance past {:.3}ms",
                current_ms, previous_ms
            ),
        }
    }
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InputError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for InputError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_error_codes() {
        assert_eq!(
            InputError::LandmarkCount {
                expected: 21,
                actual: 5
            }
            .code(),
            3001
        );
        assert_eq!(InputError::NonFinite { landmark: 3 }.code(), 3002);
        assert_eq!(
            InputError::NonMonotonic {
                previous_ms: 10.0,
                current_ms: 10.0
            }
            .code(),
            3003
        );
    }

    #[test]
    fn test_landmark_count_message() {
        let err = InputError::LandmarkCount {
            expected: 21,
            actual: 20,
        };
        assert!(err.message().contains("21"));
        assert!(err.message().contains("20"));
    }
}
