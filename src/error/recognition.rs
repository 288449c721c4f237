// Recognition error types, wire codes and constants

use crate::error::ErrorCode;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recognition error code constants
///
/// Error code range: 4001-4008
pub struct RecognitionErrorCodes {}

impl RecognitionErrorCodes {
    /// Service rejected the request (malformed or oversized vector)
    pub const BAD_INPUT: i32 = 4001;

    /// Service could not produce a confident match
    pub const LOW_CONFIDENCE: i32 = 4002;

    /// Service dependency (vector store) failed
    pub const DEPENDENCY_FAILURE: i32 = 4003;

    /// Recognizer unreachable or the connection dropped
    pub const TRANSPORT_FAILURE: i32 = 4004;

    /// Capture permission error relayed by the service
    pub const CAMERA_DENIED: i32 = 4005;

    /// Response could not be decoded
    pub const MALFORMED_RESPONSE: i32 = 4006;

    /// No response within the request timeout
    pub const TIMEOUT: i32 = 4007;

    /// Client task has shut down
    pub const CHANNEL_CLOSED: i32 = 4008;
}

/// Error codes carried in `inference_error` messages on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorCode {
    #[serde(rename = "ERR_CAM_001")]
    CameraDenied,
    #[serde(rename = "ERR_WS_002")]
    TransportUnreachable,
    #[serde(rename = "ERR_AI_003")]
    LowConfidence,
    #[serde(rename = "ERR_AI_400")]
    BadRequest,
    #[serde(rename = "ERR_DEP_500")]
    Dependency,
}

impl WireErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireErrorCode::CameraDenied => "ERR_CAM_001",
            WireErrorCode::TransportUnreachable => "ERR_WS_002",
            WireErrorCode::LowConfidence => "ERR_AI_003",
            WireErrorCode::BadRequest => "ERR_AI_400",
            WireErrorCode::Dependency => "ERR_DEP_500",
        }
    }
}

/// Log a recognition error with structured context
///
/// Transport defects are expected while the service is down and are logged
/// at warn level; everything else is an error.
pub fn log_recognition_error(err: &RecognitionError, context: &str) {
    if err.is_transport() {
        warn!(
            "Recognition transport defect in {}: code={}, message={}",
            context,
            err.code(),
            err.message()
        );
    } else {
        error!(
            "Recognition error in {}: code={}, component=RecognitionClient, message={}",
            context,
            err.code(),
            err.message()
        );
    }
}

/// Recognition-related errors
///
/// None of these reach the frame cadence synchronously; they are recorded in
/// the recognition snapshot and the last valid result stays in effect.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognitionError {
    /// Request vector rejected (client-side validation or `ERR_AI_400`)
    BadInput { reason: String },

    /// `ERR_AI_003`
    LowConfidence { reason: String },

    /// `ERR_DEP_500`
    DependencyFailure { reason: String },

    /// Connection could not be established or was lost (`ERR_WS_002`)
    TransportFailure { reason: String },

    /// `ERR_CAM_001` relayed by the service
    CameraDenied { reason: String },

    /// Response JSON did not match the protocol
    MalformedResponse { reason: String },

    /// No response within the request timeout
    Timeout { timeout_ms: u64 },

    /// Client task dropped its channels
    ChannelClosed,
}

impl RecognitionError {
    /// Build an error from a wire `inference_error` message.
    pub fn from_wire(code: WireErrorCode, message: String) -> Self {
        match code {
            WireErrorCode::BadRequest => RecognitionError::BadInput { reason: message },
            WireErrorCode::LowConfidence => RecognitionError::LowConfidence { reason: message },
            WireErrorCode::Dependency => RecognitionError::DependencyFailure { reason: message },
            WireErrorCode::TransportUnreachable => {
                RecognitionError::TransportFailure { reason: message }
            }
            WireErrorCode::CameraDenied => RecognitionError::CameraDenied { reason: message },
        }
    }

    /// Wire code equivalent, when one exists.
    pub fn wire_code(&self) -> Option<WireErrorCode> {
        match self {
            RecognitionError::BadInput { .. } => Some(WireErrorCode::BadRequest),
            RecognitionError::LowConfidence { .. } => Some(WireErrorCode::LowConfidence),
            RecognitionError::DependencyFailure { .. } => Some(WireErrorCode::Dependency),
            RecognitionError::TransportFailure { .. } => Some(WireErrorCode::TransportUnreachable),
            RecognitionError::CameraDenied { .. } => Some(WireErrorCode::CameraDenied),
            RecognitionError::MalformedResponse { .. }
            | RecognitionError::Timeout { .. }
            | RecognitionError::ChannelClosed => None,
        }
    }

    /// Whether the error means the connection must be re-established.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RecognitionError::TransportFailure { .. }
                | RecognitionError::Timeout { .. }
                | RecognitionError::ChannelClosed
        )
    }
}

impl ErrorCode for RecognitionError {
    fn code(&self) -> i32 {
        match self {
            RecognitionError::BadInput { .. } => RecognitionErrorCodes::BAD_INPUT,
            RecognitionError::LowConfidence { .. } => RecognitionErrorCodes::LOW_CONFIDENCE,
            RecognitionError::DependencyFailure { .. } => {
                RecognitionErrorCodes::DEPENDENCY_FAILURE
            }
            RecognitionError::TransportFailure { .. } => RecognitionErrorCodes::TRANSPORT_FAILURE,
            RecognitionError::CameraDenied { .. } => RecognitionErrorCodes::CAMERA_DENIED,
            RecognitionError::MalformedResponse { .. } => {
                RecognitionErrorCodes::MALFORMED_RESPONSE
            }
            RecognitionError::Timeout { .. } => RecognitionErrorCodes::TIMEOUT,
            RecognitionError::ChannelClosed => RecognitionErrorCodes::CHANNEL_CLOSED,
        }
    }

    fn message(&self) -> String {
        match self {
            RecognitionError::BadInput { reason } => format!("Invalid request: {}", reason),
            RecognitionError::LowConfidence { reason } => format!("Low confidence: {}", reason),
            RecognitionError::DependencyFailure { reason } => {
                format!("Recognizer dependency failed: {}", reason)
            }
            RecognitionError::TransportFailure { reason } => {
                format!("Recognizer unreachable: {}", reason)
            }
            RecognitionError::CameraDenied { reason } => {
                format!("Camera permission denied: {}", reason)
            }
            RecognitionError::MalformedResponse { reason } => {
                format!("Malformed recognizer response: {}", reason)
            }
            RecognitionError::Timeout { timeout_ms } => {
                format!("No recognizer response within {}ms", timeout_ms)
            }
            RecognitionError::ChannelClosed => "Recognition channel closed".to_string(),
        }
    }
}

impl fmt::Display for RecognitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RecognitionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for RecognitionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_code_serde_names() {
        let json = serde_json::to_string(&WireErrorCode::BadRequest).unwrap();
        assert_eq!(json, "\"ERR_AI_400\"");

        let code: WireErrorCode = serde_json::from_str("\"ERR_DEP_500\"").unwrap();
        assert_eq!(code, WireErrorCode::Dependency);
        assert_eq!(code.as_str(), "ERR_DEP_500");
    }

    #[test]
    fn test_from_wire_maps_every_code() {
        let cases = [
            (WireErrorCode::CameraDenied, 4005),
            (WireErrorCode::TransportUnreachable, 4004),
            (WireErrorCode::LowConfidence, 4002),
            (WireErrorCode::BadRequest, 4001),
            (WireErrorCode::Dependency, 4003),
        ];
        for (wire, code) in cases {
            let err = RecognitionError::from_wire(wire, "x".to_string());
            assert_eq!(err.code(), code);
            assert_eq!(err.wire_code(), Some(wire));
        }
    }

    #[test]
    fn test_transport_classification() {
        assert!(RecognitionError::Timeout { timeout_ms: 10 }.is_transport());
        assert!(RecognitionError::ChannelClosed.is_transport());
        assert!(!RecognitionError::BadInput {
            reason: "len".to_string()
        }
        .is_transport());
        assert!(!RecognitionError::MalformedResponse {
            reason: "eof".to_string()
        }
        .is_transport());
    }

    #[test]
    fn test_display_includes_code() {
        let err = RecognitionError::Timeout { timeout_ms: 1000 };
        let display = format!("{}", err);
        assert!(display.contains("4007"));
        assert!(display.contains("1000ms"));
    }
}
