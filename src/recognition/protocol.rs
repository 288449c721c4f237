//! Wire protocol spoken with the chord recognizer
//!
//! JSON text frames, tagged by a `type` field. Requests carry the 63-float
//! fretting-hand vector; responses are either a result or a structured error.

use serde::{Deserialize, Serialize};

use crate::error::{RecognitionError, WireErrorCode};
use crate::fingering::FingeringMap;
use crate::landmarks::{Handedness, POSE_VECTOR_LEN};

use super::{PoseRequest, RecognitionResult};

/// Bound on the magnitude of any request vector component
pub const MAX_VECTOR_MAGNITUDE: f32 = 10.0;

/// Anchor the request vector was normalized against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandAnchor {
    LeftWrist,
    RightWrist,
    BodyCenter,
}

impl From<Handedness> for HandAnchor {
    fn from(hand: Handedness) -> Self {
        match hand {
            Handedness::Left => HandAnchor::LeftWrist,
            Handedness::Right => HandAnchor::RightWrist,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestMode {
    ChordCorrection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMeta {
    pub frame_id: u64,
}

/// Body of an `inference_request` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// Frame timestamp in whole milliseconds
    pub timestamp: u64,
    pub hand_anchor: HandAnchor,
    /// Named after the service field; carries whichever hand frets
    pub left_hand_vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RequestMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

impl InferenceRequest {
    pub fn from_pose(pose: &PoseRequest) -> Self {
        Self {
            timestamp: pose.timestamp_ms.max(0.0).round() as u64,
            hand_anchor: pose.hand.into(),
            left_hand_vector: pose.values.to_vec(),
            mode: Some(RequestMode::ChordCorrection),
            meta: Some(RequestMeta {
                frame_id: pose.frame_id,
            }),
        }
    }
}

/// Messages sent to the recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    InferenceRequest(InferenceRequest),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, RecognitionError> {
        serde_json::to_string(self).map_err(|err| RecognitionError::BadInput {
            reason: err.to_string(),
        })
    }
}

/// Body of an `inference_result` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResultMessage {
    /// Service clock; not used for staleness
    #[serde(default)]
    pub timestamp: f64,
    pub chord_id: String,
    pub confidence: f32,
    pub fingering_map: Vec<i32>,
    pub correction_active: bool,
    #[serde(default)]
    pub override_notes: Option<Vec<i32>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl InferenceResultMessage {
    /// Validate and stamp the result with the frame time of its request.
    pub fn into_result(self, request_timestamp_ms: f64) -> Result<RecognitionResult, RecognitionError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(RecognitionError::MalformedResponse {
                reason: format!("confidence {} outside [0, 1]", self.confidence),
            });
        }
        if self.fingering_map.iter().any(|&fret| !(-1..=24).contains(&fret)) {
            return Err(RecognitionError::MalformedResponse {
                reason: format!("fingering {:?} outside [-1, 24]", self.fingering_map),
            });
        }
        let fingering = FingeringMap::from_frets(&self.fingering_map).ok_or_else(|| {
            RecognitionError::MalformedResponse {
                reason: format!("expected 6 frets, got {}", self.fingering_map.len()),
            }
        })?;

        // Notes outside the MIDI range invalidate the override, not the result.
        let override_notes = self.override_notes.and_then(|notes| {
            notes
                .iter()
                .map(|&n| u8::try_from(n).ok().filter(|n| *n <= 127))
                .collect::<Option<Vec<u8>>>()
        });

        Ok(RecognitionResult {
            chord_id: self.chord_id,
            confidence: self.confidence,
            fingering,
            override_notes,
            message: self.message.filter(|m| !m.is_empty()),
            timestamp_ms: request_timestamp_ms,
        })
    }
}

/// Body of an `inference_error` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceErrorMessage {
    pub code: WireErrorCode,
    pub message: String,
}

impl From<InferenceErrorMessage> for RecognitionError {
    fn from(msg: InferenceErrorMessage) -> Self {
        RecognitionError::from_wire(msg.code, msg.message)
    }
}

/// Messages received from the recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    InferenceResult(InferenceResultMessage),
    InferenceError(InferenceErrorMessage),
}

impl ServerMessage {
    pub fn from_json(text: &str) -> Result<Self, RecognitionError> {
        serde_json::from_str(text).map_err(|err| RecognitionError::MalformedResponse {
            reason: err.to_string(),
        })
    }

    pub fn to_json(&self) -> Result<String, RecognitionError> {
        serde_json::to_string(self).map_err(|err| RecognitionError::MalformedResponse {
            reason: err.to_string(),
        })
    }
}

/// Client-side check mirroring the service's request validation.
pub fn validate_vector(values: &[f32]) -> Result<(), RecognitionError> {
    if values.len() != POSE_VECTOR_LEN {
        return Err(RecognitionError::BadInput {
            reason: format!("expected {} floats, got {}", POSE_VECTOR_LEN, values.len()),
        });
    }
    if let Some((i, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || v.abs() > MAX_VECTOR_MAGNITUDE)
    {
        return Err(RecognitionError::BadInput {
            reason: format!(
                "element {} out of range [-{max}, {max}]: {}",
                i,
                v,
                max = MAX_VECTOR_MAGNITUDE
            ),
        });
    }
    Ok(())
}
