//! In-process chord recognizer
//!
//! Cosine-similarity search of the pose vector against one embedding per
//! catalog chord. Embeddings are synthetic but deterministic: a gaussian
//! vector seeded from the chord id, biased by chord quality, L2-normalized.

use std::sync::Arc;

use futures::future::BoxFuture;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{log_recognition_error, RecognitionError, WireErrorCode};
use crate::fingering::{ChordQuality, ChordShape, CHORD_CATALOG};
use crate::landmarks::{PoseVector, POSE_VECTOR_LEN};

use super::protocol::{
    InferenceErrorMessage, InferenceRequest, InferenceResultMessage, ServerMessage,
    MAX_VECTOR_MAGNITUDE,
};
use super::transport::RecognizerTransport;
use super::{
    ConnectionState, PoseRequest, PublishThrottle, RecognitionSnapshot, RecognitionSource,
};

/// Score at or above which the recognizer asks for correction
pub const SCORE_THRESHOLD: f32 = 0.85;

/// Score below which the result carries a low-confidence message
pub const LOW_CONFIDENCE_THRESHOLD: f32 = 0.4;

pub const LOW_CONFIDENCE_MESSAGE: &str = "Low confidence - try adjusting hand position";

const TOP_K: usize = 3;

/// One search hit
#[derive(Debug, Clone, PartialEq)]
pub struct ChordMatch {
    pub shape: &'static ChordShape,
    pub score: f32,
}

/// Replace NaN with 0 and infinities with +/-1.
pub fn clean_vector(values: &mut [f32]) {
    for v in values.iter_mut() {
        if v.is_nan() {
            *v = 0.0;
        } else if v.is_infinite() {
            *v = v.signum();
        }
    }
}

/// Scale to unit length; the zero vector is returned unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn standard_normal(rng: &mut StdRng) -> f32 {
    // Box-Muller; u1 in (0, 1] keeps ln finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()) as f32
}

/// Deterministic synthetic embedding for a catalog chord
pub fn chord_embedding(shape: &ChordShape) -> [f32; POSE_VECTOR_LEN] {
    let seed: u64 = shape.id.chars().map(|c| c as u64).sum();
    let mut rng = StdRng::seed_from_u64(seed);

    let mut embedding = [0.0_f32; POSE_VECTOR_LEN];
    for v in embedding.iter_mut() {
        *v = standard_normal(&mut rng);
    }
    let bias = match shape.quality {
        ChordQuality::Major => 0.5,
        ChordQuality::Minor => -0.5,
    };
    for v in embedding.iter_mut().take(10) {
        *v += bias;
    }
    l2_normalize(&mut embedding);
    embedding
}

/// Similarity search over the chord catalog
#[derive(Debug, Clone)]
pub struct LocalRecognizer {
    embeddings: Vec<(&'static ChordShape, [f32; POSE_VECTOR_LEN])>,
    score_threshold: f32,
}

impl LocalRecognizer {
    pub fn new() -> Self {
        let embeddings = CHORD_CATALOG
            .iter()
            .map(|shape| (shape, chord_embedding(shape)))
            .collect::<Vec<_>>();
        tracing::info!(
            "[LocalRecognizer] Generated {} chord embeddings",
            embeddings.len()
        );
        Self {
            embeddings,
            score_threshold: SCORE_THRESHOLD,
        }
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    pub fn embedding(&self, chord_id: &str) -> Option<&[f32; POSE_VECTOR_LEN]> {
        self.embeddings
            .iter()
            .find(|(shape, _)| shape.id == chord_id)
            .map(|(_, embedding)| embedding)
    }

    /// Best `top_k` matches, highest score first
    pub fn search(&self, query: &[f32], top_k: usize) -> Vec<ChordMatch> {
        let mut cleaned = query.to_vec();
        clean_vector(&mut cleaned);
        l2_normalize(&mut cleaned);

        let mut matches: Vec<ChordMatch> = self
            .embeddings
            .iter()
            .map(|(shape, embedding)| ChordMatch {
                shape: *shape,
                score: cosine_similarity(&cleaned, embedding),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        matches
    }

    /// Answer a request the way the recognition service does.
    pub fn infer(&self, request: &InferenceRequest) -> ServerMessage {
        let vector = &request.left_hand_vector;
        if vector.len() != POSE_VECTOR_LEN {
            return ServerMessage::InferenceError(InferenceErrorMessage {
                code: WireErrorCode::BadRequest,
                message: format!(
                    "Invalid request: expected {} floats, got {}",
                    POSE_VECTOR_LEN,
                    vector.len()
                ),
            });
        }
        if let Some((i, v)) = vector
            .iter()
            .enumerate()
            .find(|(_, v)| v.abs() > MAX_VECTOR_MAGNITUDE)
        {
            return ServerMessage::InferenceError(InferenceErrorMessage {
                code: WireErrorCode::BadRequest,
                message: format!("Invalid request: element {} out of range: {}", i, v),
            });
        }

        let Some(top) = self.search(vector, TOP_K).into_iter().next() else {
            return ServerMessage::InferenceResult(InferenceResultMessage {
                timestamp: request.timestamp as f64,
                chord_id: "unknown".to_string(),
                confidence: 0.0,
                fingering_map: vec![0; 6],
                correction_active: false,
                override_notes: None,
                message: Some("No chord matches found".to_string()),
            });
        };

        let correction_active = top.score >= self.score_threshold;
        ServerMessage::InferenceResult(InferenceResultMessage {
            timestamp: request.timestamp as f64,
            chord_id: top.shape.id.to_string(),
            confidence: top.score.clamp(0.0, 1.0),
            fingering_map: top.shape.fingering.frets().iter().map(|&f| f as i32).collect(),
            correction_active,
            override_notes: correction_active
                .then(|| top.shape.midi_notes.iter().map(|&n| n as i32).collect()),
            message: (top.score < LOW_CONFIDENCE_THRESHOLD)
                .then(|| LOW_CONFIDENCE_MESSAGE.to_string()),
        })
    }
}

impl Default for LocalRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognizerTransport for LocalRecognizer {
    fn connect(&mut self) -> BoxFuture<'_, Result<(), RecognitionError>> {
        Box::pin(async { Ok(()) })
    }

    fn request<'a>(
        &'a mut self,
        request: &'a InferenceRequest,
    ) -> BoxFuture<'a, Result<ServerMessage, RecognitionError>> {
        Box::pin(async move { Ok(self.infer(request)) })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Synchronous recognition source answering on the frame cadence.
///
/// Deterministic, so replays and tests see results on the very tick a pose
/// is published.
#[derive(Debug)]
pub struct InlineRecognizer {
    recognizer: LocalRecognizer,
    throttle: PublishThrottle,
    snapshot: Arc<RecognitionSnapshot>,
}

impl InlineRecognizer {
    pub fn new(recognizer: LocalRecognizer, publish_interval_ms: f64) -> Self {
        Self {
            recognizer,
            throttle: PublishThrottle::new(publish_interval_ms),
            snapshot: Arc::new(RecognitionSnapshot {
                state: ConnectionState::Connected,
                ..RecognitionSnapshot::default()
            }),
        }
    }
}

impl RecognitionSource for InlineRecognizer {
    fn offer(&mut self, pose: &PoseVector, frame_id: u64) -> bool {
        if !self.throttle.try_acquire(pose.timestamp_ms) {
            return false;
        }
        let pose = PoseRequest::from_pose(pose, frame_id);
        let request = InferenceRequest::from_pose(&pose);

        let mut next = (*self.snapshot).clone();
        next.requests_sent += 1;
        match self.recognizer.infer(&request) {
            ServerMessage::InferenceResult(body) => match body.into_result(pose.timestamp_ms) {
                Ok(result) => {
                    next.results_received += 1;
                    next.result = Some(result);
                }
                Err(err) => {
                    log_recognition_error(&err, "InlineRecognizer::offer");
                    next.last_error = Some(err);
                }
            },
            ServerMessage::InferenceError(body) => {
                let err = RecognitionError::from(body);
                log_recognition_error(&err, "InlineRecognizer::offer");
                next.last_error = Some(err);
            }
        }
        self.snapshot = Arc::new(next);
        true
    }

    fn snapshot(&self) -> Arc<RecognitionSnapshot> {
        Arc::clone(&self.snapshot)
    }
}
