//! Recognition cadence: chord suggestions from the fretting hand
//!
//! The frame cadence offers pose vectors through a [`RecognitionSource`] and
//! reads back an immutable [`RecognitionSnapshot`] once per tick. Network I/O
//! never happens on the frame path; [`client`] runs it as a tokio task.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RecognitionError;
use crate::fingering::FingeringMap;
use crate::landmarks::{Handedness, PoseVector, POSE_VECTOR_LEN};

pub mod backoff;
pub mod client;
pub mod local;
pub mod protocol;
pub mod transport;

pub use backoff::ReconnectBackoff;
pub use client::{RecognitionClient, RecognitionHandle};
pub use local::{InlineRecognizer, LocalRecognizer};
pub use protocol::{ClientMessage, InferenceRequest, InferenceResultMessage, ServerMessage};
pub use transport::{RecognizerTransport, WebSocketTransport};

/// Connectivity of the recognition channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Reconnecting {
        attempt: u32,
    },
    /// Attempts exhausted; only slow probing continues
    Offline,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// A chord suggestion, stamped on the frame clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub chord_id: String,
    /// Similarity score in [0, 1]
    pub confidence: f32,
    pub fingering: FingeringMap,
    /// Absolute MIDI notes, one per string when present
    pub override_notes: Option<Vec<u8>>,
    pub message: Option<String>,
    /// Frame timestamp of the pose this result answers
    pub timestamp_ms: f64,
}

impl RecognitionResult {
    pub fn age_ms(&self, now_ms: f64) -> f64 {
        now_ms - self.timestamp_ms
    }

    /// Fresh when no older than the staleness window (and not from the future)
    pub fn is_fresh(&self, now_ms: f64, staleness_window_ms: f64) -> bool {
        let age = self.age_ms(now_ms);
        (0.0..=staleness_window_ms).contains(&age)
    }
}

/// Consistent view of the recognition cadence, swapped atomically
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecognitionSnapshot {
    pub state: ConnectionState,
    /// Last valid result; superseded only by a newer valid result
    pub result: Option<RecognitionResult>,
    #[serde(skip)]
    pub last_error: Option<RecognitionError>,
    pub requests_sent: u64,
    pub results_received: u64,
}

impl RecognitionSnapshot {
    pub fn offline() -> Self {
        Self {
            state: ConnectionState::Offline,
            ..Self::default()
        }
    }

    /// The result the arbitrator may consider at `now_ms`, if any.
    ///
    /// Nothing is usable while offline, nor once the result is stale.
    pub fn usable_result(&self, now_ms: f64, staleness_window_ms: f64) -> Option<&RecognitionResult> {
        if self.state == ConnectionState::Offline {
            return None;
        }
        self.result
            .as_ref()
            .filter(|r| r.is_fresh(now_ms, staleness_window_ms))
    }
}

/// Fretting-hand pose handed from the frame cadence to the recognizer
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRequest {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub hand: Handedness,
    pub values: [f32; POSE_VECTOR_LEN],
}

impl PoseRequest {
    pub fn from_pose(pose: &PoseVector, frame_id: u64) -> Self {
        Self {
            frame_id,
            timestamp_ms: pose.timestamp_ms,
            hand: pose.hand,
            values: *pose.values(),
        }
    }
}

/// Frame-side view of a recognizer
///
/// Both calls are non-blocking and cheap enough for the frame cadence.
pub trait RecognitionSource {
    /// Offer the latest fretting-hand pose. Returns true if it was published.
    fn offer(&mut self, pose: &PoseVector, frame_id: u64) -> bool;

    /// Current snapshot, read once per tick
    fn snapshot(&self) -> Arc<RecognitionSnapshot>;

    /// Frame clock notification, called before `snapshot` on every tick
    fn advance_to(&mut self, _now_ms: f64) {}
}

impl<T: RecognitionSource + ?Sized> RecognitionSource for Box<T> {
    fn offer(&mut self, pose: &PoseVector, frame_id: u64) -> bool {
        (**self).offer(pose, frame_id)
    }

    fn snapshot(&self) -> Arc<RecognitionSnapshot> {
        (**self).snapshot()
    }

    fn advance_to(&mut self, now_ms: f64) {
        (**self).advance_to(now_ms)
    }
}

/// Rate limiter for pose publication on the frame clock
#[derive(Debug, Clone)]
pub struct PublishThrottle {
    interval_ms: f64,
    last_published_ms: Option<f64>,
}

impl PublishThrottle {
    pub fn new(interval_ms: f64) -> Self {
        Self {
            interval_ms: interval_ms.max(0.0),
            last_published_ms: None,
        }
    }

    /// Returns true (and records `now_ms`) if a publish is due.
    pub fn try_acquire(&mut self, now_ms: f64) -> bool {
        match self.last_published_ms {
            // A clock going backwards re-arms the throttle.
            Some(last) if now_ms >= last && now_ms - last < self.interval_ms => false,
            _ => {
                self.last_published_ms = Some(now_ms);
                true
            }
        }
    }
}

/// Source used when recognition is disabled: always offline, never publishes
#[derive(Debug)]
pub struct DisabledRecognition {
    snapshot: Arc<RecognitionSnapshot>,
}

impl DisabledRecognition {
    pub fn new() -> Self {
        Self {
            snapshot: Arc::new(RecognitionSnapshot::offline()),
        }
    }
}

impl Default for DisabledRecognition {
    fn default() -> Self {
        Self::new()
    }
}

impl RecognitionSource for DisabledRecognition {
    fn offer(&mut self, _pose: &PoseVector, _frame_id: u64) -> bool {
        false
    }

    fn snapshot(&self) -> Arc<RecognitionSnapshot> {
        Arc::clone(&self.snapshot)
    }
}
