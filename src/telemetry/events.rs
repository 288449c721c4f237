//! Core telemetry event types describing diagnostics data exposed to
//! CLI/HTTP surfaces.

use serde::{Deserialize, Serialize};

use crate::audio::TriggerRejection;
use crate::gesture::StrumDirection;
use crate::landmarks::Handedness;
use crate::recognition::ConnectionState;

/// Diagnostic error codes surfaced via telemetry metrics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticError {
    FixtureLoad,
    AudioBackend,
    QueueBackpressure,
}

/// Metric events covering frame latency, gestures, recognition and voices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    FrameLatency {
        avg_ms: f32,
        max_ms: f32,
        sample_count: usize,
    },
    Strum {
        string_index: usize,
        velocity: f32,
        direction: StrumDirection,
    },
    Recognition {
        chord_id: String,
        confidence: f32,
        frame_timestamp_ms: f64,
    },
    Connectivity {
        state: ConnectionState,
    },
    Correction {
        active: bool,
        chord_id: Option<String>,
    },
    VoiceRejected {
        string_index: usize,
        reason: TriggerRejection,
    },
    InputRejected {
        hand: Handedness,
        code: i32,
    },
    QueueOccupancy {
        channel: String,
        percent: f32,
    },
    Error {
        code: DiagnosticError,
        context: String,
    },
}
