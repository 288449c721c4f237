//! Arbitrator - reconciles geometric and recognizer fingerings
//!
//! A pure decision over the latest recognition result, the geometric
//! fallback and the configured thresholds. Calling it twice with the same
//! inputs yields the same outcome, so the orchestrator may call it every
//! tick and again right before rendering a strum.

use serde::Serialize;

use crate::config::ArbitrationConfig;
use crate::fingering::{chord_shape, FingeringMap};
use crate::recognition::RecognitionResult;

/// Where the active fingering came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FingeringSource {
    Geometric,
    Recognizer,
}

/// The single fingering used for the next strum
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArbitrationOutcome {
    pub fingering: FingeringMap,
    pub correction_active: bool,
    pub source: FingeringSource,
    /// Recognized chord, when correction is active
    pub chord_id: Option<String>,
    /// Confidence of the fresh result considered, if any
    pub confidence: Option<f32>,
    /// Advisory only; never changes the fingering
    pub low_confidence_warning: bool,
}

impl ArbitrationOutcome {
    pub fn geometric(fingering: FingeringMap) -> Self {
        Self {
            fingering,
            correction_active: false,
            source: FingeringSource::Geometric,
            chord_id: None,
            confidence: None,
            low_confidence_warning: false,
        }
    }
}

/// Rule-based fingering used whenever no confident suggestion exists
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometricFallback {
    fingering: FingeringMap,
}

impl GeometricFallback {
    pub fn new(fingering: FingeringMap) -> Self {
        Self { fingering }
    }

    /// Catalog shape named by `fallback_chord`, open strings otherwise
    pub fn from_config(config: &ArbitrationConfig) -> Self {
        let fingering = match config.fallback_chord.as_deref() {
            Some(id) => match chord_shape(id) {
                Some(shape) => shape.fingering,
                None => {
                    tracing::warn!(
                        "[Arbitrator] Unknown fallback chord {:?}, using open strings",
                        id
                    );
                    FingeringMap::open()
                }
            },
            None => FingeringMap::open(),
        };
        Self { fingering }
    }

    pub fn fingering(&self) -> FingeringMap {
        self.fingering
    }
}

impl Default for GeometricFallback {
    fn default() -> Self {
        Self::new(FingeringMap::open())
    }
}

/// Confidence-gated fingering selection
#[derive(Debug, Clone)]
pub struct Arbitrator {
    confidence_threshold: f32,
    low_confidence_threshold: f32,
    staleness_window_ms: f64,
}

impl Arbitrator {
    pub fn new(config: &ArbitrationConfig, staleness_window_ms: f64) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            low_confidence_threshold: config.low_confidence_threshold,
            staleness_window_ms,
        }
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Decide the active fingering at frame time `now_ms`.
    pub fn arbitrate(
        &self,
        latest: Option<&RecognitionResult>,
        geometric: FingeringMap,
        now_ms: f64,
    ) -> ArbitrationOutcome {
        let Some(result) = latest.filter(|r| r.is_fresh(now_ms, self.staleness_window_ms)) else {
            return ArbitrationOutcome::geometric(geometric);
        };

        let low_confidence_warning = result.confidence < self.low_confidence_threshold;

        if result.confidence >= self.confidence_threshold {
            ArbitrationOutcome {
                fingering: suggested_fingering(result),
                correction_active: true,
                source: FingeringSource::Recognizer,
                chord_id: Some(result.chord_id.clone()),
                confidence: Some(result.confidence),
                low_confidence_warning,
            }
        } else {
            ArbitrationOutcome {
                confidence: Some(result.confidence),
                low_confidence_warning,
                ..ArbitrationOutcome::geometric(geometric)
            }
        }
    }
}

impl Default for Arbitrator {
    fn default() -> Self {
        Self::new(&ArbitrationConfig::default(), 500.0)
    }
}

/// Recognizer fingering, preferring a full set of MIDI override notes.
pub fn suggested_fingering(result: &RecognitionResult) -> FingeringMap {
    result
        .override_notes
        .as_deref()
        .and_then(FingeringMap::from_midi_notes)
        .unwrap_or(result.fingering)
}
