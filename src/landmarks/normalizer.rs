//! Landmark Normalizer - wrist-anchored, palm-scaled, EMA-smoothed pose vectors
//!
//! Each coordinate becomes `(raw - wrist) / palm_width`, flattened in canonical
//! landmark order. The result is then smoothed against the previous vector of
//! the same hand:
//!
//! ```text
//! smoothed[t] = alpha * normalized[t] + (1 - alpha) * smoothed[t - 1]
//! ```
//!
//! The first observation of a hand is passed through unsmoothed. Smoothing
//! state lives in a [`SmoothingStore`] owned by the caller, so nothing here is
//! global and a lost hand simply loses its entry.

use std::collections::HashMap;

use crate::config::NormalizerConfig;
use crate::error::InputError;

use super::{HandObservation, Handedness, LandmarkSet, PoseVector, POSE_VECTOR_LEN};

/// Smoothing state for one tracked hand
#[derive(Debug, Clone, PartialEq)]
pub struct HandSmoothingState {
    previous: [f32; POSE_VECTOR_LEN],
    samples: u64,
}

impl HandSmoothingState {
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn previous(&self) -> &[f32; POSE_VECTOR_LEN] {
        &self.previous
    }
}

/// Keyed store of per-hand smoothing state
#[derive(Debug, Default)]
pub struct SmoothingStore {
    states: HashMap<Handedness, HandSmoothingState>,
}

impl SmoothingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hand: Handedness) -> Option<&HandSmoothingState> {
        self.states.get(&hand)
    }

    pub fn contains(&self, hand: Handedness) -> bool {
        self.states.contains_key(&hand)
    }

    /// Forget a hand, so its next observation starts unsmoothed
    pub fn reset(&mut self, hand: Handedness) {
        if self.states.remove(&hand).is_some() {
            tracing::debug!("[LandmarkNormalizer] Smoothing reset for {:?}", hand);
        }
    }

    /// Drop state of every hand that is not in `present`
    pub fn retain_present(&mut self, present: &[Handedness]) {
        self.states.retain(|hand, _| present.contains(hand));
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

/// Converts landmark sets into smoothed pose vectors
#[derive(Debug, Clone)]
pub struct LandmarkNormalizer {
    alpha: f32,
    min_scale: f32,
}

impl LandmarkNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        Self {
            alpha: config.smoothing_alpha.clamp(0.0, 1.0),
            min_scale: config.min_scale.max(f32::EPSILON),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Palm width, or the minimum scale for degenerate poses
    pub fn scale_for(&self, set: &LandmarkSet) -> f32 {
        let width = set.palm_width();
        if width > self.min_scale {
            width
        } else {
            self.min_scale
        }
    }

    /// Anchor/scale normalization without smoothing. Pure.
    pub fn normalize_unsmoothed(&self, set: &LandmarkSet) -> [f32; POSE_VECTOR_LEN] {
        let anchor = set.wrist();
        let scale = self.scale_for(set);

        let mut out = [0.0_f32; POSE_VECTOR_LEN];
        for (i, point) in set.points().iter().enumerate() {
            let rel = point.sub(&anchor);
            out[i * 3] = rel.x / scale;
            out[i * 3 + 1] = rel.y / scale;
            out[i * 3 + 2] = rel.z / scale;
        }
        out
    }

    /// Normalize and smooth a validated landmark set, updating `store`.
    pub fn normalize(
        &self,
        set: &LandmarkSet,
        hand: Handedness,
        timestamp_ms: f64,
        store: &mut SmoothingStore,
    ) -> PoseVector {
        let raw = self.normalize_unsmoothed(set);

        let smoothed = match store.states.get_mut(&hand) {
            Some(state) => {
                let mut out = [0.0_f32; POSE_VECTOR_LEN];
                for (i, value) in out.iter_mut().enumerate() {
                    *value = self.alpha * raw[i] + (1.0 - self.alpha) * state.previous[i];
                }
                state.previous = out;
                state.samples += 1;
                out
            }
            None => {
                store.states.insert(
                    hand,
                    HandSmoothingState {
                        previous: raw,
                        samples: 1,
                    },
                );
                raw
            }
        };

        PoseVector::new(hand, timestamp_ms, smoothed)
    }

    /// Validate a raw observation and normalize it.
    ///
    /// A malformed set drops the hand's smoothing state, the same as the hand
    /// not being detected this frame.
    pub fn normalize_observation(
        &self,
        observation: &HandObservation,
        timestamp_ms: f64,
        store: &mut SmoothingStore,
    ) -> Result<PoseVector, InputError> {
        match LandmarkSet::try_from(observation) {
            Ok(set) => Ok(self.normalize(&set, observation.handedness, timestamp_ms, store)),
            Err(err) => {
                store.reset(observation.handedness);
                Err(err)
            }
        }
    }
}

impl Default for LandmarkNormalizer {
    fn default() -> Self {
        Self::new(&NormalizerConfig::default())
    }
}
