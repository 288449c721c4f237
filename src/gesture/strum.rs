//! Strum detector - edge-triggered state machine over fingertip motion
//!
//! Per frame, the fingertip speed is the image-plane distance travelled since
//! the previous sample divided by the elapsed time. Crossing the speed
//! threshold fires one event and the hand falls back to idle; a debounce
//! window then suppresses further events regardless of speed.
//!
//! States:
//! ```text
//!   Idle --(speed > threshold, outside debounce)--> Strumming --(next sample)--> Idle
//! ```

use std::collections::HashMap;

use crate::config::GestureConfig;
use crate::error::{log_input_error, InputError};
use crate::landmarks::{Handedness, Point3};

use super::{StrumDirection, StrumEvent, STRING_COUNT};

/// Observable phase of the strumming hand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrumPhase {
    #[default]
    Idle,
    /// The most recent sample produced a strum event
    Strumming,
}

/// Per-hand strum tracking state
#[derive(Debug, Clone, PartialEq)]
pub struct StrumState {
    pub last_position: Point3,
    pub last_timestamp_ms: f64,
    pub last_speed: f32,
    pub phase: StrumPhase,
    last_event_ms: Option<f64>,
}

impl StrumState {
    fn seeded(position: Point3, timestamp_ms: f64) -> Self {
        Self {
            last_position: position,
            last_timestamp_ms: timestamp_ms,
            last_speed: 0.0,
            phase: StrumPhase::Idle,
            last_event_ms: None,
        }
    }

    pub fn is_strumming(&self) -> bool {
        self.phase == StrumPhase::Strumming
    }

    pub fn last_event_ms(&self) -> Option<f64> {
        self.last_event_ms
    }
}

/// Keyed store of strum state, one entry per tracked strumming hand
#[derive(Debug, Default)]
pub struct StrumStore {
    states: HashMap<Handedness, StrumState>,
}

impl StrumStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hand: Handedness) -> Option<&StrumState> {
        self.states.get(&hand)
    }

    /// Forget a hand whose tracking was lost
    pub fn reset(&mut self, hand: Handedness) {
        if self.states.remove(&hand).is_some() {
            tracing::debug!("[StrumDetector] Tracking lost for {:?}, state dropped", hand);
        }
    }

    pub fn retain_present(&mut self, present: &[Handedness]) {
        self.states.retain(|hand, _| present.contains(hand));
    }
}

/// Detects strum events from fingertip samples
#[derive(Debug, Clone)]
pub struct StrumDetector {
    speed_threshold: f32,
    max_speed: f32,
    debounce_ms: f64,
}

impl StrumDetector {
    pub fn new(config: &GestureConfig) -> Self {
        Self {
            speed_threshold: config.speed_threshold,
            max_speed: config.max_speed.max(f32::EPSILON),
            debounce_ms: config.debounce_ms.max(0.0),
        }
    }

    pub fn speed_threshold(&self) -> f32 {
        self.speed_threshold
    }

    /// Feed one fingertip sample (image-normalized coordinates) for `hand`.
    pub fn update(
        &self,
        hand: Handedness,
        position: Point3,
        timestamp_ms: f64,
        store: &mut StrumStore,
    ) -> Option<StrumEvent> {
        match store.states.get_mut(&hand) {
            Some(state) => self.advance(state, position, timestamp_ms),
            None => {
                // First observation only seeds position and time.
                store
                    .states
                    .insert(hand, StrumState::seeded(position, timestamp_ms));
                None
            }
        }
    }

    /// Advance an existing state by one sample.
    pub fn advance(
        &self,
        state: &mut StrumState,
        position: Point3,
        timestamp_ms: f64,
    ) -> Option<StrumEvent> {
        let elapsed_ms = timestamp_ms - state.last_timestamp_ms;
        if !(elapsed_ms > 0.0) {
            log_input_error(
                &InputError::NonMonotonic {
                    previous_ms: state.last_timestamp_ms,
                    current_ms: timestamp_ms,
                },
                "StrumDetector::advance",
            );
            return None;
        }

        let dx = position.x - state.last_position.x;
        let dy = position.y - state.last_position.y;
        let distance = (dx * dx + dy * dy).sqrt();
        let speed = distance / (elapsed_ms / 1000.0) as f32;

        state.last_position = position;
        state.last_timestamp_ms = timestamp_ms;
        state.last_speed = speed;
        state.phase = StrumPhase::Idle;

        if speed <= self.speed_threshold {
            return None;
        }

        if let Some(last) = state.last_event_ms {
            if timestamp_ms - last < self.debounce_ms {
                tracing::trace!(
                    "[StrumDetector] Debounced strum at {:.1}ms ({:.1}ms since last)",
                    timestamp_ms,
                    timestamp_ms - last
                );
                return None;
            }
        }

        state.phase = StrumPhase::Strumming;
        state.last_event_ms = Some(timestamp_ms);

        let event = StrumEvent {
            timestamp_ms,
            string_index: string_band(position.y),
            velocity: (speed / self.max_speed).clamp(0.0, 1.0),
            direction: if dy > 0.0 {
                StrumDirection::Down
            } else {
                StrumDirection::Up
            },
            speed,
        };
        tracing::debug!(
            "[StrumDetector] Strum {:?} on string {} (speed {:.3}, velocity {:.2})",
            event.direction,
            event.string_index,
            speed,
            event.velocity
        );
        Some(event)
    }
}

impl Default for StrumDetector {
    fn default() -> Self {
        Self::new(&GestureConfig::default())
    }
}

/// Linear bucketing of the vertical image position onto the six strings.
pub fn string_band(y: f32) -> usize {
    let band = (y * STRING_COUNT as f32).floor();
    band.clamp(0.0, (STRING_COUNT - 1) as f32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: f32, y: f32) -> Point3 {
        Point3::new(x, y, 0.0)
    }

    #[test]
    fn test_first_observation_only_seeds() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        let event = detector.update(Handedness::Right, at(0.5, 0.1), 0.0, &mut store);
        assert!(event.is_none());

        let state = store.get(Handedness::Right).unwrap();
        assert_eq!(state.last_position, at(0.5, 0.1));
        assert_eq!(state.last_speed, 0.0);
    }

    #[test]
    fn test_fast_motion_emits_single_event() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.2), 0.0, &mut store);

        // 0.1 units in 16ms = 6.25 units/s, well above 0.15.
        let event = detector
            .update(Handedness::Right, at(0.5, 0.3), 16.0, &mut store)
            .expect("strum expected");

        assert_eq!(event.direction, StrumDirection::Down);
        assert_eq!(event.string_index, 1);
        assert!((0.0..=1.0).contains(&event.velocity));
        assert!(store.get(Handedness::Right).unwrap().is_strumming());
    }

    #[test]
    fn test_slow_motion_is_ignored() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.5), 0.0, &mut store);
        // 0.001 units in 16ms = 0.0625 units/s.
        let event = detector.update(Handedness::Right, at(0.5, 0.501), 16.0, &mut store);
        assert!(event.is_none());
    }

    #[test]
    fn test_non_positive_elapsed_is_discarded() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.2), 100.0, &mut store);
        let before = store.get(Handedness::Right).unwrap().clone();

        assert!(detector
            .update(Handedness::Right, at(0.5, 0.9), 100.0, &mut store)
            .is_none());
        assert!(detector
            .update(Handedness::Right, at(0.5, 0.9), 90.0, &mut store)
            .is_none());

        assert_eq!(store.get(Handedness::Right).unwrap(), &before);
    }

    #[test]
    fn test_debounce_blocks_events_regardless_of_speed() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.0), 0.0, &mut store);

        let mut events = Vec::new();
        let mut y = 0.0;
        for step in 1..=40 {
            y = if y > 0.5 { 0.0 } else { y + 0.3 };
            let t = step as f64 * 5.0;
            if let Some(event) = detector.update(Handedness::Right, at(0.5, y), t, &mut store) {
                events.push(event);
            }
        }

        assert!(!events.is_empty());
        for pair in events.windows(2) {
            assert!(pair[1].timestamp_ms - pair[0].timestamp_ms >= 50.0);
        }
    }

    #[test]
    fn test_upward_motion_reports_up() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.9), 0.0, &mut store);
        let event = detector
            .update(Handedness::Right, at(0.5, 0.6), 20.0, &mut store)
            .unwrap();
        assert_eq!(event.direction, StrumDirection::Up);
        assert_eq!(event.string_index, 3);
    }

    #[test]
    fn test_velocity_saturates() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.0, 0.0), 0.0, &mut store);
        let event = detector
            .update(Handedness::Right, at(0.0, 0.9), 1.0, &mut store)
            .unwrap();
        assert_eq!(event.velocity, 1.0);
    }

    #[test]
    fn test_phase_returns_to_idle() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.2), 0.0, &mut store);
        detector.update(Handedness::Right, at(0.5, 0.4), 16.0, &mut store);
        assert!(store.get(Handedness::Right).unwrap().is_strumming());

        detector.update(Handedness::Right, at(0.5, 0.4), 32.0, &mut store);
        assert_eq!(
            store.get(Handedness::Right).unwrap().phase,
            StrumPhase::Idle
        );
    }

    #[test]
    fn test_string_band_is_clamped() {
        assert_eq!(string_band(-0.3), 0);
        assert_eq!(string_band(0.0), 0);
        assert_eq!(string_band(0.17), 1);
        assert_eq!(string_band(0.99), 5);
        assert_eq!(string_band(1.0), 5);
        assert_eq!(string_band(4.2), 5);
    }

    #[test]
    fn test_reset_drops_state() {
        let detector = StrumDetector::default();
        let mut store = StrumStore::new();
        detector.update(Handedness::Right, at(0.5, 0.2), 0.0, &mut store);
        store.reset(Handedness::Right);
        assert!(store.get(Handedness::Right).is_none());

        // Re-seeded, so fast motion right after reappearing emits nothing.
        let event = detector.update(Handedness::Right, at(0.5, 0.9), 16.0, &mut store);
        assert!(event.is_none());
    }
}
