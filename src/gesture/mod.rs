//! Strum gesture detection
//!
//! The strumming hand's fingertip trajectory is reduced to discrete,
//! edge-triggered [`StrumEvent`]s. Fret resolution is not done here; the
//! orchestrator asks the arbitrator for the active fingering right after an
//! event fires.

use serde::{Deserialize, Serialize};

pub mod strum;

pub use strum::{StrumDetector, StrumPhase, StrumState, StrumStore};

/// Number of strings the vertical hand position is bucketed into
pub const STRING_COUNT: usize = 6;

/// Vertical direction of a strum in image space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrumDirection {
    /// Hand moving down the frame (low string toward high string)
    Down,
    /// Hand moving up the frame
    Up,
}

/// A detected strum
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrumEvent {
    pub timestamp_ms: f64,
    /// String band under the fingertip, 0 (low E) to 5 (high E)
    pub string_index: usize,
    /// Normalized velocity in [0, 1]
    pub velocity: f32,
    pub direction: StrumDirection,
    /// Raw fingertip speed in image units per second
    pub speed: f32,
}

impl StrumEvent {
    /// Strings crossed by this strum, in crossing order.
    ///
    /// A down strum crosses from its string toward the high string, an up
    /// strum from its string toward the low string.
    pub fn crossed_strings(&self) -> impl Iterator<Item = usize> {
        let start = self.string_index.min(STRING_COUNT - 1);
        let (lo, hi, reverse) = match self.direction {
            StrumDirection::Down => (start, STRING_COUNT - 1, false),
            StrumDirection::Up => (0, start, true),
        };
        let forward = (lo..=hi).filter(move |_| !reverse);
        let backward = (lo..=hi).rev().filter(move |_| reverse);
        forward.chain(backward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(string_index: usize, direction: StrumDirection) -> StrumEvent {
        StrumEvent {
            timestamp_ms: 0.0,
            string_index,
            velocity: 0.5,
            direction,
            speed: 1.0,
        }
    }

    #[test]
    fn test_down_strum_crosses_toward_high_string() {
        let strings: Vec<_> = event(2, StrumDirection::Down).crossed_strings().collect();
        assert_eq!(strings, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_up_strum_crosses_toward_low_string() {
        let strings: Vec<_> = event(3, StrumDirection::Up).crossed_strings().collect();
        assert_eq!(strings, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_full_down_strum() {
        let strings: Vec<_> = event(0, StrumDirection::Down).crossed_strings().collect();
        assert_eq!(strings, vec![0, 1, 2, 3, 4, 5]);
    }
}
