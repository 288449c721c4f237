//! Synthetic landmark generators for tests and demo sessions.

use crate::fingering::chord_shape;
use crate::gesture::StrumDirection;
use crate::landmarks::{
    CaptureFrame, HandObservation, Handedness, Point3, INDEX_MCP, LANDMARK_COUNT, PINKY_MCP,
};
use crate::recognition::local::chord_embedding;

use super::{LandmarkSession, ScriptedRecognitionEntry};

/// 60 Hz capture
pub const FRAME_INTERVAL_MS: f64 = 1000.0 / 60.0;

/// Vertical distance from wrist to index fingertip in palm widths
const INDEX_REACH: f32 = 4.0 * 0.6;

/// A plausible open hand: wrist at `origin`, fingers fanning upward.
pub fn open_hand(origin: Point3, palm_width: f32) -> Vec<Point3> {
    let mut points = Vec::with_capacity(LANDMARK_COUNT);
    points.push(origin);
    for finger in 0..5 {
        let spread = (finger as f32 - 2.0) * palm_width / 3.0;
        for joint in 1..=4 {
            let reach = joint as f32 * palm_width * 0.6;
            points.push(Point3::new(
                origin.x + spread,
                origin.y - reach,
                origin.z + 0.01 * joint as f32,
            ));
        }
    }
    // Pin the knuckles used for scale so the palm width is exact.
    points[INDEX_MCP] = Point3::new(origin.x - palm_width / 2.0, origin.y - 0.05, origin.z);
    points[PINKY_MCP] = Point3::new(origin.x + palm_width / 2.0, origin.y - 0.05, origin.z);
    points
}

/// Open hand positioned so its index fingertip sits at `tip`
pub fn hand_with_index_tip(tip: Point3, palm_width: f32) -> Vec<Point3> {
    let origin = Point3::new(
        tip.x + palm_width / 3.0,
        tip.y + INDEX_REACH * palm_width,
        tip.z - 0.04,
    );
    open_hand(origin, palm_width)
}

/// Fretting hand whose normalized pose lines up with the local recognizer's
/// embedding of `chord_id` (wrist components aside).
pub fn chord_hand(chord_id: &str, wrist: Point3) -> Option<Vec<Point3>> {
    let shape = chord_shape(chord_id)?;
    let embedding = chord_embedding(shape);
    let mut points = Vec::with_capacity(LANDMARK_COUNT);
    points.push(wrist);
    for i in 1..LANDMARK_COUNT {
        points.push(Point3::new(
            wrist.x + embedding[i * 3],
            wrist.y + embedding[i * 3 + 1],
            wrist.z + embedding[i * 3 + 2],
        ));
    }
    Some(points)
}

/// Step-by-step builder of a strumming session
#[derive(Debug, Clone)]
pub struct SessionBuilder {
    name: String,
    strumming_hand: Handedness,
    palm_width: f32,
    tip: Point3,
    fretting: Option<Vec<Point3>>,
    clock_ms: f64,
    frames: Vec<CaptureFrame>,
    recognitions: Vec<ScriptedRecognitionEntry>,
}

impl SessionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strumming_hand: Handedness::Right,
            palm_width: 0.08,
            tip: Point3::new(0.6, 0.2, 0.0),
            fretting: None,
            clock_ms: 0.0,
            frames: Vec::new(),
            recognitions: Vec::new(),
        }
    }

    pub fn strumming_hand(mut self, hand: Handedness) -> Self {
        self.strumming_hand = hand;
        self
    }

    /// Place the strumming fingertip (image coordinates, y down).
    pub fn tip_at(mut self, x: f32, y: f32) -> Self {
        self.tip = Point3::new(x, y, 0.0);
        self
    }

    /// Show this fretting hand on every following frame.
    pub fn fretting_hand(mut self, landmarks: Vec<Point3>) -> Self {
        self.fretting = Some(landmarks);
        self
    }

    pub fn without_fretting_hand(mut self) -> Self {
        self.fretting = None;
        self
    }

    /// Keep the strumming hand still for `frames` frames.
    pub fn hold(mut self, frames: usize) -> Self {
        for _ in 0..frames {
            self.push_frame(true);
        }
        self
    }

    /// Move the fingertip `step` image units per frame for `frames` frames.
    pub fn stroke(mut self, direction: StrumDirection, frames: usize, step: f32) -> Self {
        let dy = match direction {
            StrumDirection::Down => step,
            StrumDirection::Up => -step,
        };
        for _ in 0..frames {
            self.tip.y += dy;
            self.push_frame(true);
        }
        self
    }

    /// Frames on which the strumming hand is not detected.
    pub fn lose_strumming_hand(mut self, frames: usize) -> Self {
        for _ in 0..frames {
            self.push_frame(false);
        }
        self
    }

    /// Script a recognition result arriving at the current clock.
    pub fn recognize(mut self, chord_id: &str, confidence: f32) -> Self {
        if let Some(shape) = chord_shape(chord_id) {
            self.recognitions.push(ScriptedRecognitionEntry {
                at_ms: self.clock_ms,
                chord_id: chord_id.to_string(),
                confidence,
                fingering: shape.fingering,
                override_notes: None,
                message: None,
            });
        }
        self
    }

    /// Timestamp the next frame will carry
    pub fn clock_ms(&self) -> f64 {
        self.clock_ms
    }

    pub fn build(self) -> LandmarkSession {
        LandmarkSession {
            name: self.name,
            notes: None,
            frames: self.frames,
            recognitions: self.recognitions,
        }
    }

    fn push_frame(&mut self, strumming_visible: bool) {
        let mut hands = Vec::with_capacity(2);
        if strumming_visible {
            hands.push(HandObservation {
                handedness: self.strumming_hand,
                landmarks: hand_with_index_tip(self.tip, self.palm_width),
            });
        }
        if let Some(fretting) = &self.fretting {
            hands.push(HandObservation {
                handedness: self.strumming_hand.other(),
                landmarks: fretting.clone(),
            });
        }
        self.frames.push(CaptureFrame {
            timestamp_ms: self.clock_ms,
            hands,
            body: None,
        });
        self.clock_ms += FRAME_INTERVAL_MS;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LandmarkSet;

    #[test]
    fn test_index_tip_placement() {
        let tip = Point3::new(0.4, 0.3, 0.0);
        let set = LandmarkSet::try_from(hand_with_index_tip(tip, 0.08).as_slice()).unwrap();
        let placed = set.index_tip();
        assert!((placed.x - tip.x).abs() < 1e-5);
        assert!((placed.y - tip.y).abs() < 1e-5);
    }

    #[test]
    fn test_chord_hand_is_valid_landmark_set() {
        let points = chord_hand("G_Major", Point3::new(0.3, 0.5, 0.0)).unwrap();
        assert!(LandmarkSet::try_from(points.as_slice()).is_ok());
        assert!(chord_hand("H_Major", Point3::default()).is_none());
    }

    #[test]
    fn test_builder_advances_clock() {
        let session = SessionBuilder::new("clock")
            .hold(3)
            .stroke(StrumDirection::Down, 2, 0.05)
            .build();
        assert_eq!(session.frames.len(), 5);
        assert!((session.frames[4].timestamp_ms - 4.0 * FRAME_INTERVAL_MS).abs() < 1e-9);
    }
}
