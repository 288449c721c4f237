//! Hand landmark types and normalization
//!
//! The capture collaborator delivers, once per frame, a set of 21 3D points
//! per detected hand. This module validates those sets and turns them into
//! translation/scale invariant pose vectors (see [`normalizer`]).

use serde::{Deserialize, Serialize};

use crate::error::InputError;

pub mod normalizer;

pub use normalizer::{HandSmoothingState, LandmarkNormalizer, SmoothingStore};

/// Number of landmarks per hand
pub const LANDMARK_COUNT: usize = 21;

/// Length of a flattened pose vector (21 landmarks x 3 coordinates)
pub const POSE_VECTOR_LEN: usize = LANDMARK_COUNT * 3;

/// Landmark indices used by the pipeline
pub const WRIST: usize = 0;
pub const INDEX_MCP: usize = 5;
pub const INDEX_TIP: usize = 8;
pub const PINKY_MCP: usize = 17;

/// A single 3D landmark
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn sub(&self, other: &Point3) -> Point3 {
        Point3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn distance(&self, other: &Point3) -> f32 {
        let d = self.sub(other);
        (d.x * d.x + d.y * d.y + d.z * d.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Hand identity as labelled by the pose estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn other(&self) -> Handedness {
        match self {
            Handedness::Left => Handedness::Right,
            Handedness::Right => Handedness::Left,
        }
    }
}

/// Body anchor points forwarded by the capture collaborator.
///
/// Only the renderer uses these; the pipeline carries them through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyAnchors {
    pub left_shoulder: Option<Point3>,
    pub right_shoulder: Option<Point3>,
    pub left_hip: Option<Point3>,
    pub right_hip: Option<Point3>,
}

/// Raw per-hand detection as delivered by the capture collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    pub handedness: Handedness,
    pub landmarks: Vec<Point3>,
}

/// Everything captured for one video frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureFrame {
    /// Monotonic capture timestamp in milliseconds
    pub timestamp_ms: f64,
    #[serde(default)]
    pub hands: Vec<HandObservation>,
    #[serde(default)]
    pub body: Option<BodyAnchors>,
}

impl CaptureFrame {
    pub fn hand(&self, handedness: Handedness) -> Option<&HandObservation> {
        self.hands.iter().find(|h| h.handedness == handedness)
    }
}

/// A validated set of exactly 21 finite landmarks
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: [Point3; LANDMARK_COUNT],
}

impl LandmarkSet {
    pub fn point(&self, index: usize) -> Point3 {
        self.points[index]
    }

    pub fn points(&self) -> &[Point3; LANDMARK_COUNT] {
        &self.points
    }

    pub fn wrist(&self) -> Point3 {
        self.points[WRIST]
    }

    pub fn index_tip(&self) -> Point3 {
        self.points[INDEX_TIP]
    }

    /// Distance between the index and pinky knuckles
    pub fn palm_width(&self) -> f32 {
        self.points[INDEX_MCP].distance(&self.points[PINKY_MCP])
    }
}

impl TryFrom<&[Point3]> for LandmarkSet {
    type Error = InputError;

    fn try_from(raw: &[Point3]) -> Result<Self, Self::Error> {
        if raw.len() != LANDMARK_COUNT {
            return Err(InputError::LandmarkCount {
                expected: LANDMARK_COUNT,
                actual: raw.len(),
            });
        }
        if let Some(landmark) = raw.iter().position(|p| !p.is_finite()) {
            return Err(InputError::NonFinite { landmark });
        }

        let mut points = [Point3::default(); LANDMARK_COUNT];
        points.copy_from_slice(raw);
        Ok(Self { points })
    }
}

impl TryFrom<&HandObservation> for LandmarkSet {
    type Error = InputError;

    fn try_from(observation: &HandObservation) -> Result<Self, Self::Error> {
        LandmarkSet::try_from(observation.landmarks.as_slice())
    }
}

/// Translation/scale invariant, smoothed pose of one hand
#[derive(Debug, Clone, PartialEq)]
pub struct PoseVector {
    pub hand: Handedness,
    pub timestamp_ms: f64,
    values: [f32; POSE_VECTOR_LEN],
}

impl PoseVector {
    pub fn new(hand: Handedness, timestamp_ms: f64, values: [f32; POSE_VECTOR_LEN]) -> Self {
        Self {
            hand,
            timestamp_ms,
            values,
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn values(&self) -> &[f32; POSE_VECTOR_LEN] {
        &self.values
    }

    pub fn landmark(&self, index: usize) -> Point3 {
        let base = index * 3;
        Point3::new(self.values[base], self.values[base + 1], self.values[base + 2])
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    pub use crate::fixtures::synthetic::open_hand;
}
