//! Skeleton schema and landmarks
//!
//! A landmark is one tracked joint position with the detector's confidence.
//! The joint naming follows the 33-point BlazePose topology; only the joints
//! squat analysis needs are named here, the rest are dropped on import.

use serde::{Deserialize, Serialize};

use crate::FrameTime;

/// Joint identifier for the tracked skeleton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,

    LeftShoulder,
    RightShoulder,

    LeftHip,
    RightHip,

    LeftKnee,
    RightKnee,

    LeftAnkle,
    RightAnkle,

    LeftFootIndex,
    RightFootIndex,
}

impl Joint {
    /// All joints in schema order
    pub fn all() -> &'static [Joint] {
        &[
            Joint::Nose,
            Joint::LeftShoulder,
            Joint::RightShoulder,
            Joint::LeftHip,
            Joint::RightHip,
            Joint::LeftKnee,
            Joint::RightKnee,
            Joint::LeftAnkle,
            Joint::RightAnkle,
            Joint::LeftFootIndex,
            Joint::RightFootIndex,
        ]
    }

    /// Number of joints
    pub fn count() -> usize {
        Joint::all().len()
    }

    /// Index of this joint in the 33-point BlazePose output
    pub fn blazepose_index(self) -> usize {
        match self {
            Joint::Nose => 0,
            Joint::LeftShoulder => 11,
            Joint::RightShoulder => 12,
            Joint::LeftHip => 23,
            Joint::RightHip => 24,
            Joint::LeftKnee => 25,
            Joint::RightKnee => 26,
            Joint::LeftAnkle => 27,
            Joint::RightAnkle => 28,
            Joint::LeftFootIndex => 31,
            Joint::RightFootIndex => 32,
        }
    }

    /// Inverse of [`Joint::blazepose_index`]
    pub fn from_blazepose_index(index: usize) -> Option<Joint> {
        Joint::all()
            .iter()
            .copied()
            .find(|j| j.blazepose_index() == index)
    }
}

/// Body side facing the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn shoulder(self) -> Joint {
        match self {
            Side::Left => Joint::LeftShoulder,
            Side::Right => Joint::RightShoulder,
        }
    }

    pub fn hip(self) -> Joint {
        match self {
            Side::Left => Joint::LeftHip,
            Side::Right => Joint::RightHip,
        }
    }

    pub fn knee(self) -> Joint {
        match self {
            Side::Left => Joint::LeftKnee,
            Side::Right => Joint::RightKnee,
        }
    }

    pub fn ankle(self) -> Joint {
        match self {
            Side::Left => Joint::LeftAnkle,
            Side::Right => Joint::RightAnkle,
        }
    }

    pub fn foot(self) -> Joint {
        match self {
            Side::Left => Joint::LeftFootIndex,
            Side::Right => Joint::RightFootIndex,
        }
    }

    /// Joints of this side needed for squat analysis
    pub fn chain(self) -> [Joint; 4] {
        [self.shoulder(), self.hip(), self.knee(), self.ankle()]
    }
}

/// 2D or 3D position, normalized image coordinates (y grows downwards)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_depth(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Planar distance to another position
    pub fn distance(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f32::is_finite)
    }
}

/// One tracked joint with the detector's confidence in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub joint: Joint,
    pub position: Position,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(joint: Joint, position: Position, visibility: f32) -> Self {
        Self {
            joint,
            position,
            visibility,
        }
    }
}

/// The complete landmark set for one video frame
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LandmarkFrame {
    /// Capture timestamp
    pub timestamp: FrameTime,

    /// Tracked joints; joints the detector did not report are absent
    pub landmarks: Vec<Landmark>,

    /// Whole-frame presence score from the detector, if it provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence: Option<f32>,
}

impl LandmarkFrame {
    pub fn new(timestamp: FrameTime, landmarks: Vec<Landmark>) -> Self {
        Self {
            timestamp,
            landmarks,
            presence: None,
        }
    }

    /// Frame with no subject detected
    pub fn empty(timestamp: FrameTime) -> Self {
        Self::new(timestamp, Vec::new())
    }

    pub fn with_presence(mut self, presence: f32) -> Self {
        self.presence = Some(presence);
        self
    }

    /// Build from raw BlazePose rows of `[x, y, z, visibility]`
    pub fn from_blazepose(timestamp: FrameTime, rows: &[[f32; 4]]) -> Self {
        let landmarks = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let joint = Joint::from_blazepose_index(i)?;
                Some(Landmark::new(
                    joint,
                    Position::with_depth(row[0], row[1], row[2]),
                    row[3],
                ))
            })
            .collect();
        Self::new(timestamp, landmarks)
    }

    /// Get a landmark by joint
    pub fn get(&self, joint: Joint) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.joint == joint)
    }

    /// Set or replace a landmark
    pub fn set(&mut self, landmark: Landmark) {
        match self.landmarks.iter_mut().find(|l| l.joint == landmark.joint) {
            Some(existing) => *existing = landmark,
            None => self.landmarks.push(landmark),
        }
    }

    /// Remove a landmark, returning it if present
    pub fn remove(&mut self, joint: Joint) -> Option<Landmark> {
        let idx = self.landmarks.iter().position(|l| l.joint == joint)?;
        Some(self.landmarks.remove(idx))
    }

    /// Mean visibility over the given joints; missing joints count as zero
    pub fn mean_visibility(&self, joints: &[Joint]) -> f32 {
        if joints.is_empty() {
            return 0.0;
        }
        let sum: f32 = joints
            .iter()
            .map(|j| self.get(*j).map_or(0.0, |l| sanitize_visibility(l.visibility)))
            .sum();
        sum / joints.len() as f32
    }

    /// True if every listed joint is present
    pub fn contains_all(&self, joints: &[Joint]) -> bool {
        joints.iter().all(|j| self.get(*j).is_some())
    }
}

/// Clamp a detector visibility into [0, 1], mapping NaN to zero
#[inline]
pub fn sanitize_visibility(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}
