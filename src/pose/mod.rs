// Pose data model - per-frame joint snapshots from the pose oracle
//
// Coordinates are normalized to [0, 1] with the origin at the top-left of the
// preview and y growing downward. Confidence is the oracle's per-joint score.
// Snapshots may be partial: joints the oracle did not detect are simply
// absent.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::geometry::Point;

/// Body joints consumed by the classifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const ALL: [Joint; 12] = [
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];
}

/// Position plus confidence for one detected joint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub position: Point,
    pub confidence: f32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self {
            position: Point::new(x, y),
            confidence,
        }
    }
}

/// One frame of detected joints
#[derive(Debug, Clone)]
pub struct JointSnapshot {
    pub captured_at: Instant,
    joints: HashMap<Joint, Keypoint>,
}

impl JointSnapshot {
    pub fn new(captured_at: Instant) -> Self {
        Self {
            captured_at,
            joints: HashMap::with_capacity(Joint::ALL.len()),
        }
    }

    pub fn from_joints(captured_at: Instant, joints: HashMap<Joint, Keypoint>) -> Self {
        Self {
            captured_at,
            joints,
        }
    }

    pub fn with_joint(mut self, joint: Joint, keypoint: Keypoint) -> Self {
        self.joints.insert(joint, keypoint);
        self
    }

    pub fn insert(&mut self, joint: Joint, keypoint: Keypoint) {
        self.joints.insert(joint, keypoint);
    }

    pub fn get(&self, joint: Joint) -> Option<&Keypoint> {
        self.joints.get(&joint)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Normalized positions of `required` joints, or `None` if any is
    /// missing or below `min_confidence`.
    pub fn confident_points<const N: usize>(
        &self,
        required: [Joint; N],
        min_confidence: f32,
    ) -> Option<[Point; N]> {
        let mut points = [Point::default(); N];
        for (slot, joint) in points.iter_mut().zip(required) {
            let keypoint = self.joints.get(&joint)?;
            // NaN scores fail the comparison and count as missing
            if !(keypoint.confidence >= min_confidence) {
                return None;
            }
            *slot = keypoint.position;
        }
        Some(points)
    }
}

/// Preview layer dimensions for normalized → pixel conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerGeometry {
    pub width: f32,
    pub height: f32,
}

impl LayerGeometry {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn to_layer(&self, normalized: Point) -> Point {
        Point::new(normalized.x * self.width, normalized.y * self.height)
    }
}

/// Frame delivered by the pose oracle
///
/// `Dropped` marks a frame whose inference failed; it is handled like a
/// confidence gap.
#[derive(Debug, Clone)]
pub enum FrameInput {
    Snapshot(JointSnapshot),
    Dropped { at: Instant },
}

impl FrameInput {
    pub fn timestamp(&self) -> Instant {
        match self {
            FrameInput::Snapshot(snapshot) => snapshot.captured_at,
            FrameInput::Dropped { at } => *at,
        }
    }
}
