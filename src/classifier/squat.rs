//! Squat classifier
//!
//! Target position is both knees bent below the target angle. Counting is
//! held back until the knees have bent past the start angle once, so a user
//! standing still through the countdown is never counted.

use std::time::Duration;

use crate::config::{AngleMethod, DetectionConfig, ExerciseMode};
use crate::geometry::{angle_at_joint, angle_between};
use crate::pose::{Joint, JointSnapshot, LayerGeometry};

use super::{ExerciseClassifier, PositionSignal};

const REQUIRED_TWO_POINT: [Joint; 4] = [
    Joint::LeftHip,
    Joint::LeftKnee,
    Joint::RightHip,
    Joint::RightKnee,
];

const REQUIRED_THREE_POINT: [Joint; 6] = [
    Joint::LeftHip,
    Joint::LeftKnee,
    Joint::LeftAnkle,
    Joint::RightHip,
    Joint::RightKnee,
    Joint::RightAnkle,
];

pub struct SquatClassifier {
    config: DetectionConfig,
    layer: LayerGeometry,
    /// Set once a knee angle below the start angle has been observed
    started: bool,
}

impl SquatClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        let layer = LayerGeometry::new(config.layer_width, config.layer_height);
        Self {
            config,
            layer,
            started: false,
        }
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    /// Left and right knee angles in layer space
    fn knee_angles(&self, snapshot: &JointSnapshot) -> Option<(f32, f32)> {
        let min_confidence = self.config.min_confidence;
        match self.config.angle_method {
            AngleMethod::TwoPoint => {
                let [lh, lk, rh, rk] = snapshot
                    .confident_points(REQUIRED_TWO_POINT, min_confidence)?
                    .map(|p| self.layer.to_layer(p));
                Some((angle_between(lh, lk), angle_between(rh, rk)))
            }
            AngleMethod::ThreePoint => {
                let [lh, lk, la, rh, rk, ra] = snapshot
                    .confident_points(REQUIRED_THREE_POINT, min_confidence)?
                    .map(|p| self.layer.to_layer(p));
                Some((angle_at_joint(lh, lk, la), angle_at_joint(rh, rk, ra)))
            }
        }
    }
}

impl ExerciseClassifier for SquatClassifier {
    fn mode(&self) -> ExerciseMode {
        ExerciseMode::Squat
    }

    fn classify(&mut self, snapshot: &JointSnapshot) -> PositionSignal {
        let Some((left, right)) = self.knee_angles(snapshot) else {
            return PositionSignal::gap();
        };

        if !self.started {
            let start = self.config.squat_start_angle_deg;
            if left < start || right < start {
                tracing::debug!(
                    "[Squat] Exercise started (knees {:.1}°, {:.1}°)",
                    left,
                    right
                );
                self.started = true;
            } else {
                return PositionSignal::confident(false);
            }
        }

        let target = self.config.target_angle_deg;
        PositionSignal::confident(left < target && right < target)
    }

    fn min_hold(&self) -> Duration {
        self.config.min_hold()
    }

    fn reset(&mut self) {
        self.started = false;
    }
}
