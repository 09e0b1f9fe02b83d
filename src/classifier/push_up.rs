//! Push-up classifier
//!
//! Target position is both elbows bent below the target angle. No start
//! gate: position is tracked from the first confident frame.

use std::time::Duration;

use crate::config::{AngleMethod, DetectionConfig, ExerciseMode};
use crate::geometry::{angle_at_joint, angle_between};
use crate::pose::{Joint, JointSnapshot, LayerGeometry};

use super::{ExerciseClassifier, PositionSignal};

const REQUIRED_TWO_POINT: [Joint; 4] = [
    Joint::LeftShoulder,
    Joint::LeftElbow,
    Joint::RightShoulder,
    Joint::RightElbow,
];

const REQUIRED_THREE_POINT: [Joint; 6] = [
    Joint::LeftShoulder,
    Joint::LeftElbow,
    Joint::LeftWrist,
    Joint::RightShoulder,
    Joint::RightElbow,
    Joint::RightWrist,
];

pub struct PushUpClassifier {
    config: DetectionConfig,
    layer: LayerGeometry,
}

impl PushUpClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        let layer = LayerGeometry::new(config.layer_width, config.layer_height);
        Self { config, layer }
    }

    fn elbow_angles(&self, snapshot: &JointSnapshot) -> Option<(f32, f32)> {
        let min_confidence = self.config.min_confidence;
        match self.config.angle_method {
            AngleMethod::TwoPoint => {
                let [ls, le, rs, re] = snapshot
                    .confident_points(REQUIRED_TWO_POINT, min_confidence)?
                    .map(|p| self.layer.to_layer(p));
                Some((angle_between(ls, le), angle_between(rs, re)))
            }
            AngleMethod::ThreePoint => {
                let [ls, le, lw, rs, re, rw] = snapshot
                    .confident_points(REQUIRED_THREE_POINT, min_confidence)?
                    .map(|p| self.layer.to_layer(p));
                Some((angle_at_joint(ls, le, lw), angle_at_joint(rs, re, rw)))
            }
        }
    }
}

impl ExerciseClassifier for PushUpClassifier {
    fn mode(&self) -> ExerciseMode {
        ExerciseMode::PushUp
    }

    fn classify(&mut self, snapshot: &JointSnapshot) -> PositionSignal {
        match self.elbow_angles(snapshot) {
            Some((left, right)) => {
                let target = self.config.target_angle_deg;
                PositionSignal::confident(left < target && right < target)
            }
            None => PositionSignal::gap(),
        }
    }

    fn min_hold(&self) -> Duration {
        self.config.min_hold()
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::PoseBuilder;
    use std::time::Instant;

    #[test]
    fn test_top_and_bottom_positions() {
        let poses = PoseBuilder::default();
        let mut push_up = PushUpClassifier::new(DetectionConfig::default());

        let top = push_up.classify(&poses.push_up_top().at(Instant::now()));
        assert_eq!(top, PositionSignal::confident(false));

        let bottom = push_up.classify(&poses.push_up_bottom().at(Instant::now()));
        assert_eq!(bottom, PositionSignal::confident(true));
    }

    #[test]
    fn test_three_point_angles_agree() {
        let poses = PoseBuilder::default();
        let mut config = DetectionConfig::default();
        config.angle_method = AngleMethod::ThreePoint;
        let mut push_up = PushUpClassifier::new(config);

        assert!(!push_up
            .classify(&poses.push_up_top().at(Instant::now()))
            .in_target_position);
        assert!(push_up
            .classify(&poses.push_up_bottom().at(Instant::now()))
            .in_target_position);
    }

    #[test]
    fn test_three_point_needs_wrists() {
        let poses = PoseBuilder::default();
        let mut config = DetectionConfig::default();
        config.angle_method = AngleMethod::ThreePoint;
        let mut push_up = PushUpClassifier::new(config);

        let pose = poses.push_up_bottom().without(Joint::RightWrist);
        assert_eq!(
            push_up.classify(&pose.at(Instant::now())),
            PositionSignal::gap()
        );
    }

    #[test]
    fn test_low_confidence_elbow_is_gap() {
        let poses = PoseBuilder::default();
        let mut push_up = PushUpClassifier::new(DetectionConfig::default());
        let pose = poses.push_up_bottom().with_confidence(Joint::LeftElbow, 0.2);
        assert_eq!(
            push_up.classify(&pose.at(Instant::now())),
            PositionSignal::gap()
        );
    }
}
