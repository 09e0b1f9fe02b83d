// Classifier module - per-exercise position classification
//
// Each classifier maps one JointSnapshot to a PositionSignal: whether the
// body is currently in the exercise's target position, and whether the frame
// was trustworthy enough to act on. Classifiers own whatever per-exercise
// state they need (squat start gate, pull-up bar debounce) so no state is
// shared across exercise types.
//
// Pipeline: JointSnapshot → ExerciseClassifier → PositionSignal →
// RepetitionStateMachine

use std::time::Duration;

use crate::config::{DetectionConfig, ExerciseMode};
use crate::pose::JointSnapshot;

pub mod pull_up;
pub mod push_up;
pub mod squat;

pub use pull_up::{PullUpClassifier, PullUpGate};
pub use push_up::PushUpClassifier;
pub use squat::SquatClassifier;

/// Result of classifying one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionSignal {
    /// Body is in the exercise's target position
    pub in_target_position: bool,
    /// Required joints were present and confident. When false the frame is
    /// a gap and must not move any hold timer.
    pub confidence_ok: bool,
    /// Frame was confident but discarded as tracking noise
    pub rejected_as_noise: bool,
}

impl PositionSignal {
    pub fn confident(in_target_position: bool) -> Self {
        Self {
            in_target_position,
            confidence_ok: true,
            rejected_as_noise: false,
        }
    }

    pub fn gap() -> Self {
        Self::default()
    }

    pub fn noise() -> Self {
        Self {
            rejected_as_noise: true,
            ..Self::default()
        }
    }
}

/// Common contract for the squat, push-up and pull-up analyzers
pub trait ExerciseClassifier: Send {
    fn mode(&self) -> ExerciseMode;

    /// Classify one frame. May update internal gate state.
    fn classify(&mut self, snapshot: &JointSnapshot) -> PositionSignal;

    /// Minimum target-position hold before a falling edge counts as a rep
    fn min_hold(&self) -> Duration;

    /// Forget gate state, e.g. between sets
    fn reset(&mut self);
}

/// Build the classifier for `mode`
///
/// # Returns
/// * `Some(classifier)` - for Squat, PushUp, PullUp
/// * `None` - for `ExerciseMode::None`; such sessions count no reps
pub fn classifier_for(
    mode: ExerciseMode,
    config: &DetectionConfig,
) -> Option<Box<dyn ExerciseClassifier>> {
    match mode {
        ExerciseMode::Squat => Some(Box::new(SquatClassifier::new(config.clone()))),
        ExerciseMode::PushUp => Some(Box::new(PushUpClassifier::new(config.clone()))),
        ExerciseMode::PullUp => Some(Box::new(PullUpClassifier::new(config.clone()))),
        ExerciseMode::None => None,
    }
}
