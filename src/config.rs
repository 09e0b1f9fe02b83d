//! Configuration management for the repetition engine
//!
//! Everything the engine needs from the host app (targets, detection
//! thresholds, feedback switches, biometric profile) is passed in through an
//! [`EngineConfig`] at session construction. The engine never reads shared
//! app settings on its own. Configs can be loaded from JSON for quick
//! threshold tuning without recompilation.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::SessionError;

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub profile: BiometricProfile,
}

/// Exercise selected for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExerciseMode {
    #[default]
    Squat,
    PushUp,
    PullUp,
    None,
}

impl ExerciseMode {
    /// Metabolic equivalent used for the calorie estimate
    pub fn met(&self) -> f64 {
        match self {
            ExerciseMode::Squat => 5.0,
            ExerciseMode::PushUp => 3.8,
            ExerciseMode::PullUp => 8.0,
            ExerciseMode::None => 0.0,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExerciseMode::Squat => "squat",
            ExerciseMode::PushUp => "push-up",
            ExerciseMode::PullUp => "pull-up",
            ExerciseMode::None => "none",
        }
    }
}

/// Targets and timing for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub target_repetitions: u32,
    pub target_sets: u32,
    pub rest_time_seconds: u32,
    pub exercise_mode: ExerciseMode,
    /// Countdown before the first set, in seconds
    pub countdown_seconds: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target_repetitions: 10,
            target_sets: 3,
            rest_time_seconds: 30,
            exercise_mode: ExerciseMode::Squat,
            countdown_seconds: 3,
        }
    }
}

/// How joint bend angles are measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleMethod {
    /// Directional angle of the proximal segment (hip→knee, shoulder→elbow).
    /// Only meaningful when the segment roughly hangs along gravity in frame.
    #[default]
    TwoPoint,
    /// Interior angle at the joint vertex (hip-knee-ankle, shoulder-elbow-wrist)
    ThreePoint,
}

/// Pose classification and debounce thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Joints below this confidence are treated as missing
    pub min_confidence: f32,
    /// Minimum hold in target position for squat and push-up reps
    pub min_hold_secs: f64,
    /// Continuous target hold required before a bar grab is accepted
    pub grab_confirm_secs: f64,
    /// Continuous non-target hold required before a bar release is accepted
    pub release_confirm_secs: f64,
    /// Wrists must be this far above the shoulders (layer pixels)
    pub pull_up_offset_px: f32,
    /// Wrist speed above which a drop is considered tracking noise
    pub max_wrist_speed_px_per_sec: f32,
    /// Knee/elbow angle below which the body is in target position
    pub target_angle_deg: f32,
    /// Knee angle that must be seen once before squats count
    pub squat_start_angle_deg: f32,
    pub angle_method: AngleMethod,
    /// Preview layer size used to convert normalized joints into pixels
    pub layer_width: f32,
    pub layer_height: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.3,
            min_hold_secs: 1.0,
            grab_confirm_secs: 0.7,
            release_confirm_secs: 1.5,
            pull_up_offset_px: 40.0,
            max_wrist_speed_px_per_sec: 30.0,
            target_angle_deg: 90.0,
            squat_start_angle_deg: 120.0,
            angle_method: AngleMethod::TwoPoint,
            layer_width: 390.0,
            layer_height: 844.0,
        }
    }
}

impl DetectionConfig {
    pub fn min_hold(&self) -> Duration {
        secs_to_duration(self.min_hold_secs)
    }

    pub fn grab_confirm(&self) -> Duration {
        secs_to_duration(self.grab_confirm_secs)
    }

    pub fn release_confirm(&self) -> Duration {
        secs_to_duration(self.release_confirm_secs)
    }
}

/// Millisecond-rounded conversion so 0.7 s compares as exactly 700 ms
fn secs_to_duration(secs: f64) -> Duration {
    Duration::from_millis((secs.max(0.0) * 1000.0).round() as u64)
}

/// Rep feedback switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub vibration_enabled: bool,
    pub speech_enabled: bool,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            vibration_enabled: true,
            speech_enabled: true,
        }
    }
}

/// Body stats for the calorie estimate
///
/// `gender_index` keeps the app's stored encoding (0 or 1). Zero or negative
/// stats mean "not provided".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiometricProfile {
    pub gender_index: i32,
    pub age: f64,
    pub height_cm: f64,
    pub weight_kg: f64,
}

impl EngineConfig {
    /// Check that targets and thresholds make sense before a session starts
    pub fn validate(&self) -> Result<(), SessionError> {
        let invalid = |reason: &str| {
            Err(SessionError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        if self.session.target_repetitions == 0 {
            return invalid("target_repetitions must be at least 1");
        }
        if self.session.target_sets == 0 {
            return invalid("target_sets must be at least 1");
        }

        let d = &self.detection;
        if !(0.0..=1.0).contains(&d.min_confidence) {
            return invalid("min_confidence must be within [0, 1]");
        }
        if d.min_hold_secs < 0.0 || d.grab_confirm_secs < 0.0 || d.release_confirm_secs < 0.0 {
            return invalid("debounce durations must not be negative");
        }
        if d.layer_width <= 0.0 || d.layer_height <= 0.0 {
            return invalid("layer dimensions must be positive");
        }
        Ok(())
    }

    /// Load configuration from JSON file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.detection.min_confidence, 0.3);
        assert_eq!(config.detection.min_hold(), Duration::from_secs(1));
        assert_eq!(config.detection.grab_confirm(), Duration::from_millis(700));
        assert_eq!(config.detection.release_confirm(), Duration::from_millis(1500));
        assert_eq!(config.session.countdown_seconds, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_met_constants() {
        assert_eq!(ExerciseMode::Squat.met(), 5.0);
        assert_eq!(ExerciseMode::PushUp.met(), 3.8);
        assert_eq!(ExerciseMode::PullUp.met(), 8.0);
        assert_eq!(ExerciseMode::None.met(), 0.0);
    }

    #[test]
    fn test_validate_rejects_zero_targets() {
        let mut config = EngineConfig::default();
        config.session.target_repetitions = 0;
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig { .. })
        ));

        let mut config = EngineConfig::default();
        config.session.target_sets = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{"session": {"target_repetitions": 3, "target_sets": 2,
            "rest_time_seconds": 5, "exercise_mode": "pull_up"}}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.session.exercise_mode, ExerciseMode::PullUp);
        assert_eq!(config.session.countdown_seconds, 3);
        assert_eq!(config.detection.pull_up_offset_px, 40.0);
        assert!(config.feedback.speech_enabled);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = EngineConfig::load_from_file("/nonexistent/rep_engine.json");
        assert_eq!(config.session.target_repetitions, 10);
    }
}
