//! Synthetic pose and frame-script builders.
//!
//! Shared by unit tests, the fixture harness and `rep_cli simulate`. Poses
//! are authored in preview-layer pixels (390x844 by default, y down) and
//! stored normalized, the way the pose oracle delivers them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{DetectionConfig, ExerciseMode};
use crate::pose::{FrameInput, Joint, JointSnapshot, Keypoint, LayerGeometry};
use crate::repetition::RepetitionEvent;
use crate::session::SessionController;

/// Default interval between scripted frames (10 fps)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Canonical poses known to the builders and fixture files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseName {
    SquatStanding,
    SquatBottom,
    PushUpTop,
    PushUpBottom,
    PullUpGrab,
    PullUpRelease,
}

/// One synthetic body pose
#[derive(Debug, Clone)]
pub struct Pose {
    layer: LayerGeometry,
    joints: HashMap<Joint, Keypoint>,
}

impl Pose {
    fn from_layer_points(layer: LayerGeometry, points: &[(Joint, f32, f32)], confidence: f32) -> Self {
        let joints = points
            .iter()
            .map(|&(joint, x, y)| {
                (
                    joint,
                    Keypoint::new(x / layer.width, y / layer.height, confidence),
                )
            })
            .collect();
        Self { layer, joints }
    }

    /// Snapshot of this pose captured at `at`
    pub fn at(&self, at: Instant) -> JointSnapshot {
        JointSnapshot::from_joints(at, self.joints.clone())
    }

    pub fn joints(&self) -> &HashMap<Joint, Keypoint> {
        &self.joints
    }

    pub fn with_confidence(mut self, joint: Joint, confidence: f32) -> Self {
        if let Some(keypoint) = self.joints.get_mut(&joint) {
            keypoint.confidence = confidence;
        }
        self
    }

    pub fn without(mut self, joint: Joint) -> Self {
        self.joints.remove(&joint);
        self
    }

    /// Overwrite `joints` with their positions in `other`
    pub fn copy_from(&mut self, other: &Pose, joints: &[Joint]) {
        for joint in joints {
            if let Some(keypoint) = other.joints.get(joint) {
                self.joints.insert(*joint, *keypoint);
            }
        }
    }

    /// Put both wrists `offset_px` above the shoulder line
    pub fn with_wrist_offset_px(mut self, offset_px: f32) -> Self {
        let shoulder_y = [Joint::LeftShoulder, Joint::RightShoulder]
            .iter()
            .filter_map(|joint| self.joints.get(joint))
            .map(|keypoint| keypoint.position.y * self.layer.height)
            .sum::<f32>()
            / 2.0;
        let wrist_y = (shoulder_y - offset_px) / self.layer.height;
        for joint in [Joint::LeftWrist, Joint::RightWrist] {
            if let Some(keypoint) = self.joints.get_mut(&joint) {
                keypoint.position.y = wrist_y;
            }
        }
        self
    }

    fn jittered(&self, rng: &mut StdRng, amount: f32) -> HashMap<Joint, Keypoint> {
        // Draw in joint order so a seed always moves the same joints
        Joint::ALL
            .iter()
            .filter_map(|joint| {
                let mut moved = *self.joints.get(joint)?;
                moved.position.x += rng.gen_range(-amount..=amount);
                moved.position.y += rng.gen_range(-amount..=amount);
                Some((*joint, moved))
            })
            .collect()
    }
}

/// Factory for canonical poses in a given preview layer
#[derive(Debug, Clone, Copy)]
pub struct PoseBuilder {
    layer: LayerGeometry,
    confidence: f32,
}

impl Default for PoseBuilder {
    fn default() -> Self {
        let detection = DetectionConfig::default();
        Self::new(LayerGeometry::new(
            detection.layer_width,
            detection.layer_height,
        ))
    }
}

impl PoseBuilder {
    pub fn new(layer: LayerGeometry) -> Self {
        Self {
            layer,
            confidence: DEFAULT_CONFIDENCE,
        }
    }

    pub fn for_detection(detection: &DetectionConfig) -> Self {
        Self::new(LayerGeometry::new(
            detection.layer_width,
            detection.layer_height,
        ))
    }

    /// Confidence stamped on every joint
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn pose(&self, name: PoseName) -> Pose {
        match name {
            PoseName::SquatStanding => self.squat_standing(),
            PoseName::SquatBottom => self.squat_bottom(),
            PoseName::PushUpTop => self.push_up_top(),
            PoseName::PushUpBottom => self.push_up_bottom(),
            PoseName::PullUpGrab => self.pull_up_grab(),
            PoseName::PullUpRelease => self.pull_up_release(),
        }
    }

    /// Poses that count as (target, rest) for `mode`
    pub fn cycle_poses(&self, mode: ExerciseMode) -> Option<(Pose, Pose)> {
        match mode {
            ExerciseMode::Squat => Some((self.squat_bottom(), self.squat_standing())),
            ExerciseMode::PushUp => Some((self.push_up_bottom(), self.push_up_top())),
            ExerciseMode::PullUp => Some((self.pull_up_grab(), self.pull_up_release())),
            ExerciseMode::None => None,
        }
    }

    /// Side view, upright; knees ~92° from hip to knee
    pub fn squat_standing(&self) -> Pose {
        self.build(&[
            (Joint::LeftShoulder, 198.0, 250.0),
            (Joint::RightShoulder, 194.0, 250.0),
            (Joint::LeftElbow, 200.0, 330.0),
            (Joint::RightElbow, 196.0, 330.0),
            (Joint::LeftWrist, 202.0, 400.0),
            (Joint::RightWrist, 198.0, 400.0),
            (Joint::LeftHip, 197.0, 420.0),
            (Joint::RightHip, 193.0, 420.0),
            (Joint::LeftKnee, 192.0, 560.0),
            (Joint::RightKnee, 188.0, 560.0),
            (Joint::LeftAnkle, 192.0, 700.0),
            (Joint::RightAnkle, 188.0, 700.0),
        ])
    }

    /// Hips dropped below the knees
    pub fn squat_bottom(&self) -> Pose {
        self.build(&[
            (Joint::LeftShoulder, 230.0, 430.0),
            (Joint::RightShoulder, 226.0, 430.0),
            (Joint::LeftElbow, 290.0, 450.0),
            (Joint::RightElbow, 286.0, 450.0),
            (Joint::LeftWrist, 340.0, 440.0),
            (Joint::RightWrist, 336.0, 440.0),
            (Joint::LeftHip, 202.0, 600.0),
            (Joint::RightHip, 198.0, 600.0),
            (Joint::LeftKnee, 282.0, 560.0),
            (Joint::RightKnee, 278.0, 560.0),
            (Joint::LeftAnkle, 242.0, 700.0),
            (Joint::RightAnkle, 238.0, 700.0),
        ])
    }

    /// Arms locked out
    pub fn push_up_top(&self) -> Pose {
        self.build(&[
            (Joint::LeftShoulder, 200.0, 400.0),
            (Joint::RightShoulder, 196.0, 400.0),
            (Joint::LeftElbow, 195.0, 480.0),
            (Joint::RightElbow, 191.0, 480.0),
            (Joint::LeftWrist, 195.0, 560.0),
            (Joint::RightWrist, 191.0, 560.0),
            (Joint::LeftHip, 110.0, 420.0),
            (Joint::RightHip, 106.0, 420.0),
            (Joint::LeftKnee, 40.0, 450.0),
            (Joint::RightKnee, 36.0, 450.0),
            (Joint::LeftAnkle, 10.0, 470.0),
            (Joint::RightAnkle, 6.0, 470.0),
        ])
    }

    /// Chest lowered, elbows bent back above the shoulders
    pub fn push_up_bottom(&self) -> Pose {
        self.build(&[
            (Joint::LeftShoulder, 200.0, 520.0),
            (Joint::RightShoulder, 196.0, 520.0),
            (Joint::LeftElbow, 160.0, 500.0),
            (Joint::RightElbow, 156.0, 500.0),
            (Joint::LeftWrist, 195.0, 560.0),
            (Joint::RightWrist, 191.0, 560.0),
            (Joint::LeftHip, 110.0, 530.0),
            (Joint::RightHip, 106.0, 530.0),
            (Joint::LeftKnee, 40.0, 540.0),
            (Joint::RightKnee, 36.0, 540.0),
            (Joint::LeftAnkle, 10.0, 550.0),
            (Joint::RightAnkle, 6.0, 550.0),
        ])
    }

    /// Front view, hands on the bar 150 px above the shoulders
    pub fn pull_up_grab(&self) -> Pose {
        self.hanging(250.0, 320.0)
    }

    /// Arms down at the sides
    pub fn pull_up_release(&self) -> Pose {
        self.hanging(520.0, 460.0)
    }

    fn hanging(&self, wrist_y: f32, elbow_y: f32) -> Pose {
        self.build(&[
            (Joint::LeftShoulder, 175.0, 400.0),
            (Joint::RightShoulder, 215.0, 400.0),
            (Joint::LeftElbow, 160.0, elbow_y),
            (Joint::RightElbow, 230.0, elbow_y),
            (Joint::LeftWrist, 170.0, wrist_y),
            (Joint::RightWrist, 220.0, wrist_y),
            (Joint::LeftHip, 180.0, 560.0),
            (Joint::RightHip, 210.0, 560.0),
            (Joint::LeftKnee, 182.0, 680.0),
            (Joint::RightKnee, 208.0, 680.0),
            (Joint::LeftAnkle, 184.0, 790.0),
            (Joint::RightAnkle, 206.0, 790.0),
        ])
    }

    fn build(&self, points: &[(Joint, f32, f32)]) -> Pose {
        Pose::from_layer_points(self.layer, points, self.confidence)
    }
}

/// One frame of a script, offset from the script start
///
/// `joints: None` is a frame the oracle dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptedFrame {
    pub offset_ms: u64,
    #[serde(default)]
    pub joints: Option<HashMap<Joint, Keypoint>>,
}

impl ScriptedFrame {
    pub fn timestamp(&self, base: Instant) -> Instant {
        base + Duration::from_millis(self.offset_ms)
    }

    pub fn to_input(&self, base: Instant) -> FrameInput {
        let at = self.timestamp(base);
        match &self.joints {
            Some(joints) => FrameInput::Snapshot(JointSnapshot::from_joints(at, joints.clone())),
            None => FrameInput::Dropped { at },
        }
    }
}

/// Builds a timed sequence of frames at a fixed frame interval
#[derive(Debug)]
pub struct ScriptBuilder {
    interval: Duration,
    cursor: Duration,
    frames: Vec<ScriptedFrame>,
    jitter: Option<(StdRng, f32)>,
}

impl Default for ScriptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl ScriptBuilder {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            cursor: Duration::ZERO,
            frames: Vec::new(),
            jitter: None,
        }
    }

    /// Add seeded positional noise of up to `amount` (normalized units)
    pub fn with_jitter(mut self, seed: u64, amount: f32) -> Self {
        if amount > 0.0 {
            self.jitter = Some((StdRng::seed_from_u64(seed), amount));
        }
        self
    }

    /// Offset of the next frame
    pub fn cursor(&self) -> Duration {
        self.cursor
    }

    /// Emit `pose` every interval for `duration`
    pub fn hold(&mut self, pose: &Pose, duration: Duration) -> &mut Self {
        for _ in 0..self.frame_count(duration) {
            let joints = match self.jitter.as_mut() {
                Some((rng, amount)) => pose.jittered(rng, *amount),
                None => pose.joints.clone(),
            };
            self.push(Some(joints));
        }
        self
    }

    /// Frames the oracle failed to produce
    pub fn dropout(&mut self, duration: Duration) -> &mut Self {
        for _ in 0..self.frame_count(duration) {
            self.push(None);
        }
        self
    }

    /// Advance time without any frames
    pub fn idle(&mut self, duration: Duration) -> &mut Self {
        self.cursor += duration;
        self
    }

    /// One full repetition for `mode` with timings that comfortably pass
    /// the default debounce windows
    pub fn repetition(&mut self, poses: &PoseBuilder, mode: ExerciseMode) -> &mut Self {
        let Some((target, rest)) = poses.cycle_poses(mode) else {
            return self;
        };
        match mode {
            ExerciseMode::PullUp => self
                .hold(&target, Duration::from_millis(1000))
                .hold(&rest, Duration::from_millis(2000)),
            _ => self
                .hold(&rest, Duration::from_millis(500))
                .hold(&target, Duration::from_millis(1200))
                .hold(&rest, Duration::from_millis(500)),
        }
    }

    pub fn repetitions(&mut self, poses: &PoseBuilder, mode: ExerciseMode, count: u32) -> &mut Self {
        for _ in 0..count {
            self.repetition(poses, mode);
        }
        self
    }

    pub fn frames(&self) -> &[ScriptedFrame] {
        &self.frames
    }

    pub fn build(&self) -> Vec<ScriptedFrame> {
        self.frames.clone()
    }

    fn frame_count(&self, duration: Duration) -> u64 {
        let interval = self.interval.as_millis().max(1);
        duration.as_millis().div_ceil(interval) as u64
    }

    fn push(&mut self, joints: Option<HashMap<Joint, Keypoint>>) {
        self.frames.push(ScriptedFrame {
            offset_ms: self.cursor.as_millis() as u64,
            joints,
        });
        self.cursor += self.interval;
    }
}

/// Feed `frames` into `controller`, ticking at every frame time first.
/// Returns the repetition events in order.
pub fn drive(
    controller: &mut SessionController,
    base: Instant,
    frames: &[ScriptedFrame],
) -> Vec<RepetitionEvent> {
    let mut events = Vec::new();
    for frame in frames {
        controller.tick(frame.timestamp(base));
        if let Some(event) = controller.on_frame(frame.to_input(base)) {
            events.push(event);
        }
    }
    events
}

/// Tick once per second for `seconds` seconds after `from`; returns the last tick time
pub fn tick_for(controller: &mut SessionController, from: Instant, seconds: u32) -> Instant {
    let mut now = from;
    for _ in 0..seconds {
        now += Duration::from_secs(1);
        controller.tick(now);
    }
    now
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_emits_frames_at_interval() {
        let poses = PoseBuilder::default();
        let frames = ScriptBuilder::default()
            .hold(&poses.squat_standing(), Duration::from_millis(500))
            .dropout(Duration::from_millis(200))
            .build();

        assert_eq!(frames.len(), 7);
        assert_eq!(frames[0].offset_ms, 0);
        assert_eq!(frames[4].offset_ms, 400);
        assert!(frames[5].joints.is_none());
        assert_eq!(frames[6].offset_ms, 600);
    }

    #[test]
    fn test_idle_advances_cursor_without_frames() {
        let poses = PoseBuilder::default();
        let mut script = ScriptBuilder::default();
        script.idle(Duration::from_secs(3));
        script.hold(&poses.push_up_top(), Duration::from_millis(100));
        let frames = script.build();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].offset_ms, 3000);
    }

    #[test]
    fn test_jitter_is_deterministic_per_seed() {
        let poses = PoseBuilder::default();
        let build = |seed| {
            ScriptBuilder::default()
                .with_jitter(seed, 0.002)
                .hold(&poses.squat_bottom(), Duration::from_millis(300))
                .build()
        };
        let a = build(7);
        let b = build(7);
        let left_knee = |frames: &[ScriptedFrame]| {
            frames[2].joints.as_ref().unwrap()[&Joint::LeftKnee].position
        };
        assert_eq!(left_knee(&a[..]), left_knee(&b[..]));
        assert_ne!(left_knee(&a[..]), poses.squat_bottom().joints()[&Joint::LeftKnee].position);
    }

    #[test]
    fn test_same_seed_moves_every_joint_identically() {
        let poses = PoseBuilder::default();
        let build = || {
            ScriptBuilder::default()
                .with_jitter(7, 0.01)
                .hold(&poses.squat_bottom(), Duration::from_millis(500))
                .build()
        };
        let reference = build();
        for _ in 0..20 {
            let again = build();
            assert_eq!(again.len(), reference.len());
            for (left, right) in reference.iter().zip(&again) {
                let (left, right) = (left.joints.as_ref().unwrap(), right.joints.as_ref().unwrap());
                for joint in Joint::ALL {
                    assert_eq!(left[&joint].position, right[&joint].position, "{joint:?}");
                }
            }
        }
    }

    #[test]
    fn test_wrist_offset_is_in_layer_pixels() {
        let poses = PoseBuilder::default();
        let pose = poses.pull_up_grab().with_wrist_offset_px(30.0);
        let wrist = pose.joints()[&Joint::LeftWrist].position;
        assert!((wrist.y * 844.0 - 370.0).abs() < 0.01);
    }

    #[test]
    fn test_none_mode_has_no_cycle() {
        let poses = PoseBuilder::default();
        assert!(poses.cycle_poses(ExerciseMode::None).is_none());
        let frames = ScriptBuilder::default()
            .repetition(&poses, ExerciseMode::None)
            .build();
        assert!(frames.is_empty());
    }
}
