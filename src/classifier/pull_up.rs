//! Pull-up classifier with bar grab/release debounce
//!
//! Raw position: average wrist Y more than `pull_up_offset_px` above average
//! shoulder Y in layer space (y grows downward). Wrist tracking near the bar
//! is noisy, so the raw signal goes through [`PullUpGate`]: a grab is only
//! accepted after a continuous raw-target hold of `grab_confirm`, a release
//! only after a continuous raw-non-target hold of `release_confirm`.
//!
//! While the bar is grabbed, a non-target frame with wrist speed above
//! `max_wrist_speed_px_per_sec` is treated as a tracking jump and reported as
//! noise, unless the release debounce has already run its full length.

use std::time::{Duration, Instant};

use crate::config::{DetectionConfig, ExerciseMode};
use crate::geometry::{midpoint, vertical_speed, Point};
use crate::pose::{Joint, JointSnapshot, LayerGeometry};

use super::{ExerciseClassifier, PositionSignal};

const REQUIRED: [Joint; 4] = [
    Joint::LeftWrist,
    Joint::RightWrist,
    Joint::LeftShoulder,
    Joint::RightShoulder,
];

/// Grab/release debounce state
#[derive(Debug, Clone)]
pub struct PullUpGate {
    is_bar_grabbed: bool,
    bar_grab_start: Option<Instant>,
    bar_release_start: Option<Instant>,
    grab_confirm: Duration,
    release_confirm: Duration,
}

impl PullUpGate {
    pub fn new(grab_confirm: Duration, release_confirm: Duration) -> Self {
        Self {
            is_bar_grabbed: false,
            bar_grab_start: None,
            bar_release_start: None,
            grab_confirm,
            release_confirm,
        }
    }

    pub fn is_bar_grabbed(&self) -> bool {
        self.is_bar_grabbed
    }

    /// Whether a release pending since `bar_release_start` has held long
    /// enough to be accepted at `now`
    pub fn release_due(&self, now: Instant) -> bool {
        self.bar_release_start
            .map(|start| now.saturating_duration_since(start) >= self.release_confirm)
            .unwrap_or(false)
    }

    /// Feed one confident raw sample and return the debounced grab state
    pub fn update(&mut self, raw_target: bool, now: Instant) -> bool {
        match (self.is_bar_grabbed, raw_target) {
            (false, true) => {
                let start = *self.bar_grab_start.get_or_insert(now);
                if now.saturating_duration_since(start) >= self.grab_confirm {
                    tracing::debug!("[PullUp] Bar grab confirmed");
                    self.is_bar_grabbed = true;
                    self.bar_grab_start = None;
                }
            }
            (false, false) => {
                // interruption restarts the grab debounce
                self.bar_grab_start = None;
            }
            (true, true) => {
                self.bar_release_start = None;
            }
            (true, false) => {
                let start = *self.bar_release_start.get_or_insert(now);
                if now.saturating_duration_since(start) >= self.release_confirm {
                    tracing::debug!("[PullUp] Bar release confirmed");
                    self.is_bar_grabbed = false;
                    self.bar_release_start = None;
                }
            }
        }
        self.is_bar_grabbed
    }

    pub fn reset(&mut self) {
        self.is_bar_grabbed = false;
        self.bar_grab_start = None;
        self.bar_release_start = None;
    }
}

pub struct PullUpClassifier {
    config: DetectionConfig,
    layer: LayerGeometry,
    gate: PullUpGate,
    /// Average wrist position of the last confident frame
    last_wrist: Option<(Point, Instant)>,
}

impl PullUpClassifier {
    pub fn new(config: DetectionConfig) -> Self {
        let layer = LayerGeometry::new(config.layer_width, config.layer_height);
        let gate = PullUpGate::new(config.grab_confirm(), config.release_confirm());
        Self {
            config,
            layer,
            gate,
            last_wrist: None,
        }
    }

    pub fn gate(&self) -> &PullUpGate {
        &self.gate
    }

    fn wrist_speed(&self, wrist: Point, now: Instant) -> f32 {
        match self.last_wrist {
            Some((prev, at)) => {
                let dt = now.saturating_duration_since(at).as_secs_f32();
                vertical_speed(wrist, prev, dt)
            }
            None => 0.0,
        }
    }
}

impl ExerciseClassifier for PullUpClassifier {
    fn mode(&self) -> ExerciseMode {
        ExerciseMode::PullUp
    }

    fn classify(&mut self, snapshot: &JointSnapshot) -> PositionSignal {
        let Some(points) = snapshot.confident_points(REQUIRED, self.config.min_confidence) else {
            return PositionSignal::gap();
        };
        let [lw, rw, ls, rs] = points.map(|p| self.layer.to_layer(p));
        let now = snapshot.captured_at;

        let wrist = midpoint(lw, rw);
        let shoulder = midpoint(ls, rs);
        let raw_target = shoulder.y - wrist.y > self.config.pull_up_offset_px;

        let speed = self.wrist_speed(wrist, now);
        self.last_wrist = Some((wrist, now));

        if self.gate.is_bar_grabbed()
            && !raw_target
            && speed.abs() > self.config.max_wrist_speed_px_per_sec
            && !self.gate.release_due(now)
        {
            tracing::debug!(
                "[PullUp] Ignoring wrist jump ({:.1} px/s) while on the bar",
                speed
            );
            return PositionSignal::noise();
        }

        PositionSignal::confident(self.gate.update(raw_target, now))
    }

    /// The gate already enforces timing, so any grab→release cycle counts
    fn min_hold(&self) -> Duration {
        Duration::ZERO
    }

    fn reset(&mut self) {
        self.gate.reset();
        self.last_wrist = None;
    }
}
