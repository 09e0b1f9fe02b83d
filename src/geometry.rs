//! Geometry helpers over joint coordinates
//!
//! All functions are pure and allocation-free so they can run once per
//! camera frame.

use serde::{Deserialize, Serialize};

/// 2D point, either normalized or in layer pixels depending on caller
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Signed direction of the segment `p1 → p2` in degrees, range (-180, 180].
///
/// This is a two-point directional angle, not the bend at a joint. The squat
/// and push-up classifiers use it as a proxy for knee/elbow bend.
pub fn angle_between(p1: Point, p2: Point) -> f32 {
    let dy = p2.y - p1.y;
    let dx = p2.x - p1.x;
    dy.atan2(dx).to_degrees()
}

/// Interior angle at `vertex` formed by `a` and `b`, in degrees [0, 180].
///
/// Returns 180 for degenerate (zero-length) segments.
pub fn angle_at_joint(a: Point, vertex: Point, b: Point) -> f32 {
    let v1 = (a.x - vertex.x, a.y - vertex.y);
    let v2 = (b.x - vertex.x, b.y - vertex.y);

    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 < 1e-6 || mag2 < 1e-6 {
        return 180.0;
    }

    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    // float drift can push the ratio just past ±1
    let cos_angle = (dot / (mag1 * mag2)).clamp(-1.0, 1.0);
    cos_angle.acos().to_degrees()
}

/// Signed vertical speed `(y_now - y_prev) / dt_secs`.
///
/// Positive values mean moving down the screen. Returns 0 when `dt_secs`
/// is not positive.
pub fn vertical_speed(now: Point, prev: Point, dt_secs: f32) -> f32 {
    if dt_secs <= 0.0 {
        return 0.0;
    }
    (now.y - prev.y) / dt_secs
}

pub fn distance(p1: Point, p2: Point) -> f32 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    (dx * dx + dy * dy).sqrt()
}

pub fn midpoint(p1: Point, p2: Point) -> Point {
    Point::new((p1.x + p2.x) / 2.0, (p1.y + p2.y) / 2.0)
}
