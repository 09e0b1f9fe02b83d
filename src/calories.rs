//! Calorie & timing accumulator
//!
//! Energy estimate: `MET × (BMR / 1440) × active_minutes`, where active time
//! only grows on once-per-second ticks that find the body in target
//! position. BMR uses Harris-Benedict with the gender index as the app
//! stores it:
//!
//! - index 0: `88.362 + 13.397·w + 4.799·h − 5.677·a`
//! - index 1: `447.593 + 9.247·w + 3.098·h − 4.330·a`
//!
//! Missing stats (≤ 0) or an unknown index pin the estimate to zero for the
//! whole session.
//!
//! Average rep speed is the mean wall-clock gap between consecutive reps of
//! a set; the first rep of each set has no predecessor and adds nothing.

use std::time::{Duration, Instant};

use crate::config::{BiometricProfile, ExerciseMode};

const MINUTES_PER_DAY: f64 = 1440.0;

/// Harris-Benedict BMR in kcal/day, or `None` when the profile is incomplete
pub fn basal_metabolic_rate(profile: &BiometricProfile) -> Option<f64> {
    if profile.weight_kg <= 0.0 || profile.height_cm <= 0.0 || profile.age <= 0.0 {
        return None;
    }

    let (w, h, a) = (profile.weight_kg, profile.height_cm, profile.age);
    match profile.gender_index {
        0 => Some(88.362 + 13.397 * w + 4.799 * h - 5.677 * a),
        1 => Some(447.593 + 9.247 * w + 3.098 * h - 4.330 * a),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct CalorieAccumulator {
    met: f64,
    bmr: Option<f64>,
    active_time: Duration,
    calories_burned: f64,
    last_rep_at: Option<Instant>,
    total_rep_interval: Duration,
    rep_interval_count: u32,
}

impl CalorieAccumulator {
    pub fn new(mode: ExerciseMode, profile: &BiometricProfile) -> Self {
        let bmr = basal_metabolic_rate(profile);
        if bmr.is_none() {
            tracing::warn!(
                "[Calories] Biometric profile incomplete (gender {}, age {}, height {}, weight {}); calories stay at 0",
                profile.gender_index,
                profile.age,
                profile.height_cm,
                profile.weight_kg
            );
        }

        Self {
            met: mode.met(),
            bmr,
            active_time: Duration::ZERO,
            calories_burned: 0.0,
            last_rep_at: None,
            total_rep_interval: Duration::ZERO,
            rep_interval_count: 0,
        }
    }

    pub fn bmr(&self) -> Option<f64> {
        self.bmr
    }

    pub fn calories_burned(&self) -> f64 {
        self.calories_burned
    }

    pub fn active_time(&self) -> Duration {
        self.active_time
    }

    /// Mean seconds between consecutive reps, 0 before the second rep
    pub fn average_rep_speed(&self) -> f64 {
        if self.rep_interval_count == 0 {
            return 0.0;
        }
        self.total_rep_interval.as_secs_f64() / self.rep_interval_count as f64
    }

    /// One-second tick. Only ticks spent in target position add active time.
    pub fn tick(&mut self, in_target_position: bool) -> f64 {
        if in_target_position {
            self.active_time += Duration::from_secs(1);
        }
        self.recompute()
    }

    pub fn on_repetition(&mut self, at: Instant) -> f64 {
        if let Some(previous) = self.last_rep_at {
            self.total_rep_interval += at.saturating_duration_since(previous);
            self.rep_interval_count += 1;
        }
        self.last_rep_at = Some(at);
        self.recompute()
    }

    /// A new set starts: the next rep has no predecessor
    pub fn start_set(&mut self) {
        self.last_rep_at = None;
    }

    fn recompute(&mut self) -> f64 {
        self.calories_burned = match self.bmr {
            Some(bmr) => {
                let active_minutes = self.active_time.as_secs_f64() / 60.0;
                self.met * (bmr / MINUTES_PER_DAY) * active_minutes
            }
            None => 0.0,
        };
        self.calories_burned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(gender_index: i32) -> BiometricProfile {
        BiometricProfile {
            gender_index,
            age: 30.0,
            height_cm: 175.0,
            weight_kg: 70.0,
        }
    }

    #[test]
    fn test_gender_index_mapping_as_stored() {
        // Index 0 takes the 88.362 constant set, index 1 the 447.593 set.
        // Pinned on purpose: the app's picker lists "unset, male, female",
        // so this mapping may be inverted upstream.
        let bmr0 = basal_metabolic_rate(&profile(0)).unwrap();
        let bmr1 = basal_metabolic_rate(&profile(1)).unwrap();
        assert!((bmr0 - 1695.667).abs() < 0.001);
        assert!((bmr1 - 1507.133).abs() < 0.001);
    }

    #[test]
    fn test_missing_biometrics_yield_none() {
        let mut p = profile(0);
        p.weight_kg = 0.0;
        assert!(basal_metabolic_rate(&p).is_none());

        let mut p = profile(1);
        p.age = -1.0;
        assert!(basal_metabolic_rate(&p).is_none());

        assert!(basal_metabolic_rate(&profile(2)).is_none());
        assert!(basal_metabolic_rate(&profile(-1)).is_none());
    }

    #[test]
    fn test_calories_accumulate_only_in_target() {
        let mut acc = CalorieAccumulator::new(ExerciseMode::Squat, &profile(0));
        for _ in 0..30 {
            acc.tick(false);
        }
        assert_eq!(acc.calories_burned(), 0.0);

        for _ in 0..60 {
            acc.tick(true);
        }
        assert_eq!(acc.active_time(), Duration::from_secs(60));
        let expected = 5.0 * (1695.667 / 1440.0);
        assert!((acc.calories_burned() - expected).abs() < 0.001);
    }

    #[test]
    fn test_zero_weight_stays_zero() {
        let mut p = profile(0);
        p.weight_kg = 0.0;
        let mut acc = CalorieAccumulator::new(ExerciseMode::PullUp, &p);
        let t0 = Instant::now();
        for step in 0..120u64 {
            acc.tick(true);
            acc.on_repetition(t0 + Duration::from_secs(step));
        }
        assert_eq!(acc.calories_burned(), 0.0);
    }

    #[test]
    fn test_none_mode_has_zero_met() {
        let mut acc = CalorieAccumulator::new(ExerciseMode::None, &profile(0));
        acc.tick(true);
        assert_eq!(acc.calories_burned(), 0.0);
    }

    #[test]
    fn test_average_rep_speed_skips_first_rep() {
        let mut acc = CalorieAccumulator::new(ExerciseMode::Squat, &profile(0));
        let t0 = Instant::now();
        acc.on_repetition(t0);
        assert_eq!(acc.average_rep_speed(), 0.0);

        acc.on_repetition(t0 + Duration::from_secs(2));
        acc.on_repetition(t0 + Duration::from_secs(6));
        assert!((acc.average_rep_speed() - 3.0).abs() < 1e-9);

        // Rest between sets is not a rep interval
        acc.start_set();
        acc.on_repetition(t0 + Duration::from_secs(60));
        assert!((acc.average_rep_speed() - 3.0).abs() < 1e-9);
    }
}
