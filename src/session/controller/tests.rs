use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use super::*;
use crate::config::BiometricProfile;
use crate::error::StoreError;
use crate::feedback::{FeedbackSignal, NoopFeedback, RecordingFeedback};
use crate::pose::Joint;
use crate::store::InMemorySummaryStore;
use crate::testing::{drive, tick_for, PoseBuilder, ScriptBuilder};

fn config(reps: u32, sets: u32, rest: u32) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.session.target_repetitions = reps;
    config.session.target_sets = sets;
    config.session.rest_time_seconds = rest;
    config.profile = BiometricProfile {
        gender_index: 0,
        age: 30.0,
        height_cm: 175.0,
        weight_kg: 70.0,
    };
    config
}

fn controller(config: EngineConfig) -> (SessionController, InMemorySummaryStore) {
    let store = InMemorySummaryStore::new();
    let controller =
        SessionController::new(config, Box::new(store.clone()), Box::new(NoopFeedback))
            .expect("valid config");
    (controller, store)
}

/// Start and run the countdown out; returns the time the first set began
fn start_active(controller: &mut SessionController, t0: Instant) -> Instant {
    controller.start(t0).unwrap();
    let countdown = controller.config().session.countdown_seconds;
    let active_at = tick_for(controller, t0, countdown);
    assert_eq!(controller.phase(), SessionPhase::Active);
    active_at
}

fn squats(count: u32) -> Vec<crate::testing::ScriptedFrame> {
    ScriptBuilder::default()
        .repetitions(&PoseBuilder::default(), ExerciseMode::Squat, count)
        .build()
}

fn drain(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_countdown_ticks_down_to_active() {
    let (mut controller, _) = controller(config(3, 1, 0));
    let mut rx = controller.subscribe();
    let t0 = Instant::now();
    controller.start(t0).unwrap();
    assert_eq!(controller.phase(), SessionPhase::Countdown { remaining: 3 });

    tick_for(&mut controller, t0, 2);
    assert_eq!(controller.phase(), SessionPhase::Countdown { remaining: 1 });

    tick_for(&mut controller, t0 + Duration::from_secs(2), 1);
    assert_eq!(controller.phase(), SessionPhase::Active);
    assert!(!controller.scheduler().is_scheduled(TickKind::Countdown));
    assert!(controller.scheduler().is_scheduled(TickKind::Calorie));

    let ticks: Vec<u32> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::CountdownTick { remaining } => Some(remaining),
            _ => None,
        })
        .collect();
    assert_eq!(ticks, vec![2, 1, 0]);
}

#[test]
fn test_zero_countdown_starts_active() {
    let mut cfg = config(3, 1, 0);
    cfg.session.countdown_seconds = 0;
    let (mut controller, _) = controller(cfg);
    controller.start(Instant::now()).unwrap();
    assert_eq!(controller.phase(), SessionPhase::Active);
}

#[test]
fn test_frames_during_countdown_are_ignored() {
    let (mut controller, _) = controller(config(3, 1, 0));
    let t0 = Instant::now();
    controller.start(t0).unwrap();

    let events = drive(&mut controller, t0, &squats(1));
    // The script ends at 2.2 s, before the 3 s countdown runs out
    assert!(events.is_empty());
    assert_eq!(controller.state().repetitions, 0);
    assert_eq!(controller.metrics().frames_ignored, 22);
}

#[test]
fn test_two_sets_with_rest() {
    let (mut controller, store) = controller(config(3, 2, 5));
    let mut rx = controller.subscribe();
    let t0 = Instant::now();
    let set_one = start_active(&mut controller, t0);

    let reps = drive(&mut controller, set_one, &squats(3));
    assert_eq!(reps.len(), 3);
    assert_eq!(controller.phase(), SessionPhase::Resting { remaining: 5 });
    assert_eq!(controller.sets().len(), 1);

    let rest_started = reps[2].at;
    tick_for(&mut controller, rest_started, 4);
    assert_eq!(controller.phase(), SessionPhase::Resting { remaining: 1 });
    tick_for(&mut controller, rest_started + Duration::from_secs(4), 1);
    assert_eq!(controller.phase(), SessionPhase::Active);
    assert_eq!(controller.state().current_set, 2);
    assert_eq!(controller.state().repetitions, 0);

    let set_two = rest_started + Duration::from_secs(6);
    let reps = drive(&mut controller, set_two, &squats(3));
    assert_eq!(reps.len(), 3);
    assert_eq!(controller.phase(), SessionPhase::Completed);
    assert_eq!(controller.scheduler().active_count(), 0);

    let records = store.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].completed_sets, 2);
    assert_eq!(records[0].total_reps, 3);
    assert_eq!(records[0].exercise_type, ExerciseMode::Squat);

    let events = drain(&mut rx);
    let set_completions = events
        .iter()
        .filter(|event| matches!(event, SessionEvent::SetCompleted { .. }))
        .count();
    assert_eq!(set_completions, 2);
    let rests = events
        .iter()
        .filter(|event| {
            matches!(
                event,
                SessionEvent::PhaseChanged {
                    phase: SessionPhase::Resting { .. }
                }
            )
        })
        .count();
    assert_eq!(rests, 1);

    match events.last() {
        Some(SessionEvent::SessionCompleted { summary }) => {
            assert_eq!(summary.cumulative_reps, 6);
            assert!(summary.persisted);
            assert_eq!(summary.sets.len(), 2);
        }
        other => panic!("expected SessionCompleted last, got {:?}", other),
    }
}

#[test]
fn test_final_set_skips_rest() {
    let (mut controller, store) = controller(config(2, 1, 30));
    let mut rx = controller.subscribe();
    let active_at = start_active(&mut controller, Instant::now());

    drive(&mut controller, active_at, &squats(2));
    assert_eq!(controller.phase(), SessionPhase::Completed);
    assert!(!drain(&mut rx).iter().any(|event| matches!(
        event,
        SessionEvent::PhaseChanged {
            phase: SessionPhase::Resting { .. }
        }
    )));
    assert_eq!(store.records().unwrap().len(), 1);
}

#[test]
fn test_set_completes_once_despite_extra_reps() {
    let (mut controller, _) = controller(config(2, 2, 10));
    let mut rx = controller.subscribe();
    let active_at = start_active(&mut controller, Instant::now());

    // Four full reps before the rest timer gets a chance to run out
    let reps = drive(&mut controller, active_at, &squats(4));
    assert_eq!(reps.len(), 2);
    assert_eq!(controller.state().repetitions, 2);
    assert_eq!(controller.state().current_set, 1);
    assert!(matches!(controller.phase(), SessionPhase::Resting { .. }));

    let set_completions = drain(&mut rx)
        .iter()
        .filter(|event| matches!(event, SessionEvent::SetCompleted { .. }))
        .count();
    assert_eq!(set_completions, 1);
}

#[test]
fn test_repetition_event_ignored_after_set_complete() {
    let (mut controller, _) = controller(config(1, 2, 10));
    let active_at = start_active(&mut controller, Instant::now());
    let event = RepetitionEvent {
        at: active_at + Duration::from_secs(2),
        hold: Duration::from_secs(1),
    };

    controller.on_repetition_event(event);
    controller.on_repetition_event(event);
    assert_eq!(controller.state().repetitions, 1);
    assert_eq!(controller.sets().len(), 1);
}

#[test]
fn test_zero_rest_goes_straight_to_next_set() {
    let (mut controller, _) = controller(config(1, 2, 0));
    let active_at = start_active(&mut controller, Instant::now());

    drive(&mut controller, active_at, &squats(1));
    assert_eq!(controller.phase(), SessionPhase::Active);
    assert_eq!(controller.state().current_set, 2);
    assert_eq!(controller.state().repetitions, 0);
}

#[test]
fn test_zero_weight_keeps_calories_at_zero() {
    let mut cfg = config(2, 1, 0);
    cfg.profile.weight_kg = 0.0;
    let (mut controller, store) = controller(cfg);
    let mut rx = controller.subscribe();
    let active_at = start_active(&mut controller, Instant::now());

    let poses = PoseBuilder::default();
    let frames = ScriptBuilder::default()
        .hold(&poses.squat_standing(), Duration::from_millis(500))
        .hold(&poses.squat_bottom(), Duration::from_secs(4))
        .hold(&poses.squat_standing(), Duration::from_millis(500))
        .repetition(&poses, ExerciseMode::Squat)
        .build();
    drive(&mut controller, active_at, &frames);
    assert_eq!(controller.phase(), SessionPhase::Completed);

    for event in drain(&mut rx) {
        if let SessionEvent::CaloriesUpdated { calories_burned, .. } = event {
            assert_eq!(calories_burned, 0.0);
        }
    }
    assert_eq!(store.records().unwrap()[0].calories_burned, 0.0);
}

#[test]
fn test_calories_accrue_while_holding_target() {
    let (mut controller, _) = controller(config(1, 1, 0));
    let active_at = start_active(&mut controller, Instant::now());

    let poses = PoseBuilder::default();
    let frames = ScriptBuilder::default()
        .hold(&poses.squat_standing(), Duration::from_millis(500))
        .hold(&poses.squat_bottom(), Duration::from_secs(4))
        .hold(&poses.squat_standing(), Duration::from_millis(500))
        .build();
    drive(&mut controller, active_at, &frames);

    let record = controller.summary_record().expect("session finished");
    // Calorie ticks at 1, 2, 3 and 4 s all land inside the 0.5..4.5 s hold
    assert_eq!(controller.state().active_exercise_time, Duration::from_secs(4));
    let expected = 5.0 * (1695.667 / 1440.0) * (4.0 / 60.0);
    assert!((record.calories_burned - expected).abs() < 1e-3);
}

#[test]
fn test_average_rep_speed_from_rep_intervals() {
    let (mut controller, _) = controller(config(3, 1, 0));
    let active_at = start_active(&mut controller, Instant::now());

    drive(&mut controller, active_at, &squats(3));
    let record = controller.summary_record().expect("session finished");
    // One repetition cycle is 2.2 s long
    assert!((record.average_rep_speed_seconds - 2.2).abs() < 1e-6);
}

#[test]
fn test_pause_freezes_frames_and_timers() {
    let (mut controller, _) = controller(config(5, 1, 0));
    let mut rx = controller.subscribe();
    let active_at = start_active(&mut controller, Instant::now());

    let reps = drive(&mut controller, active_at, &squats(1));
    assert_eq!(reps.len(), 1);

    let paused_at = active_at + Duration::from_secs(3);
    controller.pause(paused_at).unwrap();
    assert!(controller.is_paused());
    assert!(controller.scheduler().is_suspended());
    drain(&mut rx);

    // A full rep while paused counts nothing and no timer fires
    let reps = drive(&mut controller, paused_at, &squats(1));
    assert!(reps.is_empty());
    tick_for(&mut controller, paused_at, 10);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(controller.state().repetitions, 1);

    let resumed_at = paused_at + Duration::from_secs(10);
    controller.resume(resumed_at).unwrap();
    let events = drain(&mut rx);
    assert_eq!(events, vec![SessionEvent::Resumed]);

    // Hold state survived the pause; the next full rep counts
    let reps = drive(&mut controller, resumed_at, &squats(1));
    assert_eq!(reps.len(), 1);
    assert_eq!(controller.state().repetitions, 2);
}

#[test]
fn test_pause_excluded_from_duration() {
    let (mut controller, _) = controller(config(5, 1, 0));
    let active_at = start_active(&mut controller, Instant::now());

    controller.pause(active_at + Duration::from_secs(2)).unwrap();
    controller.resume(active_at + Duration::from_secs(12)).unwrap();
    let record = controller
        .stop(active_at + Duration::from_secs(15))
        .unwrap();
    assert!((record.duration_seconds - 5.0).abs() < 1e-6);
}

#[test]
fn test_pause_outside_session_is_rejected() {
    let (mut controller, _) = controller(config(3, 1, 0));
    let t0 = Instant::now();
    assert_eq!(controller.pause(t0), Err(SessionError::NotActive));
    assert_eq!(controller.resume(t0), Err(SessionError::NotActive));
}

#[test]
fn test_stop_during_countdown_persists_record() {
    let (mut controller, store) = controller(config(3, 2, 5));
    let t0 = Instant::now();
    controller.start(t0).unwrap();
    tick_for(&mut controller, t0, 1);

    let record = controller.stop(t0 + Duration::from_millis(1500)).unwrap();
    assert_eq!(record.completed_sets, 0);
    assert_eq!(record.total_reps, 0);
    assert_eq!(record.duration_seconds, 0.0);
    assert_eq!(controller.phase(), SessionPhase::Completed);
    assert_eq!(controller.scheduler().active_count(), 0);
    assert_eq!(store.records().unwrap(), vec![record]);
}

#[test]
fn test_stop_during_rest_cancels_rest_timer() {
    let (mut controller, store) = controller(config(1, 3, 30));
    let active_at = start_active(&mut controller, Instant::now());
    let reps = drive(&mut controller, active_at, &squats(1));
    assert!(matches!(controller.phase(), SessionPhase::Resting { .. }));

    let record = controller.stop(reps[0].at + Duration::from_secs(2)).unwrap();
    assert_eq!(record.completed_sets, 1);
    assert_eq!(record.total_reps, 1);
    assert_eq!(controller.scheduler().active_count(), 0);
    assert_eq!(store.records().unwrap().len(), 1);

    // Late ticks after completion do nothing
    tick_for(&mut controller, reps[0].at, 60);
    assert_eq!(controller.phase(), SessionPhase::Completed);
}

#[test]
fn test_lifecycle_errors() {
    let (mut controller, _) = controller(config(3, 1, 0));
    let t0 = Instant::now();
    assert_eq!(controller.stop(t0), Err(SessionError::NotActive));

    controller.start(t0).unwrap();
    assert_eq!(controller.start(t0), Err(SessionError::AlreadyStarted));

    controller.stop(t0 + Duration::from_secs(1)).unwrap();
    assert_eq!(
        controller.stop(t0 + Duration::from_secs(2)),
        Err(SessionError::Completed)
    );
    assert_eq!(controller.start(t0), Err(SessionError::Completed));
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = SessionController::new(
        config(0, 1, 0),
        Box::new(InMemorySummaryStore::new()),
        Box::new(NoopFeedback),
    );
    assert!(matches!(result, Err(SessionError::InvalidConfig { .. })));
}

#[test]
fn test_feedback_per_repetition() {
    let recorder = RecordingFeedback::new();
    let mut controller = SessionController::new(
        config(5, 1, 0),
        Box::new(InMemorySummaryStore::new()),
        Box::new(recorder.clone()),
    )
    .unwrap();
    let active_at = start_active(&mut controller, Instant::now());

    drive(&mut controller, active_at, &squats(2));
    assert_eq!(
        recorder.signals(),
        vec![
            FeedbackSignal::Haptic,
            FeedbackSignal::AudioCue,
            FeedbackSignal::Speech(1),
            FeedbackSignal::Haptic,
            FeedbackSignal::AudioCue,
            FeedbackSignal::Speech(2),
        ]
    );
}

#[test]
fn test_feedback_respects_settings() {
    let recorder = RecordingFeedback::new();
    let mut cfg = config(5, 1, 0);
    cfg.feedback.vibration_enabled = false;
    cfg.feedback.speech_enabled = false;
    let mut controller = SessionController::new(
        cfg,
        Box::new(InMemorySummaryStore::new()),
        Box::new(recorder.clone()),
    )
    .unwrap();
    let active_at = start_active(&mut controller, Instant::now());

    drive(&mut controller, active_at, &squats(1));
    assert_eq!(recorder.signals(), vec![FeedbackSignal::AudioCue]);
}

#[test]
fn test_failing_feedback_does_not_block_counting() {
    let mut controller = SessionController::new(
        config(2, 1, 0),
        Box::new(InMemorySummaryStore::new()),
        Box::new(RecordingFeedback::failing()),
    )
    .unwrap();
    let active_at = start_active(&mut controller, Instant::now());

    drive(&mut controller, active_at, &squats(2));
    assert_eq!(controller.phase(), SessionPhase::Completed);
}

#[derive(Debug)]
struct FailingStore;

impl SummaryStore for FailingStore {
    fn append(&mut self, _record: ExerciseSummaryRecord) -> Result<(), StoreError> {
        Err(StoreError::Io {
            reason: "disk full".to_string(),
        })
    }

    fn records(&self) -> Result<Vec<ExerciseSummaryRecord>, StoreError> {
        Ok(Vec::new())
    }
}

#[test]
fn test_persistence_failure_still_completes() {
    let mut controller =
        SessionController::new(config(3, 1, 0), Box::new(FailingStore), Box::new(NoopFeedback))
            .unwrap();
    let mut rx = controller.subscribe();
    let active_at = start_active(&mut controller, Instant::now());

    let result = controller.stop(active_at + Duration::from_secs(1));
    assert!(matches!(result, Err(SessionError::Persistence { .. })));
    assert_eq!(controller.phase(), SessionPhase::Completed);
    assert!(controller.summary_record().is_some());

    let persisted = drain(&mut rx).into_iter().find_map(|event| match event {
        SessionEvent::SessionCompleted { summary } => Some(summary.persisted),
        _ => None,
    });
    assert_eq!(persisted, Some(false));
}

#[test]
fn test_dropped_and_low_confidence_frames_are_gaps() {
    let (mut controller, _) = controller(config(5, 1, 0));
    let active_at = start_active(&mut controller, Instant::now());

    let poses = PoseBuilder::default();
    let weak = poses.squat_bottom().with_confidence(Joint::LeftKnee, 0.1);
    let frames = ScriptBuilder::default()
        .hold(&poses.squat_standing(), Duration::from_millis(300))
        .hold(&poses.squat_bottom(), Duration::from_millis(500))
        .dropout(Duration::from_millis(300))
        .hold(&weak, Duration::from_millis(200))
        .hold(&poses.squat_bottom(), Duration::from_millis(300))
        .hold(&poses.squat_standing(), Duration::from_millis(300))
        .build();
    let reps = drive(&mut controller, active_at, &frames);

    // Gaps neither reset nor extend the hold: 0.3..1.6 s is one rep
    assert_eq!(reps.len(), 1);
    assert_eq!(reps[0].hold, Duration::from_millis(1300));
    let metrics = controller.metrics();
    assert_eq!(metrics.dropped_frames, 3);
    assert_eq!(metrics.confidence_gaps, 2);
    assert_eq!(metrics.repetitions_detected, 1);
}

#[test]
fn test_pull_up_session_counts_with_noise_rejection() {
    let mut cfg = config(2, 1, 0);
    cfg.session.exercise_mode = ExerciseMode::PullUp;
    let (mut controller, store) = controller(cfg);
    let active_at = start_active(&mut controller, Instant::now());

    let frames = ScriptBuilder::default()
        .repetitions(&PoseBuilder::default(), ExerciseMode::PullUp, 2)
        .build();
    let reps = drive(&mut controller, active_at, &frames);

    assert_eq!(reps.len(), 2);
    assert_eq!(controller.metrics().noise_rejections, 2);
    let record = &store.records().unwrap()[0];
    assert_eq!(record.exercise_type, ExerciseMode::PullUp);
    assert_eq!(record.total_reps, 2);
}

#[test]
fn test_none_mode_never_counts() {
    let mut cfg = config(1, 1, 0);
    cfg.session.exercise_mode = ExerciseMode::None;
    let (mut controller, _) = controller(cfg);
    let active_at = start_active(&mut controller, Instant::now());

    let reps = drive(&mut controller, active_at, &squats(3));
    assert!(reps.is_empty());
    assert_eq!(controller.phase(), SessionPhase::Active);

    let record = controller.stop(active_at + Duration::from_secs(10)).unwrap();
    assert_eq!(record.total_reps, 0);
    assert_eq!(record.calories_burned, 0.0);
}
