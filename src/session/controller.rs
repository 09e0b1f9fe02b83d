//! SessionController: countdown → sets → rest → completion lifecycle.
//!
//! The controller owns everything mutable about a session: the classifier
//! picked for the exercise, the repetition state machine, the calorie
//! accumulator, the tick scheduler and the counters. Frames and ticks are
//! both fed in from outside (the async runner, the fixture harness, or
//! tests) and each call runs to completion before the next, which keeps rep
//! counting strictly ordered.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::calories::CalorieAccumulator;
use crate::classifier::{classifier_for, ExerciseClassifier};
use crate::config::{EngineConfig, ExerciseMode};
use crate::error::{log_session_error, SessionError};
use crate::feedback::FeedbackSink;
use crate::pose::FrameInput;
use crate::repetition::{RepetitionEvent, RepetitionStateMachine};
use crate::store::{ExerciseSummaryRecord, SummaryStore};

use super::events::{SessionEvent, SessionPhase, SessionSummary, SetSummary};
use super::scheduler::{TickKind, TickScheduler};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Counters and timing for the running session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    /// 1-based set number
    pub current_set: u32,
    /// Reps in the current set
    pub repetitions: u32,
    pub target_repetitions: u32,
    pub target_sets: u32,
    pub rest_time_seconds: u32,
    pub session_start: Option<Instant>,
    pub set_start: Option<Instant>,
    pub active_exercise_time: Duration,
    pub calories_burned: f64,
    pub average_rep_speed: f64,
}

impl SessionState {
    fn from_config(config: &EngineConfig) -> Self {
        Self {
            current_set: 1,
            repetitions: 0,
            target_repetitions: config.session.target_repetitions,
            target_sets: config.session.target_sets,
            rest_time_seconds: config.session.rest_time_seconds,
            session_start: None,
            set_start: None,
            active_exercise_time: Duration::ZERO,
            calories_burned: 0.0,
            average_rep_speed: 0.0,
        }
    }
}

/// Pipeline counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetrics {
    pub frames_received: u64,
    /// Frames arriving outside the active phase or while paused
    pub frames_ignored: u64,
    /// Frames the pose oracle failed to produce
    pub dropped_frames: u64,
    pub confidence_gaps: u64,
    pub noise_rejections: u64,
    pub repetitions_detected: u64,
}

/// Accumulated running time, paused with the session
#[derive(Debug, Default)]
struct Stopwatch {
    accumulated: Duration,
    running_since: Option<Instant>,
}

impl Stopwatch {
    fn start(&mut self, now: Instant) {
        if self.running_since.is_none() {
            self.running_since = Some(now);
        }
    }

    fn pause(&mut self, now: Instant) {
        if let Some(since) = self.running_since.take() {
            self.accumulated += now.saturating_duration_since(since);
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.accumulated
            + self
                .running_since
                .map(|since| now.saturating_duration_since(since))
                .unwrap_or_default()
    }
}

pub struct SessionController {
    config: EngineConfig,
    classifier: Option<Box<dyn ExerciseClassifier>>,
    repetitions: RepetitionStateMachine,
    calories: CalorieAccumulator,
    scheduler: TickScheduler,
    state: SessionState,
    phase: SessionPhase,
    paused: bool,
    set_completed: bool,
    sets: Vec<SetSummary>,
    cumulative_reps: u32,
    stopwatch: Stopwatch,
    metrics: SessionMetrics,
    record: Option<ExerciseSummaryRecord>,
    store: Box<dyn SummaryStore>,
    feedback: Box<dyn FeedbackSink>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionController {
    /// Create a controller for one session
    ///
    /// # Errors
    /// `SessionError::InvalidConfig` if the configuration fails validation
    pub fn new(
        config: EngineConfig,
        store: Box<dyn SummaryStore>,
        feedback: Box<dyn FeedbackSink>,
    ) -> Result<Self, SessionError> {
        config
            .validate()
            .inspect_err(|err| log_session_error(err, "SessionController::new"))?;

        let mode = config.session.exercise_mode;
        let classifier = classifier_for(mode, &config.detection);
        let min_hold = classifier
            .as_ref()
            .map(|c| c.min_hold())
            .unwrap_or_else(|| config.detection.min_hold());
        let calories = CalorieAccumulator::new(mode, &config.profile);
        let state = SessionState::from_config(&config);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Self {
            config,
            classifier,
            repetitions: RepetitionStateMachine::new(min_hold),
            calories,
            scheduler: TickScheduler::default(),
            state,
            phase: SessionPhase::NotStarted,
            paused: false,
            set_completed: false,
            sets: Vec::new(),
            cumulative_reps: 0,
            stopwatch: Stopwatch::default(),
            metrics: SessionMetrics::default(),
            record: None,
            store,
            feedback,
            events,
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn exercise_mode(&self) -> ExerciseMode {
        self.config.session.exercise_mode
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn metrics(&self) -> SessionMetrics {
        self.metrics
    }

    pub fn sets(&self) -> &[SetSummary] {
        &self.sets
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    /// Record built when the session finished, persisted or not
    pub fn summary_record(&self) -> Option<&ExerciseSummaryRecord> {
        self.record.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Reset counters and begin the countdown
    pub fn start(&mut self, now: Instant) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::NotStarted => {}
            SessionPhase::Completed => return Err(SessionError::Completed),
            _ => return Err(SessionError::AlreadyStarted),
        }

        self.state = SessionState::from_config(&self.config);
        self.state.session_start = Some(now);
        self.calories = CalorieAccumulator::new(self.exercise_mode(), &self.config.profile);
        self.repetitions.reset();
        if let Some(classifier) = self.classifier.as_mut() {
            classifier.reset();
        }
        self.sets.clear();
        self.cumulative_reps = 0;
        self.set_completed = false;
        self.paused = false;

        tracing::info!(
            "[Session] Starting {} session: {} sets x {} reps, rest {}s",
            self.exercise_mode().display_name(),
            self.state.target_sets,
            self.state.target_repetitions,
            self.state.rest_time_seconds
        );

        let countdown = self.config.session.countdown_seconds;
        if countdown == 0 {
            self.enter_active(now);
        } else {
            self.set_phase(SessionPhase::Countdown {
                remaining: countdown,
            });
            self.scheduler.schedule(TickKind::Countdown, now);
        }
        Ok(())
    }

    /// Freeze frame consumption and every timer; counters are untouched
    pub fn pause(&mut self, now: Instant) -> Result<(), SessionError> {
        if !self.phase.is_running() {
            return Err(SessionError::NotActive);
        }
        if self.paused {
            return Ok(());
        }

        self.paused = true;
        self.scheduler.suspend();
        self.stopwatch.pause(now);
        tracing::info!("[Session] Paused in {:?}", self.phase);
        self.publish(SessionEvent::Paused);
        Ok(())
    }

    /// Unfreeze; timers restart from `now` without replaying missed ticks
    pub fn resume(&mut self, now: Instant) -> Result<(), SessionError> {
        if !self.phase.is_running() {
            return Err(SessionError::NotActive);
        }
        if !self.paused {
            return Ok(());
        }

        self.paused = false;
        self.scheduler.resume(now);
        if matches!(self.phase, SessionPhase::Active | SessionPhase::Resting { .. }) {
            self.stopwatch.start(now);
        }
        tracing::info!("[Session] Resumed in {:?}", self.phase);
        self.publish(SessionEvent::Resumed);
        Ok(())
    }

    /// Finalize and persist whatever the counters hold, from any running phase
    ///
    /// # Errors
    /// - `NotActive` if the session never started
    /// - `Completed` if it already finished
    /// - `Persistence` if the store rejected the record (the session is
    ///   still completed and the record is available via `summary_record`)
    pub fn stop(&mut self, now: Instant) -> Result<ExerciseSummaryRecord, SessionError> {
        match self.phase {
            SessionPhase::NotStarted => Err(SessionError::NotActive),
            SessionPhase::Completed => Err(SessionError::Completed),
            _ => {
                tracing::info!("[Session] Stopped by user in {:?}", self.phase);
                self.finish(now)
            }
        }
    }

    // ========================================================================
    // INPUTS
    // ========================================================================

    /// Drive the one-second timers up to `now`
    pub fn tick(&mut self, now: Instant) {
        if !self.phase.is_running() || self.paused {
            return;
        }

        for kind in self.scheduler.due(now) {
            if !self.phase.is_running() {
                break;
            }
            match kind {
                TickKind::Countdown => self.on_countdown_tick(now),
                TickKind::Rest => self.on_rest_tick(now),
                TickKind::Elapsed => {
                    let elapsed_seconds = self.stopwatch.elapsed(now).as_secs();
                    self.publish(SessionEvent::ElapsedTick { elapsed_seconds });
                }
                TickKind::Calorie => self.on_calorie_tick(),
            }
        }
    }

    /// Run one frame through classify → repetition machine → counters
    ///
    /// Frames outside the active phase, while paused, or for a session with
    /// no exercise are ignored. Dropped and low-confidence frames leave all
    /// hold state untouched.
    pub fn on_frame(&mut self, frame: FrameInput) -> Option<RepetitionEvent> {
        self.metrics.frames_received += 1;
        if self.phase != SessionPhase::Active || self.paused {
            self.metrics.frames_ignored += 1;
            return None;
        }
        let Some(classifier) = self.classifier.as_mut() else {
            self.metrics.frames_ignored += 1;
            return None;
        };

        let snapshot = match frame {
            FrameInput::Snapshot(snapshot) => snapshot,
            FrameInput::Dropped { .. } => {
                self.metrics.dropped_frames += 1;
                return None;
            }
        };

        let signal = classifier.classify(&snapshot);
        if signal.rejected_as_noise {
            self.metrics.noise_rejections += 1;
        } else if !signal.confidence_ok {
            self.metrics.confidence_gaps += 1;
        }

        let event = self.repetitions.update(signal, snapshot.captured_at)?;
        self.on_repetition_event(event);
        Some(event)
    }

    /// Count one repetition and check for set completion
    ///
    /// Ignored outside the active phase and once the current set has
    /// already completed.
    pub fn on_repetition_event(&mut self, event: RepetitionEvent) {
        if self.phase != SessionPhase::Active || self.set_completed {
            return;
        }

        self.state.repetitions += 1;
        self.cumulative_reps += 1;
        self.metrics.repetitions_detected += 1;
        self.calories.on_repetition(event.at);
        self.sync_calories();

        let count = self.state.repetitions;
        self.emit_feedback(count);

        tracing::info!(
            "[Session] Rep {}/{} in set {}/{} (hold {:?})",
            count,
            self.state.target_repetitions,
            self.state.current_set,
            self.state.target_sets,
            event.hold
        );
        self.publish(SessionEvent::Repetition {
            exercise: self.exercise_mode(),
            set: self.state.current_set,
            repetitions: count,
            target_repetitions: self.state.target_repetitions,
            hold_ms: event.hold.as_millis() as u64,
        });
        self.publish_calories();

        if count >= self.state.target_repetitions {
            self.complete_set(event.at);
        }
    }

    // ========================================================================
    // TRANSITIONS
    // ========================================================================

    fn on_countdown_tick(&mut self, now: Instant) {
        let SessionPhase::Countdown { remaining } = self.phase else {
            return;
        };
        let remaining = remaining.saturating_sub(1);
        self.publish(SessionEvent::CountdownTick { remaining });

        if remaining == 0 {
            self.scheduler.cancel(TickKind::Countdown);
            self.enter_active(now);
        } else {
            self.phase = SessionPhase::Countdown { remaining };
        }
    }

    fn on_rest_tick(&mut self, now: Instant) {
        let SessionPhase::Resting { remaining } = self.phase else {
            return;
        };
        let remaining = remaining.saturating_sub(1);
        self.publish(SessionEvent::RestTick { remaining });

        if remaining == 0 {
            self.scheduler.cancel(TickKind::Rest);
            self.begin_next_set(now);
        } else {
            self.phase = SessionPhase::Resting { remaining };
        }
    }

    fn on_calorie_tick(&mut self) {
        let in_target =
            self.phase == SessionPhase::Active && self.repetitions.is_in_target_position();
        self.calories.tick(in_target);
        self.sync_calories();
        self.publish_calories();
    }

    /// Countdown finished: first set begins and the running timers start
    fn enter_active(&mut self, now: Instant) {
        self.state.set_start = Some(now);
        self.stopwatch.start(now);
        self.calories.start_set();
        self.scheduler.schedule(TickKind::Elapsed, now);
        self.scheduler.schedule(TickKind::Calorie, now);
        tracing::info!(
            "[Session] Set {}/{} started",
            self.state.current_set,
            self.state.target_sets
        );
        self.set_phase(SessionPhase::Active);
    }

    fn complete_set(&mut self, now: Instant) {
        if self.set_completed {
            return;
        }
        self.set_completed = true;

        let duration = self
            .state
            .set_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        let summary = SetSummary {
            set_number: self.state.current_set,
            repetitions: self.state.repetitions,
            duration_seconds: duration.as_secs_f64(),
        };
        tracing::info!(
            "[Session] Set {}/{} complete with {} reps",
            summary.set_number,
            self.state.target_sets,
            summary.repetitions
        );
        self.sets.push(summary.clone());
        self.publish(SessionEvent::SetCompleted { summary });

        if self.state.current_set >= self.state.target_sets {
            // Final set goes straight to completion; the outcome is logged there
            let _ = self.finish(now);
            return;
        }

        self.repetitions.reset();
        if let Some(classifier) = self.classifier.as_mut() {
            classifier.reset();
        }

        let rest = self.state.rest_time_seconds;
        if rest == 0 {
            self.begin_next_set(now);
        } else {
            self.set_phase(SessionPhase::Resting { remaining: rest });
            self.scheduler.schedule(TickKind::Rest, now);
        }
    }

    fn begin_next_set(&mut self, now: Instant) {
        self.state.current_set += 1;
        self.state.repetitions = 0;
        self.state.set_start = Some(now);
        self.set_completed = false;
        self.repetitions.reset();
        if let Some(classifier) = self.classifier.as_mut() {
            classifier.reset();
        }
        self.calories.start_set();
        tracing::info!(
            "[Session] Set {}/{} started",
            self.state.current_set,
            self.state.target_sets
        );
        self.set_phase(SessionPhase::Active);
    }

    /// Cancel every timer, build the record, persist it, publish the summary
    fn finish(&mut self, now: Instant) -> Result<ExerciseSummaryRecord, SessionError> {
        self.scheduler.cancel_all();
        self.stopwatch.pause(now);
        self.paused = false;

        let record = ExerciseSummaryRecord {
            timestamp_ms: now_timestamp_ms(),
            exercise_type: self.exercise_mode(),
            completed_sets: self.sets.len() as u32,
            total_reps: self.state.repetitions,
            duration_seconds: self.stopwatch.elapsed(now).as_secs_f64(),
            average_rep_speed_seconds: self.calories.average_rep_speed(),
            calories_burned: self.calories.calories_burned(),
        };
        self.record = Some(record.clone());

        let persisted = self
            .store
            .append(record.clone())
            .map_err(SessionError::from);
        if let Err(ref err) = persisted {
            log_session_error(err, "finish_session");
        }

        self.set_phase(SessionPhase::Completed);
        tracing::info!(
            "[Session] Completed: {} sets, {} reps in last set, {:.1}s, {:.2} kcal",
            record.completed_sets,
            record.total_reps,
            record.duration_seconds,
            record.calories_burned
        );
        self.publish(SessionEvent::SessionCompleted {
            summary: SessionSummary {
                record: record.clone(),
                sets: self.sets.clone(),
                cumulative_reps: self.cumulative_reps,
                persisted: persisted.is_ok(),
            },
        });

        persisted.map(|_| record)
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn emit_feedback(&mut self, count: u32) {
        if self.config.feedback.vibration_enabled {
            if let Err(err) = self.feedback.haptic() {
                tracing::warn!("[Session] Haptic feedback failed: {}", err);
            }
        }
        if let Err(err) = self.feedback.audio_cue() {
            tracing::warn!("[Session] Audio cue failed: {}", err);
        }
        if self.config.feedback.speech_enabled {
            if let Err(err) = self.feedback.speak_count(count) {
                tracing::warn!("[Session] Speech feedback failed: {}", err);
            }
        }
    }

    fn sync_calories(&mut self) {
        self.state.calories_burned = self.calories.calories_burned();
        self.state.active_exercise_time = self.calories.active_time();
        self.state.average_rep_speed = self.calories.average_rep_speed();
    }

    fn publish_calories(&self) {
        self.publish(SessionEvent::CaloriesUpdated {
            calories_burned: self.state.calories_burned,
            active_seconds: self.state.active_exercise_time.as_secs(),
        });
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.publish(SessionEvent::PhaseChanged { phase });
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine: presentation may not be attached
        let _ = self.events.send(event);
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests;
