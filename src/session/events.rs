//! Session events published to the presentation layer

use serde::{Deserialize, Serialize};

use crate::config::ExerciseMode;
use crate::store::ExerciseSummaryRecord;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    Countdown { remaining: u32 },
    Active,
    Resting { remaining: u32 },
    Completed,
}

impl SessionPhase {
    /// Started and not yet completed
    pub fn is_running(&self) -> bool {
        !matches!(self, SessionPhase::NotStarted | SessionPhase::Completed)
    }
}

/// Result of one finished set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetSummary {
    pub set_number: u32,
    pub repetitions: u32,
    pub duration_seconds: f64,
}

/// Summary handed to the presentation layer when the session ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub record: ExerciseSummaryRecord,
    pub sets: Vec<SetSummary>,
    /// Sum of reps over all sets, for display next to the per-set counter
    pub cumulative_reps: u32,
    pub persisted: bool,
}

/// Engine-side events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        phase: SessionPhase,
    },
    CountdownTick {
        remaining: u32,
    },
    RestTick {
        remaining: u32,
    },
    ElapsedTick {
        elapsed_seconds: u64,
    },
    Repetition {
        exercise: ExerciseMode,
        set: u32,
        repetitions: u32,
        target_repetitions: u32,
        hold_ms: u64,
    },
    CaloriesUpdated {
        calories_burned: f64,
        active_seconds: u64,
    },
    SetCompleted {
        summary: SetSummary,
    },
    Paused,
    Resumed,
    SessionCompleted {
        summary: SessionSummary,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_is_running() {
        assert!(!SessionPhase::NotStarted.is_running());
        assert!(SessionPhase::Countdown { remaining: 3 }.is_running());
        assert!(SessionPhase::Active.is_running());
        assert!(SessionPhase::Resting { remaining: 1 }.is_running());
        assert!(!SessionPhase::Completed.is_running());
    }

    #[test]
    fn test_event_json_is_tagged() {
        let event = SessionEvent::RestTick { remaining: 4 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "rest_tick");
        assert_eq!(json["remaining"], 4);
    }
}
