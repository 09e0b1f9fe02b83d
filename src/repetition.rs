//! Repetition state machine
//!
//! Turns the per-frame position signal into discrete repetition events.
//! Classifier-agnostic: the only per-exercise input is the minimum hold.
//!
//! - false → true (confident): hold timer starts, `HoldingCorrect`
//! - true while holding, hold ≥ minimum: `WaitingForIncorrect`
//! - true → false (confident): emit an event if hold ≥ minimum, then `Idle`
//!   whatever the hold was, so the position has to be re-entered to count
//!   again
//! - gap frames: nothing moves, with no timeout

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::classifier::PositionSignal;

/// Phase of the current position cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepPhase {
    Idle,
    HoldingCorrect,
    WaitingForIncorrect,
}

/// Edge-tracked position flag and hold start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PositionState {
    pub is_in_target_position: bool,
    pub hold_start: Option<Instant>,
}

/// Emitted once per completed false→true→false cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionEvent {
    pub at: Instant,
    pub hold: Duration,
}

pub struct RepetitionStateMachine {
    phase: RepPhase,
    position: PositionState,
    min_hold: Duration,
}

impl RepetitionStateMachine {
    pub fn new(min_hold: Duration) -> Self {
        Self {
            phase: RepPhase::Idle,
            position: PositionState::default(),
            min_hold,
        }
    }

    pub fn phase(&self) -> RepPhase {
        self.phase
    }

    pub fn position(&self) -> PositionState {
        self.position
    }

    pub fn is_in_target_position(&self) -> bool {
        self.position.is_in_target_position
    }

    pub fn min_hold(&self) -> Duration {
        self.min_hold
    }

    /// Advance with one classified frame captured at `now`
    pub fn update(&mut self, signal: PositionSignal, now: Instant) -> Option<RepetitionEvent> {
        if !signal.confidence_ok {
            return None;
        }

        match (self.position.is_in_target_position, signal.in_target_position) {
            (false, true) => {
                self.position = PositionState {
                    is_in_target_position: true,
                    hold_start: Some(now),
                };
                self.phase = RepPhase::HoldingCorrect;
                None
            }
            (true, true) => {
                if self.phase == RepPhase::HoldingCorrect && self.held_for(now) >= self.min_hold {
                    self.phase = RepPhase::WaitingForIncorrect;
                }
                None
            }
            (true, false) => {
                let hold = self.held_for(now);
                self.position = PositionState::default();
                self.phase = RepPhase::Idle;

                if hold >= self.min_hold {
                    Some(RepetitionEvent { at: now, hold })
                } else {
                    tracing::debug!(
                        "[Repetition] Hold {:?} below minimum {:?}, not counted",
                        hold,
                        self.min_hold
                    );
                    None
                }
            }
            (false, false) => None,
        }
    }

    pub fn reset(&mut self) {
        self.phase = RepPhase::Idle;
        self.position = PositionState::default();
    }

    fn held_for(&self, now: Instant) -> Duration {
        self.position
            .hold_start
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default()
    }
}
