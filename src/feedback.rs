//! Rep feedback boundary (haptics, audio cue, spoken count)
//!
//! The controller calls these synchronously from the frame pipeline, so
//! implementations must return quickly and hand slow work (speech synthesis)
//! off to their own queue. Errors are logged by the caller and otherwise
//! ignored: feedback can never fail the counting logic.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackError {
    pub reason: String,
}

impl fmt::Display for FeedbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feedback failed: {}", self.reason)
    }
}

impl std::error::Error for FeedbackError {}

/// Fire-and-forget signals emitted on each repetition
pub trait FeedbackSink: Send {
    fn haptic(&mut self) -> Result<(), FeedbackError>;
    fn audio_cue(&mut self) -> Result<(), FeedbackError>;
    fn speak_count(&mut self, count: u32) -> Result<(), FeedbackError>;
}

/// Sink that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFeedback;

impl FeedbackSink for NoopFeedback {
    fn haptic(&mut self) -> Result<(), FeedbackError> {
        Ok(())
    }

    fn audio_cue(&mut self) -> Result<(), FeedbackError> {
        Ok(())
    }

    fn speak_count(&mut self, _count: u32) -> Result<(), FeedbackError> {
        Ok(())
    }
}

/// Sink that writes signals to the log, used by the CLI
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFeedback;

impl FeedbackSink for LoggingFeedback {
    fn haptic(&mut self) -> Result<(), FeedbackError> {
        tracing::debug!("[Feedback] haptic");
        Ok(())
    }

    fn audio_cue(&mut self) -> Result<(), FeedbackError> {
        tracing::debug!("[Feedback] audio cue");
        Ok(())
    }

    fn speak_count(&mut self, count: u32) -> Result<(), FeedbackError> {
        tracing::info!("[Feedback] speak \"{}\"", count);
        Ok(())
    }
}

/// Feedback signal as observed by [`RecordingFeedback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackSignal {
    Haptic,
    AudioCue,
    Speech(u32),
}

/// Sink that records every signal; clones share the same log
#[derive(Debug, Default, Clone)]
pub struct RecordingFeedback {
    signals: Arc<Mutex<Vec<FeedbackSignal>>>,
    fail: bool,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record signals but report every one as failed
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn signals(&self) -> Vec<FeedbackSignal> {
        self.signals
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn record(&self, signal: FeedbackSignal) -> Result<(), FeedbackError> {
        if let Ok(mut guard) = self.signals.lock() {
            guard.push(signal);
        }
        if self.fail {
            Err(FeedbackError {
                reason: format!("{:?} unavailable", signal),
            })
        } else {
            Ok(())
        }
    }
}

impl FeedbackSink for RecordingFeedback {
    fn haptic(&mut self) -> Result<(), FeedbackError> {
        self.record(FeedbackSignal::Haptic)
    }

    fn audio_cue(&mut self) -> Result<(), FeedbackError> {
        self.record(FeedbackSignal::AudioCue)
    }

    fn speak_count(&mut self, count: u32) -> Result<(), FeedbackError> {
        self.record(FeedbackSignal::Speech(count))
    }
}
