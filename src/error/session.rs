// Session lifecycle error types and constants

use crate::error::{ErrorCode, StoreError};
use log::error;
use std::fmt;

/// Session error code constants shared with the host app
///
/// Error code range: 3001-3006
pub struct SessionErrorCodes {}

impl SessionErrorCodes {
    /// `start()` called on a session that already started
    pub const ALREADY_STARTED: i32 = 3001;

    /// Operation requires a running session
    pub const NOT_ACTIVE: i32 = 3002;

    /// Session configuration failed validation
    pub const INVALID_CONFIG: i32 = 3003;

    /// Summary record could not be persisted
    pub const PERSISTENCE: i32 = 3004;

    /// Session runner task is gone
    pub const CHANNEL_CLOSED: i32 = 3005;

    /// Session already completed
    pub const COMPLETED: i32 = 3006;
}

/// Log a session error with structured context
///
/// Logging is non-blocking and will not panic on failure.
pub fn log_session_error(err: &SessionError, context: &str) {
    error!(
        "Session error in {}: code={}, component=SessionController, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Session lifecycle errors
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Session already started
    AlreadyStarted,

    /// Operation needs a started, not yet completed session
    NotActive,

    /// Configuration rejected before start
    InvalidConfig { reason: String },

    /// Summary store rejected the record
    Persistence { source: StoreError },

    /// Runner task stopped before answering
    ChannelClosed,

    /// Session already completed and persisted
    Completed,
}

impl ErrorCode for SessionError {
    fn code(&self) -> i32 {
        match self {
            SessionError::AlreadyStarted => SessionErrorCodes::ALREADY_STARTED,
            SessionError::NotActive => SessionErrorCodes::NOT_ACTIVE,
            SessionError::InvalidConfig { .. } => SessionErrorCodes::INVALID_CONFIG,
            SessionError::Persistence { .. } => SessionErrorCodes::PERSISTENCE,
            SessionError::ChannelClosed => SessionErrorCodes::CHANNEL_CLOSED,
            SessionError::Completed => SessionErrorCodes::COMPLETED,
        }
    }

    fn message(&self) -> String {
        match self {
            SessionError::AlreadyStarted => {
                "Session already started. Create a new controller for another session.".to_string()
            }
            SessionError::NotActive => "Session not started".to_string(),
            SessionError::InvalidConfig { reason } => {
                format!("Invalid session configuration: {}", reason)
            }
            SessionError::Persistence { source } => {
                format!("Failed to persist summary: {}", source.message())
            }
            SessionError::ChannelClosed => "Session runner is no longer running".to_string(),
            SessionError::Completed => "Session already completed".to_string(),
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SessionError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SessionError {}

impl From<StoreError> for SessionError {
    fn from(source: StoreError) -> Self {
        SessionError::Persistence { source }
    }
}
