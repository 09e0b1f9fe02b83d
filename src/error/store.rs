// Summary store error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Store error code constants
///
/// Error code range: 4001-4003
pub struct StoreErrorCodes {}

impl StoreErrorCodes {
    pub const IO: i32 = 4001;
    pub const SERIALIZATION: i32 = 4002;
    pub const CORRUPT: i32 = 4003;
}

pub fn log_store_error(err: &StoreError, context: &str) {
    error!(
        "Store error in {}: code={}, component=SummaryStore, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Errors raised while appending or reading summary records
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    Io { reason: String },

    /// Record could not be encoded
    Serialization { reason: String },

    /// Existing store contents are not a record list
    Corrupt { reason: String },
}

impl ErrorCode for StoreError {
    fn code(&self) -> i32 {
        match self {
            StoreError::Io { .. } => StoreErrorCodes::IO,
            StoreError::Serialization { .. } => StoreErrorCodes::SERIALIZATION,
            StoreError::Corrupt { .. } => StoreErrorCodes::CORRUPT,
        }
    }

    fn message(&self) -> String {
        match self {
            StoreError::Io { reason } => format!("I/O failure: {}", reason),
            StoreError::Serialization { reason } => format!("Serialization failure: {}", reason),
            StoreError::Corrupt { reason } => format!("Corrupt summary store: {}", reason),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StoreError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io {
            reason: err.to_string(),
        }
    }
}
