// Error types for the repetition engine
//
// Degraded input (tracking gaps, missing biometrics, failed haptics) is never
// an error here. These types cover lifecycle misuse and persistence only.

mod session;
mod store;

pub use session::{log_session_error, SessionError, SessionErrorCodes};
pub use store::{log_store_error, StoreError, StoreErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, so host apps can map them without matching
/// on Rust enums.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
