// Rep Engine Core - exercise repetition detection
// Pose snapshots in, debounced repetitions and session summaries out

pub mod calories;
pub mod classifier;
pub mod config;
pub mod error;
pub mod feedback;
pub mod fixtures;
pub mod geometry;
pub mod pose;
pub mod repetition;
pub mod runner;
pub mod session;
pub mod store;
pub mod testing;

pub use config::{EngineConfig, ExerciseMode};
pub use error::{ErrorCode, SessionError, StoreError};
pub use pose::{FrameInput, Joint, JointSnapshot, Keypoint};
pub use runner::{SessionHandle, SessionRunner, SystemTimeSource, TimeSource};
pub use session::{SessionController, SessionEvent, SessionPhase};
pub use store::{ExerciseSummaryRecord, InMemorySummaryStore, JsonFileSummaryStore, SummaryStore};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to `info`, and writes to stderr so CLI
/// reports on stdout stay machine-readable. `log` records are bridged into
/// tracing. Calling this more than once is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
    {
        tracing::debug!("[Logging] tracing subscriber installed");
    }
}
