//! Session lifecycle: countdown, sets, rest, completion

mod controller;
pub mod events;
pub mod scheduler;

pub use controller::{SessionController, SessionMetrics, SessionState};
pub use events::{SessionEvent, SessionPhase, SessionSummary, SetSummary};
pub use scheduler::{TickKind, TickScheduler};
