//! Async session runner
//!
//! Owns a [`SessionController`] inside a tokio task. Frames and lifecycle
//! commands arrive over one ordered channel, and a poll interval drives the
//! controller's one-second timers, so the controller is only ever touched
//! from that single task.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::error::{log_session_error, SessionError};
use crate::pose::FrameInput;
use crate::session::{SessionController, SessionEvent};
use crate::store::ExerciseSummaryRecord;

/// How often the runner checks the controller's timers
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Time source abstraction so tests can drive the runner deterministically.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time source that only moves when told to
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<Instant>,
}

impl ManualTimeSource {
    pub fn new(start: Instant) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poison| poison.into_inner());
        *now += by;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

type StopReply = oneshot::Sender<Result<ExerciseSummaryRecord, SessionError>>;

/// Commands accepted by the runner task
#[derive(Debug)]
pub enum SessionCommand {
    Frame(FrameInput),
    Pause,
    Resume,
    Stop(StopReply),
}

pub struct SessionRunner;

impl SessionRunner {
    /// Start the session and move the controller into a tokio task.
    ///
    /// Must be called from within a tokio runtime. Events published while
    /// starting reach only receivers subscribed on the controller before
    /// this call.
    pub fn spawn(
        controller: SessionController,
        time: Arc<dyn TimeSource>,
    ) -> Result<SessionHandle, SessionError> {
        Self::spawn_with_poll(controller, time, POLL_INTERVAL)
    }

    pub fn spawn_with_poll(
        mut controller: SessionController,
        time: Arc<dyn TimeSource>,
        poll: Duration,
    ) -> Result<SessionHandle, SessionError> {
        controller.start(time.now())?;

        let events = controller.event_sender();
        let (commands, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(controller, rx, time, poll));

        tracing::info!("[SessionRunner] Session task spawned (poll {:?})", poll);
        Ok(SessionHandle { commands, events })
    }
}

async fn run_session(
    mut controller: SessionController,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    time: Arc<dyn TimeSource>,
    poll: Duration,
) {
    let mut interval = tokio::time::interval(poll);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    while controller.phase().is_running() {
        tokio::select! {
            _ = interval.tick() => controller.tick(time.now()),
            command = commands.recv() => match command {
                Some(command) => handle_command(&mut controller, command, time.as_ref()),
                None => {
                    tracing::info!("[SessionRunner] All handles dropped, finishing session");
                    if let Err(err) = controller.stop(time.now()) {
                        log_session_error(&err, "runner_handles_dropped");
                    }
                    return;
                }
            },
        }
    }

    // Completed: keep answering until every handle is gone
    while let Some(command) = commands.recv().await {
        handle_command(&mut controller, command, time.as_ref());
    }
    tracing::debug!("[SessionRunner] Session task finished");
}

fn handle_command(controller: &mut SessionController, command: SessionCommand, time: &dyn TimeSource) {
    match command {
        SessionCommand::Frame(frame) => {
            controller.on_frame(frame);
        }
        SessionCommand::Pause => {
            if let Err(err) = controller.pause(time.now()) {
                log_session_error(&err, "runner_pause");
            }
        }
        SessionCommand::Resume => {
            if let Err(err) = controller.resume(time.now()) {
                log_session_error(&err, "runner_resume");
            }
        }
        SessionCommand::Stop(reply) => {
            let _ = reply.send(controller.stop(time.now()));
        }
    }
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    /// Queue one frame; frames are processed in submission order
    pub fn submit_frame(&self, frame: FrameInput) -> Result<(), SessionError> {
        self.send(SessionCommand::Frame(frame))
    }

    pub fn pause(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::Resume)
    }

    /// Finish the session and wait for the persisted record
    pub async fn stop(&self) -> Result<ExerciseSummaryRecord, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Stop(reply))?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .map_err(|_| SessionError::ChannelClosed)
    }
}
