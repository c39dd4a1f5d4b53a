use crate::{BufferLayout, SharedRegion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one RUN and every event it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one host/executor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Channel an OUTPUT chunk was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
    /// Stringified error raised by the user program.
    Error,
}

/// How a RUN ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// The program raised an error; its text was sent as OUTPUT on [`OutputStream::Error`].
    Errored,
    /// Stopped through the interrupt path (Ctrl+C).
    Interrupted,
    /// Stopped through the interrupt path after the run deadline passed.
    TimedOut,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Errored => "errored",
            RunOutcome::Interrupted => "interrupted",
            RunOutcome::TimedOut => "timed out",
        };
        f.write_str(label)
    }
}

/// Host → executor messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HostMessage {
    /// Sent exactly once, before any RUN.
    Init {
        layout: BufferLayout,
        /// The shared memory itself. Only present in-process; a decoded INIT
        /// carries the layout alone.
        #[serde(skip)]
        region: Option<SharedRegion>,
    },
    /// Execute `source` on the warm runtime.
    Run { run_id: RunId, source: String },
    /// Tear the execution context down.
    Shutdown,
}

impl HostMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            HostMessage::Init { .. } => "INIT",
            HostMessage::Run { .. } => "RUN",
            HostMessage::Shutdown => "SHUTDOWN",
        }
    }
}

/// Executor → host messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutorMessage {
    /// INIT completed; the runtime is loaded and the ring attached.
    Ready { runtime: String },
    /// INIT failed. The session cannot reach Ready.
    InitFailed { message: String },
    Output {
        run_id: RunId,
        stream: OutputStream,
        text: String,
    },
    /// Advisory: the program is blocked reading stdin.
    InputRequest { run_id: RunId },
    /// Exactly one per RUN.
    Finished { run_id: RunId, outcome: RunOutcome },
    /// A host message broke the ordering contract and was dropped.
    Rejected { reason: String },
}

impl ExecutorMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutorMessage::Ready { .. } => "READY",
            ExecutorMessage::InitFailed { .. } => "INIT_FAILED",
            ExecutorMessage::Output { .. } => "OUTPUT",
            ExecutorMessage::InputRequest { .. } => "INPUT_REQUEST",
            ExecutorMessage::Finished { .. } => "FINISHED",
            ExecutorMessage::Rejected { .. } => "REJECTED",
        }
    }

    /// Run the message belongs to, for run-scoped messages.
    pub fn run_id(&self) -> Option<RunId> {
        match self {
            ExecutorMessage::Output { run_id, .. }
            | ExecutorMessage::InputRequest { run_id }
            | ExecutorMessage::Finished { run_id, .. } => Some(*run_id),
            _ => None,
        }
    }
}
