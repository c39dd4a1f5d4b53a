//! Session lifecycle and the protocol ordering contract.
//!
//! Both the host and the executor feed every message they send or receive
//! through a [`SessionTracker`], so an out-of-order message is caught on
//! whichever side sees it first.

use crate::{ExecutorMessage, HostMessage, RunId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    /// INIT sent, runtime loading (cold start only).
    Initializing,
    Ready,
    Running,
    /// Program done, FINISHED not yet observed.
    Finished,
    /// INIT failed; terminal.
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initializing => "initializing",
            SessionState::Ready => "ready",
            SessionState::Running => "running",
            SessionState::Finished => "finished",
            SessionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("INIT was already sent for this session")]
    DuplicateInit,

    #[error("RUN received before READY (session is {0})")]
    RunBeforeReady(SessionState),

    #[error("RUN received while run {0} is unfinished")]
    RunWhileRunning(RunId),

    #[error("session failed to initialize and cannot run code")]
    SessionFailed,

    #[error("{message} is not valid while the session is {state}")]
    Unexpected {
        message: &'static str,
        state: SessionState,
    },

    #[error("{message} for run {got} does not match the current run")]
    StaleRun { message: &'static str, got: RunId },
}

/// State machine over the messages of one session.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    state: SessionState,
    current_run: Option<RunId>,
    completed_runs: u64,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            state: SessionState::Uninitialized,
            current_run: None,
            completed_runs: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.current_run
    }

    /// Runs that reached FINISHED.
    pub fn completed_runs(&self) -> u64 {
        self.completed_runs
    }

    /// Apply a host → executor message.
    pub fn observe_host(&mut self, message: &HostMessage) -> Result<(), ProtocolViolation> {
        match message {
            HostMessage::Init { .. } => {
                if self.state != SessionState::Uninitialized {
                    return Err(ProtocolViolation::DuplicateInit);
                }
                self.state = SessionState::Initializing;
            }
            HostMessage::Run { run_id, .. } => match self.state {
                SessionState::Ready => {
                    self.state = SessionState::Running;
                    self.current_run = Some(*run_id);
                }
                SessionState::Running | SessionState::Finished => {
                    let current = self.current_run.unwrap_or(*run_id);
                    return Err(ProtocolViolation::RunWhileRunning(current));
                }
                SessionState::Failed => return Err(ProtocolViolation::SessionFailed),
                state @ (SessionState::Uninitialized | SessionState::Initializing) => {
                    return Err(ProtocolViolation::RunBeforeReady(state));
                }
            },
            HostMessage::Shutdown => {}
        }
        Ok(())
    }

    /// Apply an executor → host message.
    pub fn observe_executor(&mut self, message: &ExecutorMessage) -> Result<(), ProtocolViolation> {
        match message {
            ExecutorMessage::Ready { .. } => {
                self.expect_state(message, &[SessionState::Initializing])?;
                self.state = SessionState::Ready;
            }
            ExecutorMessage::InitFailed { .. } => {
                self.expect_state(message, &[SessionState::Initializing])?;
                self.state = SessionState::Failed;
            }
            ExecutorMessage::Output { run_id, .. } | ExecutorMessage::InputRequest { run_id } => {
                self.expect_state(message, &[SessionState::Running, SessionState::Finished])?;
                self.expect_run(message, *run_id)?;
            }
            ExecutorMessage::Finished { run_id, .. } => {
                self.expect_state(message, &[SessionState::Running, SessionState::Finished])?;
                self.expect_run(message, *run_id)?;
                self.state = SessionState::Ready;
                self.current_run = None;
                self.completed_runs += 1;
            }
            ExecutorMessage::Rejected { .. } => {}
        }
        Ok(())
    }

    /// Executor side: the program returned and FINISHED is about to be emitted.
    pub fn mark_finishing(&mut self) {
        if self.state == SessionState::Running {
            self.state = SessionState::Finished;
        }
    }

    fn expect_state(
        &self,
        message: &ExecutorMessage,
        allowed: &[SessionState],
    ) -> Result<(), ProtocolViolation> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ProtocolViolation::Unexpected {
                message: message.kind(),
                state: self.state,
            })
        }
    }

    fn expect_run(&self, message: &ExecutorMessage, got: RunId) -> Result<(), ProtocolViolation> {
        if self.current_run == Some(got) {
            Ok(())
        } else {
            Err(ProtocolViolation::StaleRun {
                message: message.kind(),
                got,
            })
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}
