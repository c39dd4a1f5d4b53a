use runbox_common::{LayoutError, ProtocolViolation};
use thiserror::Error;

/// Infrastructure failures. User program errors never become one of these.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The interpreter could not be loaded; the session is unusable.
    #[error("initialization failed: {0}")]
    Initialization(String),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("invalid buffer layout: {0}")]
    Layout(#[from] LayoutError),

    #[error("stdin buffer is full, input dropped")]
    Backpressure,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("execution context is gone")]
    Disconnected,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SandboxResult<T> = Result<T, SandboxError>;

impl From<crate::ring::RingFull> for SandboxError {
    fn from(_: crate::ring::RingFull) -> Self {
        SandboxError::Backpressure
    }
}

/// How a user program failed. These are reported as OUTPUT, never propagated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    #[error("{0}")]
    Failed(String),

    #[error("interrupted")]
    Interrupted,
}

impl ProgramError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProgramError::Failed(message.into())
    }
}

impl From<crate::wait::StdinError> for ProgramError {
    fn from(_: crate::wait::StdinError) -> Self {
        ProgramError::Interrupted
    }
}
