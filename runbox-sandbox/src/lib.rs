//! runbox sandbox - interactive code execution with blocking stdin
//!
//! An [`ExecutionHost`] owns a dedicated execution thread running a
//! [`Runtime`]. Program output streams back as protocol events; keystrokes
//! go into a lock-free ring the program's stdin blocks on.

mod config;
mod error;
mod executor;
mod feeder;
mod host;
mod io;
mod limits;
mod ring;
mod runtime;
mod transcript;
mod wait;

pub use config::{
    BufferConfig, Language, RuntimeConfig, SandboxConfig, TranscriptConfig, MAX_CAPACITY,
};
pub use error::{ProgramError, SandboxError, SandboxResult};
pub use feeder::{FeedEffect, InputFeeder, KeyInput};
pub use host::ExecutionHost;
pub use io::{OutputWriter, ProgramIo};
pub use limits::{LimitsProfile, ResourceLimits};
pub use ring::{Consumer, Producer, RingBuffer, RingFull, Slot, INTERRUPT_SENTINEL};
#[cfg(feature = "process")]
pub use runtime::ProcessRuntime;
pub use runtime::Runtime;
pub use transcript::Transcript;
pub use wait::{wait_for_data, StdinError, StdinReader, StdinRelease};

/// Re-export protocol types
pub use runbox_common::{
    BufferLayout, ExecutorMessage, HostMessage, OutputStream, RunId, RunOutcome, SessionId,
    SessionState,
};
