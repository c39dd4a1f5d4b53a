//! Runtime trait and implementations

#[cfg(feature = "process")]
mod process;

use crate::error::{ProgramError, SandboxResult};
use crate::io::ProgramIo;

#[cfg(feature = "process")]
pub use process::ProcessRuntime;

/// An interpreter that lives inside the execution context.
///
/// The executor thread owns the runtime for the whole session, so state
/// built in [`load`](Runtime::load) is warm for every run.
pub trait Runtime: Send {
    /// Get runtime name, reported in READY
    fn name(&self) -> &str;

    /// Cold start. Failure makes the session unusable.
    fn load(&mut self) -> SandboxResult<()>;

    /// Run `source` to completion.
    ///
    /// Blocking reads go through `io` and fail with
    /// [`ProgramError::Interrupted`] once the host interrupts. Any other
    /// error is the program's own and is shown to the user.
    fn execute(&mut self, source: &str, io: &mut ProgramIo<'_>) -> Result<(), ProgramError>;
}

impl<R: Runtime + ?Sized> Runtime for Box<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load(&mut self) -> SandboxResult<()> {
        (**self).load()
    }

    fn execute(&mut self, source: &str, io: &mut ProgramIo<'_>) -> Result<(), ProgramError> {
        (**self).execute(source, io)
    }
}
