//! Process-based runtime

use crate::config::{Language, RuntimeConfig};
use crate::error::{ProgramError, SandboxError, SandboxResult};
use crate::io::{OutputWriter, ProgramIo};
use crate::wait::{StdinError, StdinReader};
use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};
use std::thread;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PIPE_CHUNK: usize = 4096;
const STDIN_QUEUE: usize = 64;
/// Pump retry while the child is not taking stdin.
const PUMP_RETRY: Duration = Duration::from_millis(5);
/// Exit is polled; a SIGCHLD-driven wait can be missed when several
/// runtimes share the process.
const REAP_INTERVAL: Duration = Duration::from_millis(10);
/// How long output is collected after the child exits.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Process-based runtime - runs the source with an interpreter binary
///
/// stdin is pumped from the ring into the child on a scoped thread, so the
/// child sees keystrokes as they are typed. Interrupt kills the child.
pub struct ProcessRuntime {
    program: String,
    args: Vec<String>,
    probe_args: Vec<String>,
    env: BTreeMap<String, String>,
    rt: Option<tokio::runtime::Runtime>,
}

impl ProcessRuntime {
    pub fn new() -> Self {
        Self::for_language(Language::Shell)
    }

    pub fn for_language(language: Language) -> Self {
        Self::from_config(&RuntimeConfig::for_language(language))
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            program: config.program().to_string(),
            args: config.args(),
            probe_args: config.language.probe_args(),
            env: config.env.clone(),
            rt: None,
        }
    }

    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            program: shell.into(),
            ..Self::new()
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, source: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(source)
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for ProcessRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Runtime for ProcessRuntime {
    fn name(&self) -> &str {
        &self.program
    }

    fn load(&mut self) -> SandboxResult<()> {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        // The command spawns when built into a future, so build it in context.
        let output = rt
            .block_on(async {
                Command::new(&self.program)
                    .args(&self.probe_args)
                    .envs(&self.env)
                    .stdin(Stdio::null())
                    .output()
                    .await
            })
            .map_err(|e| {
                SandboxError::Initialization(format!(
                    "interpreter `{}` could not be started: {}",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            return Err(SandboxError::Initialization(format!(
                "interpreter `{}` probe failed: {}",
                self.program,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(program = %self.program, version = %version.trim(), "interpreter ready");
        self.rt = Some(rt);
        Ok(())
    }

    fn execute(&mut self, source: &str, io: &mut ProgramIo<'_>) -> Result<(), ProgramError> {
        let rt = self
            .rt
            .as_ref()
            .ok_or_else(|| ProgramError::failed("runtime was not loaded"))?;
        let command = self.command(source);
        let program = self.program.as_str();

        let (stdin, stdout, stderr) = io.split();
        // The pump always reads, so its blocks say nothing about the child.
        stdin.clear_block_hook();
        let release = stdin.release_handle();
        let cancel = CancellationToken::new();
        let (input_tx, input_rx) = mpsc::channel(STDIN_QUEUE);

        thread::scope(|scope| {
            let pump_cancel = cancel.clone();
            let pump = scope.spawn(move || pump_stdin(stdin, input_tx, pump_cancel));

            let result = rt.block_on(drive_child(
                program,
                command,
                input_rx,
                stdout,
                stderr,
                cancel.clone(),
            ));

            // The child is gone; retire the pump wherever it is parked.
            cancel.cancel();
            release.release_until(|| pump.is_finished());
            if pump.join().is_err() {
                warn!("stdin pump panicked");
            }
            result
        })
    }
}

/// Move characters from the ring to the child until interrupted or released.
///
/// A full queue is retried rather than awaited so an interrupt still gets
/// through while the child is not reading.
fn pump_stdin(stdin: &mut StdinReader<'_>, tx: mpsc::Sender<char>, cancel: CancellationToken) {
    loop {
        let mut c = match stdin.read_char() {
            Ok(c) => c,
            Err(StdinError::Interrupted) => {
                cancel.cancel();
                return;
            }
            Err(StdinError::Released) => return,
        };

        loop {
            match tx.try_send(c) {
                Ok(()) => break,
                Err(TrySendError::Closed(_)) => return,
                Err(TrySendError::Full(back)) => {
                    if stdin.is_interrupted() {
                        cancel.cancel();
                        return;
                    }
                    if cancel.is_cancelled() {
                        return;
                    }
                    c = back;
                    thread::sleep(PUMP_RETRY);
                }
            }
        }
    }
}

async fn write_pending(pipe: &mut Option<ChildStdin>, bytes: &[u8]) -> std::io::Result<usize> {
    match pipe {
        Some(pipe) => pipe.write(bytes).await,
        None => std::future::pending().await,
    }
}

async fn drive_child(
    program: &str,
    mut command: Command,
    mut input: mpsc::Receiver<char>,
    stdout_w: &mut OutputWriter,
    stderr_w: &mut OutputWriter,
    cancel: CancellationToken,
) -> Result<(), ProgramError> {
    let mut child = command
        .spawn()
        .map_err(|e| ProgramError::failed(format!("Failed to spawn `{}`: {}", program, e)))?;
    debug!(pid = ?child.id(), "child spawned");

    let mut child_stdin = child.stdin.take();
    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| ProgramError::failed("child stdout was not captured"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| ProgramError::failed("child stderr was not captured"))?;

    let mut out_buf = [0u8; PIPE_CHUNK];
    let mut err_buf = [0u8; PIPE_CHUNK];
    let mut utf8 = [0u8; 4];
    // Bytes accepted from the pump but not yet taken by the child.
    let mut pending: Vec<u8> = Vec::new();
    let mut reap = tokio::time::interval(REAP_INTERVAL);
    reap.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut status: Option<std::io::Result<ExitStatus>> = None;
    let (mut out_done, mut err_done, mut input_done, mut killed) = (false, false, false, false);

    while status.is_none() {
        tokio::select! {
            _ = cancel.cancelled(), if !killed => {
                killed = true;
                debug!("interrupt received, killing child");
                child_stdin = None;
                pending.clear();
                let _ = child.start_kill();
            },
            c = input.recv(), if !input_done && pending.len() < PIPE_CHUNK => match c {
                Some(c) if child_stdin.is_some() => {
                    pending.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                }
                // Child closed its stdin; drop what it won't read.
                Some(_) => {}
                None => {
                    input_done = true;
                    if pending.is_empty() {
                        child_stdin = None;
                    }
                }
            },
            written = write_pending(&mut child_stdin, &pending), if !pending.is_empty() => match written {
                Ok(n) => {
                    pending.drain(..n);
                    if pending.is_empty() && input_done {
                        child_stdin = None;
                    }
                }
                Err(_) => {
                    child_stdin = None;
                    pending.clear();
                }
            },
            n = stdout.read(&mut out_buf), if !out_done => match n {
                Ok(0) | Err(_) => out_done = true,
                Ok(n) => stdout_w.write_bytes(&out_buf[..n]),
            },
            n = stderr.read(&mut err_buf), if !err_done => match n {
                Ok(0) | Err(_) => err_done = true,
                Ok(n) => stderr_w.write_bytes(&err_buf[..n]),
            },
            _ = reap.tick() => match child.try_wait() {
                Ok(Some(exit)) => status = Some(Ok(exit)),
                Ok(None) => {}
                Err(e) => status = Some(Err(e)),
            },
        }
    }
    drop(child_stdin);

    // Collect what the child wrote before exiting. Grandchildren may hold the
    // pipes open, so this is bounded.
    let drain_deadline = tokio::time::Instant::now() + DRAIN_GRACE;
    while !(out_done && err_done) {
        tokio::select! {
            n = stdout.read(&mut out_buf), if !out_done => match n {
                Ok(0) | Err(_) => out_done = true,
                Ok(n) => stdout_w.write_bytes(&out_buf[..n]),
            },
            n = stderr.read(&mut err_buf), if !err_done => match n {
                Ok(0) | Err(_) => err_done = true,
                Ok(n) => stderr_w.write_bytes(&err_buf[..n]),
            },
            _ = tokio::time::sleep_until(drain_deadline) => {
                debug!("output pipes still open after exit, dropping the rest");
                break;
            },
        }
    }

    stdout_w.flush();
    stderr_w.flush();

    if killed {
        return Err(ProgramError::Interrupted);
    }
    match status {
        Some(Ok(status)) if status.success() => Ok(()),
        Some(Ok(status)) => Err(ProgramError::failed(format!(
            "process exited with {}",
            status
        ))),
        Some(Err(e)) => Err(ProgramError::failed(format!("Process wait error: {}", e))),
        None => Err(ProgramError::failed("process status unavailable")),
    }
}
