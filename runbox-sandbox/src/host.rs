//! Host side of a session: owns the execution thread, the producer end of
//! the stdin ring and the session state as observed from the events.
//!
//! Nothing here blocks. Sends are non-blocking channel sends, keystrokes
//! are lock-free ring writes and events are awaited.

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::executor::Executor;
use crate::feeder::{FeedEffect, InputFeeder, KeyInput};
use crate::limits::ResourceLimits;
use crate::ring::{Producer, RingBuffer};
use crate::runtime::Runtime;
use crate::transcript::Transcript;
use runbox_common::{
    ExecutorMessage, Frame, HostMessage, RunId, RunOutcome, SessionId, SessionState,
    SessionTracker,
};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How long `shutdown` waits for the execution thread before detaching it.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct ActiveRun {
    run_id: RunId,
    deadline: Option<Instant>,
    timed_out: bool,
}

#[derive(Debug)]
pub struct ExecutionHost {
    session_id: SessionId,
    runtime_name: String,
    tracker: SessionTracker,
    commands: mpsc::Sender<HostMessage>,
    events: UnboundedReceiver<ExecutorMessage>,
    feeder: InputFeeder,
    limits: ResourceLimits,
    active: Option<ActiveRun>,
    waiting_for_input: bool,
    transcript: Option<Transcript>,
    worker: Option<JoinHandle<()>>,
}

impl ExecutionHost {
    /// Cold start: spawn the execution context, send INIT and wait for READY.
    ///
    /// Fails with [`SandboxError::Initialization`] if the runtime cannot load
    /// or READY does not arrive within `limits.init_timeout`.
    pub async fn initialize(
        config: &SandboxConfig,
        runtime: impl Runtime + 'static,
    ) -> SandboxResult<Self> {
        config.validate()?;
        let session_id = SessionId::new();
        let ring = RingBuffer::allocate(config.buffer.capacity)?;
        let (command_tx, command_rx) = mpsc::channel();
        let (event_tx, event_rx) = unbounded_channel();

        let worker = Executor::spawn(
            session_id,
            Box::new(runtime),
            config.limits.clone(),
            command_rx,
            event_tx,
        )?;

        let mut host = Self {
            session_id,
            runtime_name: String::new(),
            tracker: SessionTracker::new(),
            commands: command_tx,
            events: event_rx,
            feeder: InputFeeder::new(Producer::new(ring.clone())),
            limits: config.limits.clone(),
            active: None,
            waiting_for_input: false,
            transcript: config
                .transcript
                .enabled
                .then(|| Transcript::new(config.transcript.max_entries)),
            worker: Some(worker),
        };

        info!(session_id = %session_id, capacity = ring.capacity(), "initializing session");
        host.send(HostMessage::Init {
            layout: ring.layout(),
            region: Some(ring.region().clone()),
        })?;

        let init_timeout = host.limits.init_timeout;
        let reply = match tokio::time::timeout(init_timeout, host.events.recv()).await {
            Ok(Some(message)) => host.observe(message),
            Ok(None) => {
                return Err(SandboxError::Initialization(
                    "execution context exited during INIT".to_string(),
                ))
            }
            Err(_) => {
                return Err(SandboxError::Initialization(format!(
                    "no READY within {:?}",
                    init_timeout
                )))
            }
        };

        match reply {
            ExecutorMessage::Ready { runtime } => {
                info!(session_id = %session_id, runtime = %runtime, "session ready");
                host.runtime_name = runtime;
                Ok(host)
            }
            ExecutorMessage::InitFailed { message } => Err(SandboxError::Initialization(message)),
            other => Err(SandboxError::Initialization(format!(
                "unexpected {} during INIT",
                other.kind()
            ))),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    pub fn current_run(&self) -> Option<RunId> {
        self.tracker.current_run()
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Advisory: the last INPUT_REQUEST has not been answered with Enter yet.
    pub fn is_waiting_for_input(&self) -> bool {
        self.waiting_for_input
    }

    /// Characters typed since the last Enter, for redrawing the prompt line.
    pub fn pending_line(&self) -> &str {
        self.feeder.pending_line()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    /// Start a run on the warm runtime. Only valid while `Ready`; anything
    /// else is rejected, never queued.
    pub fn run(&mut self, source: impl Into<String>) -> SandboxResult<RunId> {
        let run_id = RunId::new();
        let message = HostMessage::Run {
            run_id,
            source: source.into(),
        };
        let previous = self.tracker.clone();
        self.tracker.observe_host(&message)?;

        // FINISHED for the previous run has been observed, so the reader is idle.
        self.feeder.reset();
        self.waiting_for_input = false;

        if let Err(e) = self.dispatch(message) {
            // RUN never left; the session is still Ready.
            self.tracker = previous;
            return Err(e);
        }

        self.active = Some(ActiveRun {
            run_id,
            deadline: self.limits.max_duration.map(|d| Instant::now() + d),
            timed_out: false,
        });
        info!(session_id = %self.session_id, %run_id, "run started");
        Ok(run_id)
    }

    /// Feed one raw keystroke. Ignored unless a run is in progress.
    pub fn on_input(&mut self, raw: &str) -> SandboxResult<FeedEffect> {
        match KeyInput::from_raw(raw) {
            Some(key) => self.on_key(key),
            None => Ok(FeedEffect::Ignored),
        }
    }

    pub fn on_key(&mut self, key: KeyInput) -> SandboxResult<FeedEffect> {
        if self.tracker.state() != SessionState::Running {
            return Ok(FeedEffect::Ignored);
        }

        let effect = self.feeder.on_key(key)?;
        match effect {
            FeedEffect::Newline => self.waiting_for_input = false,
            FeedEffect::Interrupted => {
                info!(session_id = %self.session_id, "interrupt requested");
                self.waiting_for_input = false;
            }
            _ => {}
        }
        Ok(effect)
    }

    /// Ctrl+C. Returns false when there was no run to interrupt.
    pub fn interrupt(&mut self) -> SandboxResult<bool> {
        Ok(self.on_key(KeyInput::Interrupt)? == FeedEffect::Interrupted)
    }

    /// Next message from the execution context, or `None` once it is gone.
    ///
    /// A run that outlives `limits.max_duration` is interrupted here and its
    /// FINISHED is reported as [`RunOutcome::TimedOut`].
    pub async fn next_event(&mut self) -> Option<ExecutorMessage> {
        loop {
            let deadline = self
                .active
                .as_ref()
                .filter(|run| !run.timed_out)
                .and_then(|run| run.deadline);

            let message = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.events.recv()).await {
                        Ok(message) => message,
                        Err(_) => {
                            self.expire_run();
                            continue;
                        }
                    }
                }
                None => self.events.recv().await,
            };

            return message.map(|message| self.observe(message));
        }
    }

    /// Stop the execution context and wait briefly for its thread.
    pub async fn shutdown(mut self) {
        self.stop();
        let Some(worker) = self.worker.take() else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, tokio::task::spawn_blocking(move || worker.join()))
            .await
        {
            Ok(Ok(Ok(()))) => debug!(session_id = %self.session_id, "execution thread joined"),
            Ok(Ok(Err(_))) => warn!(session_id = %self.session_id, "execution thread panicked"),
            Ok(Err(e)) => warn!(session_id = %self.session_id, "join task failed: {}", e),
            Err(_) => warn!(
                session_id = %self.session_id,
                "execution thread still busy after {:?}, detaching",
                SHUTDOWN_GRACE
            ),
        }
    }

    fn stop(&mut self) {
        if self.tracker.state() == SessionState::Running {
            let _ = self.feeder.on_key(KeyInput::Interrupt);
        }
        if self.dispatch(HostMessage::Shutdown).is_err() {
            debug!("execution context already gone");
        }
    }

    fn expire_run(&mut self) {
        if let Some(run) = self.active.as_mut() {
            run.timed_out = true;
            warn!(
                session_id = %self.session_id,
                run_id = %run.run_id,
                limit = ?self.limits.max_duration,
                "run exceeded its time limit, interrupting"
            );
        }
        let _ = self.feeder.on_key(KeyInput::Interrupt);
    }

    fn send(&mut self, message: HostMessage) -> SandboxResult<()> {
        self.tracker.observe_host(&message)?;
        self.dispatch(message)
    }

    fn dispatch(&mut self, message: HostMessage) -> SandboxResult<()> {
        debug!(message = message.kind(), "host -> executor");
        let frame = self.transcript.is_some().then(|| Frame::Host(message.clone()));
        self.commands
            .send(message)
            .map_err(|_| SandboxError::Disconnected)?;
        if let (Some(transcript), Some(frame)) = (self.transcript.as_mut(), frame) {
            transcript.record(frame);
        }
        Ok(())
    }

    fn observe(&mut self, message: ExecutorMessage) -> ExecutorMessage {
        if let Err(violation) = self.tracker.observe_executor(&message) {
            warn!(message = message.kind(), %violation, "out-of-order executor message");
        }

        let message = match message {
            ExecutorMessage::Finished { run_id, outcome } => {
                self.waiting_for_input = false;
                let timed_out = self
                    .active
                    .take()
                    .map_or(false, |run| run.run_id == run_id && run.timed_out);
                let outcome = match outcome {
                    RunOutcome::Interrupted if timed_out => RunOutcome::TimedOut,
                    outcome => outcome,
                };
                info!(session_id = %self.session_id, %run_id, %outcome, "run finished");
                ExecutorMessage::Finished { run_id, outcome }
            }
            ExecutorMessage::InputRequest { run_id } => {
                if self.tracker.current_run() == Some(run_id) {
                    self.waiting_for_input = true;
                }
                message
            }
            ExecutorMessage::Rejected { ref reason } => {
                warn!(session_id = %self.session_id, %reason, "executor rejected a message");
                message
            }
            other => other,
        };

        if let Some(transcript) = self.transcript.as_mut() {
            transcript.record(Frame::Executor(message.clone()));
        }
        message
    }
}

impl Drop for ExecutionHost {
    fn drop(&mut self) {
        if self.worker.take().is_some() {
            self.stop();
        }
    }
}
