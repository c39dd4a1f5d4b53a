//! The execution context: one OS thread that owns the interpreter.
//!
//! It is the only place that blocks. Messages from the host arrive on a
//! std channel; everything it reports goes back on an unbounded tokio
//! channel so sending never waits on the host.

use crate::error::{ProgramError, SandboxError, SandboxResult};
use crate::io::{EventSink, ProgramIo};
use crate::limits::ResourceLimits;
use crate::ring::Consumer;
use crate::runtime::Runtime;
use crate::wait::StdinReader;
use runbox_common::{
    BufferLayout, ExecutorMessage, HostMessage, RunId, RunOutcome, SessionId, SessionTracker,
    SharedRegion,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, info_span, warn};

pub(crate) struct Executor {
    session_id: SessionId,
    runtime: Box<dyn Runtime>,
    limits: ResourceLimits,
    tracker: SessionTracker,
    consumer: Option<Consumer>,
    events: UnboundedSender<ExecutorMessage>,
}

impl Executor {
    /// Start the execution thread. It runs until SHUTDOWN or until the host
    /// drops its sender.
    pub(crate) fn spawn(
        session_id: SessionId,
        runtime: Box<dyn Runtime>,
        limits: ResourceLimits,
        commands: Receiver<HostMessage>,
        events: UnboundedSender<ExecutorMessage>,
    ) -> SandboxResult<JoinHandle<()>> {
        let executor = Self {
            session_id,
            runtime,
            limits,
            tracker: SessionTracker::new(),
            consumer: None,
            events,
        };

        let name = format!("runbox-exec-{}", &session_id.to_string()[..8]);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || executor.run(commands))?;
        Ok(handle)
    }

    fn run(mut self, commands: Receiver<HostMessage>) {
        let span = info_span!("executor", session_id = %self.session_id);
        let _enter = span.enter();

        while let Ok(message) = commands.recv() {
            if let Err(violation) = self.tracker.observe_host(&message) {
                warn!(message = message.kind(), %violation, "rejecting host message");
                self.emit(ExecutorMessage::Rejected {
                    reason: violation.to_string(),
                });
                continue;
            }

            match message {
                HostMessage::Init { layout, region } => self.initialize(layout, region),
                HostMessage::Run { run_id, source } => self.execute(run_id, &source),
                HostMessage::Shutdown => break,
            }
        }

        debug!(runs = self.tracker.completed_runs(), "executor stopped");
    }

    fn initialize(&mut self, layout: BufferLayout, region: Option<SharedRegion>) {
        match self.attach_and_load(layout, region) {
            Ok(consumer) => {
                self.consumer = Some(consumer);
                info!(runtime = self.runtime.name(), "runtime loaded");
                self.emit(ExecutorMessage::Ready {
                    runtime: self.runtime.name().to_string(),
                });
            }
            Err(e) => {
                error!("initialization failed: {}", e);
                self.emit(ExecutorMessage::InitFailed {
                    message: e.to_string(),
                });
            }
        }
    }

    fn attach_and_load(
        &mut self,
        layout: BufferLayout,
        region: Option<SharedRegion>,
    ) -> SandboxResult<Consumer> {
        let region = region.ok_or_else(|| {
            SandboxError::Initialization("INIT carried no shared region".to_string())
        })?;
        let consumer = Consumer::attach(region, layout)?;
        let runtime = &mut self.runtime;
        match catch_unwind(AssertUnwindSafe(|| runtime.load())) {
            Ok(loaded) => loaded?,
            Err(panic) => {
                return Err(SandboxError::Initialization(format!(
                    "runtime panicked while loading: {}",
                    panic_message(panic.as_ref())
                )))
            }
        }
        Ok(consumer)
    }

    fn execute(&mut self, run_id: RunId, source: &str) {
        let span = info_span!("run", %run_id);
        let _enter = span.enter();

        let outcome = match self.consumer.as_mut() {
            Some(consumer) => {
                let sink = EventSink::new(self.events.clone(), run_id, self.limits.max_output_bytes);
                let stdin = StdinReader::new(consumer).on_block({
                    let sink = sink.clone();
                    move || sink.input_request()
                });
                let mut io = ProgramIo::new(stdin, sink);
                let runtime = &mut self.runtime;

                let result = catch_unwind(AssertUnwindSafe(|| runtime.execute(source, &mut io)));
                io.flush();

                match result {
                    Ok(Ok(())) => RunOutcome::Completed,
                    Ok(Err(ProgramError::Interrupted)) => RunOutcome::Interrupted,
                    Ok(Err(ProgramError::Failed(message))) => {
                        io.report_error(&message);
                        RunOutcome::Errored
                    }
                    Err(panic) => {
                        let message = panic_message(panic.as_ref());
                        error!("interpreter panicked: {}", message);
                        io.report_error(&format!("internal interpreter error: {}", message));
                        RunOutcome::Errored
                    }
                }
            }
            // Unreachable while the tracker admits RUN only after READY.
            None => RunOutcome::Errored,
        };

        info!(%outcome, "run finished");
        self.tracker.mark_finishing();
        self.emit(ExecutorMessage::Finished { run_id, outcome });
    }

    fn emit(&mut self, message: ExecutorMessage) {
        if let Err(violation) = self.tracker.observe_executor(&message) {
            warn!(message = message.kind(), %violation, "executor emitted out of order");
        }
        if self.events.send(message).is_err() {
            debug!("host is gone, dropping message");
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
