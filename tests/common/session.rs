//! Helpers for driving an [`ExecutionHost`] from async tests

use runbox_sandbox::{
    ExecutionHost, ExecutorMessage, OutputStream, Runtime, RunOutcome, SandboxConfig,
};
use std::time::Duration;
use tokio::time::timeout;

/// Upper bound on any single wait in a test.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a run produced, in order.
#[derive(Debug, Default)]
pub struct RunRecord {
    pub output: Vec<(OutputStream, String)>,
    pub input_requests: usize,
    pub outcome: Option<RunOutcome>,
}

impl RunRecord {
    /// Concatenated text of one stream.
    pub fn text(&self, stream: OutputStream) -> String {
        self.output
            .iter()
            .filter(|(s, _)| *s == stream)
            .map(|(_, text)| text.as_str())
            .collect()
    }

    pub fn stdout(&self) -> String {
        self.text(OutputStream::Stdout)
    }

    pub fn errors(&self) -> Vec<&str> {
        self.output
            .iter()
            .filter(|(s, _)| *s == OutputStream::Error)
            .map(|(_, text)| text.as_str())
            .collect()
    }
}

pub async fn start(runtime: impl Runtime + 'static) -> ExecutionHost {
    start_with(SandboxConfig::default(), runtime).await
}

pub async fn start_with(config: SandboxConfig, runtime: impl Runtime + 'static) -> ExecutionHost {
    timeout(EVENT_TIMEOUT, ExecutionHost::initialize(&config, runtime))
        .await
        .expect("initialize timed out")
        .expect("initialize failed")
}

async fn next(host: &mut ExecutionHost) -> ExecutorMessage {
    timeout(EVENT_TIMEOUT, host.next_event())
        .await
        .expect("no event in time")
        .expect("execution context vanished")
}

fn record(run: &mut RunRecord, message: &ExecutorMessage) {
    match message {
        ExecutorMessage::Output { stream, text, .. } => run.output.push((*stream, text.clone())),
        ExecutorMessage::InputRequest { .. } => run.input_requests += 1,
        ExecutorMessage::Finished { outcome, .. } => run.outcome = Some(*outcome),
        other => panic!("unexpected {} during a run", other.kind()),
    }
}

/// Consume events until the program blocks on stdin.
pub async fn until_input_request(host: &mut ExecutionHost, run: &mut RunRecord) {
    loop {
        let message = next(host).await;
        record(run, &message);
        match message {
            ExecutorMessage::InputRequest { .. } => return,
            ExecutorMessage::Finished { .. } => panic!("run finished before asking for input"),
            _ => {}
        }
    }
}

/// Consume events until FINISHED.
pub async fn until_finished(host: &mut ExecutionHost, run: &mut RunRecord) -> RunOutcome {
    loop {
        let message = next(host).await;
        record(run, &message);
        if let ExecutorMessage::Finished { outcome, .. } = message {
            return outcome;
        }
    }
}

/// Run a program that needs no input.
pub async fn run_to_end(host: &mut ExecutionHost, source: &str) -> RunRecord {
    host.run(source).expect("run rejected");
    let mut run = RunRecord::default();
    until_finished(host, &mut run).await;
    run
}

/// Type `text` one key at a time, then Enter.
pub fn type_line(host: &mut ExecutionHost, text: &str) {
    for c in text.chars() {
        host.on_input(&c.to_string()).expect("keystroke rejected");
    }
    host.on_input("\r").expect("enter rejected");
}
