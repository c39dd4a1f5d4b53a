//! Integration tests for the interpreter-process runtime, using `sh`
#![cfg(unix)]

use assert_matches::assert_matches;
use runbox_sandbox::{
    ExecutionHost, Language, OutputStream, ProcessRuntime, RunOutcome, SandboxConfig,
    SandboxError,
};
use runbox_tests::common::*;
use std::time::{Duration, Instant};

fn shell() -> ProcessRuntime {
    ProcessRuntime::for_language(Language::Shell)
}

#[tokio::test]
async fn test_shell_reports_ready() {
    setup_test_logging();
    let host = start(shell()).await;
    assert_eq!(host.runtime_name(), "sh");
    host.shutdown().await;
}

#[tokio::test]
async fn test_self_exiting_child_finishes_while_stdin_is_idle() {
    setup_test_logging();
    let mut host = start(shell()).await;

    // Nothing is ever typed, so the stdin pump stays parked on the ring.
    let started = Instant::now();
    let run = run_to_end(&mut host, "echo out; echo err 1>&2").await;
    assert_eq!(run.outcome, Some(RunOutcome::Completed));
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
    assert_eq!(run.stdout(), "out\n");
    assert_eq!(run.text(OutputStream::Stderr), "err\n");

    // Repeated runs each retire their pump.
    for i in 0..5 {
        let run = run_to_end(&mut host, &format!("echo {}", i)).await;
        assert_eq!(run.stdout(), format!("{}\n", i));
    }
}

#[tokio::test]
async fn test_shell_read_round_trip() {
    setup_test_logging();
    let mut host = start(shell()).await;

    host.run("read x; echo \"got $x\"").unwrap();
    // The child's reads are not observable, so type without waiting for a request.
    type_line(&mut host, "hi");

    let mut run = RunRecord::default();
    assert_eq!(until_finished(&mut host, &mut run).await, RunOutcome::Completed);
    assert_eq!(run.stdout(), "got hi\n");
    assert_eq!(run.input_requests, 0);
}

#[tokio::test]
async fn test_shell_streams_stderr_separately() {
    setup_test_logging();
    let mut host = start(shell()).await;

    let run = run_to_end(&mut host, "echo out; echo oops 1>&2").await;
    assert_eq!(run.outcome, Some(RunOutcome::Completed));
    assert_eq!(run.stdout(), "out\n");
    assert_eq!(run.text(OutputStream::Stderr), "oops\n");
}

#[tokio::test]
async fn test_nonzero_exit_is_program_error() {
    setup_test_logging();
    let mut host = start(shell()).await;

    let run = run_to_end(&mut host, "echo before; exit 3").await;
    assert_eq!(run.outcome, Some(RunOutcome::Errored));
    assert_eq!(run.stdout(), "before\n");
    assert_eq!(run.errors().len(), 1);
    assert!(run.errors()[0].contains('3'), "{:?}", run.errors());

    let next = run_to_end(&mut host, "echo again").await;
    assert_eq!(next.outcome, Some(RunOutcome::Completed));
}

#[tokio::test]
async fn test_interrupt_kills_blocked_child() {
    setup_test_logging();
    let mut host = start(shell()).await;

    host.run("while read line; do echo \"$line\"; done").unwrap();
    type_line(&mut host, "one");

    let mut run = RunRecord::default();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let started = Instant::now();
    host.interrupt().unwrap();
    assert_eq!(until_finished(&mut host, &mut run).await, RunOutcome::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(run.stdout(), "one\n");
}

#[tokio::test]
async fn test_interrupt_wins_over_full_stdin_pipe() {
    setup_test_logging();
    let mut config = SandboxConfig::default();
    config.buffer.capacity = 4096;
    config.limits.max_duration = None;
    let mut host = start_with(config, shell()).await;

    // The child never reads, so typed input backs up through the pipe,
    // the pump queue and finally the ring.
    host.run("exec sleep 20").unwrap();
    let feed_until = Instant::now() + Duration::from_secs(1);
    let mut refused = 0;
    while Instant::now() < feed_until {
        match host.on_input("x") {
            Ok(_) => {}
            Err(SandboxError::Backpressure) => {
                refused += 1;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Err(e) => panic!("unexpected feed error: {}", e),
        }
    }
    assert!(refused > 0, "stdin never pushed back");

    let started = Instant::now();
    host.interrupt().unwrap();
    let mut run = RunRecord::default();
    assert_eq!(until_finished(&mut host, &mut run).await, RunOutcome::Interrupted);
    assert!(started.elapsed() < Duration::from_secs(3), "{:?}", started.elapsed());
}

#[tokio::test]
async fn test_child_reads_are_not_announced() {
    setup_test_logging();
    let mut host = start(shell()).await;

    host.run("read line; echo \"[$line]\"").unwrap();
    // The child is blocked in read(2), which the host cannot observe.
    let quiet = tokio::time::timeout(Duration::from_millis(300), host.next_event()).await;
    assert!(quiet.is_err(), "unexpected event: {:?}", quiet);
    assert!(!host.is_waiting_for_input());

    type_line(&mut host, "hi");
    let mut run = RunRecord::default();
    assert_eq!(until_finished(&mut host, &mut run).await, RunOutcome::Completed);
    assert_eq!(run.stdout(), "[hi]\n");
    assert_eq!(run.input_requests, 0);
}

#[tokio::test]
async fn test_deadline_kills_sleeping_child() {
    setup_test_logging();
    let config = config_with_timeout(Duration::from_millis(300));
    let mut host = start_with(config, shell()).await;

    let run = run_to_end(&mut host, "sleep 30").await;
    assert_eq!(run.outcome, Some(RunOutcome::TimedOut));

    let next = run_to_end(&mut host, "echo alive").await;
    assert_eq!(next.stdout(), "alive\n");
}

#[tokio::test]
async fn test_partial_line_output_is_flushed_at_exit() {
    setup_test_logging();
    let mut host = start(shell()).await;

    let run = run_to_end(&mut host, "printf 'no newline'").await;
    assert_eq!(run.stdout(), "no newline");
}

#[tokio::test]
async fn test_missing_interpreter_fails_initialization() {
    setup_test_logging();
    let mut config = SandboxConfig::default();
    config.runtime.language = Language::Shell;
    config.runtime.program = Some("/nonexistent/runbox-sh".into());

    let runtime = ProcessRuntime::from_config(&config.runtime);
    let result = ExecutionHost::initialize(&config, runtime).await;
    assert_matches!(result, Err(SandboxError::Initialization(msg)) if msg.contains("runbox-sh"));
}
