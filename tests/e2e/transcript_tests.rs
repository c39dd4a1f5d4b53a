//! End-to-end check of the protocol as recorded in a session transcript

use runbox_common::{decode_line, ExecutorMessage, Frame, HostMessage, RunOutcome, TranscriptEntry};
use runbox_sandbox::SandboxConfig;
use runbox_tests::common::*;

fn kinds(entries: &[TranscriptEntry]) -> Vec<&'static str> {
    entries
        .iter()
        .map(|entry| match &entry.frame {
            Frame::Host(message) => message.kind(),
            Frame::Executor(message) => message.kind(),
        })
        .collect()
}

#[tokio::test]
async fn test_transcript_follows_protocol_order() {
    setup_test_logging();
    let mut config = SandboxConfig::default();
    config.transcript.enabled = true;
    let mut host = start_with(config, ScriptRuntime::new()).await;

    host.run("input\necho").unwrap();
    let mut run = RunRecord::default();
    until_input_request(&mut host, &mut run).await;
    type_line(&mut host, "hi");
    until_finished(&mut host, &mut run).await;
    run_to_end(&mut host, "raise boom").await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.jsonl");
    host.transcript()
        .unwrap()
        .write_to(std::fs::File::create(&path).unwrap())
        .unwrap();
    host.shutdown().await;

    let text = std::fs::read_to_string(&path).unwrap();
    let entries: Vec<TranscriptEntry> = text.lines().map(|l| decode_line(l).unwrap()).collect();

    assert_eq!(
        kinds(&entries),
        vec![
            "INIT",
            "READY",
            "RUN",
            "INPUT_REQUEST",
            "OUTPUT",
            "FINISHED",
            "RUN",
            "OUTPUT",
            "FINISHED",
        ]
    );
    assert!(entries.windows(2).all(|w| w[0].seq + 1 == w[1].seq));

    // INIT crosses the wire without the region.
    assert!(matches!(
        &entries[0].frame,
        Frame::Host(HostMessage::Init { region: None, .. })
    ));

    // Every run-scoped event carries the id of the RUN it belongs to.
    let first_run = match &entries[2].frame {
        Frame::Host(HostMessage::Run { run_id, .. }) => *run_id,
        other => panic!("expected RUN, got {:?}", other),
    };
    for entry in &entries[3..6] {
        if let Frame::Executor(message) = &entry.frame {
            assert_eq!(message.run_id(), Some(first_run));
        }
    }

    assert!(matches!(
        &entries[8].frame,
        Frame::Executor(ExecutorMessage::Finished {
            outcome: RunOutcome::Errored,
            ..
        })
    ));
}

#[tokio::test]
async fn test_wire_format_uses_upper_case_tags() {
    setup_test_logging();
    let mut config = SandboxConfig::default();
    config.transcript.enabled = true;
    let mut host = start_with(config, ScriptRuntime::new()).await;
    run_to_end(&mut host, "print x").await;

    let mut out = Vec::new();
    host.transcript().unwrap().write_to(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    for tag in ["\"INIT\"", "\"READY\"", "\"RUN\"", "\"OUTPUT\"", "\"FINISHED\""] {
        assert!(text.contains(tag), "missing {} in {}", tag, text);
    }
    let finished: serde_json::Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
    assert_eq!(finished["frame"]["direction"], "executor");
    assert_eq!(finished["frame"]["message"]["outcome"], "completed");
}
