//! JSON-lines encoding of protocol traffic, used for session transcripts.

use crate::{ExecutorMessage, HostMessage};
use serde::{Deserialize, Serialize};

/// One message in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "direction", content = "message", rename_all = "snake_case")]
pub enum Frame {
    Host(HostMessage),
    Executor(ExecutorMessage),
}

/// A transcript line: the frame plus its position in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub seq: u64,
    pub elapsed_ms: u64,
    pub frame: Frame,
}

/// Encode a value as a single JSON line (newline included).
pub fn encode_line<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line. Surrounding whitespace is ignored.
pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> serde_json::Result<T> {
    serde_json::from_str(line.trim())
}
