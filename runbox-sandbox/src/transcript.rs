//! Bounded in-memory record of a session's protocol traffic

use runbox_common::{encode_line, Frame, TranscriptEntry};
use std::collections::VecDeque;
use std::io::Write;
use std::time::Instant;

#[derive(Debug)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    max_entries: usize,
    started: Instant,
    next_seq: u64,
}

impl Transcript {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            started: Instant::now(),
            next_seq: 0,
        }
    }

    /// Add a frame, dropping the oldest entry past the limit
    pub fn record(&mut self, frame: Frame) {
        if self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(TranscriptEntry {
            seq: self.next_seq,
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            frame,
        });
        self.next_seq += 1;
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every entry as one JSON line.
    pub fn write_to(&self, mut out: impl Write) -> std::io::Result<()> {
        for entry in &self.entries {
            let line = encode_line(entry)?;
            out.write_all(line.as_bytes())?;
        }
        out.flush()
    }
}
