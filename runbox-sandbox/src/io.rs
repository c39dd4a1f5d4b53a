//! Standard stream redirection for the interpreted program.
//!
//! stdout and stderr are line-batched: each complete line becomes one OUTPUT
//! message carrying the line and its newline. A partial line is held until
//! it completes, the program blocks on stdin, or the run ends.

use crate::error::ProgramError;
use crate::wait::StdinReader;
use runbox_common::{ExecutorMessage, OutputStream, RunId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Run-scoped sender for OUTPUT and INPUT_REQUEST messages.
#[derive(Clone)]
pub(crate) struct EventSink {
    tx: UnboundedSender<ExecutorMessage>,
    run_id: RunId,
    budget: Arc<OutputBudget>,
}

struct OutputBudget {
    remaining: Option<AtomicUsize>,
    exhausted: AtomicBool,
}

impl EventSink {
    pub(crate) fn new(
        tx: UnboundedSender<ExecutorMessage>,
        run_id: RunId,
        max_output_bytes: Option<usize>,
    ) -> Self {
        Self {
            tx,
            run_id,
            budget: Arc::new(OutputBudget {
                remaining: max_output_bytes.map(AtomicUsize::new),
                exhausted: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn input_request(&self) {
        let _ = self.tx.send(ExecutorMessage::InputRequest {
            run_id: self.run_id,
        });
    }

    fn output(&self, stream: OutputStream, text: String) {
        let _ = self.tx.send(ExecutorMessage::Output {
            run_id: self.run_id,
            stream,
            text,
        });
    }

    /// Send program output, trimmed to what is left of the run's budget.
    fn program_output(&self, stream: OutputStream, text: &str) {
        if text.is_empty() {
            return;
        }

        let Some(remaining) = self.budget.remaining.as_ref() else {
            self.output(stream, text.to_string());
            return;
        };

        let left = remaining.load(Ordering::SeqCst);
        let allowed = floor_char_boundary(text, left);
        remaining.fetch_sub(allowed, Ordering::SeqCst);
        if allowed > 0 {
            self.output(stream, text[..allowed].to_string());
        }
        if allowed < text.len() && !self.budget.exhausted.swap(true, Ordering::SeqCst) {
            warn!(run_id = %self.run_id, "output limit reached, dropping further output");
            self.output(
                OutputStream::Error,
                "\n[output limit reached, further output dropped]\n".to_string(),
            );
        }
    }
}

fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    (0..=max).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}

/// Line-batching writer for one output stream.
pub struct OutputWriter {
    sink: EventSink,
    stream: OutputStream,
    line: String,
    undecoded: Vec<u8>,
}

impl OutputWriter {
    pub(crate) fn new(sink: EventSink, stream: OutputStream) -> Self {
        Self {
            sink,
            stream,
            line: String::new(),
            undecoded: Vec::new(),
        }
    }

    pub fn write(&mut self, text: &str) {
        let mut rest = text;
        while let Some(pos) = rest.find('\n') {
            self.line.push_str(&rest[..=pos]);
            let line = std::mem::take(&mut self.line);
            self.sink.program_output(self.stream, &line);
            rest = &rest[pos + 1..];
        }
        self.line.push_str(rest);
    }

    /// Accept raw bytes from a pipe. A UTF-8 sequence split across reads is
    /// held back until its remaining bytes arrive; invalid bytes become U+FFFD.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.undecoded.extend_from_slice(bytes);
        let pending = std::mem::take(&mut self.undecoded);
        let mut input = pending.as_slice();

        loop {
            match std::str::from_utf8(input) {
                Ok(text) => {
                    self.write(text);
                    break;
                }
                Err(err) => {
                    let (valid, after) = input.split_at(err.valid_up_to());
                    if let Ok(text) = std::str::from_utf8(valid) {
                        self.write(text);
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.write("\u{FFFD}");
                            input = &after[len..];
                        }
                        None => {
                            self.undecoded = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Emit any partial line now.
    pub fn flush(&mut self) {
        if !self.undecoded.is_empty() {
            let bytes = std::mem::take(&mut self.undecoded);
            self.line.push_str(&String::from_utf8_lossy(&bytes));
        }
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            self.sink.program_output(self.stream, &line);
        }
    }
}

/// Standard streams handed to [`Runtime::execute`](crate::Runtime::execute).
pub struct ProgramIo<'a> {
    stdin: StdinReader<'a>,
    stdout: OutputWriter,
    stderr: OutputWriter,
    sink: EventSink,
}

impl<'a> ProgramIo<'a> {
    pub(crate) fn new(stdin: StdinReader<'a>, sink: EventSink) -> Self {
        Self {
            stdin,
            stdout: OutputWriter::new(sink.clone(), OutputStream::Stdout),
            stderr: OutputWriter::new(sink.clone(), OutputStream::Stderr),
            sink,
        }
    }

    pub fn print(&mut self, text: &str) {
        self.stdout.write(text);
    }

    pub fn eprint(&mut self, text: &str) {
        self.stderr.write(text);
    }

    pub fn write(&mut self, stream: OutputStream, text: &str) {
        match stream {
            OutputStream::Stdout => self.stdout.write(text),
            OutputStream::Stderr => self.stderr.write(text),
            OutputStream::Error => self.report_error(text),
        }
    }

    /// Blocking single-character read. Pending output is flushed first so a
    /// prompt without a newline is visible while the program waits.
    pub fn read_char(&mut self) -> Result<char, ProgramError> {
        self.flush();
        Ok(self.stdin.read_char()?)
    }

    /// Blocking line read; the returned line keeps its `'\n'`.
    pub fn read_line(&mut self) -> Result<String, ProgramError> {
        self.flush();
        Ok(self.stdin.read_line()?)
    }

    /// For long-running programs that want to honour Ctrl+C between reads.
    pub fn is_interrupted(&self) -> bool {
        self.stdin.is_interrupted()
    }

    pub fn flush(&mut self) {
        self.stdout.flush();
        self.stderr.flush();
    }

    /// Borrow the three streams separately, e.g. to pump stdin on its own thread.
    pub fn split(&mut self) -> (&mut StdinReader<'a>, &mut OutputWriter, &mut OutputWriter) {
        (&mut self.stdin, &mut self.stdout, &mut self.stderr)
    }

    pub(crate) fn report_error(&mut self, message: &str) {
        self.flush();
        let mut text = message.to_string();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        self.sink.output(OutputStream::Error, text);
    }
}
