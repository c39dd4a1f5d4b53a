//! Producer side of stdin: keystrokes in, character codes into the ring.
//!
//! Characters are pushed as they are typed, not when the line is submitted,
//! so a blocked reader sees each key immediately. Backspace therefore only
//! edits the local line buffer; a character the program already consumed
//! stays consumed.

use crate::ring::{Producer, RingFull};
use tracing::debug;

/// One discrete input event from the terminal UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    Char(char),
    Enter,
    Backspace,
    /// Ctrl+C
    Interrupt,
    /// Ctrl+D
    EndOfInput,
}

impl KeyInput {
    /// Decode a single character or control code as delivered by a terminal.
    ///
    /// Returns `None` for empty input, multi-character sequences and control
    /// codes with no meaning here.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        let c = chars.next()?;
        if chars.next().is_some() {
            return None;
        }

        match c {
            '\r' | '\n' => Some(KeyInput::Enter),
            '\u{7f}' | '\u{8}' => Some(KeyInput::Backspace),
            '\u{3}' => Some(KeyInput::Interrupt),
            '\u{4}' => Some(KeyInput::EndOfInput),
            '\t' => Some(KeyInput::Char('\t')),
            c if c.is_control() => None,
            c => Some(KeyInput::Char(c)),
        }
    }
}

/// What the UI should do in response to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEffect {
    /// Show the character.
    Echo(char),
    /// Remove the last shown character.
    Erase,
    /// Move to a new line.
    Newline,
    /// The run is being interrupted.
    Interrupted,
    /// Nothing happened.
    Ignored,
}

/// Line-editing input feeder owning the ring's producer end.
#[derive(Debug)]
pub struct InputFeeder {
    producer: Producer,
    line: String,
}

impl InputFeeder {
    pub fn new(producer: Producer) -> Self {
        Self {
            producer,
            line: String::new(),
        }
    }

    /// Characters typed since the last submitted line.
    pub fn pending_line(&self) -> &str {
        &self.line
    }

    pub fn producer(&self) -> &Producer {
        &self.producer
    }

    pub fn on_key(&mut self, key: KeyInput) -> Result<FeedEffect, RingFull> {
        match key {
            KeyInput::Char(c) => {
                self.producer.write_char(c)?;
                self.line.push(c);
                Ok(FeedEffect::Echo(c))
            }
            KeyInput::Enter | KeyInput::EndOfInput => {
                self.producer.write_char('\n')?;
                self.line.clear();
                Ok(FeedEffect::Newline)
            }
            KeyInput::Backspace => {
                if self.line.pop().is_some() {
                    Ok(FeedEffect::Erase)
                } else {
                    Ok(FeedEffect::Ignored)
                }
            }
            KeyInput::Interrupt => {
                self.line.clear();
                let queued = self.producer.interrupt();
                debug!(sentinel_queued = queued, "stdin interrupt raised");
                Ok(FeedEffect::Interrupted)
            }
        }
    }

    /// Decode and apply a raw keystroke; unknown input is ignored.
    pub fn on_raw(&mut self, raw: &str) -> Result<FeedEffect, RingFull> {
        match KeyInput::from_raw(raw) {
            Some(key) => self.on_key(key),
            None => Ok(FeedEffect::Ignored),
        }
    }

    /// Start of a new run: empty line, empty ring, interrupt cleared.
    pub fn reset(&mut self) {
        self.line.clear();
        self.producer.reset();
    }
}
