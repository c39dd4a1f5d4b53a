use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};
use crossterm::{queue, terminal};
use runbox_sandbox::{FeedEffect, OutputStream};
use std::io::{self, Write};

/// Output side of the CLI.
///
/// Interactive sessions put the terminal in raw mode so every keystroke
/// reaches the feeder unbuffered; echo and line endings are then ours to
/// draw. Raw mode is restored on drop.
pub struct Terminal {
    raw: bool,
}

impl Terminal {
    pub fn new(interactive: bool) -> io::Result<Self> {
        if interactive {
            terminal::enable_raw_mode()?;
        }
        Ok(Self { raw: interactive })
    }

    pub fn output(&mut self, stream: OutputStream, text: &str) -> io::Result<()> {
        if !self.raw {
            return match stream {
                OutputStream::Stdout => {
                    let mut out = io::stdout();
                    out.write_all(text.as_bytes())?;
                    out.flush()
                }
                OutputStream::Stderr | OutputStream::Error => {
                    let mut err = io::stderr();
                    err.write_all(text.as_bytes())?;
                    err.flush()
                }
            };
        }

        let text = text.replace('\n', "\r\n");
        let mut out = io::stdout();
        match stream {
            OutputStream::Stdout => queue!(out, Print(text))?,
            OutputStream::Stderr => {
                queue!(out, SetForegroundColor(Color::Yellow), Print(text), ResetColor)?
            }
            OutputStream::Error => {
                queue!(out, SetForegroundColor(Color::Red), Print(text), ResetColor)?
            }
        }
        out.flush()
    }

    pub fn echo(&mut self, effect: FeedEffect) -> io::Result<()> {
        if !self.raw {
            return Ok(());
        }

        let mut out = io::stdout();
        match effect {
            FeedEffect::Echo(c) => queue!(out, Print(c))?,
            FeedEffect::Erase => queue!(out, Print("\u{8} \u{8}"))?,
            FeedEffect::Newline => queue!(out, Print("\r\n"))?,
            FeedEffect::Interrupted => queue!(out, Print("^C\r\n"))?,
            FeedEffect::Ignored => return Ok(()),
        }
        out.flush()
    }
}

impl Drop for Terminal {
    fn drop(&mut self) {
        if self.raw {
            let _ = terminal::disable_raw_mode();
        }
    }
}
