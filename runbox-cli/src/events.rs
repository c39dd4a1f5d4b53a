use crossterm::event::{self, Event as CrosstermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use runbox_sandbox::KeyInput;
use std::io::{BufRead, IsTerminal};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Input events understood by the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Key(KeyInput),
    /// stdin is exhausted (piped input only).
    Closed,
}

/// Keystroke source running on its own thread.
///
/// On a terminal it reads crossterm key events (raw mode must be on). With
/// piped stdin it replays the input character by character.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // Plain threads: a reader parked in read_line must not hold up
        // runtime shutdown.
        let spawned = if std::io::stdin().is_terminal() {
            thread::Builder::new()
                .name("runbox-keys".into())
                .spawn(move || read_terminal(tx))
        } else {
            thread::Builder::new()
                .name("runbox-stdin".into())
                .spawn(move || read_piped(tx))
        };
        if let Err(err) = spawned {
            warn!("failed to start input reader: {err}");
        }
        Self { rx }
    }

    pub fn is_interactive() -> bool {
        std::io::stdin().is_terminal()
    }

    /// Next event; pending forever once the source is gone.
    pub async fn next(&mut self) -> Event {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

fn read_terminal(tx: mpsc::UnboundedSender<Event>) {
    while !tx.is_closed() {
        match event::poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(err) => {
                warn!("terminal event poll failed: {err}");
                return;
            }
        }

        let event = match event::read() {
            Ok(event) => event,
            Err(err) => {
                warn!("terminal event reader unavailable: {err}");
                return;
            }
        };

        if let Some(key) = map_event(event) {
            if tx.send(Event::Key(key)).is_err() {
                return;
            }
        }
    }
    debug!("terminal reader stopped");
}

fn read_piped(tx: mpsc::UnboundedSender<Event>) {
    replay_piped(std::io::stdin().lock(), &tx);
    let _ = tx.send(Event::Closed);
}

/// Replay piped text as keystrokes. A last line without a newline is
/// submitted with `EndOfInput`, as Ctrl+D would on a terminal.
fn replay_piped(mut input: impl BufRead, tx: &mpsc::UnboundedSender<Event>) {
    let mut line = String::new();
    let mut partial = false;
    loop {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                partial = !line.ends_with('\n');
                for c in line.chars() {
                    let key = match c {
                        '\n' => KeyInput::Enter,
                        '\r' => continue,
                        c => KeyInput::Char(c),
                    };
                    if tx.send(Event::Key(key)).is_err() {
                        return;
                    }
                }
            }
            Err(err) => {
                warn!("stdin read failed: {err}");
                break;
            }
        }
    }
    if partial {
        let _ = tx.send(Event::Key(KeyInput::EndOfInput));
    }
}

fn map_event(event: CrosstermEvent) -> Option<KeyInput> {
    match event {
        CrosstermEvent::Key(KeyEvent {
            code,
            modifiers,
            kind,
            ..
        }) => {
            if kind != KeyEventKind::Press {
                return None;
            }
            match code {
                KeyCode::Enter => Some(KeyInput::Enter),
                KeyCode::Backspace => Some(KeyInput::Backspace),
                KeyCode::Tab => Some(KeyInput::Char('\t')),
                KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(KeyInput::Interrupt)
                }
                KeyCode::Char('d') if modifiers.contains(KeyModifiers::CONTROL) => {
                    Some(KeyInput::EndOfInput)
                }
                KeyCode::Char(_) if modifiers.contains(KeyModifiers::CONTROL) => None,
                KeyCode::Char(c) => Some(KeyInput::Char(c)),
                _ => None,
            }
        }
        _ => None,
    }
}
