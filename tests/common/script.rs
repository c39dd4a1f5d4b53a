//! A tiny in-process interpreter for driving sessions from tests.
//!
//! One statement per line:
//!
//! | statement | effect |
//! |---|---|
//! | `print <text>` | stdout `<text>\n` |
//! | `write <text>` | stdout `<text>`, no newline |
//! | `eprint <text>` | stderr `<text>\n` |
//! | `input` | read one line into the input variable |
//! | `echo` | print the input variable |
//! | `readchar` | read one char, print `got <c>` |
//! | `loop_input` | read lines forever |
//! | `spin` | busy loop until interrupted |
//! | `sleep <ms>` | sleep |
//! | `count` | bump and print a counter kept across runs |
//! | `raise <msg>` | fail with `<msg>` |
//! | `panic <msg>` | panic with `<msg>` |

use runbox_sandbox::{ProgramError, ProgramIo, Runtime, SandboxError, SandboxResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct ScriptRuntime {
    loads: Arc<AtomicUsize>,
    fail_load: Option<String>,
    counter: u64,
}

impl ScriptRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose cold start fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            fail_load: Some(message.into()),
            ..Self::default()
        }
    }

    /// Shared count of `load` calls, readable after the runtime is moved.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl Runtime for ScriptRuntime {
    fn name(&self) -> &str {
        "script"
    }

    fn load(&mut self) -> SandboxResult<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match &self.fail_load {
            Some(message) => Err(SandboxError::Initialization(message.clone())),
            None => Ok(()),
        }
    }

    fn execute(&mut self, source: &str, io: &mut ProgramIo<'_>) -> Result<(), ProgramError> {
        let mut input = String::new();

        for line in source.lines() {
            let (op, arg) = line.split_once(' ').unwrap_or((line, ""));
            match op {
                "" => {}
                "print" => io.print(&format!("{}\n", arg)),
                "write" => io.print(arg),
                "eprint" => io.eprint(&format!("{}\n", arg)),
                "input" => input = io.read_line()?.trim_end_matches('\n').to_string(),
                "echo" => io.print(&format!("{}\n", input)),
                "readchar" => {
                    let c = io.read_char()?;
                    io.print(&format!("got {}\n", c));
                }
                "loop_input" => loop {
                    io.read_line()?;
                },
                "spin" => {
                    while !io.is_interrupted() {
                        std::hint::spin_loop();
                    }
                    return Err(ProgramError::Interrupted);
                }
                "sleep" => {
                    let ms = arg.parse().map_err(|_| ProgramError::failed("bad sleep"))?;
                    std::thread::sleep(Duration::from_millis(ms));
                }
                "count" => {
                    self.counter += 1;
                    io.print(&format!("{}\n", self.counter));
                }
                "raise" => return Err(ProgramError::failed(arg)),
                "panic" => panic!("{}", arg),
                other => {
                    return Err(ProgramError::failed(format!(
                        "SyntaxError: unknown statement `{}`",
                        other
                    )))
                }
            }
        }
        Ok(())
    }
}
