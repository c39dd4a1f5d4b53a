//! CLI command implementations

use crate::events::{Event, EventHandler};
use crate::terminal::Terminal;
use anyhow::{anyhow, Context, Result};
use runbox_sandbox::{
    ExecutionHost, ExecutorMessage, KeyInput, Language, LimitsProfile, ProcessRuntime,
    RunOutcome, SandboxConfig, SandboxError,
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long to wait before retrying keystrokes the full ring refused.
const BACKPRESSURE_RETRY: Duration = Duration::from_millis(10);

/// Options shared by commands that start a session.
#[derive(Debug, Default)]
pub struct SessionOptions {
    pub config: Option<PathBuf>,
    pub language: Option<String>,
    pub limits: Option<String>,
    pub timeout_secs: Option<u64>,
    pub transcript: Option<PathBuf>,
}

/// Resolve configuration: file (explicit or default), then `RUNBOX_*`
/// environment, then command-line flags.
pub fn load_config(options: &SessionOptions) -> Result<SandboxConfig> {
    let mut config = match &options.config {
        Some(path) => {
            let mut config = SandboxConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env();
            config
        }
        None => SandboxConfig::load().context("Failed to load config")?,
    };

    if let Some(language) = &options.language {
        config.runtime.language = language
            .parse::<Language>()
            .map_err(|e| anyhow!(e))?;
        // A language flag means that language's interpreter.
        config.runtime.program = None;
        config.runtime.args = None;
    }
    if let Some(profile) = &options.limits {
        config.limits = profile
            .parse::<LimitsProfile>()
            .map_err(|e| anyhow!(e))?
            .limits();
    }
    if let Some(secs) = options.timeout_secs {
        config.limits.max_duration = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if options.transcript.is_some() {
        config.transcript.enabled = true;
    }

    config.validate()?;
    Ok(config)
}

/// Run a source file interactively. Returns the process exit code.
pub async fn execute_run(file: &Path, options: SessionOptions) -> Result<i32> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let config = load_config(&options)?;
    let runtime = ProcessRuntime::from_config(&config.runtime);

    info!(
        file = %file.display(),
        language = %config.runtime.language,
        "starting session"
    );
    let mut host = ExecutionHost::initialize(&config, runtime)
        .await
        .context("Failed to start the interpreter")?;

    let interactive = EventHandler::is_interactive();
    let mut terminal = Terminal::new(interactive)?;
    let outcome = drive(&mut host, &mut terminal, &source).await;
    drop(terminal);

    if let (Some(path), Some(transcript)) = (&options.transcript, host.transcript()) {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        transcript
            .write_to(std::io::BufWriter::new(file))
            .context("Failed to write transcript")?;
        info!(entries = transcript.len(), path = %path.display(), "transcript written");
    }
    host.shutdown().await;

    let outcome = outcome?;
    if !outcome.is_success() {
        eprintln!("✗ Run {}", outcome);
    }
    Ok(exit_code(outcome))
}

async fn drive(host: &mut ExecutionHost, terminal: &mut Terminal, source: &str) -> Result<RunOutcome> {
    let mut events = EventHandler::spawn();
    let mut pending: VecDeque<KeyInput> = VecDeque::new();

    host.run(source)?;

    loop {
        // Keys the ring refused go first, in order.
        while let Some(key) = pending.front().copied() {
            match host.on_key(key) {
                Ok(effect) => {
                    terminal.echo(effect)?;
                    pending.pop_front();
                }
                Err(SandboxError::Backpressure) => break,
                Err(e) => return Err(e.into()),
            }
        }

        tokio::select! {
            message = host.next_event() => match message {
                Some(ExecutorMessage::Output { stream, text, .. }) => terminal.output(stream, &text)?,
                Some(ExecutorMessage::InputRequest { .. }) => debug!("program waiting for input"),
                Some(ExecutorMessage::Finished { outcome, .. }) => return Ok(outcome),
                Some(ExecutorMessage::Rejected { reason }) => {
                    return Err(anyhow!("run rejected: {}", reason))
                }
                Some(other) => warn!(message = other.kind(), "unexpected message during run"),
                None => return Err(anyhow!("execution context exited unexpectedly")),
            },
            event = events.next() => match event {
                Event::Key(key) => pending.push_back(key),
                Event::Closed => debug!("input closed"),
            },
            _ = tokio::time::sleep(BACKPRESSURE_RETRY), if !pending.is_empty() => {}
        }
    }
}

fn exit_code(outcome: RunOutcome) -> i32 {
    match outcome {
        RunOutcome::Completed => 0,
        RunOutcome::Errored => 1,
        RunOutcome::TimedOut => 124,
        RunOutcome::Interrupted => 130,
    }
}

/// Cold-start the interpreter once and report whether it came up.
pub async fn execute_probe(options: SessionOptions) -> Result<()> {
    let config = load_config(&options)?;
    let runtime = ProcessRuntime::from_config(&config.runtime);
    let program = runtime.program().to_string();

    let started = std::time::Instant::now();
    let host = ExecutionHost::initialize(&config, runtime)
        .await
        .with_context(|| format!("Interpreter `{}` is not usable", program))?;

    println!(
        "✓ {} ready in {:.0?} (session {})",
        host.runtime_name(),
        started.elapsed(),
        host.session_id()
    );
    host.shutdown().await;
    Ok(())
}

/// Print the effective configuration, optionally writing the default file.
pub fn execute_config(options: SessionOptions, init: bool) -> Result<()> {
    let path = match &options.config {
        Some(path) => path.clone(),
        None => SandboxConfig::config_path()?,
    };

    if init {
        if path.exists() {
            println!("Config already exists at {}", path.display());
        } else {
            SandboxConfig::default().save_to(&path)?;
            println!("✓ Wrote default config to {}", path.display());
        }
    }

    let config = load_config(&options)?;
    println!("# {}", path.display());
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to serialize config")?
    );
    Ok(())
}
