mod commands;
mod events;
mod terminal;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::SessionOptions;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "runbox")]
#[command(about = "Run programs interactively in an isolated interpreter")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a source file with live stdin
    Run {
        /// Source file to execute
        file: PathBuf,

        /// Interpreter language (overrides config)
        #[arg(short, long, value_parser = ["python", "shell", "javascript"])]
        language: Option<String>,

        /// Config file (default: ~/.config/runbox/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Limits preset (overrides config; --timeout still applies on top)
        #[arg(long, value_parser = ["standard", "strict", "permissive", "unlimited"])]
        limits: Option<String>,

        /// Wall-clock limit in seconds, 0 for none
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Write the protocol transcript as JSON lines
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
    /// Cold-start the interpreter and report whether it is usable
    Probe {
        /// Interpreter language (overrides config)
        #[arg(short, long, value_parser = ["python", "shell", "javascript"])]
        language: Option<String>,

        /// Config file (default: ~/.config/runbox/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write the default config file if none exists
        #[arg(long)]
        init: bool,

        /// Config file (default: ~/.config/runbox/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let guard = init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            language,
            config,
            limits,
            timeout,
            transcript,
        } => {
            let options = SessionOptions {
                config,
                language,
                limits,
                timeout_secs: timeout,
                transcript,
            };
            let code = commands::execute_run(&file, options).await?;
            if code != 0 {
                drop(guard);
                std::process::exit(code);
            }
            Ok(())
        }
        Commands::Probe { language, config } => {
            commands::execute_probe(SessionOptions {
                config,
                language,
                ..SessionOptions::default()
            })
            .await
        }
        Commands::Config { init, config } => commands::execute_config(
            SessionOptions {
                config,
                ..SessionOptions::default()
            },
            init,
        ),
    }
}

/// Log to a file only; the terminal belongs to the running program.
fn init_logging(verbose: bool) -> WorkerGuard {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if verbose { "debug" } else { "info" };
    let file_appender = tracing_appender::rolling::never(std::env::temp_dir(), "runbox.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "runbox={},runbox_sandbox={},runbox_common={}",
                    log_level, log_level, log_level
                ))
            }),
        )
        .init();

    guard
}
