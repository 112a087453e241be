mod request;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use varstore_config::AppConfig;
use varstore_core::{CommandExecutor, PersistenceLayer};

/// A variable store with undo/redo, driven from the command line.
///
/// With a command (e.g. `varstore SET x 10`) runs it and exits.
/// Without one, reads commands from stdin, one per line.
#[derive(Parser, Debug)]
#[command(name = "varstore", version, about)]
struct Cli {
    /// Command to run: SET, GET, UNSET, NUMEQUALTO, UNDO, REDO, END, HISTORY, STATUS.
    command: Vec<String>,

    /// Config file (defaults to `varstore.json` next to the executable).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the database. Overrides config and environment,
    /// and stores data on disk even when the config has `persist: false`.
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory; nothing is read from or written to disk.
    #[arg(long = "in-memory", conflicts_with = "data_dir")]
    in_memory: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let (config, config_problem) = AppConfig::load_or_create(&config_path);

    // Initialize logging; stdout is reserved for replies
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    if let Some(problem) = config_problem {
        tracing::warn!("{problem}; using default settings");
    }

    let exec = open_executor(&cli, &config)?;

    if cli.command.is_empty() {
        run_repl(&exec)
    } else {
        let line = cli.command.join(" ");
        if let Some(reply) = request::handle_line(&exec, &line)? {
            println!("{reply}");
        }
        Ok(())
    }
}

/// Directory the store lives in, or `None` to keep it in memory.
///
/// Flags win over the config file.
fn storage_dir(cli: &Cli, config: &AppConfig) -> Option<PathBuf> {
    if cli.in_memory {
        return None;
    }
    if let Some(dir) = &cli.data_dir {
        return Some(dir.clone());
    }
    config.persist.then(|| config.resolve_data_dir())
}

fn open_executor(cli: &Cli, config: &AppConfig) -> Result<CommandExecutor> {
    let Some(data_dir) = storage_dir(cli, config) else {
        tracing::info!("Starting varstore in memory");
        return Ok(CommandExecutor::in_memory());
    };
    tracing::info!("Starting varstore with data in {}", data_dir.display());

    let pl = PersistenceLayer::open(&data_dir)?;
    CommandExecutor::load_or_new(Some(pl)).context("Failed to load variable store")
}

/// Answers stdin requests until EOF. A failed request is reported and the
/// loop keeps going.
fn run_repl(exec: &CommandExecutor) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read from stdin")?;
        match request::handle_line(exec, &line) {
            Ok(Some(reply)) => writeln!(stdout, "{reply}")?,
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Request {line:?} failed: {e:#}");
                writeln!(stdout, "ERROR")?;
            }
        }
        stdout.flush()?;
    }
    Ok(())
}
