mod commands;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use wsync::config::Config;
use wsync::context::AppContext;
use wsync::db::{Database, STORE_FILE};

#[derive(Parser, Debug)]
#[command(name = "wsync")]
#[command(about = "Offline-first client for Moodle-style web services")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/wsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _log_guard = init_logging(&data_dir)?;

  let db = Database::open(&data_dir.join(STORE_FILE))
    .map_err(|e| eyre!("Failed to open store in {}: {}", data_dir.display(), e))?;

  let (tx, mut rx) = mpsc::unbounded_channel();
  let context = AppContext::builder(std::sync::Arc::new(db))
    .events(tx)
    .build()?;
  config.apply_to(&context.settings)?;

  let result = commands::run(&context, args.command).await;

  // Surface whatever the client wanted the user to see
  while let Ok(event) = rx.try_recv() {
    commands::print_event(&event);
  }

  result
}

/// Log to a daily file in the data directory; stdout carries command output.
fn init_logging(data_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(data_dir)
    .map_err(|e| eyre!("Failed to create data directory {}: {}", data_dir.display(), e))?;

  let appender = tracing_appender::rolling::daily(data_dir, "wsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("WSYNC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
