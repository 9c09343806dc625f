use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use conduit_blocks::InMemoryBlockLoader;
use conduit_engine::{Engine, EngineConfig, EngineOperationType, HttpProgressSink};
use conduit_host_kv::{FsStore, HttpStore};
use conduit_resolver::HttpConnectionService;

/// Conduit - run flow engine operations from the command line
#[derive(Parser)]
#[command(name = "conduit")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.conduit)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Base URL of the host API. When absent the store lives in the data
  /// directory and connections and progress stay in process.
  #[arg(long, global = true, env = "CONDUIT_API_URL")]
  api_url: Option<String>,

  /// Bearer token for the host API
  #[arg(long, global = true, env = "CONDUIT_API_TOKEN", default_value = "")]
  api_token: String,

  /// Wall-clock budget of a flow run, in seconds
  #[arg(long, global = true, default_value_t = 600)]
  timeout_secs: u64,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Run an engine operation
  Run {
    /// Operation type, e.g. EXECUTE_FLOW
    operation_type: String,

    /// Path to the operation payload (JSON). Read from stdin when absent.
    operation_file: Option<PathBuf>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(io::stderr)
    .init();

  let data_dir = match cli.data_dir.clone() {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".conduit"),
  };

  match &cli.command {
    Some(Commands::Run {
      operation_type,
      operation_file,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run_operation(&cli, operation_type, operation_file.as_ref(), data_dir))
    }
    None => {
      println!("conduit - use --help to see available commands");
      Ok(())
    }
  }
}

async fn run_operation(
  cli: &Cli,
  operation_type: &str,
  operation_file: Option<&PathBuf>,
  data_dir: PathBuf,
) -> Result<()> {
  let operation_type: EngineOperationType = operation_type.parse()?;
  let operation = match operation_file {
    Some(path) => {
      let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read operation file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse operation file: {}", path.display()))?
    }
    None => read_operation_from_stdin()?,
  };

  let mut config = EngineConfig::new(data_dir.join("codes"));
  config.run_timeout = std::time::Duration::from_secs(cli.timeout_secs);

  let mut builder = Engine::builder(config)
    .with_blocks(Arc::new(InMemoryBlockLoader::with_builtins().await));
  if let Some(api_url) = &cli.api_url {
    info!(api_url = %api_url, "using_host_api");
    builder = builder
      .with_store(Arc::new(HttpStore::new(api_url, &cli.api_token)))
      .with_connections(Arc::new(HttpConnectionService::new(api_url, &cli.api_token)))
      .with_progress_sink(Arc::new(HttpProgressSink::new(api_url, &cli.api_token)));
  } else {
    builder = builder.with_store(Arc::new(FsStore::new(data_dir.join("store.json"))));
  }
  let engine = builder.build();

  let cancel = CancellationToken::new();
  let run = engine.execute_with_cancel(operation_type, operation, cancel.clone());
  tokio::pin!(run);

  let response = tokio::select! {
    response = &mut run => response,
    _ = tokio::signal::ctrl_c() => {
      warn!("cancellation requested");
      cancel.cancel();
      run.await
    }
  };

  println!("{}", serde_json::to_string_pretty(&response)?);
  Ok(())
}

fn read_operation_from_stdin() -> Result<serde_json::Value> {
  use std::io::IsTerminal;

  if io::stdin().is_terminal() {
    return Ok(serde_json::json!({}));
  }

  let mut input = String::new();
  io::stdin()
    .read_to_string(&mut input)
    .context("failed to read operation from stdin")?;

  if input.trim().is_empty() {
    Ok(serde_json::json!({}))
  } else {
    serde_json::from_str(&input).context("failed to parse operation JSON from stdin")
  }
}
