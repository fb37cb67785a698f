use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ferry_config::BlobConfig;
use ferry_gateway::router;
use ferry_registry::BlobRegistry;

/// Ferry - hand off local artifacts to remote consumers over HTTP
#[derive(Parser)]
#[command(name = "ferry")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to a JSON configuration file (defaults apply when omitted)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Serve registered blobs over HTTP
  Serve {
    /// Address to bind the gateway on
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Files to register at startup; their retrieval URLs are printed
    #[arg(long = "share")]
    share: Vec<PathBuf>,

    /// Expected number of retrievals per shared file
    #[arg(long, default_value_t = 1)]
    count: u64,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let cli = Cli::parse();
  let config = load_config(cli.config.as_deref())?;

  match cli.command {
    Some(Commands::Serve { bind, share, count }) => serve(config, bind, share, count)?,
    None => {
      println!("ferry - use --help to see available commands");
    }
  }

  Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<BlobConfig> {
  match path {
    Some(path) => {
      let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
      serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
    }
    None => Ok(BlobConfig::default()),
  }
}

fn serve(config: BlobConfig, bind: SocketAddr, share: Vec<PathBuf>, count: u64) -> Result<()> {
  let rt = tokio::runtime::Runtime::new()?;
  rt.block_on(serve_async(config, bind, share, count))
}

async fn serve_async(
  config: BlobConfig,
  bind: SocketAddr,
  share: Vec<PathBuf>,
  count: u64,
) -> Result<()> {
  let ttl = config.ttl();
  let base_url = config.base_url.clone();
  let registry = Arc::new(BlobRegistry::new(config));

  for path in share {
    anyhow::ensure!(path.is_file(), "not a file: {}", path.display());
    let id = registry.register(&path, ttl, count);
    let url = base_url
      .join(&format!("/blob/{id}"))
      .context("failed to build blob url")?;
    println!("{}  {}", url, path.display());
  }

  let listener = tokio::net::TcpListener::bind(bind)
    .await
    .with_context(|| format!("failed to bind {bind}"))?;
  tracing::info!(addr = %bind, "ferry gateway listening");

  axum::serve(listener, router(registry))
    .with_graceful_shutdown(async {
      if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to listen for shutdown signal");
      }
      tracing::info!("shutting down");
    })
    .await
    .context("gateway server failed")?;

  Ok(())
}
