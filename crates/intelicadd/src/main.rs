//! InteliCAD Daemon - LLM planning backend for the CAD executor
//!
//! Accepts free-text modification requests, plans CAD operations with an
//! LLM and hands them to the executor through a polling API.

use anyhow::Result;
use clap::Parser;
use intelicadd::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intelicadd")]
#[command(about = "InteliCAD job daemon", version)]
struct Args {
    /// Config file (overrides INTELICAD_CONFIG and the system paths)
    #[arg(long)]
    config: Option<String>,

    /// Listen address, e.g. 127.0.0.1:8000
    #[arg(long)]
    bind: Option<String>,

    /// Artifact storage directory
    #[arg(long)]
    storage_dir: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("InteliCAD daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };
    config.llm = config.llm.with_env_api_key();
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(dir) = args.storage_dir {
        config.storage.dir = dir;
    }

    intelicadd::server::run(config).await
}
