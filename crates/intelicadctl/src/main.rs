//! InteliCAD Control - executor and operator CLI
//!
//! `run` starts the poll loop against the daemon; the other commands
//! submit and inspect jobs.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use intelicadctl::commands;
use intelicadctl::config::ExecutorConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "intelicadctl")]
#[command(about = "InteliCAD executor and job CLI", version)]
struct Cli {
    /// Executor config file (defaults to $XDG_CONFIG_HOME/intelicad/executor.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the backend and execute jobs on the simulated CAD session
    Run {
        /// Seconds between polls
        #[arg(long)]
        interval: Option<u64>,

        /// Directory for exported documents
        #[arg(long)]
        work_dir: Option<PathBuf>,
    },

    /// Submit a CAD file with a modification request
    Submit {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        command: String,
    },

    /// Show everything the backend knows about a job
    Status { job_id: String },

    /// Download a completed job's output file
    Download {
        job_id: String,

        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show jobs waiting for the executor
    Poll,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExecutorConfig::load_from_path(path)?,
        None => ExecutorConfig::load()?,
    };
    if let Some(backend) = cli.backend {
        config.backend_url = backend;
    }

    match cli.command {
        Commands::Run { interval, work_dir } => {
            if let Some(secs) = interval {
                config.poll_interval_secs = secs;
            }
            if let Some(dir) = work_dir {
                config.work_dir = dir;
            }
            commands::run(config).await
        }
        Commands::Submit { file, command } => commands::submit(&config, &file, &command).await,
        Commands::Status { job_id } => commands::status(&config, &job_id).await,
        Commands::Download { job_id, out } => commands::download(&config, &job_id, out).await,
        Commands::Poll => commands::poll(&config).await,
    }
}
