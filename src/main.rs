// ABOUTME: CLI entry point for jotter-sync
// ABOUTME: Runs one-shot passes, the periodic daemon, or a connectivity check

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jotter_sync::{Outcome, SqliteStore, SyncSession, DEFAULT_SYNC_INTERVAL};

#[derive(Parser)]
#[command(name = "jotter-sync")]
#[command(about = "Bidirectional sync between the local Jotter database and a remote PostgreSQL", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the local Jotter database (defaults to the platform data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Remote PostgreSQL connection string; when absent, sync is disabled
    #[arg(long, env = "JOTTER_SYNC_DATABASE_URL", global = true)]
    remote: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single sync pass and print the summary as JSON
    Sync,
    /// Run sync passes on a recurring timer until interrupted
    Daemon {
        /// Seconds between passes
        #[arg(long, default_value_t = DEFAULT_SYNC_INTERVAL.as_secs())]
        interval: u64,
    },
    /// Connect to the remote store (bootstrapping its schema) and report status
    Status,
}

fn default_db_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not determine the platform data directory")?;
    Ok(data_dir.join("jotter").join("jotter.db"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {:?}", parent))?;
    }

    let local = Arc::new(SqliteStore::open(&db_path)?);
    let session = Arc::new(SyncSession::new(local, cli.remote));

    match cli.command {
        Commands::Sync => {
            let summary = session.sync_now().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.outcome == Outcome::Failed {
                std::process::exit(1);
            }
        }
        Commands::Daemon { interval } => {
            session.start_scheduler(Duration::from_secs(interval));
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for shutdown signal")?;
            tracing::info!("Shutdown signal received, stopping sync daemon");
            session.shutdown().await;
        }
        Commands::Status => {
            if !matches!(
                session.state(),
                jotter_sync::ConnectionState::Unconfigured
            ) {
                if let Err(e) = session.connect().await {
                    eprintln!("Remote connection failed: {:#}", e);
                }
            }
            println!(
                "{}",
                serde_json::json!({
                    "database": db_path,
                    "state": format!("{:?}", session.state()),
                    "connected": session.is_connected(),
                })
            );
        }
    }

    Ok(())
}
