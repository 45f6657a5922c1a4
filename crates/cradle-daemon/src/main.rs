//! cradle-daemon entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cradle_daemon::server::Server;

#[derive(Parser)]
#[command(name = "cradle-daemon")]
#[command(author, version, about = "Warm-pool daemon for container restore")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon
    Start {
        /// Daemon root directory (defaults to CRADLE_ROOT or /var/lib/cradle)
        #[arg(long)]
        root: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cradle_daemon=info".parse()?)
                .add_directive("cradle_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { root } => {
            start(root.unwrap_or_else(cradle_core::config::default_root)).await
        }
    }
}

async fn start(root: PathBuf) -> Result<()> {
    info!(root = %root.display(), "cradle-daemon starting");

    let server = Server::new(&root)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut task = tokio::spawn(server.run(shutdown_rx));

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT"),
        _ = sigterm.recv() => info!("received SIGTERM"),
        res = &mut task => {
            // The server only returns on its own when accepting failed.
            res??;
            return Ok(());
        }
    }

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    task.await??;
    info!("shutdown complete");
    Ok(())
}
