//! cradle CLI - manual client for the daemon socket

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cradle_core::client::Client;
use cradle_core::config::{default_root, socket_path};
use cradle_core::NsType;

#[derive(Parser)]
#[command(name = "cradle")]
#[command(author, version, about = "Client for the cradle warm-pool daemon")]
struct Cli {
    /// Socket path (defaults to <CRADLE_ROOT>/daemon.socket)
    #[arg(short, long)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lease a pre-warmed namespace (uts, ipc or mnt)
    GetNs {
        kind: String,

        /// Opaque argument forwarded to the manager
        #[arg(long)]
        arg: Option<String>,
    },

    /// Return a namespace slot to its pool
    PutNs { kind: String, id: usize },

    /// Materialise the checkpoint tree for a ref
    GetCheckpoint { reference: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let socket = cli
        .socket
        .unwrap_or_else(|| socket_path(&default_root()));
    let mut client = Client::connect(&socket).await?;

    match cli.command {
        Commands::GetNs { kind, arg } => {
            let t: NsType = kind.parse()?;
            let rsp = client.get_namespace(t, arg).await?;
            if rsp.fd < 0 {
                anyhow::bail!("get {t} failed: {}", rsp.info);
            }
            println!("ns_id: {}", rsp.ns_id);
            println!("path:  /proc/{}/fd/{}", rsp.pid, rsp.fd);
            if !rsp.info.is_empty() {
                println!("info:  {}", rsp.info);
            }
        }

        Commands::PutNs { kind, id } => {
            let t: NsType = kind.parse()?;
            let rsp = client.put_namespace(t, id).await?;
            if !rsp.error.is_empty() {
                anyhow::bail!("put {t} {id} failed: {}", rsp.error);
            }
            println!("returned {t} slot {id}");
        }

        Commands::GetCheckpoint { reference } => {
            let rsp = client.get_checkpoint(&reference).await?;
            if rsp.path.is_empty() {
                anyhow::bail!("no checkpoint for '{reference}'");
            }
            println!("{}", rsp.path);
        }
    }

    Ok(())
}
