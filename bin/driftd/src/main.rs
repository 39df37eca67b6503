//! Drift daemon.
//!
//! Runs one symmetric peer: serves chunks, replicates the action ledger,
//! and exposes one-shot upload/fetch/info commands that spin up an
//! ephemeral node.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use drift_core::FileHash;
use drift_node::{Node, NodeConfig};

/// Drift content distribution daemon.
#[derive(Parser)]
#[command(name = "driftd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, default_value = "drift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node until interrupted
    Run {
        /// Listen port override
        #[arg(short, long)]
        port: Option<u16>,

        /// Bootstrap peer (host:port) override
        #[arg(short, long)]
        bootstrap: Option<String>,

        /// Data directory override
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Upload a file into the local cache and print its fingerprint
    Put {
        /// File to upload
        file: PathBuf,

        /// Data directory override
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Fetch a file from the swarm
    Fetch {
        /// File fingerprint (SHA-256 hex)
        hash: String,

        /// Output path
        output: PathBuf,

        /// Bootstrap peer (host:port)
        #[arg(short, long)]
        bootstrap: Option<String>,

        /// Data directory override
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },

    /// Show what the swarm knows about a file
    Info {
        /// File fingerprint (SHA-256 hex)
        hash: String,

        /// Bootstrap peer (host:port)
        #[arg(short, long)]
        bootstrap: Option<String>,

        /// Data directory override
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = NodeConfig::load(&cli.config).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            port,
            bootstrap,
            data_dir,
        } => {
            if let Some(port) = port {
                config.listen_port = port;
            }
            if let Some(bootstrap) = bootstrap {
                config.bootstrap = Some(bootstrap);
            }
            if let Some(data_dir) = data_dir {
                config.data_dir = data_dir;
            }
            run(config).await
        }
        Commands::Put { file, data_dir } => {
            let node = ephemeral_node(config, None, data_dir).await?;
            let result = node.upload(&file).context("Upload failed");
            node.stop().await;
            let hash = result?;
            println!("{hash}");
            Ok(())
        }
        Commands::Fetch {
            hash,
            output,
            bootstrap,
            data_dir,
        } => {
            let node = ephemeral_node(config, bootstrap, data_dir).await?;
            let fetched = node
                .fetch(&FileHash::from_hex(hash), &output)
                .await
                .context("Fetch failed");
            node.stop().await;
            if fetched? {
                println!("fetched to {}", output.display());
                Ok(())
            } else {
                anyhow::bail!("file not available in the swarm");
            }
        }
        Commands::Info {
            hash,
            bootstrap,
            data_dir,
        } => {
            let node = ephemeral_node(config, bootstrap, data_dir).await?;
            let info = node.file_info(&FileHash::from_hex(hash)).await;
            node.stop().await;
            match info {
                Some(info) => {
                    println!("fileHash:      {}", info.file_hash);
                    println!("totalChunks:   {}", info.total_chunks);
                    println!("estimatedSize: {} bytes", info.estimated_size);
                    println!("chunksLocally: {}", info.chunks_locally);
                    Ok(())
                }
                None => anyhow::bail!("file unknown locally and to all peers"),
            }
        }
    }
}

/// Runs the node until SIGINT.
async fn run(config: NodeConfig) -> Result<()> {
    let node = Node::start(config).await.context("Failed to start node")?;
    info!(peer_id = %node.peer_id(), "Node running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    node.stop().await;
    Ok(())
}

/// Starts a node on an ephemeral port for one-shot commands.
async fn ephemeral_node(
    mut config: NodeConfig,
    bootstrap: Option<String>,
    data_dir: Option<PathBuf>,
) -> Result<std::sync::Arc<Node>> {
    config.listen_port = 0;
    if bootstrap.is_some() {
        config.bootstrap = bootstrap;
    }
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Node::start(config).await.context("Failed to start node")
}
