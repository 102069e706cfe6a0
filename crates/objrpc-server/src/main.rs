//! objrpc server - serves the demo object graph over HTTP.

use anyhow::Result;
use clap::Parser;
use objrpc::{ProtocolConfig, ServerConfig};
use objrpc_server::{demo::demo_root, start_server};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "objrpc-server")]
#[command(about = "Object RPC server over HTTP", version)]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = ServerConfig::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting {} server", ProtocolConfig::AGENT);

    let addr = start_server(demo_root(), &args.host, args.port).await?;

    // Machine-readable port for launchers (intentional stdout)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
