//! Rally Game Server
//!
//! Binary entry point: parses arguments, wires up logging, and runs
//! the accept loop until interrupted.

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rally::{GameServer, ServerConfig, VERSION};

/// Two-player real-time rally game server.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Address to bind
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .context("invalid bind address")?;

    info!("rally server v{VERSION}");

    let server = GameServer::new(ServerConfig {
        bind_addr,
        ..Default::default()
    });

    tokio::select! {
        result = server.run() => result.context("server terminated")?,
        _ = tokio::signal::ctrl_c() => info!("received ctrl-c, shutting down"),
    }

    Ok(())
}
