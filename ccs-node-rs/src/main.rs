//! Consensus cluster service node.
//!
//! One replica of the leader-election cluster: discovers its peers by
//! DNS, serves the raft wire protocol over HTTP, and launches the
//! configured payload program on role transitions.

mod api;
mod payload;

use clap::Parser;
use ccs_core::{discovery, Config, HttpPeerClient, Node};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Consensus cluster service node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP port, overriding the PORT environment variable
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = Config::from_env()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    info!(
        "node \"{}\" starting for service \"{}\"",
        config.hostname, config.app_name
    );

    let peers = discovery::discover_peers(&config).await?;
    info!(
        "discovered {} peers, cluster size {}",
        peers.len(),
        peers.len() + 1
    );

    let transport = HttpPeerClient::new(config.rpc_timeout(), config.port)?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let node = Node::new(&config, peers, Arc::new(transport), events_tx);

    tokio::spawn(payload::run(
        events_rx,
        config.script_leader_path.clone(),
        config.script_follower_path.clone(),
    ));

    node.start();

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, api::router(node)).await?;

    Ok(())
}
