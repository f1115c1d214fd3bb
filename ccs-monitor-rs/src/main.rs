//! Cluster status dashboard.
//!
//! Polls every replica's `GET /api/v1/raft/` once a second and serves
//! the aggregate at `/nodes`, plus a minimal page that renders it.

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::{Json, Router};
use ccs_core::discovery;
use clap::Parser;
use hickory_resolver::TokioAsyncResolver;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

const DASHBOARD: &str = r#"<!doctype html>
<html>
<head><title>Consensus Cluster Monitor</title></head>
<body>
<h1>Consensus Cluster Monitor</h1>
<table id="nodes" border="1"><tr><th>id</th><th>state</th><th>term</th></tr></table>
<script>
setInterval(async () => {
  const res = await fetch('/nodes');
  const body = await res.json();
  const rows = body.nodes.map(n =>
    `<tr><td>${n.id}</td><td>${n.state}</td><td>${n.term}</td></tr>`);
  document.getElementById('nodes').innerHTML =
    '<tr><th>id</th><th>state</th><th>term</th></tr>' + rows.join('');
}, 1000);
</script>
</body>
</html>
"#;

type NodeTable = Arc<RwLock<BTreeMap<String, Value>>>;

/// Consensus cluster status monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTTP port to serve the dashboard on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Port the replicas serve their API on
    #[arg(long, default_value = "80")]
    replica_port: u16,

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

    let app_name = std::env::var("MAIN_APP_NAME")?;
    info!("monitoring service \"{}\"", app_name);

    let nodes: NodeTable = Arc::new(RwLock::new(BTreeMap::new()));
    tokio::spawn(poll_cluster(
        app_name,
        args.replica_port,
        nodes.clone(),
    ));

    let app = Router::new()
        .route("/", get(|| async { Html(DASHBOARD) }))
        .route("/nodes", get(nodes_handler))
        .with_state(nodes);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn nodes_handler(State(nodes): State<NodeTable>) -> Json<Value> {
    let nodes = nodes.read().await;
    Json(json!({ "nodes": nodes.values().cloned().collect::<Vec<_>>() }))
}

/// Re-discover the cluster and refresh every replica's status each round.
async fn poll_cluster(app_name: String, replica_port: u16, nodes: NodeTable) {
    let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
        Ok(resolver) => resolver,
        Err(error) => {
            warn!("resolver setup failed: {}", error);
            return;
        }
    };
    let http = match reqwest::Client::builder().timeout(POLL_INTERVAL).build() {
        Ok(http) => http,
        Err(error) => {
            warn!("http client setup failed: {}", error);
            return;
        }
    };

    let mut ticker = interval(POLL_INTERVAL);
    loop {
        ticker.tick().await;

        let addresses = match discovery::lookup_cluster(&resolver, &app_name).await {
            Ok(addresses) => addresses,
            Err(error) => {
                warn!("dns discovery failed: {}", error);
                continue;
            }
        };

        for address in addresses {
            let replica = match discovery::hostname_for(&resolver, address).await {
                Ok(replica) => replica,
                Err(error) => {
                    warn!("reverse lookup of {} failed: {}", address, error);
                    continue;
                }
            };
            let url = format!("http://{}:{}/api/v1/raft/", replica, replica_port);
            match fetch_status(&http, &url).await {
                Ok(status) => {
                    nodes.write().await.insert(replica, status);
                }
                Err(error) => {
                    warn!("could not request status of {}: {}", replica, error);
                }
            }
        }
    }
}

async fn fetch_status(http: &reqwest::Client, url: &str) -> Result<Value, reqwest::Error> {
    let body: Value = http.get(url).send().await?.json().await?;
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}
