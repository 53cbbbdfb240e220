// Copyright (c) 2026 Tally Contributors. MIT License.
// See LICENSE for details.

//! # Tally Relay Node
//!
//! Entry point for the `tally-node` binary. Parses CLI arguments, sets up
//! logging and metrics, accepts and dials TCP peers, and serves the HTTP
//! API until a shutdown signal arrives.
//!
//! - `run`     — start the relay node
//! - `version` — print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod relay;
mod transport;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;

use tally_protocol::config::{network_name, GossipConfig, HANDSHAKE_TIMEOUT, PROTOCOL_VERSION};
use tally_protocol::crypto::H256;
use tally_protocol::network::{ChainStatus, GossipError, GossipService, PeerRegistry};

use cli::{Commands, TallyNodeCli};
use logging::LogFormat;
use metrics::{NodeMetrics, SharedMetrics};
use relay::RelayHandler;
use transport::{TcpTransport, NODE_ID_LEN};

/// How often the peer gauge is refreshed from the registry.
const GAUGE_REFRESH: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = TallyNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Everything a connection task needs.
#[derive(Clone)]
struct Node {
    id: [u8; NODE_ID_LEN],
    version: u32,
    service: Arc<GossipService>,
    metrics: SharedMetrics,
}

/// Starts the relay: P2P listener, bootnode dials, and the HTTP API.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(
        "tally_node=info,tally_protocol=info,tower_http=info",
        LogFormat::from_str_lossy(&args.log_format),
    );

    let genesis = match &args.genesis {
        Some(hex) => H256::from_hex(hex).context("invalid --genesis hash")?,
        None => H256::ZERO,
    };
    let chain = ChainStatus {
        network_id: args.network_id,
        head_hash: genesis,
        head_number: 0,
        genesis_hash: genesis,
    };

    let node_id: [u8; NODE_ID_LEN] = rand::random();
    tracing::info!(
        node_id = %hex::encode(&node_id[..8]),
        network = %network_name(args.network_id),
        genesis = %genesis,
        listen = %args.listen,
        "starting tally-node"
    );

    // --- Gossip stack ---
    let node_metrics = Arc::new(NodeMetrics::new().context("failed to create metrics")?);
    let registry = Arc::new(PeerRegistry::new());
    let handler = Arc::new(RelayHandler::new(
        chain,
        Arc::clone(&registry),
        Arc::clone(&node_metrics),
    ));
    let config = GossipConfig {
        max_peers: args.max_peers,
        ..GossipConfig::default()
    };
    let service = Arc::new(GossipService::new(config, Arc::clone(&registry), handler));
    let node = Node {
        id: node_id,
        version: args.protocol_version,
        service: Arc::clone(&service),
        metrics: Arc::clone(&node_metrics),
    };

    // --- P2P listener ---
    let p2p_listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("failed to bind P2P listener on {}", args.listen))?;
    tracing::info!("P2P listening on {}", args.listen);
    let accept_loop = tokio::spawn(accept_loop(p2p_listener, node.clone()));

    for addr in &args.bootnodes {
        tokio::spawn(dial(*addr, node.clone()));
    }

    // --- Peer gauge ---
    let gauge_registry = Arc::clone(&registry);
    let gauge_metrics = Arc::clone(&node_metrics);
    let gauge_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(GAUGE_REFRESH);
        loop {
            interval.tick().await;
            gauge_metrics
                .connected_peers
                .set(gauge_registry.len() as i64);
        }
    });

    // --- API server ---
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            args.protocol_version
        ),
        node_id: hex::encode(&node_id[..8]),
        chain,
        registry: Arc::clone(&registry),
        metrics: Arc::clone(&node_metrics),
        started_at: chrono::Utc::now(),
    };
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, disconnecting peers");
        }
    }

    accept_loop.abort();
    service.shutdown();
    gauge_loop.abort();
    tracing::info!("tally-node stopped");
    Ok(())
}

/// Accepts inbound connections until aborted.
async fn accept_loop(listener: TcpListener, node: Node) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::debug!(remote = %addr, "inbound connection");
                tokio::spawn(serve(stream, addr, node.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

/// Dials one bootnode. No retries; reconnecting is left to the operator.
async fn dial(addr: SocketAddr, node: Node) {
    match TcpStream::connect(addr).await {
        Ok(stream) => serve(stream, addr, node).await,
        Err(e) => tracing::warn!(remote = %addr, error = %e, "failed to dial bootnode"),
    }
}

/// Runs the hello, then hands the connection to the gossip service.
async fn serve(mut stream: TcpStream, addr: SocketAddr, node: Node) {
    let remote_id = match transport::hello(&mut stream, &node.id, HANDSHAKE_TIMEOUT).await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!(remote = %addr, error = %e, "hello failed");
            node.metrics
                .sessions_total
                .with_label_values(&["hello_failed"])
                .inc();
            return;
        }
    };

    let rw = match TcpTransport::new(stream, node.service.config().max_message_size) {
        Ok(rw) => Arc::new(rw),
        Err(e) => {
            tracing::debug!(remote = %addr, error = %e, "socket setup failed");
            return;
        }
    };

    let started = Instant::now();
    let result = node
        .service
        .handle_connection(node.version, &remote_id, rw)
        .await;

    let outcome = match &result {
        Ok(()) => "closed",
        Err(GossipError::Handshake(_)) => "handshake_failed",
        Err(GossipError::Registry(_)) | Err(GossipError::TooManyPeers(_)) => "rejected",
        Err(GossipError::Transport(_)) => "disconnected",
        Err(_) => "protocol_error",
    };
    node.metrics
        .sessions_total
        .with_label_values(&[outcome])
        .inc();
    node.metrics
        .session_duration_seconds
        .observe(started.elapsed().as_secs_f64());
    node.metrics
        .connected_peers
        .set(node.service.registry().len() as i64);

    match result {
        Ok(()) => tracing::debug!(remote = %addr, "session closed"),
        Err(e) => tracing::debug!(remote = %addr, outcome, error = %e, "session ended"),
    }
}

/// Prints version information to stdout.
fn print_version() {
    println!("tally-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", PROTOCOL_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
