//! # CLI Interface
//!
//! Defines the command-line argument structure for `tally-node` using
//! `clap` derive. Two subcommands: `run` and `version`.

use clap::{Parser, Subcommand};
use std::net::SocketAddr;

use tally_protocol::config::{
    DEFAULT_API_PORT, DEFAULT_P2P_PORT, MAX_PEERS, NETWORK_ID_DEVNET, PROTOCOL_VERSION,
};

/// Tally consensus gossip relay.
///
/// Accepts and dials TCP peers, negotiates the gossip handshake with each,
/// and floods every proposal, vote and block fragment it receives to the
/// peers that have not seen it.
#[derive(Parser, Debug)]
#[command(
    name = "tally-node",
    about = "Tally consensus gossip relay node",
    version,
    propagate_version = true
)]
pub struct TallyNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Tally node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the relay node.
    Run(RunArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Address to accept P2P connections on.
    #[arg(long, env = "TALLY_LISTEN", default_value_t = default_listen())]
    pub listen: SocketAddr,

    /// Peers to dial at startup, as `host:port`. Repeat or comma-separate.
    #[arg(long, env = "TALLY_BOOTNODES", value_delimiter = ',')]
    pub bootnodes: Vec<SocketAddr>,

    /// Network identifier announced in the handshake.
    #[arg(long, env = "TALLY_NETWORK_ID", default_value_t = NETWORK_ID_DEVNET)]
    pub network_id: u64,

    /// Hex-encoded genesis block hash. Peers on a different genesis are
    /// rejected during the handshake. Defaults to the all-zero hash.
    #[arg(long, env = "TALLY_GENESIS")]
    pub genesis: Option<String>,

    /// Gossip sub-protocol version to negotiate.
    #[arg(long, env = "TALLY_PROTOCOL_VERSION", default_value_t = PROTOCOL_VERSION)]
    pub protocol_version: u32,

    /// Maximum number of registered peers.
    #[arg(long, env = "TALLY_MAX_PEERS", default_value_t = MAX_PEERS)]
    pub max_peers: usize,

    /// Port for the HTTP API and Prometheus metrics.
    #[arg(long, env = "TALLY_API_PORT", default_value_t = DEFAULT_API_PORT)]
    pub api_port: u16,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "TALLY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_P2P_PORT))
}
