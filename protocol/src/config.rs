//! # Protocol Configuration & Constants
//!
//! Every magic number in the gossip layer lives here. The known-set caps,
//! the handshake deadline and the message ceiling are what keep a hostile
//! peer from turning our memory into its scratch space, so treat changes
//! to them as protocol changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Network Identifiers
// ---------------------------------------------------------------------------

/// Mainnet network identifier.
pub const NETWORK_ID_MAINNET: u64 = 0x54414C59; // "TALY"

/// Testnet network identifier.
pub const NETWORK_ID_TESTNET: u64 = 0x54414C54; // "TALT"

/// Devnet network identifier. Reset whenever someone feels like it.
pub const NETWORK_ID_DEVNET: u64 = 0x54414C44; // "TALD"

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

/// Sub-protocol name advertised to the transport layer.
pub const PROTOCOL_NAME: &str = "tally";

/// Gossip sub-protocol version. Both sides of a handshake must announce the
/// same value or the connection is dropped.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Known-Set Limits
// ---------------------------------------------------------------------------

/// Maximum proposal hashes remembered per peer. Bounds memory when a peer
/// floods us with distinct hashes.
pub const MAX_KNOWN_PROPOSALS: usize = 2048;

/// Maximum vote hashes remembered per peer.
pub const MAX_KNOWN_VOTES: usize = 2048;

/// Maximum block fragment proofs remembered per peer.
pub const MAX_KNOWN_BLOCK_FRAGMENTS: usize = 2048;

// ---------------------------------------------------------------------------
// Timing & Size Limits
// ---------------------------------------------------------------------------

/// Deadline for the whole status exchange. Send and receive must both
/// complete within this window.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest payload accepted from a peer, in bytes (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Node Parameters
// ---------------------------------------------------------------------------

/// Default P2P listening port.
pub const DEFAULT_P2P_PORT: u16 = 30_310;

/// Default HTTP API port (status, peers, metrics).
pub const DEFAULT_API_PORT: u16 = 30_311;

/// Maximum number of registered peers a node accepts.
pub const MAX_PEERS: usize = 50;

/// Returns a friendly name for a network ID, mainly for logging.
pub fn network_name(network_id: u64) -> String {
    match network_id {
        NETWORK_ID_MAINNET => "mainnet".to_string(),
        NETWORK_ID_TESTNET => "testnet".to_string(),
        NETWORK_ID_DEVNET => "devnet".to_string(),
        other => format!("unknown(0x{:08X})", other),
    }
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Tunables for the gossip service.
///
/// Defaults come from the constants above. Tests shrink the known-set
/// capacities to exercise eviction without inserting thousands of hashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Capacity of each peer's known-proposal set.
    pub max_known_proposals: usize,
    /// Capacity of each peer's known-vote set.
    pub max_known_votes: usize,
    /// Capacity of each peer's known-fragment set.
    pub max_known_block_fragments: usize,
    /// Status exchange deadline in milliseconds.
    pub handshake_timeout_ms: u64,
    /// Largest accepted inbound payload in bytes.
    pub max_message_size: usize,
    /// Maximum number of registered peers.
    pub max_peers: usize,
}

impl GossipConfig {
    /// Returns the handshake deadline as a [`Duration`].
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_known_proposals: MAX_KNOWN_PROPOSALS,
            max_known_votes: MAX_KNOWN_VOTES,
            max_known_block_fragments: MAX_KNOWN_BLOCK_FRAGMENTS,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT.as_millis() as u64,
            max_message_size: MAX_MESSAGE_SIZE,
            max_peers: MAX_PEERS,
        }
    }
}
