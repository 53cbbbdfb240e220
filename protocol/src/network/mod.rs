//! # Network Module
//!
//! Consensus gossip for the Tally protocol. Disseminates proposals, votes
//! and block fragments between validator nodes while avoiding redundant
//! sends.
//!
//! ## Architecture
//!
//! ```text
//! message.rs    — Message codes, status payload, bincode codec
//! transport.rs  — MsgReadWriter seam + in-memory pipe
//! known.rs      — Capacity-bounded known-hash set
//! handshake.rs  — One-shot status exchange under a deadline
//! peer.rs       — Negotiated peer: head, known sets, send path
//! registry.rs   — Table of registered peers
//! broadcast.rs  — Fan-out to peers lacking an artifact
//! service.rs    — Per-connection lifecycle and inbound dispatch
//! error.rs      — Registry, handshake and session errors
//! ```
//!
//! ## Design Decisions
//!
//! - The registry is an explicit object owned by the node's network stack,
//!   never a global. Every connection flow gets an `Arc` to it.
//! - Peer tables and known sets use `parking_lot` locks. Lock scopes never
//!   span an `.await`; queries hand back `Arc<Peer>` snapshots.
//! - The layer is transport-agnostic. Sockets, framing and encryption live
//!   behind [`MsgReadWriter`].

pub mod broadcast;
pub mod error;
pub mod handshake;
pub mod known;
pub mod message;
pub mod peer;
pub mod registry;
pub mod service;
pub mod transport;

pub use broadcast::{
    broadcast_block_fragment, broadcast_proposal, broadcast_vote, BroadcastReport,
};
pub use error::{GossipError, HandshakeError, RegistryError};
pub use handshake::{ChainStatus, Handshake, HandshakeState};
pub use known::KnownSet;
pub use message::{BlockFragmentData, CodecError, Message, MessageCode, StatusData};
pub use peer::{Peer, PeerHead, PeerInfo};
pub use registry::PeerRegistry;
pub use service::{ConsensusHandler, GossipService};
pub use transport::{pipe, DisconnectReason, MsgReadWriter, PipeEnd, TransportError};
