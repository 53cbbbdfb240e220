// Copyright (c) 2026 Tally Contributors. MIT License.
// See LICENSE for details.

//! # Tally Protocol — Consensus Gossip
//!
//! The peer layer that sits between a BFT consensus engine and the wire.
//! It negotiates compatibility with each new connection, keeps a table of
//! live peers, and floods proposals, votes and block fragments to the peers
//! that have not seen them yet.
//!
//! ## Architecture
//!
//! - **config** — Protocol constants and the tunable `GossipConfig`.
//! - **crypto** — The 32-byte hash type artifacts are identified by.
//! - **types** — Consensus artifacts as seen by the gossip layer.
//! - **network** — Handshake, peers, registry, fan-out, connection service.
//!
//! ## What this crate does not do
//!
//! Peer discovery, NAT traversal, the consensus algorithm itself and vote
//! signature checks all belong somewhere else. Sockets too: the transport
//! is plugged in through [`network::MsgReadWriter`].

pub mod config;
pub mod crypto;
pub mod network;
pub mod types;
