//! Error types for the gossip layer.
//!
//! None of these are fatal to the process. A failed handshake means the
//! connection is dropped, a registry error means the caller drops the new
//! connection or ignores a stale removal, and a transport error on send
//! normally gets that one peer unregistered.

use std::time::Duration;

use thiserror::Error;

use crate::crypto::H256;

use super::transport::TransportError;

/// Errors returned by [`PeerRegistry`](super::registry::PeerRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A peer with the same identity is already registered.
    #[error("peer is already registered")]
    AlreadyRegistered,
    /// No peer with that identity is registered.
    #[error("peer is not registered")]
    NotRegistered,
    /// The registry has been closed.
    #[error("peer set is closed")]
    Closed,
    /// The registry already holds its maximum number of peers.
    #[error("peer set is full ({0})")]
    Full(usize),
}

/// Reasons a status exchange fails. All of them are terminal for the
/// connection attempt.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The first message was not a status message.
    #[error("first msg has code {code:#x} (!= {expected:#x})")]
    NoStatusMessage {
        /// Code that arrived instead.
        code: u64,
        /// The status code.
        expected: u64,
    },

    /// The status message exceeded the size ceiling.
    #[error("status message too large: {size} > {max}")]
    MessageTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// The status payload could not be decoded.
    #[error("invalid status message: {0}")]
    Decode(String),

    /// The remote is on a different chain.
    #[error("genesis block mismatch: {} (!= {})", .remote.short(), .local.short())]
    GenesisMismatch {
        /// Genesis announced by the remote.
        remote: H256,
        /// Our genesis.
        local: H256,
    },

    /// The remote is on a different network.
    #[error("network id mismatch: {remote} (!= {local})")]
    NetworkIdMismatch {
        /// Network announced by the remote.
        remote: u64,
        /// Our network.
        local: u64,
    },

    /// The remote speaks a different protocol version.
    #[error("protocol version mismatch: {remote} (!= {local})")]
    ProtocolVersionMismatch {
        /// Version announced by the remote.
        remote: u32,
        /// Version negotiated for this connection.
        local: u32,
    },

    /// Send and receive did not both finish before the deadline.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The transport failed while sending or receiving the status.
    #[error("handshake transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Errors that end a gossip session or reject a connection.
#[derive(Debug, Error)]
pub enum GossipError {
    /// The status exchange failed.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Registration was refused.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The connection failed underneath us.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The peer table is full.
    #[error("too many peers ({0})")]
    TooManyPeers(usize),

    /// An inbound message exceeded the size ceiling.
    #[error("message too large: {size} > {max}")]
    MessageTooLarge {
        /// Payload size in bytes.
        size: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// A second status message arrived after the handshake.
    #[error("unexpected status message after handshake")]
    UnexpectedStatus,

    /// The message code is not part of this protocol.
    #[error("invalid message code {0:#x}")]
    InvalidMessageCode(u64),

    /// A known message carried a payload that failed to decode.
    #[error("failed to decode {kind} message: {reason}")]
    Decode {
        /// Message kind being decoded.
        kind: &'static str,
        /// Decoder error text.
        reason: String,
    },
}
