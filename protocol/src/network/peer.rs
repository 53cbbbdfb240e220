//! # Remote Peer
//!
//! A [`Peer`] wraps one negotiated connection. It tracks the chain head the
//! remote last announced and, per artifact kind, the hashes the remote is
//! known to have, so fan-out never sends it something twice.
//!
//! Peers are only built after a successful handshake. Once registered, the
//! [`PeerRegistry`](super::registry::PeerRegistry) owns them; everything else
//! holds an `Arc<Peer>` snapshot.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, trace};

use crate::config::{GossipConfig, PROTOCOL_NAME};
use crate::crypto::{ArtifactHash, H256};
use crate::types::{Artifact, BlockFragment, Proposal, Vote};

use super::known::KnownSet;
use super::message::{BlockFragmentData, MessageCode};
use super::transport::{self, DisconnectReason, MsgReadWriter, TransportError};

/// A peer's announced chain head. Always read and written as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHead {
    /// Hash of the head block.
    pub hash: H256,
    /// Height of the head block.
    pub number: u64,
}

/// Short summary of what we know about a connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer identifier.
    pub id: String,
    /// Negotiated protocol version.
    pub version: u32,
    /// Height of the peer's head block.
    pub number: u64,
    /// Hex hash of the peer's head block.
    pub head: String,
    /// When the peer object was created.
    pub connected_at: DateTime<Utc>,
}

/// One live, negotiated connection.
pub struct Peer {
    id: String,
    version: u32,
    rw: Arc<dyn MsgReadWriter>,
    head: RwLock<PeerHead>,
    known_proposals: KnownSet,
    known_votes: KnownSet,
    known_block_fragments: KnownSet,
    connected_at: DateTime<Utc>,
    done: watch::Sender<bool>,
}

impl Peer {
    /// Builds a peer for a connection that completed its handshake.
    ///
    /// The identifier is the hex encoding of the first 8 bytes of the
    /// remote node id (or all of it, if shorter).
    pub fn new(
        version: u32,
        node_id: &[u8],
        rw: Arc<dyn MsgReadWriter>,
        head: PeerHead,
        config: &GossipConfig,
    ) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            id: hex::encode(&node_id[..node_id.len().min(8)]),
            version,
            rw,
            head: RwLock::new(head),
            known_proposals: KnownSet::new(config.max_known_proposals),
            known_votes: KnownSet::new(config.max_known_votes),
            known_block_fragments: KnownSet::new(config.max_known_block_fragments),
            connected_at: Utc::now(),
            done,
        }
    }

    /// Peer identifier used as the registry key.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Protocol version negotiated for this connection.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Copy of the current head.
    pub fn head(&self) -> PeerHead {
        *self.head.read()
    }

    /// Replaces the head hash and number together.
    pub fn set_head(&self, hash: H256, number: u64) {
        *self.head.write() = PeerHead { hash, number };
    }

    /// Metadata summary for APIs and logs.
    pub fn info(&self) -> PeerInfo {
        let head = self.head();
        PeerInfo {
            id: self.id.clone(),
            version: self.version,
            number: head.number,
            head: head.hash.to_string(),
            connected_at: self.connected_at,
        }
    }

    // -- known sets ---------------------------------------------------------

    /// Records that the peer has this proposal; it will not be sent again.
    pub fn mark_proposal(&self, hash: ArtifactHash) {
        self.known_proposals.insert(hash);
    }

    /// Records that the peer has this vote.
    pub fn mark_vote(&self, hash: ArtifactHash) {
        self.known_votes.insert(hash);
    }

    /// Records that the peer has this block fragment.
    pub fn mark_block_fragment(&self, hash: ArtifactHash) {
        self.known_block_fragments.insert(hash);
    }

    /// Whether the peer is known to have the proposal.
    pub fn knows_proposal(&self, hash: &ArtifactHash) -> bool {
        self.known_proposals.contains(hash)
    }

    /// Whether the peer is known to have the vote.
    pub fn knows_vote(&self, hash: &ArtifactHash) -> bool {
        self.known_votes.contains(hash)
    }

    /// Whether the peer is known to have the block fragment.
    pub fn knows_block_fragment(&self, hash: &ArtifactHash) -> bool {
        self.known_block_fragments.contains(hash)
    }

    /// Number of remembered proposal hashes.
    pub fn known_proposal_count(&self) -> usize {
        self.known_proposals.len()
    }

    /// Number of remembered vote hashes.
    pub fn known_vote_count(&self) -> usize {
        self.known_votes.len()
    }

    /// Number of remembered fragment hashes.
    pub fn known_block_fragment_count(&self) -> usize {
        self.known_block_fragments.len()
    }

    // -- sending ------------------------------------------------------------

    /// Marks the proposal as known and sends it.
    pub async fn send_proposal(&self, proposal: &Proposal) -> Result<(), TransportError> {
        let hash = proposal.hash();
        self.mark_proposal(hash);
        trace!(peer = %self.id, hash = %hash.short(), "sending proposal");
        transport::send(self.rw.as_ref(), MessageCode::Proposal, proposal).await
    }

    /// Marks the vote as known and sends it.
    pub async fn send_vote(&self, vote: &Vote) -> Result<(), TransportError> {
        let hash = vote.hash();
        self.mark_vote(hash);
        trace!(peer = %self.id, hash = %hash.short(), "sending vote");
        transport::send(self.rw.as_ref(), MessageCode::Vote, vote).await
    }

    /// Marks the fragment as known and sends it with its height and round.
    pub async fn send_block_fragment(
        &self,
        block_number: u64,
        round: u64,
        fragment: &BlockFragment,
    ) -> Result<(), TransportError> {
        self.mark_block_fragment(fragment.hash());
        trace!(
            peer = %self.id,
            block = block_number,
            round,
            index = fragment.index,
            "sending block fragment"
        );
        let data = BlockFragmentData {
            block_number,
            round,
            fragment: fragment.clone(),
        };
        transport::send(self.rw.as_ref(), MessageCode::BlockFragment, &data).await
    }

    // -- lifecycle ----------------------------------------------------------

    /// Signals any per-peer background activity to stop.
    ///
    /// Closing twice is a bug in the caller; the registry guarantees a
    /// single close per registration.
    pub fn close(&self) {
        let was_closed = self.done.send_replace(true);
        if was_closed {
            error!(peer = %self.id, "peer closed twice");
            debug_assert!(!was_closed, "peer {} closed twice", self.id);
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the peer has been closed.
    pub async fn closed(&self) {
        let mut done = self.done.subscribe();
        // The sender lives as long as `self`, so this only errors if the
        // peer is being torn down, which also means closed.
        let _ = done.wait_for(|closed| *closed).await;
    }

    /// Tears down the underlying connection.
    pub fn disconnect(&self, reason: DisconnectReason) {
        self.rw.disconnect(reason);
    }

    /// The transport this peer reads from and writes to.
    pub fn transport(&self) -> &Arc<dyn MsgReadWriter> {
        &self.rw
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer {} [{}/{:2}]", self.id, PROTOCOL_NAME, self.version)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("head", &self.head())
            .field("closed", &self.is_closed())
            .finish()
    }
}
