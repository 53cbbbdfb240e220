//! # Gossip Service
//!
//! Owns the lifecycle of every connection handed to it by the transport:
//!
//! ```text
//! handshake ─▶ Peer::new ─▶ register (capped) ─▶ read loop ─▶ unregister
//! ```
//!
//! Inbound artifacts are marked as known on the sending peer *before* the
//! consensus handler sees them, so a handler that re-broadcasts never echoes
//! an artifact back to where it came from.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::GossipConfig;
use crate::types::{Artifact, BlockFragment, Proposal, Vote};

use super::broadcast::{self, BroadcastReport};
use super::error::{GossipError, HandshakeError, RegistryError};
use super::handshake::{ChainStatus, Handshake};
use super::message::{BlockFragmentData, Message, MessageCode};
use super::peer::{Peer, PeerHead};
use super::registry::PeerRegistry;
use super::transport::{DisconnectReason, MsgReadWriter};

/// The consensus engine, as seen from the gossip layer.
#[async_trait]
pub trait ConsensusHandler: Send + Sync {
    /// Local chain view announced in every handshake.
    fn chain_status(&self) -> ChainStatus;

    /// A proposal arrived from `peer`.
    async fn on_proposal(&self, peer: &Arc<Peer>, proposal: Proposal);

    /// A vote arrived from `peer`.
    async fn on_vote(&self, peer: &Arc<Peer>, vote: Vote);

    /// A block fragment arrived from `peer`.
    async fn on_block_fragment(
        &self,
        peer: &Arc<Peer>,
        block_number: u64,
        round: u64,
        fragment: BlockFragment,
    );
}

/// Runs handshakes and read loops for all connections of one node.
pub struct GossipService {
    config: GossipConfig,
    registry: Arc<PeerRegistry>,
    handler: Arc<dyn ConsensusHandler>,
}

impl GossipService {
    /// Creates a service around an existing registry.
    pub fn new(
        config: GossipConfig,
        registry: Arc<PeerRegistry>,
        handler: Arc<dyn ConsensusHandler>,
    ) -> Self {
        Self {
            config,
            registry,
            handler,
        }
    }

    /// The registry this service registers peers in.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Active configuration.
    pub fn config(&self) -> &GossipConfig {
        &self.config
    }

    /// Serves one connection until it ends.
    ///
    /// Returns `Ok(())` when the peer was closed locally (unregistered or
    /// registry shutdown) and the error that ended the session otherwise.
    /// The transport is always disconnected on return.
    pub async fn handle_connection(
        &self,
        version: u32,
        node_id: &[u8],
        rw: Arc<dyn MsgReadWriter>,
    ) -> Result<(), GossipError> {
        let chain = self.handler.chain_status();
        let status = {
            let mut handshake = Handshake::new(
                rw.as_ref(),
                version,
                chain,
                self.config.handshake_timeout(),
                self.config.max_message_size,
            );
            match handshake.run().await {
                Ok(status) => status,
                Err(e) => {
                    let reason = match e {
                        HandshakeError::Timeout(_) => DisconnectReason::ReadTimeout,
                        _ => DisconnectReason::ProtocolError,
                    };
                    debug!(node = %hex::encode(node_id), error = %e, "handshake failed");
                    rw.disconnect(reason);
                    return Err(e.into());
                }
            }
        };

        let head = PeerHead {
            hash: status.current_block,
            number: status.block_number,
        };
        let peer = Arc::new(Peer::new(version, node_id, rw, head, &self.config));

        if let Err(e) = self
            .registry
            .register_within(Arc::clone(&peer), self.config.max_peers)
        {
            debug!(peer = %peer.id(), error = %e, "registration refused");
            return Err(match e {
                RegistryError::Full(max) => {
                    peer.disconnect(DisconnectReason::TooManyPeers);
                    GossipError::TooManyPeers(max)
                }
                RegistryError::AlreadyRegistered => {
                    peer.disconnect(DisconnectReason::AlreadyConnected);
                    e.into()
                }
                _ => {
                    peer.disconnect(DisconnectReason::Quitting);
                    e.into()
                }
            });
        }

        info!(
            peer = %peer.id(),
            version,
            head = head.number,
            "{} connected",
            peer
        );

        let result = self.read_loop(&peer).await;

        // Someone else may already have removed it.
        let _ = self.registry.unregister(peer.id());

        match &result {
            Ok(()) => {
                debug!(peer = %peer.id(), "peer closed");
                peer.disconnect(DisconnectReason::Requested);
            }
            Err(GossipError::Transport(e)) => {
                debug!(peer = %peer.id(), error = %e, "peer connection ended");
                peer.disconnect(DisconnectReason::Requested);
            }
            Err(e) => {
                warn!(peer = %peer.id(), error = %e, "dropping peer");
                peer.disconnect(DisconnectReason::ProtocolError);
            }
        }
        result
    }

    /// Reads until the peer is closed or the connection fails.
    ///
    /// Only the wait for the next message races the close signal. A message
    /// already being handled runs to completion.
    async fn read_loop(&self, peer: &Arc<Peer>) -> Result<(), GossipError> {
        loop {
            let msg = tokio::select! {
                res = peer.transport().read_msg() => res?,
                _ = peer.closed() => return Ok(()),
            };
            self.handle_msg(peer, msg).await?;
            if peer.is_closed() {
                return Ok(());
            }
        }
    }

    async fn handle_msg(&self, peer: &Arc<Peer>, msg: Message) -> Result<(), GossipError> {
        if msg.size() > self.config.max_message_size {
            return Err(GossipError::MessageTooLarge {
                size: msg.size(),
                max: self.config.max_message_size,
            });
        }

        match msg.kind() {
            None => Err(GossipError::InvalidMessageCode(msg.code)),
            Some(MessageCode::Status) => Err(GossipError::UnexpectedStatus),
            Some(MessageCode::Proposal) => {
                let proposal: Proposal = decode(&msg, "proposal")?;
                peer.mark_proposal(proposal.hash());
                self.handler.on_proposal(peer, proposal).await;
                Ok(())
            }
            Some(MessageCode::Vote) => {
                let vote: Vote = decode(&msg, "vote")?;
                peer.mark_vote(vote.hash());
                self.handler.on_vote(peer, vote).await;
                Ok(())
            }
            Some(MessageCode::BlockFragment) => {
                let data: BlockFragmentData = decode(&msg, "block fragment")?;
                peer.mark_block_fragment(data.fragment.hash());
                self.handler
                    .on_block_fragment(peer, data.block_number, data.round, data.fragment)
                    .await;
                Ok(())
            }
        }
    }

    // -- outbound -----------------------------------------------------------

    /// Fans a proposal out to every peer lacking it.
    pub async fn broadcast_proposal(&self, proposal: &Proposal) -> BroadcastReport {
        broadcast::broadcast_proposal(&self.registry, proposal).await
    }

    /// Fans a vote out to every peer lacking it.
    pub async fn broadcast_vote(&self, vote: &Vote) -> BroadcastReport {
        broadcast::broadcast_vote(&self.registry, vote).await
    }

    /// Fans a block fragment out to every peer lacking it.
    pub async fn broadcast_block_fragment(
        &self,
        block_number: u64,
        round: u64,
        fragment: &BlockFragment,
    ) -> BroadcastReport {
        broadcast::broadcast_block_fragment(&self.registry, block_number, round, fragment).await
    }

    /// Closes the registry, disconnecting every peer.
    pub fn shutdown(&self) {
        self.registry.close();
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    msg: &Message,
    kind: &'static str,
) -> Result<T, GossipError> {
    msg.decode().map_err(|e| GossipError::Decode {
        kind,
        reason: e.to_string(),
    })
}
