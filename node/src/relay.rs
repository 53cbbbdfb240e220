//! # Relay Handler
//!
//! The node has no consensus engine of its own. It stands in for one with a
//! flood-fill relay: every artifact that arrives is forwarded to every peer
//! that has not seen it yet. Peers whose sends fail are unregistered, which
//! ends their sessions.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use tally_protocol::crypto::ArtifactHash;
use tally_protocol::network::{
    broadcast_block_fragment, broadcast_proposal, broadcast_vote, BroadcastReport, ChainStatus,
    ConsensusHandler, KnownSet, Peer, PeerRegistry,
};
use tally_protocol::types::{Artifact, BlockFragment, Proposal, Vote};

use crate::metrics::SharedMetrics;

/// Artifacts remembered node-wide so a hash arriving from several peers is
/// only relayed once.
const SEEN_CAPACITY: usize = 8192;

/// Flood-fill [`ConsensusHandler`].
pub struct RelayHandler {
    chain: ChainStatus,
    registry: Arc<PeerRegistry>,
    metrics: SharedMetrics,
    seen: KnownSet<ArtifactHash>,
}

impl RelayHandler {
    /// Creates a relay announcing `chain` in every handshake.
    pub fn new(chain: ChainStatus, registry: Arc<PeerRegistry>, metrics: SharedMetrics) -> Self {
        Self {
            chain,
            registry,
            metrics,
            seen: KnownSet::new(SEEN_CAPACITY),
        }
    }

    /// Returns `false` if the artifact was already relayed.
    fn first_sighting(&self, kind: &str, hash: ArtifactHash) -> bool {
        self.metrics
            .messages_received_total
            .with_label_values(&[kind])
            .inc();
        let fresh = self.seen.insert(hash);
        if !fresh {
            debug!(kind, hash = %hash.short(), "already relayed");
        }
        fresh
    }

    fn settle(&self, kind: &str, report: BroadcastReport) {
        self.metrics
            .record_broadcast(kind, report.sent.len(), report.failed.len());
        for id in report.failed {
            warn!(peer = %id, kind, "relay failed, dropping peer");
            // Its session may already be tearing down.
            let _ = self.registry.unregister(&id);
        }
    }
}

#[async_trait]
impl ConsensusHandler for RelayHandler {
    fn chain_status(&self) -> ChainStatus {
        self.chain
    }

    async fn on_proposal(&self, peer: &Arc<Peer>, proposal: Proposal) {
        if !self.first_sighting("proposal", proposal.hash()) {
            return;
        }
        debug!(
            from = %peer.id(),
            block = proposal.block_number,
            round = proposal.round,
            "relaying proposal"
        );
        let report = broadcast_proposal(&self.registry, &proposal).await;
        self.settle("proposal", report);
    }

    async fn on_vote(&self, peer: &Arc<Peer>, vote: Vote) {
        if !self.first_sighting("vote", vote.hash()) {
            return;
        }
        debug!(
            from = %peer.id(),
            block = vote.block_number,
            vote_type = %vote.vote_type,
            "relaying vote"
        );
        let report = broadcast_vote(&self.registry, &vote).await;
        self.settle("vote", report);
    }

    async fn on_block_fragment(
        &self,
        peer: &Arc<Peer>,
        block_number: u64,
        round: u64,
        fragment: BlockFragment,
    ) {
        if !self.first_sighting("block_fragment", fragment.hash()) {
            return;
        }
        debug!(
            from = %peer.id(),
            block = block_number,
            index = fragment.index,
            "relaying block fragment"
        );
        let report = broadcast_block_fragment(&self.registry, block_number, round, &fragment).await;
        self.settle("block_fragment", report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use tally_protocol::config::GossipConfig;
    use tally_protocol::crypto::H256;
    use tally_protocol::network::{pipe, MsgReadWriter, PeerHead};

    fn add_peer(registry: &PeerRegistry, tag: u8) -> (Arc<Peer>, tally_protocol::network::PipeEnd) {
        let (local, remote) = pipe();
        let head = PeerHead {
            hash: H256::ZERO,
            number: 0,
        };
        let peer = Arc::new(Peer::new(
            1,
            &[tag; 32],
            Arc::new(local),
            head,
            &GossipConfig::default(),
        ));
        registry.register(Arc::clone(&peer)).unwrap();
        (peer, remote)
    }

    fn relay() -> (RelayHandler, Arc<PeerRegistry>, SharedMetrics) {
        let registry = Arc::new(PeerRegistry::new());
        let metrics = Arc::new(NodeMetrics::new().unwrap());
        let chain = ChainStatus {
            network_id: 1,
            head_hash: H256::ZERO,
            head_number: 0,
            genesis_hash: H256::ZERO,
        };
        let handler = RelayHandler::new(chain, Arc::clone(&registry), Arc::clone(&metrics));
        (handler, registry, metrics)
    }

    fn proposal() -> Proposal {
        Proposal {
            block_number: 2,
            round: 0,
            lock_round: 0,
            block_hash: H256([2u8; 32]),
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn relays_to_everyone_but_the_sender() {
        let (relay, registry, metrics) = relay();
        let (from, from_remote) = add_peer(&registry, 1);
        let (_to, to_remote) = add_peer(&registry, 2);

        // The service marks before handing over.
        let proposal = proposal();
        from.mark_proposal(proposal.hash());
        relay.on_proposal(&from, proposal.clone()).await;

        let msg = to_remote.read_msg().await.unwrap();
        assert_eq!(msg.decode::<Proposal>().unwrap(), proposal);
        let echo = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            from_remote.read_msg(),
        )
        .await;
        assert!(echo.is_err(), "sender got its own proposal back");
        assert_eq!(
            metrics
                .artifacts_sent_total
                .with_label_values(&["proposal"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn repeated_artifact_is_relayed_once() {
        let (relay, registry, metrics) = relay();
        let (from, _r1) = add_peer(&registry, 1);
        let (to, _r2) = add_peer(&registry, 2);

        relay.on_proposal(&from, proposal()).await;
        relay.on_proposal(&to, proposal()).await;

        assert_eq!(
            metrics
                .messages_received_total
                .with_label_values(&["proposal"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .artifacts_sent_total
                .with_label_values(&["proposal"])
                .get(),
            2
        );
    }

    #[tokio::test]
    async fn failed_peers_are_unregistered() {
        let (relay, registry, metrics) = relay();
        let (from, _r1) = add_peer(&registry, 1);
        let (dead, dead_remote) = add_peer(&registry, 2);
        drop(dead_remote);

        relay.on_proposal(&from, proposal()).await;

        assert!(registry.peer(dead.id()).is_none());
        assert!(dead.is_closed());
        assert_eq!(metrics.send_failures_total.get(), 1);
    }
}
