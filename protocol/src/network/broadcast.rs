//! # Broadcast Fan-out
//!
//! Sends a new artifact to every registered peer that is not yet known to
//! have it. The lacking peers are snapshotted once, then all sends run
//! concurrently. A failed send is counted and logged; it never stops the
//! remaining sends. Dropping the failed peer is up to whoever owns its
//! connection.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{trace, warn};

use crate::types::{Artifact, BlockFragment, Proposal, Vote};

use super::peer::Peer;
use super::registry::PeerRegistry;
use super::transport::TransportError;

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Ids of peers the artifact was written to.
    pub sent: Vec<String>,
    /// Ids of peers whose send failed.
    pub failed: Vec<String>,
}

impl BroadcastReport {
    /// Number of peers the fan-out targeted.
    pub fn targeted(&self) -> usize {
        self.sent.len() + self.failed.len()
    }
}

/// Sends a proposal to every peer lacking it.
pub async fn broadcast_proposal(registry: &PeerRegistry, proposal: &Proposal) -> BroadcastReport {
    let peers = registry.peers_without_proposal(&proposal.hash());
    fan_out("proposal", peers, |peer| async move {
        peer.send_proposal(proposal).await
    })
    .await
}

/// Sends a vote to every peer lacking it.
pub async fn broadcast_vote(registry: &PeerRegistry, vote: &Vote) -> BroadcastReport {
    let peers = registry.peers_without_vote(&vote.hash());
    fan_out("vote", peers, |peer| async move { peer.send_vote(vote).await }).await
}

/// Sends a block fragment to every peer lacking it.
pub async fn broadcast_block_fragment(
    registry: &PeerRegistry,
    block_number: u64,
    round: u64,
    fragment: &BlockFragment,
) -> BroadcastReport {
    let peers = registry.peers_without_block_fragment(&fragment.hash());
    fan_out("block_fragment", peers, |peer| async move {
        peer.send_block_fragment(block_number, round, fragment)
            .await
    })
    .await
}

async fn fan_out<F, Fut>(kind: &'static str, peers: Vec<Arc<Peer>>, send: F) -> BroadcastReport
where
    F: Fn(Arc<Peer>) -> Fut,
    Fut: Future<Output = Result<(), TransportError>>,
{
    trace!(kind, targets = peers.len(), "broadcasting");
    let results = join_all(peers.into_iter().map(|peer| {
        let id = peer.id().to_string();
        let fut = send(peer);
        async move { (id, fut.await) }
    }))
    .await;

    let mut report = BroadcastReport::default();
    for (id, result) in results {
        match result {
            Ok(()) => report.sent.push(id),
            Err(e) => {
                warn!(peer = %id, kind, error = %e, "broadcast send failed");
                report.failed.push(id);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GossipConfig;
    use crate::crypto::H256;
    use crate::network::message::{Message, MessageCode};
    use crate::network::peer::PeerHead;
    use crate::network::transport::{DisconnectReason, MsgReadWriter};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Transport that records writes and can be told to fail them.
    #[derive(Default)]
    struct Recorder {
        written: Mutex<Vec<Message>>,
        fail: bool,
    }

    #[async_trait]
    impl MsgReadWriter for Recorder {
        async fn read_msg(&self) -> Result<Message, TransportError> {
            std::future::pending().await
        }

        async fn write_msg(&self, msg: Message) -> Result<(), TransportError> {
            if self.fail {
                return Err(TransportError::Closed);
            }
            self.written.lock().push(msg);
            Ok(())
        }

        fn disconnect(&self, _reason: DisconnectReason) {}
    }

    fn add_peer(registry: &PeerRegistry, tag: u8, fail: bool) -> (Arc<Peer>, Arc<Recorder>) {
        let rw = Arc::new(Recorder {
            fail,
            ..Recorder::default()
        });
        let head = PeerHead {
            hash: H256::ZERO,
            number: 0,
        };
        let peer = Arc::new(Peer::new(
            1,
            &[tag; 32],
            rw.clone(),
            head,
            &GossipConfig::default(),
        ));
        registry.register(Arc::clone(&peer)).unwrap();
        (peer, rw)
    }

    fn proposal() -> Proposal {
        Proposal {
            block_number: 1,
            round: 0,
            lock_round: 0,
            block_hash: H256([9u8; 32]),
            signature: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn only_lacking_peers_receive() {
        let registry = PeerRegistry::new();
        let (a, a_rw) = add_peer(&registry, 0xA, false);
        let (b, b_rw) = add_peer(&registry, 0xB, false);
        let (c, c_rw) = add_peer(&registry, 0xC, false);

        let proposal = proposal();
        let h = proposal.hash();
        a.mark_proposal(h);

        let report = broadcast_proposal(&registry, &proposal).await;
        let mut sent = report.sent.clone();
        sent.sort();
        let mut expected = vec![b.id().to_string(), c.id().to_string()];
        expected.sort();
        assert_eq!(sent, expected);
        assert!(report.failed.is_empty());

        assert!(a_rw.written.lock().is_empty());
        assert_eq!(b_rw.written.lock().len(), 1);
        assert_eq!(c_rw.written.lock().len(), 1);
        assert_eq!(b_rw.written.lock()[0].kind(), Some(MessageCode::Proposal));

        for peer in [&a, &b, &c] {
            assert!(peer.knows_proposal(&h));
        }

        // Nobody lacks it any more.
        assert_eq!(broadcast_proposal(&registry, &proposal).await.targeted(), 0);
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_others() {
        let registry = PeerRegistry::new();
        let (_a, _) = add_peer(&registry, 1, true);
        let (_b, b_rw) = add_peer(&registry, 2, false);
        let (_c, c_rw) = add_peer(&registry, 3, false);

        let vote = Vote {
            block_hash: H256([5u8; 32]),
            block_number: 1,
            round: 0,
            vote_type: crate::types::VoteType::PreVote,
            signature: vec![],
        };
        let report = broadcast_vote(&registry, &vote).await;
        assert_eq!(report.sent.len(), 2);
        assert_eq!(report.failed, vec!["0101010101010101".to_string()]);
        assert_eq!(b_rw.written.lock().len(), 1);
        assert_eq!(c_rw.written.lock().len(), 1);
        // Failure handling is left to the caller.
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn fragment_carries_height_and_round() {
        let registry = PeerRegistry::new();
        let (p, rw) = add_peer(&registry, 1, false);
        let fragment = BlockFragment {
            index: 2,
            data: vec![0xEE; 16],
            proof: H256([7u8; 32]),
        };

        let report = broadcast_block_fragment(&registry, 40, 2, &fragment).await;
        assert_eq!(report.sent.len(), 1);
        assert!(p.knows_block_fragment(&fragment.proof));

        let data: crate::network::message::BlockFragmentData =
            rw.written.lock()[0].decode().unwrap();
        assert_eq!((data.block_number, data.round), (40, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_broadcasts_mark_once() {
        let registry = Arc::new(PeerRegistry::new());
        let (peer, _rw) = add_peer(&registry, 1, false);
        let proposal = Arc::new(proposal());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let proposal = Arc::clone(&proposal);
                tokio::spawn(async move { broadcast_proposal(&registry, &proposal).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peer.knows_proposal(&proposal.hash()));
        assert_eq!(peer.known_proposal_count(), 1);
    }

    #[tokio::test]
    async fn empty_registry_is_a_noop() {
        let registry = PeerRegistry::new();
        let report = broadcast_proposal(&registry, &proposal()).await;
        assert_eq!(report, BroadcastReport::default());
    }
}
