//! # Peer Registry
//!
//! The table of live, negotiated peers. One registry exists per network
//! stack; it is created with the stack and closed when the stack shuts down.
//!
//! Mutations (`register`, `unregister`, `close`) take the write lock; every
//! query takes the read lock and returns a snapshot of `Arc<Peer>` handles,
//! so no caller ever holds the lock across network I/O.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::crypto::ArtifactHash;

use super::error::RegistryError;
use super::peer::{Peer, PeerInfo};
use super::transport::DisconnectReason;

#[derive(Default)]
struct Inner {
    peers: HashMap<String, Arc<Peer>>,
    closed: bool,
}

/// Set of registered peers keyed by peer id.
#[derive(Default)]
pub struct PeerRegistry {
    inner: RwLock<Inner>,
}

impl PeerRegistry {
    /// Creates an empty, open registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer. Existing entries are never replaced.
    pub fn register(&self, peer: Arc<Peer>) -> Result<(), RegistryError> {
        self.register_within(peer, usize::MAX)
    }

    /// Adds a peer unless `max_peers` are already registered.
    ///
    /// The size check and the insert happen under one write lock, so
    /// concurrent registrations never push the table past the cap.
    pub fn register_within(&self, peer: Arc<Peer>, max_peers: usize) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(RegistryError::Closed);
        }
        if inner.peers.len() >= max_peers {
            return Err(RegistryError::Full(max_peers));
        }
        if inner.peers.contains_key(peer.id()) {
            return Err(RegistryError::AlreadyRegistered);
        }
        debug!(peer = %peer.id(), version = peer.version(), "peer registered");
        inner.peers.insert(peer.id().to_string(), peer);
        Ok(())
    }

    /// Removes a peer and closes it.
    pub fn unregister(&self, id: &str) -> Result<(), RegistryError> {
        let peer = self
            .inner
            .write()
            .peers
            .remove(id)
            .ok_or(RegistryError::NotRegistered)?;
        peer.close();
        debug!(peer = %id, "peer unregistered");
        Ok(())
    }

    /// Looks up a peer by id.
    pub fn peer(&self, id: &str) -> Option<Arc<Peer>> {
        self.inner.read().peers.get(id).cloned()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.inner.read().peers.len()
    }

    /// Returns `true` if no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.read().peers.is_empty()
    }

    /// Snapshot of every registered peer.
    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.inner.read().peers.values().cloned().collect()
    }

    /// Peers whose proposal set does not contain `hash`.
    pub fn peers_without_proposal(&self, hash: &ArtifactHash) -> Vec<Arc<Peer>> {
        self.filter(|p| !p.knows_proposal(hash))
    }

    /// Peers whose vote set does not contain `hash`.
    pub fn peers_without_vote(&self, hash: &ArtifactHash) -> Vec<Arc<Peer>> {
        self.filter(|p| !p.knows_vote(hash))
    }

    /// Peers whose block-fragment set does not contain `hash`.
    pub fn peers_without_block_fragment(&self, hash: &ArtifactHash) -> Vec<Arc<Peer>> {
        self.filter(|p| !p.knows_block_fragment(hash))
    }

    /// The peer with the greatest announced head number.
    ///
    /// Ties go to whichever peer the table yields first; callers must not
    /// depend on which one that is.
    pub fn best_peer(&self) -> Option<Arc<Peer>> {
        let inner = self.inner.read();
        let mut best: Option<(&Arc<Peer>, u64)> = None;
        for peer in inner.peers.values() {
            let number = peer.head().number;
            match best {
                Some((_, n)) if number <= n => {}
                _ => best = Some((peer, number)),
            }
        }
        best.map(|(peer, _)| Arc::clone(peer))
    }

    /// Metadata for every registered peer.
    pub fn infos(&self) -> Vec<PeerInfo> {
        self.inner.read().peers.values().map(|p| p.info()).collect()
    }

    /// Rejects further registrations and disconnects every registered peer.
    ///
    /// The table itself is left as is. Calling this more than once only
    /// disconnects on the first call.
    pub fn close(&self) {
        let mut inner = self.inner.write();
        if inner.closed {
            return;
        }
        inner.closed = true;
        info!(peers = inner.peers.len(), "closing peer registry");
        for peer in inner.peers.values() {
            peer.disconnect(DisconnectReason::Quitting);
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    fn filter(&self, keep: impl Fn(&Peer) -> bool) -> Vec<Arc<Peer>> {
        self.inner
            .read()
            .peers
            .values()
            .filter(|p| keep(p))
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for PeerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PeerRegistry")
            .field("peers", &inner.peers.len())
            .field("closed", &inner.closed)
            .finish()
    }
}
