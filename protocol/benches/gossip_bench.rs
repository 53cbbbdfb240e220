// Gossip layer benchmarks for the Tally protocol.
//
// Covers known-set insertion at capacity, artifact hashing, and the
// registry snapshot that every fan-out starts with.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tally_protocol::config::{GossipConfig, MAX_KNOWN_PROPOSALS};
use tally_protocol::crypto::H256;
use tally_protocol::network::{pipe, KnownSet, Peer, PeerHead, PeerRegistry};
use tally_protocol::types::{Artifact, Proposal};

fn hash(n: u64) -> H256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&n.to_le_bytes());
    H256(bytes)
}

fn bench_known_set_insert(c: &mut Criterion) {
    let set = KnownSet::new(MAX_KNOWN_PROPOSALS);
    for n in 0..MAX_KNOWN_PROPOSALS as u64 {
        set.insert(hash(n));
    }
    let mut next = MAX_KNOWN_PROPOSALS as u64;

    c.bench_function("known_set/insert_at_capacity", |b| {
        b.iter(|| {
            next += 1;
            set.insert(hash(next))
        });
    });

    c.bench_function("known_set/contains", |b| {
        let probe = hash(next);
        b.iter(|| set.contains(&probe));
    });
}

fn bench_proposal_hash(c: &mut Criterion) {
    let proposal = Proposal {
        block_number: 1_000_000,
        round: 2,
        lock_round: 1,
        block_hash: H256([0xAB; 32]),
        signature: vec![0u8; 96],
    };
    c.bench_function("artifact/proposal_hash", |b| {
        b.iter(|| proposal.hash());
    });
}

fn bench_peers_without(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry/peers_without_proposal");

    for &n in &[8usize, 50, 200] {
        let registry = PeerRegistry::new();
        let mut remotes = Vec::with_capacity(n);
        for i in 0..n {
            let (local, remote) = pipe();
            let head = PeerHead {
                hash: H256::ZERO,
                number: i as u64,
            };
            let id = (i as u64).to_be_bytes();
            let peer = Peer::new(1, &id, Arc::new(local), head, &GossipConfig::default());
            // Half the peers already know the artifact.
            if i % 2 == 0 {
                peer.mark_proposal(hash(7));
            }
            registry
                .register(Arc::new(peer))
                .expect("unique peer ids");
            remotes.push(remote);
        }

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &registry, |b, registry| {
            let h = hash(7);
            b.iter(|| registry.peers_without_proposal(&h));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_known_set_insert,
    bench_proposal_hash,
    bench_peers_without
);
criterion_main!(benches);
