//! Consensus artifact definitions.
//!
//! The gossip layer does not interpret these beyond their identity hash.
//! Signatures are carried as opaque bytes; validating them is the
//! consensus engine's job, not ours.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{hash_encoded, ArtifactHash, H256};

/// Anything that is flooded through the gossip layer.
pub trait Artifact {
    /// Deduplication key used by the per-peer known sets.
    fn hash(&self) -> ArtifactHash;
}

// ---------------------------------------------------------------------------
// Proposal
// ---------------------------------------------------------------------------

/// A block proposal for a given height and round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Height of the proposed block.
    pub block_number: u64,
    /// Consensus round the proposal belongs to.
    pub round: u64,
    /// Round in which the proposer locked on this value, or the current
    /// round for a fresh proposal.
    pub lock_round: u64,
    /// Hash of the proposed block.
    pub block_hash: H256,
    /// Proposer signature, opaque to the gossip layer.
    pub signature: Vec<u8>,
}

impl Artifact for Proposal {
    fn hash(&self) -> ArtifactHash {
        encoded_identity(self)
    }
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// Voting step a vote belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteType {
    /// First voting step of a round.
    PreVote,
    /// Second voting step; a quorum of these commits the block.
    PreCommit,
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreVote => write!(f, "PreVote"),
            Self::PreCommit => write!(f, "PreCommit"),
        }
    }
}

/// A validator vote on a block hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Block the vote is cast for. Zero means "nil".
    pub block_hash: H256,
    /// Height of the voted block.
    pub block_number: u64,
    /// Consensus round.
    pub round: u64,
    /// Voting step.
    pub vote_type: VoteType,
    /// Validator signature, opaque to the gossip layer.
    pub signature: Vec<u8>,
}

impl Artifact for Vote {
    fn hash(&self) -> ArtifactHash {
        encoded_identity(self)
    }
}

/// BLAKE3 over the bincode encoding of a proposal or vote.
///
/// Both are made of integers, hashes, a unit enum and byte vectors, and
/// bincode's default options put no limit on size, so encoding cannot fail.
fn encoded_identity<T: Serialize>(value: &T) -> ArtifactHash {
    match hash_encoded(value) {
        Ok(hash) => hash,
        Err(e) => unreachable!("artifact failed to encode: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Block Fragment
// ---------------------------------------------------------------------------

/// One chunk of a proposed block, shipped separately so large blocks can
/// stream in parallel with the proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFragment {
    /// Position of the fragment within the block.
    pub index: u32,
    /// Raw fragment bytes.
    pub data: Vec<u8>,
    /// Merkle proof hash of the fragment. Doubles as its identity.
    pub proof: H256,
}

impl Artifact for BlockFragment {
    fn hash(&self) -> ArtifactHash {
        self.proof
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(round: u64) -> Proposal {
        Proposal {
            block_number: 10,
            round,
            lock_round: round,
            block_hash: H256([7u8; 32]),
            signature: vec![1, 2, 3],
        }
    }

    #[test]
    fn proposal_hash_covers_every_field() {
        assert_eq!(proposal(0).hash(), proposal(0).hash());
        assert_ne!(proposal(0).hash(), proposal(1).hash());
    }

    #[test]
    fn identity_is_hash_of_encoding() {
        let mut big = proposal(3);
        big.signature = vec![0x5A; 1 << 16];
        let encoded = bincode::serialize(&big).unwrap();
        assert_eq!(big.hash(), crate::crypto::blake3_hash(&encoded));
        assert_ne!(big.hash(), crate::crypto::blake3_hash(&[]));
    }

    #[test]
    fn vote_type_changes_identity() {
        let prevote = Vote {
            block_hash: H256([1u8; 32]),
            block_number: 3,
            round: 0,
            vote_type: VoteType::PreVote,
            signature: vec![],
        };
        let precommit = Vote {
            vote_type: VoteType::PreCommit,
            ..prevote.clone()
        };
        assert_ne!(prevote.hash(), precommit.hash());
    }

    #[test]
    fn fragment_identity_is_its_proof() {
        let fragment = BlockFragment {
            index: 2,
            data: vec![0xAA; 64],
            proof: H256([9u8; 32]),
        };
        assert_eq!(fragment.hash(), H256([9u8; 32]));
    }
}
