//! # Cryptographic Primitives
//!
//! The gossip layer treats signatures as opaque bytes. The only primitive
//! it needs is a collision-resistant hash to identify artifacts and chains.

pub mod hash;

pub use hash::{blake3_hash, hash_encoded, ArtifactHash, HashParseError, H256};
