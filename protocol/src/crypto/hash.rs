//! # Hashing Utilities
//!
//! The gossip layer needs exactly one notion of identity: a 32-byte hash.
//! Proposals and votes are identified by the BLAKE3 digest of their
//! encoding, block fragments carry their own proof hash, and chain heads and
//! genesis blocks are referenced by hash during the handshake.
//!
//! Every digest computed here is BLAKE3.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-byte hash value.
///
/// Equality is plain byte equality. Displays as `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct H256(pub [u8; 32]);

/// Deduplication key for proposals, votes and block fragments.
pub type ArtifactHash = H256;

/// Error returned when parsing a hash from hex or bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HashParseError {
    /// The input was not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    /// The decoded input was not 32 bytes long.
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

impl H256 {
    /// The all-zero hash.
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Builds a hash from a byte slice. The slice must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashParseError> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| HashParseError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parses a hex string, with or without a leading `0x`.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| HashParseError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Full lowercase hex encoding without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 bytes as hex. Good enough to tell hashes apart in logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }

    /// Borrows the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for H256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256(0x{})", self.short())
    }
}

/// Compute the BLAKE3 hash of the input data.
///
/// # Example
///
/// ```
/// use tally_protocol::crypto::blake3_hash;
///
/// let hash = blake3_hash(b"tally");
/// assert_eq!(hash.as_bytes().len(), 32);
/// ```
pub fn blake3_hash(data: &[u8]) -> H256 {
    H256(*blake3::hash(data).as_bytes())
}

/// Hash the bincode encoding of a value.
///
/// The encoding is streamed straight into the hasher. It fails only when
/// `T`'s `Serialize` impl does.
pub fn hash_encoded<T: Serialize>(value: &T) -> Result<H256, bincode::Error> {
    let mut hasher = blake3::Hasher::new();
    bincode::serialize_into(&mut hasher, value)?;
    Ok(H256(*hasher.finalize().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unencodable;

    impl Serialize for Unencodable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("refuses to encode"))
        }
    }

    #[test]
    fn test_hash_encoded_matches_encoding() {
        let value = (7u64, vec![1u8, 2, 3]);
        let expected = blake3_hash(&bincode::serialize(&value).unwrap());
        assert_eq!(hash_encoded(&value).unwrap(), expected);
    }

    #[test]
    fn test_hash_encoded_reports_encoding_failure() {
        assert!(hash_encoded(&Unencodable).is_err());
    }

    #[test]
    fn test_hex_roundtrip_accepts_prefix() {
        let hash = blake3_hash(b"genesis");
        let parsed = H256::from_hex(&hash.to_string()).unwrap();
        assert_eq!(parsed, hash);
        let unprefixed = H256::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(unprefixed, hash);
    }

    #[test]
    fn test_from_hex_rejects_wrong_length() {
        assert_eq!(
            H256::from_hex("0xabcd"),
            Err(HashParseError::InvalidLength(2))
        );
        assert!(matches!(
            H256::from_hex("zz"),
            Err(HashParseError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_short_is_first_eight_bytes() {
        let hash = H256([0xAB; 32]);
        assert_eq!(hash.short(), "abababababababab");
    }

    #[test]
    fn test_hash_encoded_is_deterministic() {
        let a = hash_encoded(&(1u64, H256::ZERO)).unwrap();
        let b = hash_encoded(&(1u64, H256::ZERO)).unwrap();
        let c = hash_encoded(&(2u64, H256::ZERO)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
