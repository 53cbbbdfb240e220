//! # Gossip Messages
//!
//! Logical message model of the sub-protocol. The transport moves opaque
//! `(code, payload)` pairs; this module names the codes and turns payloads
//! into typed values and back.
//!
//! ```text
//! 0x00  Status          StatusData          handshake only, first message
//! 0x01  Proposal        Proposal
//! 0x02  Vote            Vote
//! 0x03  BlockFragment   BlockFragmentData
//! ```
//!
//! Payloads are bincode-encoded. Nothing here enforces size limits; the
//! handshake and the service read loop check `Message::size` against the
//! configured ceiling before decoding.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::crypto::H256;
use crate::types::BlockFragment;

/// Message codes of the gossip sub-protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MessageCode {
    /// Handshake status exchange.
    Status = 0x00,
    /// Block proposal.
    Proposal = 0x01,
    /// Validator vote.
    Vote = 0x02,
    /// Block fragment with its height and round.
    BlockFragment = 0x03,
}

impl MessageCode {
    /// Maps a raw wire code to a known message code.
    pub fn from_u64(code: u64) -> Option<Self> {
        match code {
            0x00 => Some(Self::Status),
            0x01 => Some(Self::Proposal),
            0x02 => Some(Self::Vote),
            0x03 => Some(Self::BlockFragment),
            _ => None,
        }
    }

    /// Raw wire code.
    pub fn as_u64(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for MessageCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status => write!(f, "Status"),
            Self::Proposal => write!(f, "Proposal"),
            Self::Vote => write!(f, "Vote"),
            Self::BlockFragment => write!(f, "BlockFragment"),
        }
    }
}

/// Failure to encode or decode a payload.
#[derive(Debug, Error)]
#[error("codec error: {0}")]
pub struct CodecError(#[from] pub bincode::Error);

/// A single framed message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw message code. May be unknown to this protocol version.
    pub code: u64,
    /// Encoded payload.
    pub payload: Bytes,
}

impl Message {
    /// Builds a message from a raw code and payload.
    pub fn new(code: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    /// Encodes `value` as the payload of a message with the given code.
    pub fn encode<T: Serialize>(code: MessageCode, value: &T) -> Result<Self, CodecError> {
        let payload = bincode::serialize(value)?;
        Ok(Self::new(code.as_u64(), payload))
    }

    /// Decodes the payload into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(bincode::deserialize(&self.payload)?)
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// The known message code, if any.
    pub fn kind(&self) -> Option<MessageCode> {
        MessageCode::from_u64(self.code)
    }
}

/// Handshake payload announced by each side of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    /// Sub-protocol version the sender speaks.
    pub protocol_version: u32,
    /// Network the sender belongs to.
    pub network_id: u64,
    /// Height of the sender's current head.
    pub block_number: u64,
    /// Hash of the sender's current head.
    pub current_block: H256,
    /// Hash of the sender's genesis block.
    pub genesis_block: H256,
}

/// Wire payload of a [`MessageCode::BlockFragment`] message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFragmentData {
    /// Height of the block the fragment belongs to.
    pub block_number: u64,
    /// Consensus round of the proposal carrying the block.
    pub round: u64,
    /// The fragment itself.
    pub fragment: BlockFragment,
}
