//! # Status Handshake
//!
//! Every connection starts with a single bidirectional status exchange
//! before any gossip is accepted:
//!
//! ```text
//! Idle ──run()──▶ SendingAndAwaiting ──▶ Negotiated
//!                         │
//!                         └─────────────▶ Failed
//! ```
//!
//! Our status goes out while we wait for theirs; neither direction waits on
//! the other. One deadline covers both. The remote status is validated in a
//! fixed order: message code, size, decoding, genesis, network, version.
//! There are no retries. Reconnecting is the transport's business.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::crypto::H256;

use super::error::HandshakeError;
use super::message::{MessageCode, StatusData};
use super::transport::{self, MsgReadWriter};

/// The local chain view announced during the handshake. Supplied by the
/// consensus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatus {
    /// Network we belong to.
    pub network_id: u64,
    /// Hash of our current head.
    pub head_hash: H256,
    /// Height of our current head.
    pub head_number: u64,
    /// Hash of our genesis block.
    pub genesis_hash: H256,
}

/// Progress of a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Not started.
    Idle,
    /// Our status is being sent while we wait for theirs.
    SendingAndAwaiting,
    /// Both statuses exchanged and the remote one validated.
    Negotiated,
    /// The exchange failed. Terminal.
    Failed,
}

/// One status exchange over one connection.
pub struct Handshake<'a> {
    rw: &'a dyn MsgReadWriter,
    version: u32,
    chain: ChainStatus,
    timeout: Duration,
    max_message_size: usize,
    state: HandshakeState,
}

impl<'a> Handshake<'a> {
    /// Prepares a handshake for a connection negotiated at `version`.
    pub fn new(
        rw: &'a dyn MsgReadWriter,
        version: u32,
        chain: ChainStatus,
        timeout: Duration,
        max_message_size: usize,
    ) -> Self {
        Self {
            rw,
            version,
            chain,
            timeout,
            max_message_size,
            state: HandshakeState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Runs the exchange and returns the validated remote status.
    ///
    /// Exactly one status is written and exactly one message is read. If
    /// either side fails, or both have not finished within the deadline,
    /// the handshake ends in [`HandshakeState::Failed`].
    pub async fn run(&mut self) -> Result<StatusData, HandshakeError> {
        self.state = HandshakeState::SendingAndAwaiting;

        let ours = StatusData {
            protocol_version: self.version,
            network_id: self.chain.network_id,
            block_number: self.chain.head_number,
            current_block: self.chain.head_hash,
            genesis_block: self.chain.genesis_hash,
        };
        trace!(
            version = self.version,
            network = self.chain.network_id,
            head = %self.chain.head_hash,
            "sending status"
        );

        let rw = self.rw;
        let exchange = async {
            tokio::try_join!(
                async {
                    transport::send(rw, MessageCode::Status, &ours)
                        .await
                        .map_err(HandshakeError::from)
                },
                self.read_status(),
            )
        };

        let result = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(((), theirs))) => Ok(theirs),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(HandshakeError::Timeout(self.timeout)),
        };

        self.state = match &result {
            Ok(_) => HandshakeState::Negotiated,
            Err(e) => {
                debug!(error = %e, "handshake failed");
                HandshakeState::Failed
            }
        };
        result
    }

    async fn read_status(&self) -> Result<StatusData, HandshakeError> {
        let msg = self.rw.read_msg().await?;
        if msg.code != MessageCode::Status.as_u64() {
            return Err(HandshakeError::NoStatusMessage {
                code: msg.code,
                expected: MessageCode::Status.as_u64(),
            });
        }
        if msg.size() > self.max_message_size {
            return Err(HandshakeError::MessageTooLarge {
                size: msg.size(),
                max: self.max_message_size,
            });
        }
        let status: StatusData = msg
            .decode()
            .map_err(|e| HandshakeError::Decode(e.to_string()))?;

        if status.genesis_block != self.chain.genesis_hash {
            return Err(HandshakeError::GenesisMismatch {
                remote: status.genesis_block,
                local: self.chain.genesis_hash,
            });
        }
        if status.network_id != self.chain.network_id {
            return Err(HandshakeError::NetworkIdMismatch {
                remote: status.network_id,
                local: self.chain.network_id,
            });
        }
        if status.protocol_version != self.version {
            return Err(HandshakeError::ProtocolVersionMismatch {
                remote: status.protocol_version,
                local: self.version,
            });
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE};
    use crate::network::message::Message;
    use crate::network::transport::{pipe, PipeEnd};

    fn chain(genesis: u8, network_id: u64) -> ChainStatus {
        ChainStatus {
            network_id,
            head_hash: H256([0x11; 32]),
            head_number: 12,
            genesis_hash: H256([genesis; 32]),
        }
    }

    async fn exchange(
        a: (&PipeEnd, u32, ChainStatus),
        b: (&PipeEnd, u32, ChainStatus),
    ) -> (
        Result<StatusData, HandshakeError>,
        Result<StatusData, HandshakeError>,
    ) {
        let mut ha = Handshake::new(a.0, a.1, a.2, HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        let mut hb = Handshake::new(b.0, b.1, b.2, HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        tokio::join!(ha.run(), hb.run())
    }

    #[tokio::test]
    async fn matching_peers_negotiate() {
        let (a, b) = pipe();
        let mut remote = chain(1, 7);
        remote.head_number = 99;
        remote.head_hash = H256([0x99; 32]);

        let mut ha = Handshake::new(&a, 1, chain(1, 7), HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        let mut hb = Handshake::new(&b, 1, remote, HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        assert_eq!(ha.state(), HandshakeState::Idle);

        let (ra, rb) = tokio::join!(ha.run(), hb.run());
        let seen_by_a = ra.unwrap();
        assert_eq!(seen_by_a.block_number, 99);
        assert_eq!(seen_by_a.current_block, H256([0x99; 32]));
        assert_eq!(rb.unwrap().block_number, 12);
        assert_eq!(ha.state(), HandshakeState::Negotiated);
    }

    #[tokio::test]
    async fn genesis_mismatch_fails() {
        let (a, b) = pipe();
        let (ra, rb) = exchange((&a, 1, chain(1, 7)), (&b, 1, chain(2, 7))).await;
        assert!(matches!(ra, Err(HandshakeError::GenesisMismatch { .. })));
        assert!(matches!(rb, Err(HandshakeError::GenesisMismatch { .. })));
    }

    #[tokio::test]
    async fn network_mismatch_fails() {
        let (a, b) = pipe();
        let (ra, _) = exchange((&a, 1, chain(1, 7)), (&b, 1, chain(1, 8))).await;
        assert!(matches!(
            ra,
            Err(HandshakeError::NetworkIdMismatch { remote: 8, local: 7 })
        ));
    }

    #[tokio::test]
    async fn genesis_is_checked_before_network() {
        let (a, b) = pipe();
        let (ra, _) = exchange((&a, 1, chain(1, 7)), (&b, 2, chain(2, 8))).await;
        assert!(matches!(ra, Err(HandshakeError::GenesisMismatch { .. })));
    }

    #[tokio::test]
    async fn version_mismatch_fails() {
        let (a, b) = pipe();
        let (ra, _) = exchange((&a, 1, chain(1, 7)), (&b, 2, chain(1, 7))).await;
        assert!(matches!(
            ra,
            Err(HandshakeError::ProtocolVersionMismatch { remote: 2, local: 1 })
        ));
    }

    #[tokio::test]
    async fn non_status_first_message_fails() {
        let (a, b) = pipe();
        b.write_msg(Message::new(MessageCode::Vote.as_u64(), vec![0u8; 4]))
            .await
            .unwrap();

        let mut ha = Handshake::new(&a, 1, chain(1, 7), HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        let err = ha.run().await.unwrap_err();
        assert!(matches!(err, HandshakeError::NoStatusMessage { code: 0x02, .. }));
        assert_eq!(ha.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn oversized_status_fails() {
        let (a, b) = pipe();
        b.write_msg(Message::new(MessageCode::Status.as_u64(), vec![0u8; 256]))
            .await
            .unwrap();

        let mut ha = Handshake::new(&a, 1, chain(1, 7), HANDSHAKE_TIMEOUT, 128);
        let err = ha.run().await.unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::MessageTooLarge { size: 256, max: 128 }
        ));
    }

    #[tokio::test]
    async fn garbage_status_fails_to_decode() {
        let (a, b) = pipe();
        b.write_msg(Message::new(MessageCode::Status.as_u64(), vec![0xFF; 3]))
            .await
            .unwrap();

        let mut ha = Handshake::new(&a, 1, chain(1, 7), HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        assert!(matches!(ha.run().await, Err(HandshakeError::Decode(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_remote_times_out() {
        let (a, _b) = pipe();
        let start = tokio::time::Instant::now();

        let mut ha = Handshake::new(&a, 1, chain(1, 7), HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        let err = ha.run().await.unwrap_err();

        let elapsed = start.elapsed();
        assert!(matches!(err, HandshakeError::Timeout(_)));
        assert!(elapsed >= HANDSHAKE_TIMEOUT);
        assert!(elapsed < HANDSHAKE_TIMEOUT + Duration::from_millis(100));
        assert_eq!(ha.state(), HandshakeState::Failed);
    }

    #[tokio::test]
    async fn closed_transport_fails_fast() {
        let (a, b) = pipe();
        drop(b);
        let mut ha = Handshake::new(&a, 1, chain(1, 7), HANDSHAKE_TIMEOUT, MAX_MESSAGE_SIZE);
        assert!(matches!(ha.run().await, Err(HandshakeError::Transport(_))));
    }
}
