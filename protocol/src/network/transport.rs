//! # Transport Seam
//!
//! The gossip layer never touches sockets. Whatever owns the connection
//! (TCP framing, an encrypted session, a test pipe) implements
//! [`MsgReadWriter`] and hands it over once the connection is up.
//!
//! All methods take `&self`: the handshake writes its own status while
//! waiting for the remote one, and broadcasts write while the read loop is
//! parked in `read_msg`. Implementations synchronize internally.

use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::message::{CodecError, Message, MessageCode};

/// Buffered messages per direction of an in-memory pipe.
const PIPE_CAPACITY: usize = 64;

/// Why a connection is being torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Local request, no particular fault.
    Requested,
    /// The node is shutting down.
    Quitting,
    /// The remote broke the protocol.
    ProtocolError,
    /// The remote did not answer in time.
    ReadTimeout,
    /// A session with the same identity already exists.
    AlreadyConnected,
    /// The peer table is full.
    TooManyPeers,
    /// The remote is of no use to us (e.g. send failures).
    UselessPeer,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Requested => "disconnect requested",
            Self::Quitting => "client quitting",
            Self::ProtocolError => "breach of protocol",
            Self::ReadTimeout => "read timeout",
            Self::AlreadyConnected => "already connected",
            Self::TooManyPeers => "too many peers",
            Self::UselessPeer => "useless peer",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote end went away.
    #[error("connection closed")]
    Closed,
    /// The connection was torn down locally.
    #[error("disconnected: {0}")]
    Disconnected(DisconnectReason),
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Payload encoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A frame exceeded what the transport is willing to buffer.
    #[error("frame too large: {size} > {max}")]
    FrameTooLarge {
        /// Announced frame size.
        size: usize,
        /// Transport limit.
        max: usize,
    },
}

/// A bidirectional message stream for one connection.
#[async_trait]
pub trait MsgReadWriter: Send + Sync {
    /// Waits for the next inbound message.
    async fn read_msg(&self) -> Result<Message, TransportError>;

    /// Writes one message. May block on the transport's write path.
    async fn write_msg(&self, msg: Message) -> Result<(), TransportError>;

    /// Tears the connection down. Must not block; pending and future reads
    /// and writes fail afterwards.
    fn disconnect(&self, reason: DisconnectReason);
}

/// Encodes `value` and writes it with the given code.
pub async fn send<T>(
    rw: &dyn MsgReadWriter,
    code: MessageCode,
    value: &T,
) -> Result<(), TransportError>
where
    T: Serialize + Sync,
{
    let msg = Message::encode(code, value)?;
    rw.write_msg(msg).await
}

// ---------------------------------------------------------------------------
// In-memory pipe
// ---------------------------------------------------------------------------

/// One end of an in-memory connection created by [`pipe`].
pub struct PipeEnd {
    tx: Mutex<Option<mpsc::Sender<Message>>>,
    rx: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    closed: watch::Sender<Option<DisconnectReason>>,
}

/// Creates a connected pair of in-memory transports.
///
/// Each direction buffers a small number of messages. Disconnecting one end
/// fails its own reads and writes and closes the stream seen by the other
/// end.
pub fn pipe() -> (PipeEnd, PipeEnd) {
    let (a_tx, b_rx) = mpsc::channel(PIPE_CAPACITY);
    let (b_tx, a_rx) = mpsc::channel(PIPE_CAPACITY);
    (PipeEnd::new(a_tx, a_rx), PipeEnd::new(b_tx, b_rx))
}

impl PipeEnd {
    fn new(tx: mpsc::Sender<Message>, rx: mpsc::Receiver<Message>) -> Self {
        let (closed, _) = watch::channel(None);
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            closed,
        }
    }

    /// Reason passed to the first `disconnect` call, if any.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        *self.closed.borrow()
    }
}

#[async_trait]
impl MsgReadWriter for PipeEnd {
    async fn read_msg(&self) -> Result<Message, TransportError> {
        let mut closed = self.closed.subscribe();
        let already = *closed.borrow_and_update();
        if let Some(reason) = already {
            return Err(TransportError::Disconnected(reason));
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            msg = rx.recv() => msg.ok_or(TransportError::Closed),
            _ = closed.changed() => {
                let reason = (*closed.borrow()).unwrap_or(DisconnectReason::Requested);
                Err(TransportError::Disconnected(reason))
            }
        }
    }

    async fn write_msg(&self, msg: Message) -> Result<(), TransportError> {
        if let Some(reason) = self.disconnect_reason() {
            return Err(TransportError::Disconnected(reason));
        }
        let tx = self.tx.lock().clone().ok_or(TransportError::Closed)?;
        tx.send(msg).await.map_err(|_| TransportError::Closed)
    }

    fn disconnect(&self, reason: DisconnectReason) {
        self.closed.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        // Dropping our sender lets the other end observe end-of-stream.
        self.tx.lock().take();
    }
}
