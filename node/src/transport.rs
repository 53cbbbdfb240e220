//! # TCP Transport
//!
//! Plugs plain TCP connections into the gossip layer. Each frame is
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────────┐
//! │ code: u64 BE │ len: u32 BE  │ payload (len B) │
//! └──────────────┴──────────────┴─────────────────┘
//! ```
//!
//! Before the gossip handshake runs, both sides swap their raw 32-byte node
//! ids (the "hello"). That is the identity the peer table is keyed on.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};

use tally_protocol::network::{DisconnectReason, Message, MsgReadWriter, TransportError};

/// Length of a node id on the wire.
pub const NODE_ID_LEN: usize = 32;

const HEADER_LEN: usize = 12;

/// One encoded frame waiting for the writer task.
struct WriteJob {
    frame: Vec<u8>,
    done: oneshot::Sender<std::io::Result<()>>,
}

/// A framed TCP connection.
///
/// Writes are handed to a per-connection writer task, which puts every
/// frame on the socket whole or not at all. Dropping a `write_msg` future
/// never leaves a partial frame behind.
///
/// `disconnect` fails every pending and future read and write right away.
/// The socket is closed once the transport is dropped or disconnected.
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writes: mpsc::UnboundedSender<WriteJob>,
    closed: watch::Sender<Option<DisconnectReason>>,
    max_frame: usize,
    remote: SocketAddr,
}

impl TcpTransport {
    /// Wraps a connected stream and spawns its writer task, so it must be
    /// called from inside a Tokio runtime. Frames larger than `max_frame`
    /// are refused in both directions.
    pub fn new(stream: TcpStream, max_frame: usize) -> std::io::Result<Self> {
        let remote = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(None);
        let (writes, jobs) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, jobs, closed.subscribe()));
        Ok(Self {
            reader: Mutex::new(reader),
            writes,
            closed,
            max_frame,
            remote,
        })
    }

    /// Address of the remote end.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    fn disconnected(&self) -> Option<DisconnectReason> {
        *self.closed.borrow()
    }

    /// Error for a write that can no longer reach the socket.
    fn gone(&self) -> TransportError {
        match self.disconnected() {
            Some(reason) => TransportError::Disconnected(reason),
            None => TransportError::Closed,
        }
    }

    async fn read_frame(&self) -> Result<Message, TransportError> {
        let mut reader = self.reader.lock().await;
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header).await.map_err(eof_as_closed)?;

        let mut code = [0u8; 8];
        code.copy_from_slice(&header[..8]);
        let mut len = [0u8; 4];
        len.copy_from_slice(&header[8..]);
        let code = u64::from_be_bytes(code);
        let len = u32::from_be_bytes(len) as usize;

        if len > self.max_frame {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: self.max_frame,
            });
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.map_err(eof_as_closed)?;
        Ok(Message::new(code, Bytes::from(payload)))
    }

    fn encode_frame(&self, msg: &Message) -> Result<Vec<u8>, TransportError> {
        let len = u32::try_from(msg.size())
            .ok()
            .filter(|len| *len as usize <= self.max_frame)
            .ok_or(TransportError::FrameTooLarge {
                size: msg.size(),
                max: self.max_frame,
            })?;

        let mut frame = Vec::with_capacity(HEADER_LEN + msg.size());
        frame.extend_from_slice(&msg.code.to_be_bytes());
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&msg.payload);
        Ok(frame)
    }
}

/// Drains queued frames onto the socket in order.
///
/// Exits on disconnect, on the first I/O error, or once the transport is
/// dropped. Dropping `writer` on exit shuts down our side of the socket.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut jobs: mpsc::UnboundedReceiver<WriteJob>,
    mut closed: watch::Receiver<Option<DisconnectReason>>,
) {
    loop {
        let job = tokio::select! {
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
            _ = closed.changed() => break,
        };
        // A frame is only abandoned when the whole connection goes away.
        let res = tokio::select! {
            res = write_all_flush(&mut writer, &job.frame) => res,
            _ = closed.changed() => break,
        };
        let failed = res.is_err();
        let _ = job.done.send(res);
        if failed {
            break;
        }
    }
}

async fn write_all_flush(writer: &mut OwnedWriteHalf, frame: &[u8]) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

fn eof_as_closed(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::Closed
    } else {
        TransportError::Io(e)
    }
}

#[async_trait]
impl MsgReadWriter for TcpTransport {
    async fn read_msg(&self) -> Result<Message, TransportError> {
        let mut closed = self.closed.subscribe();
        let already = *closed.borrow_and_update();
        if let Some(reason) = already {
            return Err(TransportError::Disconnected(reason));
        }
        tokio::select! {
            res = self.read_frame() => res,
            _ = closed.changed() => {
                let reason = (*closed.borrow()).unwrap_or(DisconnectReason::Requested);
                Err(TransportError::Disconnected(reason))
            }
        }
    }

    async fn write_msg(&self, msg: Message) -> Result<(), TransportError> {
        if let Some(reason) = self.disconnected() {
            return Err(TransportError::Disconnected(reason));
        }
        let frame = self.encode_frame(&msg)?;
        let (done, written) = oneshot::channel();
        self.writes
            .send(WriteJob { frame, done })
            .map_err(|_| self.gone())?;
        match written.await {
            Ok(res) => res.map_err(TransportError::Io),
            Err(_) => Err(self.gone()),
        }
    }

    fn disconnect(&self, reason: DisconnectReason) {
        let first = self.closed.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });
        if first {
            tracing::debug!(remote = %self.remote, %reason, "disconnecting");
        }
    }
}

/// Errors from the id exchange that precedes the gossip handshake.
#[derive(Debug, thiserror::Error)]
pub enum HelloError {
    /// The socket failed.
    #[error("hello i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The remote did not send its id in time.
    #[error("hello timed out")]
    Timeout,
    /// We dialled ourselves.
    #[error("connected to self")]
    SelfConnection,
}

/// Swaps node ids with the remote end of `stream`.
pub async fn hello(
    stream: &mut TcpStream,
    local_id: &[u8; NODE_ID_LEN],
    timeout: Duration,
) -> Result<[u8; NODE_ID_LEN], HelloError> {
    let exchange = async {
        stream.write_all(local_id).await?;
        let mut remote = [0u8; NODE_ID_LEN];
        stream.read_exact(&mut remote).await?;
        Ok::<_, std::io::Error>(remote)
    };
    let remote = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| HelloError::Timeout)??;
    if &remote == local_id {
        return Err(HelloError::SelfConnection);
    }
    Ok(remote)
}
