//! Outbound delivery handles enforcing the single-writer discipline.
//!
//! Every connection owns exactly one writer task, which holds the write
//! half of the socket. Producers (the connection's own handler, broadcast
//! fan-out, the heartbeat monitor) clone a [`PushHandle`] and enqueue
//! envelopes; the writer serialises them into frames in arrival order, so
//! frames never interleave on the wire.

use futures::SinkExt;
use thiserror::Error;
use tokio::{net::tcp::OwnedWriteHalf, sync::mpsc, task::JoinHandle};
use tokio_util::{codec::FramedWrite, sync::CancellationToken};
use tracing::{debug, warn};

use crate::{codec::FrameCodec, envelope::Envelope};

/// Error returned when a push cannot reach the connection's writer.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// The writer task is gone; the connection is closing or closed.
    #[error("connection writer closed")]
    Closed,
}

/// Cloneable handle used to enqueue envelopes for one connection.
#[derive(Clone)]
pub struct PushHandle {
    tx: mpsc::Sender<Envelope>,
}

impl PushHandle {
    /// Enqueue an envelope, awaiting queue capacity.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Closed`] if the writer task has terminated.
    pub async fn push(&self, envelope: Envelope) -> Result<(), PushError> {
        self.tx.send(envelope).await.map_err(|_| PushError::Closed)
    }
}

#[cfg(test)]
impl PushHandle {
    /// Handle backed by a bare channel, for registry and router tests.
    pub(crate) fn for_test(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

/// Spawn the writer task for one connection.
///
/// The task drains the queue into `sink` until every handle is dropped or
/// `cancel` fires. A write failure cancels the token itself so the
/// connection's read loop unblocks without waiting for its deadline.
pub(crate) fn spawn_writer(
    sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    cancel: CancellationToken,
    capacity: usize,
) -> (PushHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity);
    let task = tokio::spawn(write_loop(sink, rx, cancel));
    (PushHandle { tx }, task)
}

async fn write_loop(
    mut sink: FramedWrite<OwnedWriteHalf, FrameCodec>,
    mut rx: mpsc::Receiver<Envelope>,
    cancel: CancellationToken,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(envelope) => envelope,
                None => break,
            },
        };
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "dropping unencodable envelope");
                continue;
            }
        };
        if let Err(error) = sink.send(bytes).await {
            debug!(%error, "connection write failed, closing");
            cancel.cancel();
            break;
        }
    }
    rx.close();
    if let Err(error) = sink.close().await {
        debug!(%error, "error closing connection sink");
    }
}
