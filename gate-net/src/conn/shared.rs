//! The write-queue discipline shared by every connection variant.
//!
//! This is the Rust shape of the teacher's "Governor" writer actor
//! (`orzatty-client::easy::EasyClient`): a bounded channel is the only
//! path from producer to transport, and one dedicated task owns the
//! far end. The one deliberate divergence from the teacher: the
//! client-side governor calls `tx.send(..).await` so a slow network
//! applies backpressure to the *application*; a server-side connection
//! must never let one slow peer stall the module that's serving many
//! peers, so [`ConnHandle::write_msg`] uses `try_send` and destroys the
//! connection outright when the queue is full, per the framework's
//! "drop the slow peer" invariant.

use crate::error::Error;
use async_trait::async_trait;
use bytes::Bytes;
use gate_core::framer::LenPrefixFramer;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::Notify;

/// Turns a `WriteMsg` fragment sequence into the exact bytes that
/// belong on the wire for one transport variant.
///
/// Stream and reliable-UDP transports prepend a length prefix
/// ([`LenPrefixEncoder`]); websocket relies on the transport's native
/// message framing and only needs bounds checking ([`crate::conn::WsFrameEncoder`]).
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, fragments: &[&[u8]]) -> Result<Bytes, Error>;
}

/// [`FrameEncoder`] for the stream and reliable-UDP transports: bounds
/// checks, prepends the length prefix, concatenates into one buffer.
pub struct LenPrefixEncoder(pub LenPrefixFramer);

impl FrameEncoder for LenPrefixEncoder {
    fn encode(&self, fragments: &[&[u8]]) -> Result<Bytes, Error> {
        Ok(Bytes::from(self.0.encode_frame(fragments)?))
    }
}

/// Drives the far end of a connection's outbound queue: writes one
/// already-encoded frame to the transport, and tears it down on
/// request.
#[async_trait]
pub trait TransportSink: Send + 'static {
    async fn send_frame(&mut self, data: Bytes) -> std::io::Result<()>;

    /// Graceful shutdown: flush/close in the ordinary way.
    async fn shutdown(&mut self);

    /// Best-effort "abandon unsent data" hint applied only on the
    /// immediate-destroy path. No-op unless the transport supports it
    /// (stream sockets do, via `SO_LINGER = 0`).
    fn set_linger_zero(&self) {}
}

pub(crate) struct ConnSharedState {
    tx: Sender<Option<Bytes>>,
    closed: AtomicBool,
    abort: Notify,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
}

impl ConnSharedState {
    fn do_write(&self, item: Option<Bytes>) {
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::debug!("close conn: channel full");
                self.destroy();
            }
            Err(TrySendError::Closed(_)) => {}
        }
    }

    fn destroy(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.abort.notify_one();
    }
}

/// A cheaply cloneable handle to a connection's write/close half.
///
/// Distinct from the read half ([`crate::conn::Conn::read_msg`]) so
/// application code (e.g. a handler holding an `Arc<Agent>`) can write
/// and close concurrently with the dedicated read task, matching the
/// "writes never block the reader" contract.
#[derive(Clone)]
pub struct ConnHandle {
    state: Arc<ConnSharedState>,
    encoder: Arc<dyn FrameEncoder>,
}

impl ConnHandle {
    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        self.state.local_addr
    }

    pub(crate) fn remote_addr(&self) -> Option<SocketAddr> {
        self.state.remote_addr
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Encodes `fragments` and enqueues the result. Fails immediately
    /// (without touching the queue) if the connection is already
    /// closing; never blocks on a full queue — instead it destroys the
    /// connection, per the bounded-queue invariant.
    pub fn write_msg(&self, fragments: &[&[u8]]) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let frame = self.encoder.encode(fragments)?;
        self.state.do_write(Some(frame));
        Ok(())
    }

    /// Graceful close: enqueues the sentinel so the writer task drains
    /// whatever is already queued before closing the transport. A
    /// no-op if already closing/closed. If the queue happens to be
    /// full at the moment of close, the connection is destroyed
    /// immediately instead (same rule as any other enqueue).
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.do_write(None);
    }

    /// Immediate teardown: abandons anything still queued and wakes
    /// the writer task so it closes the transport right away. Safe to
    /// call multiple times.
    pub fn destroy(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.abort.notify_one();
    }
}

/// Spawns the bounded outbound queue plus its dedicated drain task for
/// one connection, returning the [`ConnHandle`] producers use and the
/// task's `JoinHandle`.
pub(crate) fn spawn_writer<S: TransportSink>(
    sink: S,
    encoder: Arc<dyn FrameEncoder>,
    pending_write_num: usize,
    local_addr: Option<SocketAddr>,
    remote_addr: Option<SocketAddr>,
) -> (ConnHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(pending_write_num.max(1));
    let state = Arc::new(ConnSharedState {
        tx,
        closed: AtomicBool::new(false),
        abort: Notify::new(),
        local_addr,
        remote_addr,
    });
    let handle = ConnHandle {
        state: state.clone(),
        encoder,
    };
    let join = tokio::spawn(run_writer(sink, rx, state));
    (handle, join)
}

async fn run_writer<S: TransportSink>(
    mut sink: S,
    mut rx: Receiver<Option<Bytes>>,
    state: Arc<ConnSharedState>,
) {
    let destroyed = tokio::select! {
        _ = state.abort.notified() => true,
        _ = drain(&mut sink, &mut rx) => false,
    };
    if destroyed {
        sink.set_linger_zero();
    }
    sink.shutdown().await;
    state.closed.store(true, Ordering::SeqCst);
}

async fn drain<S: TransportSink>(sink: &mut S, rx: &mut Receiver<Option<Bytes>>) {
    while let Some(item) = rx.recv().await {
        match item {
            None => break,
            Some(buf) => {
                if sink.send_frame(buf).await.is_err() {
                    break;
                }
            }
        }
    }
}
