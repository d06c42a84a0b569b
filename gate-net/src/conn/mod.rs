//! Connection layer (C2): a uniform read/write contract over three
//! dissimilar transports, sharing one write-queue discipline.
//!
//! Every variant is built from three pieces: a [`FrameReader`] owned
//! exclusively by the agent's read task, a [`FrameEncoder`] that turns
//! a `WriteMsg` fragment sequence into the bytes that belong on the
//! wire, and a [`TransportSink`] driven by a dedicated writer task
//! that drains the bounded outbound queue. Producers never touch the
//! transport directly: [`ConnHandle::write_msg`] only ever enqueues, so a
//! slow peer can never stall the caller.

mod reliable;
mod shared;
mod stream;
#[cfg(feature = "websocket")]
mod ws;

pub use reliable::{new_reliable_conn, ReliableConn, ReliableListener, ReliableReader};
pub use shared::{ConnHandle, FrameEncoder, LenPrefixEncoder, TransportSink};
pub use stream::{new_stream_conn, StreamConn, StreamReader};
#[cfg(feature = "websocket")]
pub use ws::{new_ws_conn, WsConn, WsFrameEncoder, WsReader};

use crate::error::Error;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::sync::Mutex as AsyncMutex;

/// Reads one complete application-level message from a transport.
///
/// Implementations own the read half of the transport exclusively;
/// `read_frame` is never called concurrently by more than one task
/// (the agent's read loop), so the serializing [`AsyncMutex`] that
/// wraps it in [`Conn`] is uncontended in practice and exists only to
/// let `Conn` be shared as `Arc<Conn<R>>` without an `unsafe impl Sync`.
#[async_trait]
pub trait FrameReader: Send {
    async fn read_frame(&mut self) -> Result<Vec<u8>, Error>;
}

/// A live session: an owned reader half plus a handle to the shared
/// write-queue/close state.
///
/// `Conn<R>` is the concrete type an [`crate::agent::Agent`] is built
/// from; `R` varies per transport (stream, websocket, reliable-UDP)
/// but the agent's read loop and `WriteMsg`/`Close`/`Destroy` surface
/// is identical across all three.
pub struct Conn<R> {
    reader: AsyncMutex<R>,
    handle: ConnHandle,
}

impl<R: FrameReader> Conn<R> {
    pub(crate) fn new(reader: R, handle: ConnHandle) -> Self {
        Self {
            reader: AsyncMutex::new(reader),
            handle,
        }
    }

    /// Reads exactly one message. Any error (framing, decode, peer
    /// close) is fatal to the session — the caller is expected to tear
    /// the connection down rather than retry.
    pub async fn read_msg(&self) -> Result<Vec<u8>, Error> {
        self.reader.lock().await.read_frame().await
    }

    /// Encodes and enqueues one message built from `fragments`.
    /// Bounds-checked before anything is queued; never blocks.
    pub fn write_msg(&self, fragments: &[&[u8]]) -> Result<(), Error> {
        self.handle.write_msg(fragments)
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn destroy(&self) {
        self.handle.destroy();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.handle.local_addr()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.handle.remote_addr()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// A cheaply cloneable handle carrying only the write/close half of
    /// this connection — useful for giving application code a way to
    /// push writes without granting access to the (single-reader) read
    /// half.
    pub fn handle(&self) -> ConnHandle {
        self.handle.clone()
    }
}

pub(crate) fn addr_pair(
    local: std::io::Result<SocketAddr>,
    remote: std::io::Result<SocketAddr>,
) -> (Option<SocketAddr>, Option<SocketAddr>) {
    (local.ok(), remote.ok())
}
