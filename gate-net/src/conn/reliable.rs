//! Reliable-UDP transport.
//!
//! The framework treats the KCP-style session as an interchangeable
//! byte stream: anything that is `AsyncRead + AsyncWrite` can back a
//! [`ReliableConn`], so swapping in a real KCP implementation later is
//! a matter of supplying a [`ReliableListener`], not touching this
//! module. No KCP crate is pulled in here — that choice belongs to the
//! binary that wires a concrete listener together, matching how the
//! stream and websocket transports are themselves just framing glued
//! onto an existing async I/O type.

use super::shared::{spawn_writer, ConnHandle, FrameEncoder, LenPrefixEncoder, TransportSink};
use super::{addr_pair, Conn, FrameReader};
use crate::error::Error;
use async_trait::async_trait;
use bytes::Bytes;
use gate_core::framer::LenPrefixFramer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

pub type ReliableConn<S> = Conn<ReliableReader<S>>;

pub struct ReliableReader<S> {
    session: S,
    framer: LenPrefixFramer,
}

#[async_trait]
impl<S: AsyncRead + Unpin + Send> FrameReader for ReliableReader<S> {
    async fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        Ok(self.framer.read_msg(&mut self.session).await?)
    }
}

/// A listener that accepts reliable-UDP sessions. Implemented by
/// whatever KCP (or similar ARQ-over-UDP) crate a deployment chooses;
/// `gate-net` only needs the session type to be a plain byte stream.
#[async_trait]
pub trait ReliableListener: Send + Sync {
    type Session: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn accept(&self) -> std::io::Result<(Self::Session, SocketAddr, SocketAddr)>;
}

struct ReliableSink<S> {
    session: S,
}

#[async_trait]
impl<S: AsyncWrite + Unpin + Send + 'static> TransportSink for ReliableSink<S> {
    async fn send_frame(&mut self, data: Bytes) -> std::io::Result<()> {
        self.session.write_all(&data).await
    }

    async fn shutdown(&mut self) {
        let _ = self.session.shutdown().await;
    }

    // Reliable-UDP sessions have no socket-level linger concept; an
    // abandoned session just stops being driven and the underlying ARQ
    // state times out on its own.
}

/// Builds a [`ReliableConn`] from an already-accepted session and its
/// resolved addresses.
pub fn new_reliable_conn<S>(
    session: S,
    local: SocketAddr,
    remote: SocketAddr,
    framer: LenPrefixFramer,
    pending_write_num: usize,
) -> Result<ReliableConn<S>, Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (local, remote) = addr_pair(Ok(local), Ok(remote));

    let (read_half, write_half) = tokio::io::split(session);
    let reader = ReliableReader {
        session: read_half,
        framer,
    };
    let sink = ReliableSink { session: write_half };
    let encoder: Arc<dyn FrameEncoder> = Arc::new(LenPrefixEncoder(framer));
    let (handle, _writer): (ConnHandle, _) =
        spawn_writer(sink, encoder, pending_write_num, local, remote);

    Ok(Conn::new(reader, handle))
}
