//! Stream transport: `TcpStream` (or any `AsyncRead + AsyncWrite`
//! byte stream) framed with the length-prefix wire format.

use super::shared::{spawn_writer, ConnHandle, FrameEncoder, LenPrefixEncoder, TransportSink};
use super::{addr_pair, Conn, FrameReader};
use crate::error::Error;
use async_trait::async_trait;
use bytes::Bytes;
use gate_core::framer::LenPrefixFramer;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::net::TcpStream;

pub type StreamConn = Conn<StreamReader<ReadHalf<TcpStream>>>;

pub struct StreamReader<R> {
    half: R,
    framer: LenPrefixFramer,
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameReader for StreamReader<R> {
    async fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        Ok(self.framer.read_msg(&mut self.half).await?)
    }
}

#[cfg(unix)]
type RawSockFd = std::os::fd::RawFd;
#[cfg(not(unix))]
type RawSockFd = i32;

struct StreamSink<W> {
    half: W,
    raw_fd: Option<RawSockFd>,
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> TransportSink for StreamSink<W> {
    async fn send_frame(&mut self, data: Bytes) -> std::io::Result<()> {
        self.half.write_all(&data).await
    }

    /// Matches the source's writer goroutine, which calls `conn.Close()`
    /// — a full close — on *every* exit path, not just the destroyed
    /// one: `SetLinger(0)` in `doDestroy` only changes what that close
    /// does, it doesn't skip it. Shutting down only the write half here
    /// would leave a read task parked forever against a peer that never
    /// sends its own FIN, so this always shuts down both directions on
    /// the raw fd before the ordinary half-close.
    async fn shutdown(&mut self) {
        if let Some(fd) = self.raw_fd {
            shutdown_both(fd);
        }
        let _ = self.half.shutdown().await;
    }

    fn set_linger_zero(&self) {
        if let Some(fd) = self.raw_fd {
            apply_linger_zero(fd);
        }
    }
}

#[cfg(unix)]
fn shutdown_both(fd: RawSockFd) {
    use std::net::Shutdown;
    use std::os::fd::FromRawFd;
    // Borrow the fd just long enough to shut down both directions;
    // `forget` so the `TcpStream` still owns and eventually closes it.
    // This is what actually unblocks a read task parked on this socket
    // waiting for a quiescent peer — closing only the write half does
    // nothing for a pending read.
    let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
    let _ = sock.shutdown(Shutdown::Both);
    std::mem::forget(sock);
}

#[cfg(not(unix))]
fn shutdown_both(_fd: i32) {}

#[cfg(unix)]
fn apply_linger_zero(fd: RawSockFd) {
    use std::os::fd::FromRawFd;
    // Borrow the fd just long enough to set SO_LINGER=0; `forget` so
    // the `TcpStream` still owns and eventually closes it. This is how
    // `destroy()` gets a hard RST out of the `shutdown()` call that
    // follows, instead of the lingering FIN close the kernel does by
    // default.
    let sock = unsafe { socket2::Socket::from_raw_fd(fd) };
    let _ = sock.set_linger(Some(std::time::Duration::ZERO));
    std::mem::forget(sock);
}

#[cfg(not(unix))]
fn apply_linger_zero(_fd: i32) {}

/// Builds a [`StreamConn`] from an accepted or dialed `TcpStream`.
///
/// Sets `TCP_NODELAY` up front (request/reply framing does not benefit
/// from Nagle batching) and wires `destroy()` to a zero-linger close so
/// an abandoned session drops instantly rather than lingering in
/// `FIN_WAIT`.
pub fn new_stream_conn(
    stream: TcpStream,
    framer: LenPrefixFramer,
    pending_write_num: usize,
) -> Result<StreamConn, Error> {
    stream.set_nodelay(true)?;

    let local = stream.local_addr();
    let remote = stream.peer_addr();
    let (local, remote) = addr_pair(local, remote);

    #[cfg(unix)]
    let raw_fd = {
        use std::os::fd::AsRawFd;
        Some(stream.as_raw_fd())
    };
    #[cfg(not(unix))]
    let raw_fd = None;

    let (read_half, write_half) = tokio::io::split(stream);

    let reader = StreamReader {
        half: read_half,
        framer,
    };
    let sink = StreamSink {
        half: write_half,
        raw_fd,
    };
    let encoder: Arc<dyn FrameEncoder> = Arc::new(LenPrefixEncoder(framer));
    let (handle, _writer): (ConnHandle, _) =
        spawn_writer(sink, encoder, pending_write_num, local, remote);

    Ok(Conn::new(reader, handle))
}
