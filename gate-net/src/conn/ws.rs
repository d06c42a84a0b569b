//! Websocket transport: binary frames over an `axum` upgrade.
//!
//! Unlike the stream and reliable-UDP transports, websocket already
//! has message-oriented framing, so [`WsFrameEncoder`] only bounds
//! checks and concatenates fragments — no length prefix is added. Text,
//! ping/pong and close frames are not part of this framework's
//! protocol; they are drained and ignored by the read side rather than
//! treated as errors, matching a browser client's keepalive traffic.

use super::shared::{spawn_writer, ConnHandle, FrameEncoder, TransportSink};
use super::{addr_pair, Conn, FrameReader};
use crate::error::Error;
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use gate_core::config::LenPrefixConfig;
use std::net::SocketAddr;
use std::sync::Arc;

pub type WsConn = Conn<WsReader>;

pub struct WsReader {
    rx: SplitStream<WebSocket>,
    max_len: u32,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        loop {
            match self.rx.next().await {
                Some(Ok(Message::Binary(data))) => {
                    if data.len() as u32 > self.max_len {
                        return Err(gate_core::Error::TooLong.into());
                    }
                    return Ok(data);
                }
                // Browsers and keepalive proxies send these; they carry
                // no application message, so loop for the next frame.
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Text(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(Error::PeerClosed),
                Some(Err(err)) => return Err(Error::WebSocket(err.to_string())),
            }
        }
    }
}

pub struct WsFrameEncoder {
    max_len: u32,
}

impl FrameEncoder for WsFrameEncoder {
    fn encode(&self, fragments: &[&[u8]]) -> Result<Bytes, Error> {
        let total: usize = fragments.iter().map(|f| f.len()).sum();
        if total as u32 > self.max_len {
            return Err(gate_core::Error::TooLong.into());
        }
        let mut buf = Vec::with_capacity(total);
        for fragment in fragments {
            buf.extend_from_slice(fragment);
        }
        Ok(Bytes::from(buf))
    }
}

struct WsSink {
    tx: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send_frame(&mut self, data: Bytes) -> std::io::Result<()> {
        self.tx
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::BrokenPipe, err.to_string()))
    }

    async fn shutdown(&mut self) {
        let _ = self.tx.send(Message::Close(None)).await;
        let _ = self.tx.close().await;
    }

    // A websocket frame close is already as immediate as this
    // transport gets; there's no socket-level linger to disable.
}

/// Builds a [`WsConn`] from an accepted `axum` websocket upgrade.
pub fn new_ws_conn(
    socket: WebSocket,
    local: Option<SocketAddr>,
    remote: Option<SocketAddr>,
    frame_config: LenPrefixConfig,
    pending_write_num: usize,
) -> WsConn {
    let missing = || std::io::Error::from(std::io::ErrorKind::NotFound);
    let (local, remote) = addr_pair(local.ok_or_else(missing), remote.ok_or_else(missing));
    let (tx, rx) = socket.split();

    let reader = WsReader {
        rx,
        max_len: frame_config.max_len,
    };
    let sink = WsSink { tx };
    let encoder: Arc<dyn FrameEncoder> = Arc::new(WsFrameEncoder {
        max_len: frame_config.max_len,
    });
    let (handle, _writer): (ConnHandle, _) =
        spawn_writer(sink, encoder, pending_write_num, local, remote);

    Conn::new(reader, handle)
}
