//! Gate lifecycle (C6): the union of up to three transport servers
//! behind one `run`/shutdown call, exactly `spec.md` §4.6's `Gate`.

use crate::agent::Agent;
use crate::conn::{ReliableConn, ReliableListener, ReliableReader, StreamConn, StreamReader, WsConn};
#[cfg(feature = "websocket")]
use crate::conn::WsReader;
use crate::server::{ReliableServer, ServerConfig, StreamServer};
#[cfg(feature = "websocket")]
use crate::server::{WsServer, WsTlsConfig};
use gate_core::config::LenPrefixConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
#[cfg(feature = "websocket")]
use std::time::Duration;
use tokio::io::ReadHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;

type StreamAgentFactory = Arc<dyn Fn(StreamConn) -> Arc<Agent<StreamReader<ReadHalf<TcpStream>>>> + Send + Sync>;
#[cfg(feature = "websocket")]
type WsAgentFactory = Arc<dyn Fn(WsConn) -> Arc<Agent<WsReader>> + Send + Sync>;

/// A [`ReliableListener`] that never accepts a session — the default
/// reliable-UDP slot for a [`Gate`] that doesn't configure one, so the
/// type parameter doesn't have to be named when it isn't used.
pub struct NoReliableListener;

#[async_trait::async_trait]
impl ReliableListener for NoReliableListener {
    type Session = tokio::io::DuplexStream;

    async fn accept(&self) -> std::io::Result<(Self::Session, SocketAddr, SocketAddr)> {
        std::future::pending().await
    }
}

/// The union of transport configuration a `Gate` starts.
///
/// Only the transports with `Some(addr)` (stream/websocket) or
/// `Some(listener)` (reliable) are started; the rest are skipped
/// entirely, matching the source's "non-empty address ⇒ start"
/// per-transport check in `gate.Run`.
pub struct Gate<L: ReliableListener = NoReliableListener> {
    pub stream_addr: Option<SocketAddr>,
    pub stream_framer: LenPrefixConfig,
    pub new_stream_agent: Option<StreamAgentFactory>,

    #[cfg(feature = "websocket")]
    pub ws_addr: Option<SocketAddr>,
    #[cfg(feature = "websocket")]
    pub ws_framer: LenPrefixConfig,
    #[cfg(feature = "websocket")]
    pub new_ws_agent: Option<WsAgentFactory>,
    /// The source's `Gate.HTTPTimeout`: a request-timeout layer over
    /// the whole websocket router. `None` applies no timeout.
    #[cfg(feature = "websocket")]
    pub ws_http_timeout: Option<Duration>,
    /// The source's `Gate.CertFile`/`Gate.KeyFile`: present together to
    /// serve the websocket endpoint over TLS instead of plain HTTP.
    #[cfg(feature = "websocket")]
    pub ws_tls: Option<WsTlsConfig>,

    pub reliable_listener: Option<L>,
    pub reliable_framer: LenPrefixConfig,
    pub new_reliable_agent:
        Option<Arc<dyn Fn(ReliableConn<L::Session>) -> Arc<Agent<ReliableReader<L::Session>>> + Send + Sync>>,

    pub server_config: ServerConfig,
}

impl<L: ReliableListener> Default for Gate<L> {
    fn default() -> Self {
        Self {
            stream_addr: None,
            stream_framer: LenPrefixConfig::default(),
            new_stream_agent: None,
            #[cfg(feature = "websocket")]
            ws_addr: None,
            #[cfg(feature = "websocket")]
            ws_framer: LenPrefixConfig::default(),
            #[cfg(feature = "websocket")]
            new_ws_agent: None,
            #[cfg(feature = "websocket")]
            ws_http_timeout: None,
            #[cfg(feature = "websocket")]
            ws_tls: None,
            reliable_listener: None,
            reliable_framer: LenPrefixConfig::default(),
            new_reliable_agent: None,
            server_config: ServerConfig::default(),
        }
    }
}

impl<L: ReliableListener + 'static> Gate<L> {
    /// Starts every configured transport, blocks until `close_rx`
    /// fires, then closes each started server in turn and waits for
    /// its connections to drain.
    pub async fn run(self, close_rx: oneshot::Receiver<()>) -> Result<(), crate::error::Error> {
        let mut closers: Vec<Pin<Box<dyn Future<Output = ()> + Send>>> = Vec::new();

        #[cfg(feature = "websocket")]
        let ws = if let (Some(addr), Some(new_agent)) = (self.ws_addr, self.new_ws_agent.clone()) {
            let server = WsServer::bind(
                addr,
                self.server_config,
                self.ws_framer,
                self.ws_http_timeout,
                self.ws_tls.clone(),
                move |conn| new_agent(conn),
            )
            .await?;
            Some(server)
        } else {
            None
        };

        let stream = if let (Some(addr), Some(new_agent)) =
            (self.stream_addr, self.new_stream_agent.clone())
        {
            let server = StreamServer::bind(addr, self.server_config, self.stream_framer, move |conn| {
                new_agent(conn)
            })
            .await?;
            Some(server)
        } else {
            None
        };

        let reliable = if let (Some(listener), Some(new_agent)) =
            (self.reliable_listener, self.new_reliable_agent.clone())
        {
            Some(ReliableServer::start(
                listener,
                self.server_config,
                self.reliable_framer,
                move |conn| new_agent(conn),
            ))
        } else {
            None
        };

        let _ = close_rx.await;

        #[cfg(feature = "websocket")]
        if let Some(server) = ws {
            closers.push(Box::pin(server.close()));
        }
        if let Some(server) = stream {
            closers.push(Box::pin(server.close()));
        }
        if let Some(server) = reliable {
            closers.push(Box::pin(server.close()));
        }
        for closer in closers {
            closer.await;
        }
        Ok(())
    }
}
