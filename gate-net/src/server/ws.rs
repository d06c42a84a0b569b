//! WebSocket server: an `axum` HTTP server with a single upgrade
//! route, sharing the same cap/wrap/spawn bookkeeping as the stream
//! and reliable-UDP servers.

use super::{Lifecycle, ServerConfig};
use crate::agent::Agent;
use crate::conn::{new_ws_conn, WsConn, WsReader};
use crate::error::Error;
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use gate_core::config::LenPrefixConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::timeout::TimeoutLayer;

type WsAgent = Agent<WsReader>;

/// `CertFile`/`KeyFile` pair enabling TLS on the websocket HTTP
/// server, the direct Rust equivalent of the source's `Gate.CertFile`/
/// `Gate.KeyFile` toggling `http.Server.ListenAndServeTLS`.
#[derive(Debug, Clone)]
pub struct WsTlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

pub struct WsServer {
    local_addr: SocketAddr,
    lifecycle: Arc<Lifecycle>,
    accept_task: JoinHandle<()>,
}

struct WsState<F> {
    config: ServerConfig,
    frame_config: LenPrefixConfig,
    new_agent: Arc<F>,
    lifecycle: Arc<Lifecycle>,
}

impl<F> Clone for WsState<F> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            frame_config: self.frame_config,
            new_agent: self.new_agent.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl WsServer {
    /// Binds `addr` as a websocket endpoint at `/`. `http_timeout`, if
    /// set, is applied as a request-timeout layer over the whole
    /// router (the source's `HTTPTimeout` field on `http.Server`);
    /// `tls`, if set, serves HTTPS/WSS via `axum-server`'s rustls
    /// integration instead of plain HTTP, exactly the source's
    /// `CertFile`/`KeyFile`-present check before calling
    /// `ListenAndServeTLS`.
    pub async fn bind<F>(
        addr: SocketAddr,
        config: ServerConfig,
        frame_config: LenPrefixConfig,
        http_timeout: Option<Duration>,
        tls: Option<WsTlsConfig>,
        new_agent: F,
    ) -> Result<Self, Error>
    where
        F: Fn(WsConn) -> Arc<WsAgent> + Send + Sync + 'static,
    {
        let lifecycle = Arc::new(Lifecycle::new(config.max_conn_num));
        let state = WsState {
            config,
            frame_config,
            new_agent: Arc::new(new_agent),
            lifecycle: lifecycle.clone(),
        };
        let mut router = Router::new().route("/", get(upgrade::<F>)).with_state(state);
        if let Some(timeout) = http_timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }
        let app = router.into_make_service_with_connect_info::<SocketAddr>();

        let handle = Handle::new();

        lifecycle.listener_barrier.enter();
        let loop_lifecycle = lifecycle.clone();
        let serve_handle = handle.clone();
        let accept_task = tokio::spawn(async move {
            let result = async {
                match tls {
                    Some(tls) => {
                        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                            .await
                            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
                        axum_server::bind_rustls(addr, rustls_config)
                            .handle(serve_handle)
                            .serve(app)
                            .await
                    }
                    None => axum_server::bind(addr).handle(serve_handle).serve(app).await,
                }
            }
            .await;
            if let Err(err) = result {
                tracing::warn!(error = %err, "websocket server exited with error");
            }
            loop_lifecycle.listener_barrier.leave();
        });

        // Bounded: a bad cert/key never calls `Handle::notify_listening`,
        // so an unbounded wait here would hang `bind` forever instead of
        // surfacing the load failure from the task above.
        let local_addr = tokio::time::timeout(Duration::from_secs(5), handle.listening())
            .await
            .map_err(|_| Error::Bind(std::io::Error::new(std::io::ErrorKind::TimedOut, "websocket server did not start listening in time")))?
            .ok_or_else(|| Error::Tls("websocket server failed to bind (see prior log line)".to_string()))?;

        let shutdown_lifecycle = lifecycle.clone();
        tokio::spawn(async move {
            shutdown_lifecycle.close.notified().await;
            handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        Ok(Self {
            local_addr,
            lifecycle,
            accept_task,
        })
    }

    /// The address actually bound — useful when `addr`'s port was `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub async fn close(self) {
        self.lifecycle.shutdown().await;
        let _ = self.accept_task.await;
    }
}

async fn upgrade<F>(
    State(state): State<WsState<F>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse
where
    F: Fn(WsConn) -> Arc<WsAgent> + Send + Sync + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, remote, state))
}

async fn handle_socket<F>(socket: WebSocket, remote: SocketAddr, state: WsState<F>)
where
    F: Fn(WsConn) -> Arc<WsAgent> + Send + Sync + 'static,
{
    let conn = new_ws_conn(
        socket,
        None,
        Some(remote),
        state.frame_config,
        state.config.pending_write_num,
    );
    let Some(id) = state.lifecycle.conns.try_insert(conn.handle()) else {
        tracing::debug!(peer = %remote, "too many connections");
        conn.destroy();
        return;
    };

    let agent = (state.new_agent)(conn);
    state.lifecycle.conn_barrier.enter();
    agent.run().await;
    state.lifecycle.conns.remove(id);
    state.lifecycle.conn_barrier.leave();
}
