//! Stream (TCP) server accept loop.

use super::{Lifecycle, ServerConfig};
use crate::agent::Agent;
use crate::conn::{new_stream_conn, StreamConn, StreamReader};
use crate::error::Error;
use gate_core::config::LenPrefixConfig;
use gate_core::framer::LenPrefixFramer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::ReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

type StreamAgent = Agent<StreamReader<ReadHalf<TcpStream>>>;

/// A running TCP accept loop. Drop does not stop it — call
/// [`Self::close`] and await it for a clean, drained shutdown.
pub struct StreamServer {
    local_addr: SocketAddr,
    lifecycle: Arc<Lifecycle>,
    accept_task: JoinHandle<()>,
}

impl StreamServer {
    /// Binds `addr` and starts accepting connections immediately.
    /// `new_agent` is called once per accepted connection, after the
    /// connection cap has been checked and the connection inserted
    /// into the live set; it is expected to wire the agent to a
    /// processor and RPC sink and may announce it via `Go("NewAgent",
    /// ..)` itself.
    pub async fn bind<F>(
        addr: SocketAddr,
        config: ServerConfig,
        framer_config: LenPrefixConfig,
        new_agent: F,
    ) -> Result<Self, Error>
    where
        F: Fn(StreamConn) -> Arc<StreamAgent> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind(addr).await.map_err(Error::Bind)?;
        let local_addr = listener.local_addr().map_err(Error::Bind)?;
        let lifecycle = Arc::new(Lifecycle::new(config.max_conn_num));
        let framer = LenPrefixFramer::new(framer_config);

        lifecycle.listener_barrier.enter();
        let loop_lifecycle = lifecycle.clone();
        let accept_task = tokio::spawn(async move {
            accept_loop(listener, config, framer, Arc::new(new_agent), loop_lifecycle.clone()).await;
            loop_lifecycle.listener_barrier.leave();
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

    /// Stops accepting, destroys every live connection, and waits for
    /// every agent task to finish.
    pub async fn close(self) {
        self.lifecycle.shutdown().await;
        let _ = self.accept_task.await;
    }
}

async fn accept_loop<F>(
    listener: TcpListener,
    config: ServerConfig,
    framer: LenPrefixFramer,
    new_agent: Arc<F>,
    lifecycle: Arc<Lifecycle>,
) where
    F: Fn(StreamConn) -> Arc<StreamAgent> + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = lifecycle.close.notified() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                let conn = match new_stream_conn(stream, framer, config.pending_write_num) {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(error = %err, peer = %peer, "failed to wrap accepted connection");
                        continue;
                    }
                };
                let Some(id) = lifecycle.conns.try_insert(conn.handle()) else {
                    tracing::debug!(peer = %peer, "too many connections");
                    conn.destroy();
                    continue;
                };

                let agent = new_agent(conn);
                lifecycle.conn_barrier.enter();
                let task_lifecycle = lifecycle.clone();
                tokio::spawn(async move {
                    agent.run().await;
                    task_lifecycle.conns.remove(id);
                    task_lifecycle.conn_barrier.leave();
                });
            }
        }
    }
}
