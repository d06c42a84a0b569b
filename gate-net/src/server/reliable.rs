//! Reliable-UDP server accept loop.
//!
//! Identical shape to the stream server, parameterized over whatever
//! [`ReliableListener`] a deployment plugs in for its ARQ-over-UDP
//! sessions (a real KCP binding, most likely).

use super::{Lifecycle, ServerConfig};
use crate::agent::Agent;
use crate::conn::{new_reliable_conn, ReliableConn, ReliableListener, ReliableReader};
use gate_core::config::LenPrefixConfig;
use gate_core::framer::LenPrefixFramer;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A running reliable-UDP accept loop over session type `L::Session`.
pub struct ReliableServer {
    lifecycle: Arc<Lifecycle>,
    accept_task: JoinHandle<()>,
}

impl ReliableServer {
    pub fn start<L, F>(
        listener: L,
        config: ServerConfig,
        framer_config: LenPrefixConfig,
        new_agent: F,
    ) -> Self
    where
        L: ReliableListener + 'static,
        F: Fn(ReliableConn<L::Session>) -> Arc<Agent<ReliableReader<L::Session>>>
            + Send
            + Sync
            + 'static,
    {
        let lifecycle = Arc::new(Lifecycle::new(config.max_conn_num));
        let framer = LenPrefixFramer::new(framer_config);

        lifecycle.listener_barrier.enter();
        let loop_lifecycle = lifecycle.clone();
        let accept_task = tokio::spawn(async move {
            accept_loop(listener, config, framer, Arc::new(new_agent), loop_lifecycle.clone()).await;
            loop_lifecycle.listener_barrier.leave();
        });

        Self {
            lifecycle,
            accept_task,
        }
    }

    pub async fn close(self) {
        self.lifecycle.shutdown().await;
        let _ = self.accept_task.await;
    }
}

async fn accept_loop<L, F>(
    listener: L,
    config: ServerConfig,
    framer: LenPrefixFramer,
    new_agent: Arc<F>,
    lifecycle: Arc<Lifecycle>,
) where
    L: ReliableListener,
    F: Fn(ReliableConn<L::Session>) -> Arc<Agent<ReliableReader<L::Session>>> + Send + Sync + 'static,
{
    loop {
        tokio::select! {
            biased;
            _ = lifecycle.close.notified() => break,
            accepted = listener.accept() => {
                let (session, local, remote) = match accepted {
                    Ok(triple) => triple,
                    Err(err) => {
                        tracing::warn!(error = %err, "reliable accept failed");
                        continue;
                    }
                };
                let conn = match new_reliable_conn(session, local, remote, framer, config.pending_write_num) {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(error = %err, peer = %remote, "failed to wrap accepted session");
                        continue;
                    }
                };
                let Some(id) = lifecycle.conns.try_insert(conn.handle()) else {
                    tracing::debug!(peer = %remote, "too many connections");
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
