//! Per-connection session object (`gate.agent` in the source).
//!
//! `Agent::run`'s read loop is the one place every inbound message
//! passes through: read a frame, hand it to the processor, and tear
//! the whole session down on the first error of any kind. The agent
//! itself — not its `user_data` slot — is what `Processor::route`
//! passes to handlers and routers as the opaque per-call context,
//! exactly as the source's `a.processor.Route(msg, a)` hands the
//! `*agent` itself to `Route`, not `a.userData`; a handler recovers
//! the agent from that context to call back into `write_msg`, and only
//! separately reaches into `user_data` for whatever the owning module
//! has stashed there.

use crate::conn::{Conn, FrameReader};
use crate::processor::{Processor, UserData};
use crate::rpc::RpcServer;
use gate_core::WireMessage;
use parking_lot::Mutex;
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

/// A live session: a connection, the processor it decodes through, and
/// the RPC sink its lifecycle events are reported to.
///
/// Always held as `Arc<Agent<R>>` — `run` and `on_close` pass a clone
/// of that `Arc`, type-erased, as the `userData` argument to
/// `Processor::route` and the `CloseAgent` RPC call, so handlers
/// receive a handle back to this agent rather than an inert value.
pub struct Agent<R> {
    conn: Conn<R>,
    processor: Arc<Processor>,
    rpc: Option<Arc<RpcServer>>,
    user_data: Mutex<Option<UserData>>,
}

impl<R: FrameReader + 'static> Agent<R> {
    /// Builds a new agent. Does not itself announce the connection to
    /// the RPC sink — whether that happens, and under what call name
    /// (`"NewAgent"` vs `"NewKCPAgent"`), is a per-transport decision
    /// the gate's agent factory makes after construction, per
    /// `spec.md` §4.6.
    pub fn new(conn: Conn<R>, processor: Arc<Processor>, rpc: Option<Arc<RpcServer>>) -> Arc<Self> {
        Arc::new(Self {
            conn,
            processor,
            rpc,
            user_data: Mutex::new(None),
        })
    }

    /// Type-erases this agent handle for use as an RPC argument or as
    /// the `userData` `Processor::route` hands to handlers/routers.
    /// Also what a transport's agent factory passes to the `"NewAgent"`
    /// (or `"NewKCPAgent"`) announcement it makes after construction.
    pub fn as_user_data(self: &Arc<Self>) -> UserData {
        self.clone() as Arc<dyn Any + Send + Sync>
    }

    /// Reads and routes messages until the connection errors or the
    /// peer closes it, then closes the connection and reports
    /// `CloseAgent` to the RPC sink. Runs to completion on the
    /// connection's dedicated read task.
    pub async fn run(self: &Arc<Self>) {
        loop {
            let data = match self.conn.read_msg().await {
                Ok(data) => data,
                Err(err) => {
                    tracing::debug!(error = %err, "agent: read message failed, closing");
                    break;
                }
            };
            if let Err(err) = self.processor.route(&data, Some(self.as_user_data())) {
                tracing::debug!(error = %err, "agent: route message failed, closing");
                break;
            }
        }
        self.conn.close();
        self.on_close().await;
    }

    async fn on_close(self: &Arc<Self>) {
        let Some(rpc) = &self.rpc else { return };
        if let Err(err) = rpc.call0("CloseAgent", vec![self.as_user_data()]).await {
            tracing::error!(error = %err, "chanrpc error");
        }
    }

    /// Encodes `msg` through the agent's processor and writes it.
    /// Marshal/write failures are logged, not propagated — the source
    /// treats `WriteMsg` as fire-and-forget from the application's
    /// point of view.
    pub fn write_msg<M: WireMessage>(&self, msg: &M) {
        let data = match self.processor.encode(msg) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(error = %err, name = M::NAME, "marshal message error");
                return;
            }
        };
        if let Err(err) = self.conn.write_msg(&[&data]) {
            tracing::error!(error = %err, name = M::NAME, "write message error");
        }
    }

    pub fn close(&self) {
        self.conn.close();
    }

    pub fn destroy(&self) {
        self.conn.destroy();
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.conn.local_addr()
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.conn.remote_addr()
    }

    /// The one opaque value the owning module has stored on this
    /// agent. Not synchronized against concurrent writers beyond what
    /// is needed for memory safety — callers are expected to confine
    /// mutation to their own module's event loop, per `spec.md` §4.5.
    pub fn user_data(&self) -> Option<UserData> {
        self.user_data.lock().clone()
    }

    pub fn set_user_data(&self, data: UserData) {
        *self.user_data.lock() = Some(data);
    }

    /// Recovers a typed agent handle from the opaque `userData` a
    /// `Processor` handler or router received, mirroring a Go type
    /// assertion on the `interface{}` the source hands to `Route`.
    pub fn downcast(user_data: &UserData) -> Option<Arc<Self>> {
        user_data.clone().downcast::<Self>().ok()
    }
}
