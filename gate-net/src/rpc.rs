//! A minimal channel-RPC sink in the shape the frame skeleton expects.
//!
//! `gate-net` does not depend on a particular `chanrpc` implementation
//! — the wider gate architecture treats that package as an external
//! collaborator and only specifies the surface the core uses:
//! `go`/`call0` for producers, `chan_call`/`exec` for the consuming
//! module loop, plus the async-return and callback queues the skeleton
//! also selects over. `RpcServer` is that surface, built the same way
//! every other queue in this crate is: a bounded `tokio::sync::mpsc`
//! channel with `try_send` for the fire-and-forget path.
//!
//! Unlike the source's per-call-site `reflect.Value` dispatch, handlers
//! here are registered once up front under a stable name and resolved
//! at `exec` time — registration follows the processor registry's own
//! rule that duplicate names are a startup bug, not a runtime
//! condition, so `register` panics on collision.

use crate::error::Error;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};

/// One positional argument to an RPC call. Handlers downcast with
/// `Any::downcast_ref`.
pub type RpcArg = Arc<dyn Any + Send + Sync>;
pub type RpcArgs = Vec<RpcArg>;
type RpcHandler = dyn Fn(RpcArgs) + Send + Sync;

/// One queued `go`/`call0` invocation, resolved against the function
/// table at enqueue time.
pub struct CallInfo {
    pub name: &'static str,
    pub args: RpcArgs,
    handler: Option<Arc<RpcHandler>>,
    ack: Option<oneshot::Sender<()>>,
}

/// One queued asynchronous return: the result of work done outside the
/// module's own task, to be run back on the module's event loop.
pub struct RetInfo(Box<dyn FnOnce() + Send>);

/// One queued callback with no associated call — the generic
/// "run this on the module loop" queue (`g.ChanCb`/`g.Cb` in the
/// source).
pub struct CbJob(Box<dyn FnOnce() + Send>);

/// The chanrpc-equivalent surface a [`crate::skeleton::FrameSkeleton`]
/// drains: a call queue, an async-return queue, and a callback queue,
/// each pushed to by any task and drained by exactly one.
pub struct RpcServer {
    functions: RwLock<HashMap<&'static str, Arc<RpcHandler>>>,
    call_tx: mpsc::Sender<CallInfo>,
    call_rx: AsyncMutex<mpsc::Receiver<CallInfo>>,
    ret_tx: mpsc::Sender<RetInfo>,
    ret_rx: AsyncMutex<mpsc::Receiver<RetInfo>>,
    cb_tx: mpsc::Sender<CbJob>,
    cb_rx: AsyncMutex<mpsc::Receiver<CbJob>>,
    in_flight: AtomicUsize,
    closed: AtomicBool,
}

impl RpcServer {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (call_tx, call_rx) = mpsc::channel(capacity.max(1));
        let (ret_tx, ret_rx) = mpsc::channel(capacity.max(1));
        let (cb_tx, cb_rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            functions: RwLock::new(HashMap::new()),
            call_tx,
            call_rx: AsyncMutex::new(call_rx),
            ret_tx,
            ret_rx: AsyncMutex::new(ret_rx),
            cb_tx,
            cb_rx: AsyncMutex::new(cb_rx),
            in_flight: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Registers the handler invoked for `name` by [`Self::exec`].
    /// Calling this twice for the same name, or after the server has
    /// started serving, is a wiring bug and panics.
    pub fn register(&self, name: &'static str, f: impl Fn(RpcArgs) + Send + Sync + 'static) {
        let mut functions = self.functions.write();
        if functions.contains_key(name) {
            panic!("rpc function {name} is already registered");
        }
        functions.insert(name, Arc::new(f));
    }

    /// Fire-and-forget call: enqueues without waiting for `exec` to
    /// run it. Silently dropped if the queue is full or the server is
    /// closed — mirrors `Processor::route`'s router path, which must
    /// never block the caller.
    pub fn go(&self, name: &'static str, args: RpcArgs) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let handler = self.functions.read().get(name).cloned();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let ci = CallInfo {
            name,
            args,
            handler,
            ack: None,
        };
        if self.call_tx.try_send(ci).is_err() {
            tracing::warn!(name, "rpc queue full, dropping call");
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Enqueues a call and waits for `exec` to run it on the owning
    /// module's loop. Used for calls whose caller needs a completion
    /// signal but no return value (`OnClose`'s `CloseAgent`, in
    /// particular).
    pub async fn call0(&self, name: &'static str, args: RpcArgs) -> Result<(), Error> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::RpcClosed);
        }
        let handler = self.functions.read().get(name).cloned();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let ci = CallInfo {
            name,
            args,
            handler,
            ack: Some(ack_tx),
        };
        self.call_tx.send(ci).await.map_err(|_| Error::RpcClosed)?;
        ack_rx.await.map_err(|_| Error::RpcClosed)
    }

    /// Awaits the next queued call. Selected on by the frame skeleton.
    pub async fn chan_call(&self) -> Option<CallInfo> {
        self.call_rx.lock().await.recv().await
    }

    /// Runs one call's handler and acknowledges its caller, if any.
    pub fn exec(&self, ci: CallInfo) {
        match &ci.handler {
            Some(f) => f(ci.args),
            None => tracing::error!(name = ci.name, "rpc: no function registered"),
        }
        if let Some(ack) = ci.ack {
            let _ = ack.send(());
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Queues `cb` to run on the module loop once some other task's
    /// work completes — the async-call return path.
    pub fn asyn_call(&self, cb: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.ret_tx
            .try_send(RetInfo(Box::new(cb)))
            .map_err(|_| {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                Error::RpcClosed
            })
    }

    pub async fn chan_asyn_ret(&self) -> Option<RetInfo> {
        self.ret_rx.lock().await.recv().await
    }

    pub fn cb(&self, ret: RetInfo) {
        (ret.0)();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// Queues a plain callback with no associated call record.
    pub fn post_cb(&self, job: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.cb_tx.try_send(CbJob(Box::new(job))).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Error::RpcClosed
        })
    }

    pub async fn chan_cb(&self) -> Option<CbJob> {
        self.cb_rx.lock().await.recv().await
    }

    pub fn run_cb(&self, job: CbJob) {
        (job.0)();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// `true` once every queue is empty and no call is awaiting `exec`.
    pub fn idle(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) == 0
    }

    /// Stops accepting new `go`/`call0` work. Idempotent; safe to call
    /// repeatedly, matching the shutdown loop in
    /// [`crate::skeleton::FrameSkeleton::run`] which calls `close`
    /// until both sinks report idle.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn go_then_exec_runs_the_registered_handler() {
        let rpc = RpcServer::new(8);
        let (tx, mut rx) = mpsc::channel(1);
        rpc.register("Ping", move |_args| {
            let _ = tx.try_send(());
        });

        rpc.go("Ping", vec![]);
        let ci = rpc.chan_call().await.unwrap();
        rpc.exec(ci);

        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn call0_resolves_once_exec_runs() {
        let rpc = RpcServer::new(8);
        rpc.register("CloseAgent", |_| {});

        let rpc2 = rpc.clone();
        let call = tokio::spawn(async move { rpc2.call0("CloseAgent", vec![]).await });

        let ci = rpc.chan_call().await.unwrap();
        assert!(!rpc.idle());
        rpc.exec(ci);

        call.await.unwrap().unwrap();
        assert!(rpc.idle());
    }

    #[tokio::test]
    async fn idle_reflects_in_flight_work_across_all_three_queues() {
        let rpc = RpcServer::new(8);
        assert!(rpc.idle());

        rpc.post_cb(|| {}).unwrap();
        assert!(!rpc.idle());
        let job = rpc.chan_cb().await.unwrap();
        rpc.run_cb(job);
        assert!(rpc.idle());

        rpc.asyn_call(|| {}).unwrap();
        assert!(!rpc.idle());
        let ret = rpc.chan_asyn_ret().await.unwrap();
        rpc.cb(ret);
        assert!(rpc.idle());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_register_panics() {
        let rpc = RpcServer::new(8);
        rpc.register("Dup", |_| {});
        rpc.register("Dup", |_| {});
    }

    #[tokio::test]
    async fn close_rejects_new_call0s() {
        let rpc = RpcServer::new(8);
        rpc.close();
        let err = rpc.call0("Anything", vec![]).await.unwrap_err();
        assert!(matches!(err, Error::RpcClosed));
    }
}
