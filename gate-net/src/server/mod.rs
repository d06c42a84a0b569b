//! Server layer (C3): accept loops that cap, wrap, and spawn.
//!
//! All three transports share the same bookkeeping — a live-connection
//! set guarded by one lock, and a task-count barrier a shutdown waits
//! on — so it lives here once and each transport's accept loop
//! (`stream`, `ws`, `reliable`) only supplies the part that differs:
//! how a raw session turns into a framed [`crate::conn::Conn`].

mod reliable;
mod stream;
#[cfg(feature = "websocket")]
mod ws;

pub use reliable::ReliableServer;
pub use stream::StreamServer;
#[cfg(feature = "websocket")]
pub use ws::{WsServer, WsTlsConfig};

use crate::conn::ConnHandle;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Tuning shared by every server variant. Mirrors the source's
/// `MaxConnNum`/`PendingWriteNum` zero-means-default fields.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ServerConfig {
    pub max_conn_num: usize,
    pub pending_write_num: usize,
}

impl ServerConfig {
    pub fn new(max_conn_num: usize, pending_write_num: usize) -> Self {
        Self {
            max_conn_num: if max_conn_num == 0 { 100 } else { max_conn_num },
            pending_write_num: if pending_write_num == 0 { 100 } else { pending_write_num },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_conn_num: 100,
            pending_write_num: 100,
        }
    }
}

/// Counts in-flight tasks and lets a shutdown wait for the count to
/// reach zero — the async equivalent of `sync.WaitGroup` used for both
/// the listener barrier (one task) and the connections barrier (one
/// per live agent).
#[derive(Default)]
pub(crate) struct TaskBarrier {
    count: AtomicUsize,
    notify: Notify,
}

impl TaskBarrier {
    pub(crate) fn enter(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn leave(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub(crate) async fn wait_zero(&self) {
        while self.count.load(Ordering::SeqCst) != 0 {
            self.notify.notified().await;
        }
    }
}

/// The live-connection set every accept loop inserts into and every
/// finished agent task removes itself from.
pub(crate) struct ConnSet {
    live: Mutex<HashMap<u64, ConnHandle>>,
    next_id: AtomicU64,
    max_conn_num: usize,
}

impl ConnSet {
    pub(crate) fn new(max_conn_num: usize) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            max_conn_num,
        }
    }

    /// Tries to admit one more connection. Returns `None` (and leaves
    /// the set untouched) once `max_conn_num` is already live, per
    /// `spec.md` §4.3's cap check.
    pub(crate) fn try_insert(&self, handle: ConnHandle) -> Option<u64> {
        let mut live = self.live.lock();
        if live.len() >= self.max_conn_num {
            return None;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        live.insert(id, handle);
        Some(id)
    }

    pub(crate) fn remove(&self, id: u64) {
        self.live.lock().remove(&id);
    }

    /// Destroys and forgets every live connection. Called once during
    /// shutdown, under the same lock the accept loop uses, so no
    /// connection can be admitted in between.
    pub(crate) fn close_all(&self) {
        let mut live = self.live.lock();
        for (_, handle) in live.drain() {
            handle.destroy();
        }
    }
}

/// Shared accept-loop machinery: construct once per server, `admit`
/// each accepted raw connection, and `shutdown` to drain.
pub(crate) struct Lifecycle {
    pub(crate) conns: ConnSet,
    pub(crate) listener_barrier: Arc<TaskBarrier>,
    pub(crate) conn_barrier: Arc<TaskBarrier>,
    pub(crate) close: Arc<Notify>,
}

impl Lifecycle {
    pub(crate) fn new(max_conn_num: usize) -> Self {
        Self {
            conns: ConnSet::new(max_conn_num),
            listener_barrier: Arc::new(TaskBarrier::default()),
            conn_barrier: Arc::new(TaskBarrier::default()),
            close: Arc::new(Notify::new()),
        }
    }

    /// Signals the accept loop to stop, waits for it to exit, then
    /// destroys every live connection and waits for every agent task
    /// to finish — exactly the ordering `spec.md` §4.3 requires so no
    /// connection is admitted after shutdown begins.
    pub(crate) async fn shutdown(&self) {
        self.close.notify_waiters();
        self.listener_barrier.wait_zero().await;
        self.conns.close_all();
        self.conn_barrier.wait_zero().await;
    }
}
