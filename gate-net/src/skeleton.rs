//! The module event loop: one task draining every queue a module can
//! be pushed to, with an idle `Looper::update` tick when nothing else
//! is ready.
//!
//! Grounded directly on `FrameSkeleton.Run`: a `select` over a close
//! signal, the client's async-return queue, two call queues (the
//! module's own RPC surface and a separate "command" surface used for
//! admin/debug calls), a generic callback queue, and a timer queue,
//! falling through to `Looper::update` only when every branch would
//! otherwise block. The ~1000Hz cap on how often `update` can run is
//! reproduced with a trailing `tokio::time::sleep`.

use crate::rpc::RpcServer;
use crate::timer::TimerDispatcher;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const MIN_TICK: Duration = Duration::from_millis(1);

/// Ticked once per loop iteration in which no queued work was ready.
/// `dt` is the wall-clock time since the previous tick (of either
/// kind), letting the implementation drive fixed-step game logic.
pub trait Looper: Send {
    fn update(&mut self, dt: Duration);
}

/// A `Looper` that does nothing — for modules that only react to RPC
/// calls and have no per-frame state to advance.
pub struct NoopLooper;

impl Looper for NoopLooper {
    fn update(&mut self, _dt: Duration) {}
}

/// One module's complete set of queues: its own RPC surface, a second
/// surface for out-of-band "command" calls (introspection, admin
/// tooling), a generic callback sink, and a timer dispatcher.
///
/// `client` is the sink this module uses to make outbound async calls
/// to *other* modules; its `chan_asyn_ret`/`cb` pair is how those
/// calls' results come back to run on this module's own loop.
pub struct FrameSkeleton<L: Looper> {
    pub server: Arc<RpcServer>,
    pub command_server: Arc<RpcServer>,
    pub client: Arc<RpcServer>,
    pub g: Arc<RpcServer>,
    pub dispatcher: Arc<TimerDispatcher>,
    pub looper: L,
}

impl<L: Looper> FrameSkeleton<L> {
    pub fn new(
        server: Arc<RpcServer>,
        command_server: Arc<RpcServer>,
        client: Arc<RpcServer>,
        g: Arc<RpcServer>,
        dispatcher: Arc<TimerDispatcher>,
        looper: L,
    ) -> Self {
        Self {
            server,
            command_server,
            client,
            g,
            dispatcher,
            looper,
        }
    }

    /// Runs until `close_rx` fires, then drains both RPC sinks until
    /// idle before returning.
    pub async fn run(mut self, mut close_rx: oneshot::Receiver<()>) {
        let mut last_tick = Instant::now();
        loop {
            let begin = Instant::now();
            tokio::select! {
                biased;

                _ = &mut close_rx => {
                    self.command_server.close();
                    self.server.close();
                    while !self.g.idle() || !self.client.idle() {
                        self.g.close();
                        self.client.close();
                    }
                    return;
                }

                ret = self.client.chan_asyn_ret() => {
                    if let Some(ret) = ret {
                        self.client.cb(ret);
                    }
                }

                ci = self.server.chan_call() => {
                    if let Some(ci) = ci {
                        self.server.exec(ci);
                    }
                }

                ci = self.command_server.chan_call() => {
                    if let Some(ci) = ci {
                        self.command_server.exec(ci);
                    }
                }

                job = self.g.chan_cb() => {
                    if let Some(job) = job {
                        self.g.run_cb(job);
                    }
                }

                entry = self.dispatcher.chan_timer() => {
                    if let Some(entry) = entry {
                        entry.fire();
                    }
                }

                else => {
                    self.looper.update(begin.duration_since(last_tick));
                }
            }

            let elapsed = begin.elapsed();
            if elapsed < MIN_TICK {
                tokio::time::sleep(MIN_TICK - elapsed).await;
            }
            last_tick = begin;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLooper(Arc<AtomicUsize>);

    impl Looper for CountingLooper {
        fn update(&mut self, _dt: Duration) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn idle_loop_ticks_the_looper_and_exits_on_close() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let skeleton = FrameSkeleton::new(
            RpcServer::new(8),
            RpcServer::new(8),
            RpcServer::new(8),
            RpcServer::new(8),
            TimerDispatcher::new(8),
            CountingLooper(ticks.clone()),
        );
        let (close_tx, close_rx) = oneshot::channel();
        let handle = tokio::spawn(skeleton.run(close_rx));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ticks.load(Ordering::SeqCst) > 0);

        close_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn a_queued_call_runs_before_any_further_idle_tick_is_observed() {
        let server = RpcServer::new(8);
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        server.register("Ping", move |_args| {
            let _ = tx.try_send(());
        });
        let skeleton = FrameSkeleton::new(
            server.clone(),
            RpcServer::new(8),
            RpcServer::new(8),
            RpcServer::new(8),
            TimerDispatcher::new(8),
            NoopLooper,
        );
        let (close_tx, close_rx) = oneshot::channel();
        let handle = tokio::spawn(skeleton.run(close_rx));

        server.go("Ping", vec![]);
        assert!(rx.recv().await.is_some());

        close_tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
