//! One-shot and repeating timers that fire onto a module's own event
//! loop instead of running their callback on whatever task the delay
//! elapses on — the same "post the work back, don't run it here" shape
//! as [`crate::rpc::RpcServer`]'s async-return queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

/// One fired timer, ready to run on the owning loop.
pub struct TimerEntry(Box<dyn FnOnce() + Send>);

impl TimerEntry {
    pub fn fire(self) {
        (self.0)();
    }
}

/// A handle to a repeating timer. Dropping it does not stop the timer;
/// call [`Self::cancel`] explicitly.
#[derive(Clone)]
pub struct TimerHandle {
    stopped: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Schedules callbacks to fire after a delay (or on a fixed period)
/// and delivers them through one channel a [`crate::skeleton::FrameSkeleton`]
/// selects on, so timer callbacks always run on the module's own task
/// and never need their own synchronization.
pub struct TimerDispatcher {
    tx: mpsc::Sender<TimerEntry>,
    rx: AsyncMutex<mpsc::Receiver<TimerEntry>>,
}

impl TimerDispatcher {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Arc::new(Self {
            tx,
            rx: AsyncMutex::new(rx),
        })
    }

    /// Runs `cb` once, after `delay`, on the owning loop.
    pub fn after(self: &Arc<Self>, delay: Duration, cb: impl FnOnce() + Send + 'static) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(TimerEntry(Box::new(cb))).await.is_err() {
                tracing::debug!("timer dispatcher dropped before a one-shot timer fired");
            }
        });
    }

    /// Runs `cb` every `period`, on the owning loop, until the returned
    /// handle is cancelled.
    pub fn every(
        self: &Arc<Self>,
        period: Duration,
        cb: impl FnMut() + Send + 'static,
    ) -> TimerHandle {
        let tx = self.tx.clone();
        let stopped = Arc::new(AtomicBool::new(false));
        let handle = TimerHandle {
            stopped: stopped.clone(),
        };
        let cb = Arc::new(parking_lot::Mutex::new(cb));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                if stopped.load(Ordering::SeqCst) {
                    return;
                }
                let cb = cb.clone();
                let entry = TimerEntry(Box::new(move || {
                    (cb.lock())();
                }));
                if tx.send(entry).await.is_err() {
                    return;
                }
            }
        });
        handle
    }

    /// Awaits the next fired timer. Selected on by the frame skeleton.
    pub async fn chan_timer(&self) -> Option<TimerEntry> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn after_fires_once_past_the_delay() {
        let dispatcher = TimerDispatcher::new(4);
        let (tx, mut rx) = mpsc::channel(1);
        dispatcher.after(Duration::from_millis(5), move || {
            let _ = tx.try_send(());
        });

        let entry = dispatcher.chan_timer().await.unwrap();
        entry.fire();
        assert!(rx.recv().await.is_some());
    }
}
