//! Fixed-delay recurring task execution.
//!
//! The delay is measured from the completion of one run to the start of the
//! next, so a slow callback stretches the schedule instead of overlapping it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

/// Drives a caller-supplied asynchronous callback on a fixed-delay schedule.
///
/// The callback's output is discarded: a failing run is the callback's own
/// responsibility to log, and never stops the schedule. At most one run is in
/// flight at any time.
pub struct Runner<F> {
    callback: Arc<Mutex<F>>,
    interval: Duration,
    stop_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl<F, Fut> Runner<F>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
{
    pub fn new(callback: F, interval: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            callback: Arc::new(Mutex::new(callback)),
            interval,
            stop_tx,
            handle: None,
        }
    }

    /// Starts the schedule. The first run begins immediately; every later run
    /// starts `interval` after the previous one settled. No-op while a
    /// schedule is already active.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let (stop_tx, mut stop_rx) = watch::channel(false);
        self.stop_tx = stop_tx;

        let callback = Arc::clone(&self.callback);
        let interval = self.interval;

        self.handle = Some(tokio::spawn(async move {
            loop {
                if *stop_rx.borrow() {
                    break;
                }

                {
                    let mut callback = callback.lock().await;
                    let _ = (*callback)().await;
                }

                if *stop_rx.borrow() {
                    break;
                }

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }));
    }

    /// Signals the schedule to halt and waits for any in-flight run to
    /// settle. Idempotent; resolves immediately when idle.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}
