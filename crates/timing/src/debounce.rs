//! Coalescing debouncer
//!
//! Collapses bursts of signals into at most one deferred callback call. The
//! contract: at least one invocation within the delay after the latest
//! `emit()` of a burst, at most one invocation per burst. Optionally the
//! callback runs once immediately on spawn.
//!
//! One background task per instance; `emit()` never blocks (a capacity-1
//! channel drops redundant signals) and `stop()` cancels any pending fire.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handle to a debounce task.
///
/// Dropping the handle also shuts the task down (the signal channel closes).
pub struct Debouncer {
    signal: mpsc::Sender<()>,
    token: CancellationToken,
}

impl Debouncer {
    /// Spawn a debounce task invoking `callback` at most once per burst,
    /// `delay` after the burst's first signal.
    pub fn spawn<F, Fut>(delay: Duration, immediate: bool, mut callback: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (signal, mut rx) = mpsc::channel::<()>(1);
        let token = CancellationToken::new();
        let task_token = token.clone();

        tokio::spawn(async move {
            if immediate {
                callback().await;
            }

            let timer = tokio::time::sleep(delay);
            tokio::pin!(timer);
            let mut armed = false;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => return,

                    received = rx.recv() => {
                        if received.is_none() {
                            return;
                        }
                        if !armed {
                            timer.as_mut().reset(Instant::now() + delay);
                            armed = true;
                        }
                    }

                    _ = timer.as_mut(), if armed => {
                        callback().await;
                        armed = false;
                    }
                }
            }
        });

        Self { signal, token }
    }

    /// Signal the debouncer. Non-blocking; redundant signals within a burst
    /// coalesce.
    pub fn emit(&self) {
        let _ = self.signal.try_send(());
    }

    /// Cancel any pending fire and stop the background task. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
    }
}

#[cfg(test)]
#[path = "debounce_test.rs"]
mod debounce_test;
