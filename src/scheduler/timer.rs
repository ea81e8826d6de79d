//! One-shot cancellable timers on the tokio runtime.
//!
//! A timer moves `Pending -> Firing -> Done`, or `Pending -> Cancelled`.
//! Cancellation is refused while the timer is `Firing`, which lets the
//! caller of `deschedule` retry instead of racing the re-arm step.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

const PENDING: u8 = 0;
const FIRING: u8 = 1;
const CANCELLED: u8 = 2;
const DONE: u8 = 3;

/// Handle to an armed one-shot timer.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    state: Arc<AtomicU8>,
    token: CancellationToken,
}

impl TimerHandle {
    /// Arm a timer that runs `on_fire` after `delay`.
    ///
    /// `on_fire` runs while the timer is `Firing`; the future it returns runs
    /// after the timer is `Done`, so a long job does not block cancellation
    /// of the timer that replaced this one.
    pub(crate) fn arm<F, Fut>(runtime: &Handle, delay: Duration, on_fire: F) -> Self
    where
        F: FnOnce() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(PENDING));
        let token = CancellationToken::new();

        let task_state = state.clone();
        let task_token = token.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if task_state
                .compare_exchange(PENDING, FIRING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                return;
            }
            let work = on_fire();
            task_state.store(DONE, Ordering::SeqCst);
            if let Some(work) = work {
                work.await;
            }
        });

        Self { state, token }
    }

    /// Try to stop the timer.
    ///
    /// Returns `false` only if the timer is firing right now.
    pub(crate) fn cancel(&self) -> bool {
        match self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
        {
            Ok(_) => {
                self.token.cancel();
                true
            }
            Err(FIRING) => false,
            Err(_) => true,
        }
    }

    /// Whether the timer has not fired or been cancelled yet.
    pub(crate) fn is_pending(&self) -> bool {
        self.state.load(Ordering::SeqCst) == PENDING
    }

    /// Whether the timer is waiting or firing.
    pub(crate) fn is_live(&self) -> bool {
        matches!(self.state.load(Ordering::SeqCst), PENDING | FIRING)
    }
}
