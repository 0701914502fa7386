//! Cooperative cancellation/suspension token.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use netron_core::{NetronError, NetronResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Request {
    None,
    Cancel,
    Suspend,
}

struct SignalInner {
    request: Mutex<Request>,
    /// Task -> controller: request observed.
    ack: Notify,
    /// Controller -> task: leave the suspended park.
    resume: Notify,
}

/// Token handed to a running task.
///
/// The task calls [`TaskSignal::checkpoint`] at safe points; the
/// observer side posts cancel/suspend requests and waits for the
/// acknowledgment. Nothing is forcibly interrupted: a task that never
/// reaches a checkpoint simply runs to completion.
#[derive(Clone)]
pub struct TaskSignal {
    inner: Arc<SignalInner>,
}

impl TaskSignal {
    pub(crate) fn new() -> Self {
        TaskSignal {
            inner: Arc::new(SignalInner {
                request: Mutex::new(Request::None),
                ack: Notify::new(),
                resume: Notify::new(),
            }),
        }
    }

    /// Safe point. Returns `Err(Cancelled)` once cancellation has been
    /// requested (the task should propagate it); parks until resumed
    /// when suspension has been requested.
    pub async fn checkpoint(&self) -> NetronResult<()> {
        loop {
            {
                // Read the request and clear a suspend under one lock
                // hold, so a cancel can never land in between and get
                // overwritten.
                let mut request = self.inner.request.lock();
                match *request {
                    Request::None => return Ok(()),
                    Request::Cancel => {
                        self.inner.ack.notify_one();
                        return Err(NetronError::Cancelled);
                    }
                    Request::Suspend => *request = Request::None,
                }
            }
            self.inner.ack.notify_one();
            self.inner.resume.notified().await;
            // A cancel may have been posted while parked.
        }
    }

    /// Whether cancellation has been requested but not yet observed.
    pub fn cancel_requested(&self) -> bool {
        *self.inner.request.lock() == Request::Cancel
    }

    pub(crate) fn request_cancel(&self) {
        *self.inner.request.lock() = Request::Cancel;
        // Wake a task parked in a suspend.
        self.inner.resume.notify_one();
    }

    /// Post a suspend request and wait until the task acknowledges it at
    /// a checkpoint.
    pub(crate) async fn request_suspend(&self) {
        let acked = self.inner.ack.notified();
        *self.inner.request.lock() = Request::Suspend;
        acked.await;
    }

    pub(crate) fn request_resume(&self) {
        self.inner.resume.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoint_passes_when_idle() {
        let signal = TaskSignal::new();
        signal.checkpoint().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_observed_at_checkpoint() {
        let signal = TaskSignal::new();
        signal.request_cancel();
        assert!(signal.cancel_requested());
        assert!(matches!(
            signal.checkpoint().await,
            Err(NetronError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_suspend_parks_until_resume() {
        let signal = TaskSignal::new();
        let task_signal = signal.clone();

        let handle = tokio::spawn(async move {
            task_signal.checkpoint().await.unwrap();
            true
        });

        signal.request_suspend().await;
        assert!(!handle.is_finished());
        signal.request_resume();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancel_wins_over_pending_suspend() {
        let signal = TaskSignal::new();
        let task_signal = signal.clone();

        let handle = tokio::spawn(async move { task_signal.checkpoint().await });

        signal.request_suspend().await;
        // The task is parked; a cancel posted now must be observed as
        // Cancelled, not swallowed by the suspend handling.
        signal.request_cancel();
        assert!(matches!(
            handle.await.unwrap(),
            Err(NetronError::Cancelled)
        ));
    }
}
