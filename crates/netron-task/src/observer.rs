//! Handle onto a launched task: state, control, outcome.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use netron_core::{NetronError, NetronResult, Value};

use crate::signal::TaskSignal;
use crate::state::{TaskInfo, TaskState};

type Finalizer = Box<dyn FnOnce() + Send>;

struct ObserverShared {
    info: TaskInfo,
    signal: TaskSignal,
    state_tx: watch::Sender<TaskState>,
    outcome: Mutex<Option<NetronResult<Value>>>,
    finalizers: Mutex<FinalizerQueue>,
}

#[derive(Default)]
struct FinalizerQueue {
    pending: Vec<Finalizer>,
    drained: bool,
}

/// Cheaply cloneable handle onto one task execution.
///
/// All control operations act through the shared [`TaskSignal`]; the
/// task itself is only ever interrupted at its own checkpoints.
#[derive(Clone)]
pub struct TaskObserver {
    shared: Arc<ObserverShared>,
}

impl TaskObserver {
    pub(crate) fn new(info: TaskInfo) -> Self {
        let (state_tx, _) = watch::channel(TaskState::Idle);
        TaskObserver {
            shared: Arc::new(ObserverShared {
                info,
                signal: TaskSignal::new(),
                state_tx,
                outcome: Mutex::new(None),
                finalizers: Mutex::new(FinalizerQueue::default()),
            }),
        }
    }

    pub fn info(&self) -> &TaskInfo {
        &self.shared.info
    }

    pub fn name(&self) -> &str {
        &self.shared.info.name
    }

    pub fn signal(&self) -> TaskSignal {
        self.shared.signal.clone()
    }

    pub fn state(&self) -> TaskState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == TaskState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub(crate) fn mark_running(&self) {
        self.shared.state_tx.send_replace(TaskState::Running);
    }

    /// Request cooperative cancellation and wait for the task to settle.
    /// A no-op on an already finished task.
    pub async fn cancel(&self) -> NetronResult<()> {
        if !self.shared.info.cancelable {
            return Err(NetronError::NotAllowed("task is not cancelable".into()));
        }
        match self.state() {
            TaskState::Running | TaskState::Suspended | TaskState::Idle => {
                self.shared.state_tx.send_replace(TaskState::Cancelling);
                self.shared.signal.request_cancel();
                self.wait().await;
                Ok(())
            }
            TaskState::Cancelling => {
                self.wait().await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Park the task at its next checkpoint. Resolves once the task has
    /// acknowledged the suspension.
    pub async fn suspend(&self) -> NetronResult<()> {
        if !self.shared.info.suspendable {
            return Err(NetronError::NotAllowed("task is not suspendable".into()));
        }
        match self.state() {
            TaskState::Suspended => Ok(()),
            TaskState::Running => {
                // The task may settle without ever reaching another
                // checkpoint; watch for that instead of waiting on an
                // acknowledgment that will never come.
                let acked = self.shared.signal.request_suspend();
                tokio::pin!(acked);
                let mut rx = self.shared.state_tx.subscribe();
                loop {
                    tokio::select! {
                        _ = &mut acked => {
                            self.shared.state_tx.send_replace(TaskState::Suspended);
                            return Ok(());
                        }
                        changed = rx.changed() => {
                            if changed.is_err() || rx.borrow().is_terminal() {
                                return Err(NetronError::NotAllowed(
                                    "task already finished".into(),
                                ));
                            }
                        }
                    }
                }
            }
            state => Err(NetronError::NotAllowed(format!(
                "cannot suspend task in state '{state}'"
            ))),
        }
    }

    /// Suspend, then automatically resume after `timeout`, invoking
    /// `before_resume` just before the task is released.
    pub async fn suspend_for(
        &self,
        timeout: Duration,
        before_resume: impl FnOnce() + Send + 'static,
    ) -> NetronResult<()> {
        self.suspend().await?;
        let observer = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            before_resume();
            if let Err(err) = observer.resume() {
                tracing::debug!(task = %observer.name(), %err, "timed resume skipped");
            }
        });
        Ok(())
    }

    /// Release a suspended task.
    pub fn resume(&self) -> NetronResult<()> {
        if self.state() != TaskState::Suspended {
            return Err(NetronError::NotAllowed("task is not suspended".into()));
        }
        self.shared.state_tx.send_replace(TaskState::Running);
        self.shared.signal.request_resume();
        Ok(())
    }

    /// Run `f` once the task settles, in submission order. Runs
    /// immediately if the task has already settled.
    pub fn finally(&self, f: impl FnOnce() + Send + 'static) {
        {
            let mut queue = self.shared.finalizers.lock();
            if !queue.drained {
                queue.pending.push(Box::new(f));
                return;
            }
        }
        f();
    }

    /// Wait for the task to settle and return its terminal state.
    pub async fn wait(&self) -> TaskState {
        let mut rx = self.shared.state_tx.subscribe();
        loop {
            let state = *rx.borrow_and_update();
            if state.is_terminal() {
                return state;
            }
            if rx.changed().await.is_err() {
                return state;
            }
        }
    }

    /// Wait for the task to settle and return its outcome.
    pub async fn result(&self) -> NetronResult<Value> {
        self.wait().await;
        match self.shared.outcome.lock().clone() {
            Some(outcome) => outcome,
            None => Err(NetronError::Internal("task settled without outcome".into())),
        }
    }

    pub(crate) fn settle(&self, outcome: NetronResult<Value>) {
        let cancelling = self.state() == TaskState::Cancelling;
        let terminal = match &outcome {
            Err(NetronError::Cancelled) => TaskState::Cancelled,
            Err(_) if cancelling => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
            Ok(_) if cancelling => TaskState::Cancelled,
            Ok(_) => TaskState::Completed,
        };
        if let Err(err) = &outcome {
            if terminal == TaskState::Failed {
                tracing::debug!(task = %self.name(), %err, "task failed");
            }
        }
        *self.shared.outcome.lock() = Some(outcome);
        self.shared.state_tx.send_replace(terminal);

        let pending = {
            let mut queue = self.shared.finalizers.lock();
            queue.drained = true;
            std::mem::take(&mut queue.pending)
        };
        for f in pending {
            f();
        }
    }
}
