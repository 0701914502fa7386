//! Named task registry and launcher.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;

use netron_core::{BoxFuture, NetronError, NetronResult, PeerId, Value};

use crate::observer::TaskObserver;
use crate::signal::TaskSignal;
use crate::state::TaskInfo;

/// Everything a task body receives about its invocation.
pub struct TaskContext {
    /// Peer on whose behalf the task runs.
    pub peer_id: PeerId,
    pub args: Vec<Value>,
    pub signal: TaskSignal,
}

pub type TaskFn = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, NetronResult<Value>> + Send + Sync>;

/// Wrap an async closure into a [`TaskFn`].
pub fn task_fn<F, Fut>(f: F) -> TaskFn
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = NetronResult<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Registration-time description of a task.
pub struct TaskSpec {
    pub name: String,
    pub func: TaskFn,
    pub suspendable: bool,
    pub cancelable: bool,
    pub singleton: bool,
    pub description: String,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, func: TaskFn) -> Self {
        TaskSpec {
            name: name.into(),
            func,
            suspendable: false,
            cancelable: false,
            singleton: false,
            description: String::new(),
        }
    }

    pub fn suspendable(mut self) -> Self {
        self.suspendable = true;
        self
    }

    pub fn cancelable(mut self) -> Self {
        self.cancelable = true;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = text.into();
        self
    }
}

#[derive(Clone)]
struct TaskEntry {
    info: TaskInfo,
    func: TaskFn,
}

/// Registry of named tasks. Shared behind `Arc` by the runtime; every
/// launch spawns onto the ambient tokio runtime and is tracked through
/// a [`TaskObserver`].
#[derive(Default)]
pub struct TaskManager {
    tasks: RwLock<HashMap<String, TaskEntry>>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&self, spec: TaskSpec) -> NetronResult<()> {
        if spec.singleton && (spec.suspendable || spec.cancelable) {
            return Err(NetronError::NotAllowed(
                "singleton task cannot be suspendable or cancelable".into(),
            ));
        }
        let mut tasks = self.tasks.write();
        if tasks.contains_key(&spec.name) {
            return Err(NetronError::Exists(format!("task '{}'", spec.name)));
        }
        let info = TaskInfo {
            name: spec.name.clone(),
            suspendable: spec.suspendable,
            cancelable: spec.cancelable,
            singleton: spec.singleton,
            description: spec.description,
        };
        tasks.insert(spec.name, TaskEntry { info, func: spec.func });
        Ok(())
    }

    pub fn has_task(&self, name: &str) -> bool {
        self.tasks.read().contains_key(name)
    }

    pub fn task_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn task_info(&self, name: &str) -> Option<TaskInfo> {
        self.tasks.read().get(name).map(|e| e.info.clone())
    }

    pub fn delete_task(&self, name: &str) -> NetronResult<()> {
        match self.tasks.write().remove(name) {
            Some(_) => Ok(()),
            None => Err(NetronError::NotExists(format!("task '{name}'"))),
        }
    }

    /// Launch a registered task. Returns the observer immediately; the
    /// body runs on a spawned tokio task.
    pub fn run(&self, name: &str, peer_id: PeerId, args: Vec<Value>) -> NetronResult<TaskObserver> {
        let entry = self
            .tasks
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| NetronError::NotExists(format!("task '{name}'")))?;

        let observer = TaskObserver::new(entry.info);
        let ctx = TaskContext {
            peer_id,
            args,
            signal: observer.signal(),
        };
        let fut = (entry.func)(ctx);
        observer.mark_running();
        tracing::debug!(task = %name, peer = ?peer_id, "task started");

        let settled = observer.clone();
        tokio::spawn(async move {
            let outcome = fut.await;
            settled.settle(outcome);
        });
        Ok(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskState;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    fn peer() -> PeerId {
        PeerId(7)
    }

    #[test]
    fn test_add_duplicate_rejected() {
        let manager = TaskManager::new();
        manager
            .add_task(TaskSpec::new("t", task_fn(|_| async { Ok(Value::Null) })))
            .unwrap();
        let err = manager
            .add_task(TaskSpec::new("t", task_fn(|_| async { Ok(Value::Null) })))
            .unwrap_err();
        assert!(matches!(err, NetronError::Exists(_)));
    }

    #[test]
    fn test_singleton_excludes_control_flags() {
        let manager = TaskManager::new();
        let err = manager
            .add_task(
                TaskSpec::new("t", task_fn(|_| async { Ok(Value::Null) }))
                    .singleton()
                    .cancelable(),
            )
            .unwrap_err();
        assert!(matches!(err, NetronError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn test_run_unknown_task() {
        let manager = TaskManager::new();
        let err = manager.run("nope", peer(), vec![]).err().unwrap();
        assert!(matches!(err, NetronError::NotExists(_)));
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let manager = TaskManager::new();
        manager
            .add_task(TaskSpec::new(
                "sum",
                task_fn(|ctx: TaskContext| async move {
                    let total: i64 = ctx
                        .args
                        .iter()
                        .filter_map(|v| v.as_int())
                        .sum();
                    Ok(Value::from(total))
                }),
            ))
            .unwrap();

        let observer = manager
            .run("sum", peer(), vec![Value::from(2), Value::from(3)])
            .unwrap();
        assert_eq!(observer.result().await.unwrap(), Value::from(5));
        assert_eq!(observer.state(), TaskState::Completed);
    }

    #[tokio::test]
    async fn test_failure_settles_failed() {
        let manager = TaskManager::new();
        manager
            .add_task(TaskSpec::new(
                "boom",
                task_fn(|_| async { Err(NetronError::Internal("boom".into())) }),
            ))
            .unwrap();

        let observer = manager.run("boom", peer(), vec![]).unwrap();
        assert!(observer.result().await.is_err());
        assert_eq!(observer.state(), TaskState::Failed);
    }

    #[tokio::test]
    async fn test_cancel_non_cancelable() {
        let manager = TaskManager::new();
        manager
            .add_task(TaskSpec::new(
                "pending",
                task_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Value::Null)
                }),
            ))
            .unwrap();

        let observer = manager.run("pending", peer(), vec![]).unwrap();
        let err = observer.cancel().await.unwrap_err();
        assert!(matches!(err, NetronError::NotAllowed(_)));
    }

    #[tokio::test]
    async fn test_cooperative_cancel() {
        let manager = TaskManager::new();
        manager
            .add_task(
                TaskSpec::new(
                    "looper",
                    task_fn(|ctx: TaskContext| async move {
                        loop {
                            ctx.signal.checkpoint().await?;
                            tokio::task::yield_now().await;
                        }
                    }),
                )
                .cancelable(),
            )
            .unwrap();

        let observer = manager.run("looper", peer(), vec![]).unwrap();
        observer.cancel().await.unwrap();
        assert_eq!(observer.state(), TaskState::Cancelled);
        assert!(matches!(
            observer.result().await,
            Err(NetronError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_suspend_resume_cycle() {
        let manager = TaskManager::new();
        manager
            .add_task(
                TaskSpec::new(
                    "steps",
                    task_fn(|ctx: TaskContext| async move {
                        for _ in 0..100 {
                            ctx.signal.checkpoint().await?;
                            tokio::task::yield_now().await;
                        }
                        Ok(Value::from("done"))
                    }),
                )
                .suspendable(),
            )
            .unwrap();

        let observer = manager.run("steps", peer(), vec![]).unwrap();
        observer.suspend().await.unwrap();
        assert_eq!(observer.state(), TaskState::Suspended);
        observer.resume().unwrap();
        assert_eq!(observer.result().await.unwrap(), Value::from("done"));
    }

    #[tokio::test]
    async fn test_resume_when_not_suspended() {
        let manager = TaskManager::new();
        manager
            .add_task(
                TaskSpec::new("quick", task_fn(|_| async { Ok(Value::Null) })).suspendable(),
            )
            .unwrap();
        let observer = manager.run("quick", peer(), vec![]).unwrap();
        observer.wait().await;
        assert!(matches!(
            observer.resume(),
            Err(NetronError::NotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn test_suspend_for_auto_resumes() {
        let manager = TaskManager::new();
        let stop = Arc::new(AtomicBool::new(false));
        let watched = stop.clone();
        manager
            .add_task(
                TaskSpec::new(
                    "waiter",
                    task_fn(move |ctx: TaskContext| {
                        let watched = watched.clone();
                        async move {
                            while !watched.load(Ordering::SeqCst) {
                                ctx.signal.checkpoint().await?;
                                tokio::task::yield_now().await;
                            }
                            Ok(Value::Null)
                        }
                    }),
                )
                .suspendable(),
            )
            .unwrap();

        let observer = manager.run("waiter", peer(), vec![]).unwrap();
        let released = stop.clone();
        observer
            .suspend_for(Duration::from_millis(10), move || {
                released.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();
        assert_eq!(observer.wait().await, TaskState::Completed);
        assert!(stop.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_finally_runs_after_settle() {
        let manager = TaskManager::new();
        manager
            .add_task(TaskSpec::new("t", task_fn(|_| async { Ok(Value::Null) })))
            .unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let observer = manager.run("t", peer(), vec![]).unwrap();
        let counted = calls.clone();
        observer.finally(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        observer.wait().await;
        // Already settled: runs immediately.
        let counted = calls.clone();
        observer.finally(move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
