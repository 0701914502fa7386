//! Peer abstraction: one surface for local and remote context access.

use netron_core::{BoxFuture, DefId, Interface, NetronResult, PeerId, Value};

use crate::context::ContextHandle;
use crate::events::Subscription;

/// One named task invocation inside a task request batch.
#[derive(Clone, Debug)]
pub struct TaskRequest {
    pub name: String,
    pub args: Vec<Value>,
}

impl TaskRequest {
    pub fn new(name: impl Into<String>) -> Self {
        TaskRequest {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(name: impl Into<String>, args: Vec<Value>) -> Self {
        TaskRequest {
            name: name.into(),
            args,
        }
    }
}

/// Uniform surface over a peer, local or remote.
///
/// `get`/`set` follow the wire action semantics: `get` reads a property
/// or invokes a method for its result, `set` writes a property or
/// invokes a method discarding the result. `call`/`call_void` are the
/// method-flavored aliases.
pub trait AbstractPeer: Send + Sync {
    fn id(&self) -> PeerId;

    fn get<'a>(
        &'a self,
        def_id: DefId,
        member: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, NetronResult<Value>>;

    fn set<'a>(
        &'a self,
        def_id: DefId,
        member: &'a str,
        data: Value,
    ) -> BoxFuture<'a, NetronResult<()>>;

    fn call<'a>(
        &'a self,
        def_id: DefId,
        method: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, NetronResult<Value>> {
        self.get(def_id, method, args)
    }

    fn call_void<'a>(
        &'a self,
        def_id: DefId,
        method: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, NetronResult<()>> {
        self.set(def_id, method, Value::Seq(args))
    }

    /// Subscribe to this peer's events (`context:attach`,
    /// `context:detach`, ...).
    fn subscribe(&self, event: &str) -> Subscription;

    /// Expose a context through this peer under `name`.
    fn attach_context<'a>(
        &'a self,
        name: &'a str,
        ctx: ContextHandle,
    ) -> BoxFuture<'a, NetronResult<DefId>>;

    /// Withdraw a context previously attached under `name`.
    fn detach_context<'a>(&'a self, name: &'a str) -> BoxFuture<'a, NetronResult<DefId>>;

    fn has_context(&self, name: &str) -> bool;

    fn context_names(&self) -> Vec<String>;

    /// Handle for the context registered under `name`.
    fn query_interface(&self, name: &str) -> NetronResult<Interface>;

    /// Run a batch of named tasks on this peer. The result maps task
    /// name to `{"result": ...}` or `{"error": ...}`; an unknown task is
    /// an error entry, never a transport failure.
    fn run_task<'a>(&'a self, requests: Vec<TaskRequest>) -> BoxFuture<'a, NetronResult<Value>>;
}
