//! Protocol-level tasks every Netron instance serves.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use netron_core::{NetronError, NetronResult, Value};
use netron_task::{task_fn, TaskContext, TaskSpec};

use crate::events::EVENT_CONTEXT_ATTACH;
use crate::netron::NetronInner;
use crate::stub::RemoteStub;

pub(crate) const TASK_GET_CONFIG: &str = "netron_get_config";
pub(crate) const TASK_GET_CONTEXT_DEFS: &str = "netron_get_context_defs";
pub(crate) const TASK_EMIT_EVENT: &str = "netron_emit_event";
pub(crate) const TASK_ATTACH_CONTEXT: &str = "netron_attach_context";
pub(crate) const TASK_DETACH_CONTEXT: &str = "netron_detach_context";

fn gone() -> NetronError {
    NetronError::Internal("netron instance is gone".into())
}

fn upgrade(weak: &Weak<NetronInner>) -> NetronResult<Arc<NetronInner>> {
    weak.upgrade().ok_or_else(gone)
}

/// Register the built-in tasks on a freshly constructed instance. The
/// names are fixed and the registry is empty at this point, so a
/// registration failure is a programming error worth a log, never a
/// runtime condition.
pub(crate) fn register(inner: &Arc<NetronInner>) {
    let specs = vec![
        TaskSpec::new(TASK_GET_CONFIG, get_config(Arc::downgrade(inner)))
            .describe("serve the instance options to a connecting peer"),
        TaskSpec::new(TASK_GET_CONTEXT_DEFS, get_context_defs(Arc::downgrade(inner)))
            .describe("serve the definitions of every attached context"),
        TaskSpec::new(TASK_EMIT_EVENT, emit_event(Arc::downgrade(inner)))
            .describe("deliver a remote event to this side's subscribers"),
        TaskSpec::new(TASK_ATTACH_CONTEXT, attach_context(Arc::downgrade(inner)))
            .describe("install a forwarding stub for a peer's context"),
        TaskSpec::new(TASK_DETACH_CONTEXT, detach_context(Arc::downgrade(inner)))
            .describe("remove a previously proxified context"),
    ];
    for spec in specs {
        let name = spec.name.clone();
        if let Err(err) = inner.tasks.add_task(spec) {
            tracing::error!(task = %name, %err, "builtin task registration failed");
        }
    }
}

fn get_config(weak: Weak<NetronInner>) -> netron_task::TaskFn {
    task_fn(move |_ctx: TaskContext| {
        let weak = weak.clone();
        async move {
            let inner = upgrade(&weak)?;
            let mut map = BTreeMap::new();
            map.insert("peer_id".to_string(), Value::Int(inner.id.0 as i64));
            map.insert(
                "proxify_contexts".to_string(),
                Value::Bool(inner.options.proxify_contexts),
            );
            Ok(Value::Map(map))
        }
    })
}

fn get_context_defs(weak: Weak<NetronInner>) -> netron_task::TaskFn {
    task_fn(move |_ctx: TaskContext| {
        let weak = weak.clone();
        async move {
            let inner = upgrade(&weak)?;
            let mut map = BTreeMap::new();
            for (name, def_id) in inner.contexts.read().iter() {
                if let Some(def) = inner.stubs.definition(*def_id) {
                    map.insert(name.clone(), Value::Definition(def));
                }
            }
            Ok(Value::Map(map))
        }
    })
}

fn emit_event(weak: Weak<NetronInner>) -> netron_task::TaskFn {
    task_fn(move |ctx: TaskContext| {
        let weak = weak.clone();
        async move {
            let inner = upgrade(&weak)?;
            let mut args = ctx.args.into_iter();
            let event = match args.next() {
                Some(Value::Str(event)) => event,
                _ => {
                    return Err(NetronError::InvalidArgument(
                        "event name must be a string".into(),
                    ))
                }
            };
            let payload = args.next().unwrap_or(Value::Null);
            let peer = inner.peers.read().get(&ctx.peer_id).cloned();
            if let Some(peer) = peer {
                peer.handle_remote_event(&event, payload);
            }
            Ok(Value::Null)
        }
    })
}

fn attach_context(weak: Weak<NetronInner>) -> netron_task::TaskFn {
    task_fn(move |ctx: TaskContext| {
        let weak = weak.clone();
        async move {
            let inner = upgrade(&weak)?;
            if !inner.options.proxify_contexts {
                return Err(NetronError::NotAllowed(
                    "context proxification is not enabled".into(),
                ));
            }
            let mut args = ctx.args.into_iter();
            let name = match args.next() {
                Some(Value::Str(name)) => name,
                _ => {
                    return Err(NetronError::InvalidArgument(
                        "context name must be a string".into(),
                    ))
                }
            };
            let def = match args.next() {
                Some(Value::Definition(def)) => def,
                _ => {
                    return Err(NetronError::InvalidArgument(
                        "expected a context definition".into(),
                    ))
                }
            };
            if inner.contexts.read().contains_key(&name) {
                return Err(NetronError::Exists(format!("context '{name}'")));
            }
            let origin = inner
                .peers
                .read()
                .get(&ctx.peer_id)
                .cloned()
                .ok_or(NetronError::ConnectionClosed)?;

            let stub = RemoteStub::new(&inner.uid, Arc::downgrade(&origin), &def);
            let local_def = stub.definition().clone();
            let def_id = inner.stubs.insert_remote(ctx.peer_id, stub);
            inner.contexts.write().insert(name.clone(), def_id);

            tracing::debug!(context = %name, origin = ?ctx.peer_id, "context proxified");
            inner.announce_context(EVENT_CONTEXT_ATTACH, &name, Some(local_def), Some(ctx.peer_id));
            Ok(Value::Int(def_id.0 as i64))
        }
    })
}

fn detach_context(weak: Weak<NetronInner>) -> netron_task::TaskFn {
    task_fn(move |ctx: TaskContext| {
        let weak = weak.clone();
        async move {
            let inner = upgrade(&weak)?;
            let name = match ctx.args.into_iter().next() {
                Some(Value::Str(name)) => name,
                _ => {
                    return Err(NetronError::InvalidArgument(
                        "context name must be a string".into(),
                    ))
                }
            };
            let def_id = inner.detach_proxified(&name, ctx.peer_id)?;
            Ok(Value::Int(def_id.0 as i64))
        }
    })
}
