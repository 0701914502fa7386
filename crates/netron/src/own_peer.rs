//! Loopback peer: the local Netron seen through the peer surface.

use std::sync::Arc;

use netron_core::{BoxFuture, DefId, Interface, NetronResult, PeerId, Value};

use crate::context::ContextHandle;
use crate::events::Subscription;
use crate::netron::NetronInner;
use crate::peer::{AbstractPeer, TaskRequest};
use crate::stub::stamp_value;

/// The hosting instance itself, behind [`AbstractPeer`]. Everything
/// routes straight to the local registry; no packets, no codec.
#[derive(Clone)]
pub struct OwnPeer {
    inner: Arc<NetronInner>,
}

impl OwnPeer {
    pub(crate) fn new(inner: Arc<NetronInner>) -> Self {
        OwnPeer { inner }
    }
}

impl AbstractPeer for OwnPeer {
    fn id(&self) -> PeerId {
        self.inner.id
    }

    fn get<'a>(
        &'a self,
        def_id: DefId,
        member: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, NetronResult<Value>> {
        Box::pin(async move {
            let mut value = self
                .inner
                .local_get(def_id, member, args, self.inner.id)
                .await?;
            // Same contract as the wire path: definitions crossing the
            // peer surface carry the peer they are reachable through.
            stamp_value(&mut value, self.inner.id);
            Ok(value)
        })
    }

    fn set<'a>(
        &'a self,
        def_id: DefId,
        member: &'a str,
        data: Value,
    ) -> BoxFuture<'a, NetronResult<()>> {
        Box::pin(async move { self.inner.local_set(def_id, member, data, self.inner.id).await })
    }

    fn subscribe(&self, event: &str) -> Subscription {
        self.inner.events.subscribe(event)
    }

    fn attach_context<'a>(
        &'a self,
        name: &'a str,
        ctx: ContextHandle,
    ) -> BoxFuture<'a, NetronResult<DefId>> {
        Box::pin(async move { self.inner.attach(name, ctx) })
    }

    fn detach_context<'a>(&'a self, name: &'a str) -> BoxFuture<'a, NetronResult<DefId>> {
        Box::pin(async move { self.inner.detach(name) })
    }

    fn has_context(&self, name: &str) -> bool {
        self.inner.contexts.read().contains_key(name)
    }

    fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.contexts.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn query_interface(&self, name: &str) -> NetronResult<Interface> {
        self.inner.query_interface(name)
    }

    fn run_task<'a>(&'a self, requests: Vec<TaskRequest>) -> BoxFuture<'a, NetronResult<Value>> {
        Box::pin(async move {
            let mut value = self.inner.run_task_map(self.inner.id, requests).await;
            stamp_value(&mut value, self.inner.id);
            Ok(value)
        })
    }
}
