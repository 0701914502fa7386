//! The Netron instance: context registry, stub resolution, task
//! registry, event bus and peer directory.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use netron_core::{
    DefId, Definition, DefinitionsItem, Interface, NetronError, NetronResult, PeerId, RemoteError,
    UidSequence, Value,
};
use netron_task::{TaskManager, TaskSpec};
use netron_wire::{Action, Codec, JsonCodec, Packet};

use crate::builtin;
use crate::context::ContextHandle;
use crate::events::{EventBus, Subscription, EVENT_CONTEXT_ATTACH, EVENT_CONTEXT_DETACH, EVENT_PEER_CONNECT, EVENT_PEER_DISCONNECT};
use crate::own_peer::OwnPeer;
use crate::peer::{AbstractPeer, TaskRequest};
use crate::proto;
use crate::remote_peer::RemotePeer;
use crate::stub::Stub;
use crate::stub_manager::{StubEntry, StubManager};

#[derive(Clone, Debug)]
pub struct NetronOptions {
    /// Allow remote peers to install their contexts here.
    pub proxify_contexts: bool,
    /// Per-connection writer channel capacity, in packets.
    pub write_buffer: usize,
}

impl Default for NetronOptions {
    fn default() -> Self {
        NetronOptions {
            proxify_contexts: false,
            write_buffer: 256,
        }
    }
}

/// Cheaply cloneable handle on one Netron instance.
#[derive(Clone)]
pub struct Netron {
    inner: Arc<NetronInner>,
}

pub(crate) struct NetronInner {
    pub(crate) id: PeerId,
    pub(crate) options: NetronOptions,
    pub(crate) uid: UidSequence,
    pub(crate) codec: Arc<dyn Codec>,
    pub(crate) contexts: RwLock<HashMap<String, DefId>>,
    ctx_refs: Mutex<HashMap<usize, DefId>>,
    pub(crate) stubs: StubManager,
    pub(crate) tasks: TaskManager,
    pub(crate) events: EventBus,
    pub(crate) peers: RwLock<HashMap<PeerId, Arc<RemotePeer>>>,
    interfaces: RwLock<HashMap<(PeerId, DefId), Interface>>,
}

impl Netron {
    pub fn new() -> Self {
        Self::with_options(NetronOptions::default())
    }

    pub fn with_options(options: NetronOptions) -> Self {
        Self::with_codec(options, Arc::new(JsonCodec))
    }

    pub fn with_codec(options: NetronOptions, codec: Arc<dyn Codec>) -> Self {
        let inner = Arc::new(NetronInner {
            id: PeerId(rand::random::<u64>().max(1)),
            options,
            uid: UidSequence::new(),
            codec,
            contexts: RwLock::new(HashMap::new()),
            ctx_refs: Mutex::new(HashMap::new()),
            stubs: StubManager::new(),
            tasks: TaskManager::new(),
            events: EventBus::new(),
            peers: RwLock::new(HashMap::new()),
            interfaces: RwLock::new(HashMap::new()),
        });
        builtin::register(&inner);
        Netron { inner }
    }

    pub fn id(&self) -> PeerId {
        self.inner.id
    }

    pub fn options(&self) -> &NetronOptions {
        &self.inner.options
    }

    pub(crate) fn inner(&self) -> &Arc<NetronInner> {
        &self.inner
    }

    /// Expose a context under `name`.
    pub fn attach_context(&self, name: &str, ctx: ContextHandle) -> NetronResult<DefId> {
        self.inner.attach(name, ctx)
    }

    /// Withdraw the context registered under `name`.
    pub fn detach_context(&self, name: &str) -> NetronResult<DefId> {
        self.inner.detach(name)
    }

    /// Withdraw every context. Peer-originated (proxified) contexts are
    /// only released when `release_proxified` is set.
    pub fn detach_all_contexts(&self, release_proxified: bool) {
        let names: Vec<String> = self.inner.contexts.read().keys().cloned().collect();
        for name in names {
            let keep = !release_proxified && self.inner.is_proxified(&name);
            if !keep {
                let _ = self.inner.detach(&name);
            }
        }
    }

    pub fn has_context(&self, name: &str) -> bool {
        self.inner.contexts.read().contains_key(name)
    }

    pub fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.contexts.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Mint (or reuse) an anonymous stub for a context instance so its
    /// definition can travel inside arguments or collections.
    pub fn ref_context(&self, ctx: ContextHandle) -> Definition {
        self.inner.ref_context(ctx)
    }

    /// Drop a stub minted by [`Netron::ref_context`].
    pub fn release_context(&self, def_id: DefId) -> bool {
        self.inner.release_context(def_id)
    }

    /// Handle for a locally attached context, bound to the own peer.
    pub fn query_interface(&self, name: &str) -> NetronResult<Interface> {
        self.inner.query_interface(name)
    }

    pub fn own_peer(&self) -> OwnPeer {
        OwnPeer::new(self.inner.clone())
    }

    pub fn peer(&self, id: PeerId) -> Option<Arc<RemotePeer>> {
        self.inner.peers.read().get(&id).cloned()
    }

    pub fn peers(&self) -> Vec<Arc<RemotePeer>> {
        self.inner.peers.read().values().cloned().collect()
    }

    pub fn subscribe(&self, event: &str) -> Subscription {
        self.inner.events.subscribe(event)
    }

    pub fn add_task(&self, spec: TaskSpec) -> NetronResult<()> {
        self.inner.tasks.add_task(spec)
    }

    pub fn delete_task(&self, name: &str) -> NetronResult<()> {
        self.inner.tasks.delete_task(name)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.inner.tasks.task_names()
    }

    /// Run a batch of tasks locally, on behalf of the own peer.
    pub async fn run_task(&self, requests: Vec<TaskRequest>) -> Value {
        self.inner.run_task_map(self.inner.id, requests).await
    }

    pub fn disconnect_all(&self) {
        for peer in self.peers() {
            peer.disconnect();
        }
    }
}

impl Default for Netron {
    fn default() -> Self {
        Self::new()
    }
}

impl NetronInner {
    pub(crate) fn attach(&self, name: &str, ctx: ContextHandle) -> NetronResult<DefId> {
        let def = {
            let mut contexts = self.contexts.write();
            if contexts.contains_key(name) {
                return Err(NetronError::Exists(format!("context '{name}'")));
            }
            let stub = Stub::new(&self.uid, ctx);
            let def = stub.definition().clone();
            let def_id = self.stubs.insert_local(stub);
            contexts.insert(name.to_string(), def_id);
            def
        };
        let def_id = def.id;
        tracing::info!(context = %name, def = def_id.0, "context attached");
        self.announce_context(EVENT_CONTEXT_ATTACH, name, Some(def), None);
        Ok(def_id)
    }

    pub(crate) fn detach(&self, name: &str) -> NetronResult<DefId> {
        let def_id = self
            .contexts
            .write()
            .remove(name)
            .ok_or_else(|| NetronError::NotExists(format!("context '{name}'")))?;
        self.stubs.remove(def_id);
        self.interfaces
            .write()
            .retain(|(_, id), _| *id != def_id);
        tracing::info!(context = %name, def = def_id.0, "context detached");
        self.announce_context(EVENT_CONTEXT_DETACH, name, None, None);
        Ok(def_id)
    }

    /// Detach a proxified context on behalf of its origin peer.
    pub(crate) fn detach_proxified(&self, name: &str, origin: PeerId) -> NetronResult<DefId> {
        let def_id = *self
            .contexts
            .read()
            .get(name)
            .ok_or_else(|| NetronError::NotExists(format!("context '{name}'")))?;
        match self.stubs.get(def_id) {
            Some(StubEntry::Remote(_)) => {}
            Some(StubEntry::Local(_)) => {
                return Err(NetronError::NotAllowed(format!(
                    "context '{name}' is locally owned"
                )))
            }
            None => return Err(NetronError::NotExists(format!("context '{name}'"))),
        }
        self.contexts.write().remove(name);
        self.stubs.remove(def_id);
        self.announce_context(EVENT_CONTEXT_DETACH, name, None, Some(origin));
        Ok(def_id)
    }

    fn is_proxified(&self, name: &str) -> bool {
        self.contexts
            .read()
            .get(name)
            .and_then(|def_id| self.stubs.get(*def_id))
            .map(|entry| matches!(entry, StubEntry::Remote(_)))
            .unwrap_or(false)
    }

    pub(crate) fn ref_context(&self, ctx: ContextHandle) -> Definition {
        let key = Arc::as_ptr(&ctx) as *const () as usize;
        if let Some(def_id) = self.ctx_refs.lock().get(&key).copied() {
            if let Some(def) = self.stubs.definition(def_id) {
                return def;
            }
        }
        let stub = Stub::new(&self.uid, ctx);
        let def = stub.definition().clone();
        let def_id = self.stubs.insert_local(stub);
        self.ctx_refs.lock().insert(key, def_id);
        def
    }

    pub(crate) fn release_context(&self, def_id: DefId) -> bool {
        self.ctx_refs.lock().retain(|_, id| *id != def_id);
        self.stubs.remove(def_id).is_some()
    }

    pub(crate) fn query_interface(&self, name: &str) -> NetronResult<Interface> {
        let def_id = *self
            .contexts
            .read()
            .get(name)
            .ok_or_else(|| NetronError::NotExists(format!("context '{name}'")))?;
        if let Some(iface) = self.interfaces.read().get(&(self.id, def_id)) {
            return Ok(iface.clone());
        }
        let def = self
            .stubs
            .definition(def_id)
            .ok_or_else(|| NetronError::NotExists(format!("definition {}", def_id.0)))?;
        let iface = Interface::new(def, self.id);
        self.interfaces
            .write()
            .insert((self.id, def_id), iface.clone());
        Ok(iface)
    }

    /// Emit a context-registry event locally and push it to connected
    /// peers so their caches stay live.
    pub(crate) fn announce_context(
        &self,
        event: &str,
        name: &str,
        def: Option<Definition>,
        skip: Option<PeerId>,
    ) {
        let mut payload = BTreeMap::new();
        payload.insert("name".to_string(), Value::Str(name.to_string()));
        if let Some(def) = def {
            payload.insert("def".to_string(), Value::Definition(def));
        }
        let payload = Value::Map(payload);
        self.events.emit(event, payload.clone());

        let event = event.to_string();
        for peer in self.peers.read().values() {
            if skip == Some(peer.id()) {
                continue;
            }
            let peer = peer.clone();
            let event = event.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                if let Err(err) = peer.emit_remote(&event, payload).await {
                    tracing::debug!(peer = ?peer.id(), %event, %err, "event push failed");
                }
            });
        }
    }

    pub(crate) fn register_peer(&self, peer: Arc<RemotePeer>) {
        let id = peer.id();
        self.peers.write().insert(id, peer);
        self.events.emit(EVENT_PEER_CONNECT, Value::Int(id.0 as i64));
    }

    pub(crate) fn remove_peer(&self, id: PeerId) {
        if self.peers.write().remove(&id).is_none() {
            return;
        }
        // Sweep everything the peer proxified onto us.
        let swept = self.stubs.remove_for_peer(id);
        if !swept.is_empty() {
            let mut contexts = self.contexts.write();
            contexts.retain(|_, def_id| !swept.contains(def_id));
        }
        self.interfaces.write().retain(|(peer, _), _| *peer != id);
        self.events
            .emit(EVENT_PEER_DISCONNECT, Value::Int(id.0 as i64));
    }

    /// GET/SET entry point shared by the own peer and inbound dispatch.
    pub(crate) async fn local_get(
        &self,
        def_id: DefId,
        member: &str,
        args: Vec<Value>,
        caller: PeerId,
    ) -> NetronResult<Value> {
        match self.stubs.get(def_id) {
            Some(StubEntry::Local(stub)) => stub.get(member, args, caller).await,
            Some(StubEntry::Remote(stub)) => stub.get(member, args).await,
            None => Err(NetronError::NotExists(format!("definition {}", def_id.0))),
        }
    }

    pub(crate) async fn local_set(
        &self,
        def_id: DefId,
        member: &str,
        data: Value,
        caller: PeerId,
    ) -> NetronResult<()> {
        match self.stubs.get(def_id) {
            Some(StubEntry::Local(stub)) => stub.set(member, data, caller).await,
            Some(StubEntry::Remote(stub)) => stub.set(member, data).await,
            None => Err(NetronError::NotExists(format!("definition {}", def_id.0))),
        }
    }

    /// Replace references in an inbound payload with the definitions
    /// they point at: the sending peer's cached definitions first, then
    /// the local stub registry.
    fn resolve_refs(&self, peer: &RemotePeer, value: &mut Value) -> NetronResult<()> {
        match value {
            Value::Reference(reference) => {
                let def = peer
                    .cached_def(reference.def_id)
                    .or_else(|| self.stubs.definition(reference.def_id))
                    .ok_or_else(|| {
                        NetronError::NotExists(format!("definition {}", reference.def_id.0))
                    })?;
                *value = Value::Definition(def);
            }
            Value::Definitions(defs) => {
                for item in defs.iter_mut() {
                    if let DefinitionsItem::Reference(reference) = item {
                        let def = peer
                            .cached_def(reference.def_id)
                            .or_else(|| self.stubs.definition(reference.def_id))
                            .ok_or_else(|| {
                                NetronError::NotExists(format!(
                                    "definition {}",
                                    reference.def_id.0
                                ))
                            })?;
                        *item = DefinitionsItem::Definition(def);
                    }
                }
            }
            Value::Seq(items) => {
                for item in items {
                    self.resolve_refs(peer, item)?;
                }
            }
            Value::Map(map) => {
                for item in map.values_mut() {
                    self.resolve_refs(peer, item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Run a task batch; every entry resolves to a result or an error,
    /// an unknown name never fails the batch.
    pub(crate) async fn run_task_map(&self, peer_id: PeerId, requests: Vec<TaskRequest>) -> Value {
        let mut map = BTreeMap::new();
        for request in requests {
            let outcome = match self.tasks.run(&request.name, peer_id, request.args) {
                Ok(observer) => observer.result().await,
                Err(err) => Err(err),
            };
            map.insert(request.name, proto::task_result_entry(outcome));
        }
        Value::Map(map)
    }

    /// Serve one inbound request packet and send the response back on
    /// the same connection.
    pub(crate) async fn handle_request(self: Arc<Self>, peer: Arc<RemotePeer>, packet: Packet) {
        let id = packet.id;
        let action = packet.action();
        let result = self.serve(&peer, packet).await;
        let response = match result {
            Ok(mut data) => {
                peer.scrub_outbound(&mut data);
                Packet::new(id, false, action, data)
            }
            Err(err) => {
                tracing::debug!(peer = ?peer.id(), id, %err, "request failed");
                let mut packet =
                    Packet::new(id, false, action, Value::Error(RemoteError::from(&err)));
                packet.set_error(true);
                packet
            }
        };
        if peer.send_packet(response).await.is_err() {
            tracing::debug!(peer = ?peer.id(), id, "response dropped, connection gone");
        }
    }

    async fn serve(&self, peer: &Arc<RemotePeer>, packet: Packet) -> NetronResult<Value> {
        match Action::from_u8(packet.action()) {
            Some(Action::Get) => {
                let (def_id, member, mut args) = proto::decode_get(packet.data)?;
                for arg in &mut args {
                    self.resolve_refs(peer, arg)?;
                }
                self.local_get(def_id, &member, args, peer.id()).await
            }
            Some(Action::Set) => {
                let (def_id, member, mut data) = proto::decode_set(packet.data)?;
                self.resolve_refs(peer, &mut data)?;
                self.local_set(def_id, &member, data, peer.id()).await?;
                Ok(Value::Null)
            }
            Some(Action::Task) => {
                let requests = proto::decode_task(packet.data)?;
                Ok(self.run_task_map(peer.id(), requests).await)
            }
            None => Err(NetronError::InvalidPacket(format!(
                "unknown action {:#04x}",
                packet.action()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netron_core::ContextSchema;

    struct Echo;

    impl crate::context::Context for Echo {
        fn schema(&self) -> ContextSchema {
            ContextSchema::new("echo").method("say")
        }

        fn get(&self, member: &str) -> NetronResult<Value> {
            Err(NetronError::NotExists(member.to_string()))
        }

        fn set(&self, member: &str, _value: Value) -> NetronResult<()> {
            Err(NetronError::NotExists(member.to_string()))
        }

        fn call<'a>(
            &'a self,
            _member: &'a str,
            mut args: Vec<Value>,
        ) -> netron_core::BoxFuture<'a, NetronResult<Value>> {
            Box::pin(async move { Ok(args.pop().unwrap_or(Value::Null)) })
        }
    }

    #[tokio::test]
    async fn test_attach_detach_registry() {
        let netron = Netron::new();
        let def_id = netron.attach_context("echo", Arc::new(Echo)).unwrap();
        assert!(netron.has_context("echo"));
        assert_eq!(netron.context_names(), vec!["echo".to_string()]);

        let err = netron.attach_context("echo", Arc::new(Echo)).unwrap_err();
        assert!(matches!(err, NetronError::Exists(_)));

        assert_eq!(netron.detach_context("echo").unwrap(), def_id);
        assert!(!netron.has_context("echo"));
        assert!(matches!(
            netron.detach_context("echo"),
            Err(NetronError::NotExists(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_events() {
        let netron = Netron::new();
        let mut attach = netron.subscribe(EVENT_CONTEXT_ATTACH);
        let mut detach = netron.subscribe(EVENT_CONTEXT_DETACH);

        netron.attach_context("echo", Arc::new(Echo)).unwrap();
        let payload = attach.recv().await.unwrap();
        let map = payload.as_map().unwrap();
        assert_eq!(map.get("name").unwrap(), &Value::from("echo"));
        assert!(matches!(map.get("def"), Some(Value::Definition(_))));

        netron.detach_context("echo").unwrap();
        let payload = detach.recv().await.unwrap();
        assert_eq!(
            payload.as_map().unwrap().get("name").unwrap(),
            &Value::from("echo")
        );
    }

    #[tokio::test]
    async fn test_query_interface_local() {
        let netron = Netron::new();
        netron.attach_context("echo", Arc::new(Echo)).unwrap();
        let iface = netron.query_interface("echo").unwrap();
        assert_eq!(iface.name(), "echo");
        assert_eq!(iface.peer_id, netron.id());
        assert!(iface.has_member("say"));

        assert!(matches!(
            netron.query_interface("nope"),
            Err(NetronError::NotExists(_))
        ));
    }

    #[tokio::test]
    async fn test_ref_context_reuses_stub() {
        let netron = Netron::new();
        let ctx: ContextHandle = Arc::new(Echo);
        let a = netron.ref_context(ctx.clone());
        let b = netron.ref_context(ctx.clone());
        assert_eq!(a.id, b.id);

        assert!(netron.release_context(a.id));
        let c = netron.ref_context(ctx);
        assert_ne!(a.id, c.id);
    }

    #[tokio::test]
    async fn test_run_task_unknown_is_entry_error() {
        let netron = Netron::new();
        let result = netron.run_task(vec![TaskRequest::new("missing")]).await;
        let entry = result.as_map().unwrap().get("missing").unwrap();
        assert!(matches!(
            entry.as_map().unwrap().get("error"),
            Some(Value::Error(_))
        ));
    }

    #[tokio::test]
    async fn test_builtin_config_task() {
        let netron = Netron::new();
        let result = netron
            .run_task(vec![TaskRequest::new("netron_get_config")])
            .await;
        let config = result
            .as_map()
            .unwrap()
            .get("netron_get_config")
            .unwrap()
            .as_map()
            .unwrap()
            .get("result")
            .unwrap()
            .as_map()
            .unwrap()
            .clone();
        assert_eq!(config.get("proxify_contexts"), Some(&Value::Bool(false)));
        assert_eq!(
            config.get("peer_id"),
            Some(&Value::Int(netron.id().0 as i64))
        );
    }
}
