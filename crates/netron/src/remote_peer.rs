//! Connected remote peer: request correlation, definition caches and
//! the connection's read/write loops.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use netron_core::{
    BoxFuture, DefId, Definition, DefinitionsItem, Interface, NetronError, NetronResult, PeerId,
    Reference, Value,
};
use netron_transport::{negotiate, read_frame, write_frame, BoxedStream};
use netron_wire::{Action, Codec, Packet};

use crate::builtin::{TASK_ATTACH_CONTEXT, TASK_DETACH_CONTEXT, TASK_EMIT_EVENT, TASK_GET_CONFIG, TASK_GET_CONTEXT_DEFS};
use crate::context::ContextHandle;
use crate::events::{EventBus, Subscription, EVENT_CONTEXT_ATTACH, EVENT_CONTEXT_DETACH};
use crate::netron::NetronInner;
use crate::peer::{AbstractPeer, TaskRequest};
use crate::proto;

/// A peer on the far side of a live connection.
///
/// Holds the pending-request table, the cache of remote definitions and
/// a peer-local event bus fed by events the remote side pushes. The
/// back-reference to the hosting Netron is weak; the connection never
/// keeps its runtime alive.
pub struct RemotePeer {
    id: PeerId,
    target: String,
    netron: Weak<NetronInner>,
    codec: Arc<dyn Codec>,
    writer_tx: mpsc::Sender<Packet>,
    shutdown: Notify,
    packet_id: AtomicU32,
    pending: Mutex<HashMap<u32, oneshot::Sender<NetronResult<Value>>>>,
    defs: RwLock<HashMap<DefId, Definition>>,
    ctx_defs: RwLock<HashMap<String, DefId>>,
    sent_defs: Mutex<HashSet<DefId>>,
    task_results: Mutex<HashMap<String, Value>>,
    events: EventBus,
    reader: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl RemotePeer {
    /// Negotiate a fresh stream, wire up the io loops and register the
    /// peer with its Netron. The initiating side also runs the greeting
    /// exchange to prime its caches.
    pub(crate) async fn establish(
        inner: Arc<NetronInner>,
        mut stream: BoxedStream,
        target: String,
        initiator: bool,
    ) -> NetronResult<Arc<RemotePeer>> {
        let remote_id = negotiate(&mut stream, inner.id).await?;
        if remote_id == inner.id {
            return Err(NetronError::Transport("peer identity collision".into()));
        }

        let (writer_tx, writer_rx) = mpsc::channel(inner.options.write_buffer.max(1));
        let (read_half, write_half) = tokio::io::split(stream);

        let peer = Arc::new(RemotePeer {
            id: remote_id,
            target,
            netron: Arc::downgrade(&inner),
            codec: inner.codec.clone(),
            writer_tx,
            shutdown: Notify::new(),
            packet_id: AtomicU32::new(1),
            pending: Mutex::new(HashMap::new()),
            defs: RwLock::new(HashMap::new()),
            ctx_defs: RwLock::new(HashMap::new()),
            sent_defs: Mutex::new(HashSet::new()),
            task_results: Mutex::new(HashMap::new()),
            events: EventBus::new(),
            reader: Mutex::new(None),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(write_loop(peer.clone(), write_half, writer_rx));
        let reader = tokio::spawn(read_loop(peer.clone(), read_half));
        *peer.reader.lock() = Some(reader);

        inner.register_peer(peer.clone());
        tracing::debug!(peer = ?remote_id, target = %peer.target, "peer connected");

        if initiator {
            if let Err(err) = peer.greet().await {
                peer.disconnect();
                return Err(err);
            }
        }
        Ok(peer)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    /// Cached result of a greeting (or any later) task run.
    pub fn task_result(&self, name: &str) -> Option<Value> {
        self.task_results.lock().get(name).cloned()
    }

    /// Tear the connection down: every outstanding request is rejected
    /// with `ConnectionClosed` and the peer is dropped from its Netron.
    pub fn disconnect(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        self.teardown();
    }

    fn teardown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_one();
        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(NetronError::ConnectionClosed));
        }
        if let Some(inner) = self.netron.upgrade() {
            inner.remove_peer(self.id);
        }
        tracing::debug!(peer = ?self.id, target = %self.target, "peer disconnected");
    }

    /// On-connect exchange: fetch the remote config and the served
    /// context definitions.
    async fn greet(&self) -> NetronResult<()> {
        let result = self
            .run_task(vec![
                TaskRequest::new(TASK_GET_CONFIG),
                TaskRequest::new(TASK_GET_CONTEXT_DEFS),
            ])
            .await?;
        let defs = result
            .as_map()
            .and_then(|m| m.get(TASK_GET_CONTEXT_DEFS))
            .and_then(|v| v.as_map())
            .and_then(|m| m.get("result"))
            .and_then(|v| v.as_map())
            .cloned()
            .ok_or_else(|| NetronError::InvalidPacket("malformed greeting response".into()))?;
        for (name, value) in defs {
            if let Value::Definition(def) = value {
                self.cache_context_def(&name, def);
            }
        }
        Ok(())
    }

    fn cache_context_def(&self, name: &str, mut def: Definition) {
        def.peer_id = Some(self.id);
        self.ctx_defs.write().insert(name.to_string(), def.id);
        self.defs.write().insert(def.id, def);
    }

    /// Deliver an event the remote side pushed. Context registry events
    /// also keep the local caches in sync.
    pub(crate) fn handle_remote_event(&self, event: &str, payload: Value) {
        match event {
            EVENT_CONTEXT_ATTACH => {
                if let Some(map) = payload.as_map() {
                    if let (Some(name), Some(Value::Definition(def))) =
                        (map.get("name").and_then(|v| v.as_str()), map.get("def"))
                    {
                        self.cache_context_def(name, def.clone());
                    }
                }
            }
            EVENT_CONTEXT_DETACH => {
                if let Some(name) = payload.as_map().and_then(|m| m.get("name")).and_then(|v| v.as_str()) {
                    if let Some(def_id) = self.ctx_defs.write().remove(name) {
                        self.defs.write().remove(&def_id);
                    }
                }
            }
            _ => {}
        }
        self.events.emit(event, payload);
    }

    /// Push an event to the remote side. Fire-and-forget in spirit; the
    /// future resolves once the remote acknowledged the task.
    pub(crate) async fn emit_remote(&self, event: &str, payload: Value) -> NetronResult<()> {
        self.run_task(vec![TaskRequest::with_args(
            TASK_EMIT_EVENT,
            vec![Value::Str(event.to_string()), payload],
        )])
        .await?;
        Ok(())
    }

    pub(crate) async fn send_packet(&self, packet: Packet) -> NetronResult<()> {
        self.writer_tx
            .send(packet)
            .await
            .map_err(|_| NetronError::ConnectionClosed)
    }

    /// Send a request packet and await its correlated response.
    async fn request(&self, action: Action, mut data: Value) -> NetronResult<Value> {
        if !self.is_connected() {
            return Err(NetronError::ConnectionClosed);
        }
        self.scrub_outbound(&mut data);
        let id = self.packet_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let packet = Packet::new(id, true, action.to_u8(), data);
        if self.send_packet(packet).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(NetronError::ConnectionClosed);
        }
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(NetronError::ConnectionClosed),
        }
    }

    /// Resolve a correlated response arriving from the wire.
    fn complete(&self, packet: Packet) {
        let tx = match self.pending.lock().remove(&packet.id) {
            Some(tx) => tx,
            None => {
                tracing::debug!(peer = ?self.id, id = packet.id, "uncorrelated response dropped");
                return;
            }
        };
        let result = if packet.is_error() {
            match packet.data {
                Value::Error(remote) => Err(remote.into()),
                other => Err(NetronError::InvalidPacket(format!(
                    "error response without error payload: {other:?}"
                ))),
            }
        } else {
            let mut data = packet.data;
            self.absorb_inbound(&mut data);
            self.resolve_inbound(&mut data).map(|_| data)
        };
        let _ = tx.send(result);
    }

    /// Stamp and cache definitions arriving from this peer.
    fn absorb_inbound(&self, value: &mut Value) {
        match value {
            Value::Definition(def) => {
                def.peer_id = Some(self.id);
                self.defs.write().insert(def.id, def.clone());
            }
            Value::Definitions(defs) => {
                for item in defs.iter_mut() {
                    if let DefinitionsItem::Definition(def) = item {
                        def.peer_id = Some(self.id);
                        self.defs.write().insert(def.id, def.clone());
                    }
                }
            }
            Value::Seq(items) => {
                for item in items {
                    self.absorb_inbound(item);
                }
            }
            Value::Map(map) => {
                for item in map.values_mut() {
                    self.absorb_inbound(item);
                }
            }
            _ => {}
        }
    }

    /// Replace references in a response payload with the definitions
    /// this peer previously sent us. The sender only emits a reference
    /// after the full definition has crossed once, so a miss here means
    /// the caches went out of sync and the caller gets `NotExists`.
    fn resolve_inbound(&self, value: &mut Value) -> NetronResult<()> {
        match value {
            Value::Reference(reference) => {
                let def = self.cached_def(reference.def_id).ok_or_else(|| {
                    NetronError::NotExists(format!("definition {}", reference.def_id.0))
                })?;
                *value = Value::Definition(def);
            }
            Value::Definitions(defs) => {
                for item in defs.iter_mut() {
                    if let DefinitionsItem::Reference(reference) = item {
                        let def = self.cached_def(reference.def_id).ok_or_else(|| {
                            NetronError::NotExists(format!("definition {}", reference.def_id.0))
                        })?;
                        *item = DefinitionsItem::Definition(def);
                    }
                }
            }
            Value::Seq(items) => {
                for item in items {
                    self.resolve_inbound(item)?;
                }
            }
            Value::Map(map) => {
                for item in map.values_mut() {
                    self.resolve_inbound(item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Definition this peer has sent us, by its id space.
    pub(crate) fn cached_def(&self, def_id: DefId) -> Option<Definition> {
        self.defs.read().get(&def_id).cloned()
    }

    /// Replace definitions the peer has already seen with references.
    pub(crate) fn scrub_outbound(&self, value: &mut Value) {
        match value {
            Value::Definition(def) => {
                if !self.sent_defs.lock().insert(def.id) {
                    *value = Value::Reference(Reference::new(def.id));
                }
            }
            Value::Definitions(defs) => {
                for item in defs.iter_mut() {
                    if let DefinitionsItem::Definition(def) = item {
                        if !self.sent_defs.lock().insert(def.id) {
                            *item = DefinitionsItem::Reference(Reference::new(def.id));
                        }
                    }
                }
            }
            Value::Seq(items) => {
                for item in items {
                    self.scrub_outbound(item);
                }
            }
            Value::Map(map) => {
                for item in map.values_mut() {
                    self.scrub_outbound(item);
                }
            }
            _ => {}
        }
    }

    /// Client-side schema validation against the cached definition;
    /// fails before anything goes on the wire.
    fn check_member(&self, def_id: DefId, member: &str, writing: bool) -> NetronResult<()> {
        let defs = self.defs.read();
        let def = defs
            .get(&def_id)
            .ok_or_else(|| NetronError::NotExists(format!("definition {}", def_id.0)))?;
        let meta = def
            .member(member)
            .ok_or_else(|| NetronError::NotExists(format!("member '{member}'")))?;
        if writing && !meta.method && meta.readonly {
            return Err(NetronError::InvalidAccess(format!("member '{member}'")));
        }
        Ok(())
    }
}

impl AbstractPeer for RemotePeer {
    fn id(&self) -> PeerId {
        self.id
    }

    fn get<'a>(
        &'a self,
        def_id: DefId,
        member: &'a str,
        args: Vec<Value>,
    ) -> BoxFuture<'a, NetronResult<Value>> {
        Box::pin(async move {
            self.check_member(def_id, member, false)?;
            self.request(Action::Get, proto::encode_get(def_id, member, args))
                .await
        })
    }

    fn set<'a>(
        &'a self,
        def_id: DefId,
        member: &'a str,
        data: Value,
    ) -> BoxFuture<'a, NetronResult<()>> {
        Box::pin(async move {
            self.check_member(def_id, member, true)?;
            self.request(Action::Set, proto::encode_set(def_id, member, data))
                .await?;
            Ok(())
        })
    }

    fn subscribe(&self, event: &str) -> Subscription {
        self.events.subscribe(event)
    }

    /// Proxify a local context onto the remote peer: push its
    /// definition and let the far side install a forwarding stub.
    fn attach_context<'a>(
        &'a self,
        name: &'a str,
        ctx: ContextHandle,
    ) -> BoxFuture<'a, NetronResult<DefId>> {
        Box::pin(async move {
            let inner = self
                .netron
                .upgrade()
                .ok_or(NetronError::ConnectionClosed)?;
            let def = inner.ref_context(ctx);
            let result = self
                .run_task(vec![TaskRequest::with_args(
                    TASK_ATTACH_CONTEXT,
                    vec![Value::Str(name.to_string()), Value::Definition(def)],
                )])
                .await?;
            let assigned = task_outcome(&result, TASK_ATTACH_CONTEXT)?;
            def_id_from(assigned)
        })
    }

    fn detach_context<'a>(&'a self, name: &'a str) -> BoxFuture<'a, NetronResult<DefId>> {
        Box::pin(async move {
            let result = self
                .run_task(vec![TaskRequest::with_args(
                    TASK_DETACH_CONTEXT,
                    vec![Value::Str(name.to_string())],
                )])
                .await?;
            let removed = task_outcome(&result, TASK_DETACH_CONTEXT)?;
            def_id_from(removed)
        })
    }

    fn has_context(&self, name: &str) -> bool {
        self.ctx_defs.read().contains_key(name)
    }

    fn context_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.ctx_defs.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn query_interface(&self, name: &str) -> NetronResult<Interface> {
        let def_id = *self
            .ctx_defs
            .read()
            .get(name)
            .ok_or_else(|| NetronError::NotExists(format!("context '{name}'")))?;
        let def = self
            .defs
            .read()
            .get(&def_id)
            .cloned()
            .ok_or_else(|| NetronError::NotExists(format!("definition {}", def_id.0)))?;
        Ok(Interface::new(def, self.id))
    }

    fn run_task<'a>(&'a self, requests: Vec<TaskRequest>) -> BoxFuture<'a, NetronResult<Value>> {
        Box::pin(async move {
            let result = self
                .request(Action::Task, proto::encode_task(&requests))
                .await?;
            if let Some(map) = result.as_map() {
                let mut cache = self.task_results.lock();
                for (name, entry) in map {
                    if let Some(value) = entry.as_map().and_then(|m| m.get("result")) {
                        cache.insert(name.clone(), value.clone());
                    }
                }
            }
            Ok(result)
        })
    }
}

/// Extract one task's outcome from a batch result map.
fn task_outcome(result: &Value, name: &str) -> NetronResult<Value> {
    let entry = result
        .as_map()
        .and_then(|m| m.get(name))
        .and_then(|v| v.as_map())
        .ok_or_else(|| NetronError::InvalidPacket(format!("missing result for task '{name}'")))?;
    if let Some(Value::Error(remote)) = entry.get("error") {
        return Err(remote.clone().into());
    }
    entry
        .get("result")
        .cloned()
        .ok_or_else(|| NetronError::InvalidPacket(format!("missing result for task '{name}'")))
}

fn def_id_from(value: Value) -> NetronResult<DefId> {
    value
        .as_int()
        .filter(|n| *n > 0 && *n <= u32::MAX as i64)
        .map(|n| DefId(n as u32))
        .ok_or_else(|| NetronError::InvalidPacket("expected a definition id".into()))
}

async fn write_loop(
    peer: Arc<RemotePeer>,
    mut write_half: tokio::io::WriteHalf<BoxedStream>,
    mut rx: mpsc::Receiver<Packet>,
) {
    loop {
        tokio::select! {
            _ = peer.shutdown.notified() => break,
            packet = rx.recv() => {
                let packet = match packet {
                    Some(packet) => packet,
                    None => break,
                };
                let frame = match packet.encode(peer.codec.as_ref()) {
                    Ok(frame) => frame,
                    Err(err) => {
                        tracing::warn!(peer = ?peer.id, %err, "dropping unencodable packet");
                        continue;
                    }
                };
                if let Err(err) = write_frame(&mut write_half, &frame).await {
                    tracing::debug!(peer = ?peer.id, %err, "write failed");
                    break;
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}

async fn read_loop(peer: Arc<RemotePeer>, mut read_half: tokio::io::ReadHalf<BoxedStream>) {
    loop {
        let frame = match read_frame(&mut read_half).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(peer = ?peer.id, %err, "read failed");
                break;
            }
        };
        let packet = match Packet::decode(&frame, peer.codec.as_ref()) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::warn!(peer = ?peer.id, %err, "undecodable packet, closing");
                break;
            }
        };
        if packet.is_impulse() {
            let inner = match peer.netron.upgrade() {
                Some(inner) => inner,
                None => break,
            };
            let mut packet = packet;
            peer.absorb_inbound(&mut packet.data);
            let peer = peer.clone();
            tokio::spawn(async move {
                inner.handle_request(peer, packet).await;
            });
        } else {
            peer.complete(packet);
        }
    }
    peer.teardown();
}
