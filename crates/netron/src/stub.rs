//! Dispatch surface in front of a context.
//!
//! A [`Stub`] fronts a local context: it owns the minted [`Definition`]
//! and enforces the member schema before anything reaches the instance.
//! A [`RemoteStub`] fronts a context that lives on another peer but was
//! installed here (proxification): it mirrors the same contract and
//! forwards every operation back through the origin connection.

use std::sync::Weak;

use netron_core::{
    DefId, Definition, DefinitionsItem, NetronError, NetronResult, PeerId, UidSequence, Value,
};

use crate::context::ContextHandle;
use crate::peer::AbstractPeer;
use crate::remote_peer::RemotePeer;

/// Stamp every Definition travelling inside `value` with the peer it is
/// crossing to, so the receiver can route follow-up calls.
pub(crate) fn stamp_value(value: &mut Value, peer_id: PeerId) {
    match value {
        Value::Definition(def) => def.peer_id = Some(peer_id),
        Value::Definitions(defs) => {
            for item in defs.iter_mut() {
                match item {
                    DefinitionsItem::Definition(def) => def.peer_id = Some(peer_id),
                    DefinitionsItem::Interface(iface) => {
                        iface.definition.peer_id = Some(peer_id);
                    }
                    DefinitionsItem::Reference(_) => {}
                }
            }
        }
        Value::Seq(items) => {
            for item in items {
                stamp_value(item, peer_id);
            }
        }
        Value::Map(map) => {
            for item in map.values_mut() {
                stamp_value(item, peer_id);
            }
        }
        _ => {}
    }
}

#[derive(Clone)]
pub struct Stub {
    instance: ContextHandle,
    definition: Definition,
}

impl Stub {
    /// Mint a fresh Definition for `instance` in the local id space.
    pub fn new(uid: &UidSequence, instance: ContextHandle) -> Self {
        let schema = instance.schema();
        let definition = Definition::from_schema(uid.next_def(), &schema);
        Stub {
            instance,
            definition,
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn def_id(&self) -> DefId {
        self.definition.id
    }

    /// Read a property or invoke a method member.
    pub async fn get(
        &self,
        member: &str,
        mut args: Vec<Value>,
        peer_id: PeerId,
    ) -> NetronResult<Value> {
        let meta = self
            .definition
            .member(member)
            .ok_or_else(|| NetronError::NotExists(format!("member '{member}'")))?;
        if meta.method {
            for arg in &mut args {
                stamp_value(arg, peer_id);
            }
            self.instance.call(member, args).await
        } else {
            self.instance.get(member)
        }
    }

    /// Write a property, or invoke a method member discarding the
    /// result.
    pub async fn set(
        &self,
        member: &str,
        mut data: Value,
        peer_id: PeerId,
    ) -> NetronResult<()> {
        let meta = self
            .definition
            .member(member)
            .ok_or_else(|| NetronError::NotExists(format!("member '{member}'")))?;
        if meta.method {
            stamp_value(&mut data, peer_id);
            self.instance.call(member, data.into_args()).await?;
            Ok(())
        } else if meta.readonly {
            Err(NetronError::InvalidAccess(format!("member '{member}'")))
        } else {
            self.instance.set(member, data)
        }
    }
}

/// Forwarding stub for a proxified context.
///
/// `definition` lives in the local id space; `remote_def` is the id the
/// origin peer knows the context by. The back-reference is weak so a
/// dropped connection never keeps the stub graph alive.
#[derive(Clone)]
pub struct RemoteStub {
    origin: Weak<RemotePeer>,
    remote_def: DefId,
    definition: Definition,
}

impl RemoteStub {
    pub fn new(uid: &UidSequence, origin: Weak<RemotePeer>, remote: &Definition) -> Self {
        let mut definition = remote.clone();
        definition.id = uid.next_def();
        definition.parent_id = DefId::NONE;
        definition.peer_id = None;
        RemoteStub {
            origin,
            remote_def: remote.id,
            definition,
        }
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    fn origin(&self) -> NetronResult<std::sync::Arc<RemotePeer>> {
        self.origin
            .upgrade()
            .ok_or(NetronError::ConnectionClosed)
    }

    pub async fn get(&self, member: &str, args: Vec<Value>) -> NetronResult<Value> {
        if self.definition.member(member).is_none() {
            return Err(NetronError::NotExists(format!("member '{member}'")));
        }
        self.origin()?.get(self.remote_def, member, args).await
    }

    pub async fn set(&self, member: &str, data: Value) -> NetronResult<()> {
        let meta = self
            .definition
            .member(member)
            .ok_or_else(|| NetronError::NotExists(format!("member '{member}'")))?;
        if !meta.method && meta.readonly {
            return Err(NetronError::InvalidAccess(format!("member '{member}'")));
        }
        self.origin()?.set(self.remote_def, member, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netron_core::{ContextSchema, MemberSchema, Value};
    use std::sync::Arc;

    struct Counter {
        count: parking_lot::Mutex<i64>,
    }

    impl crate::context::Context for Counter {
        fn schema(&self) -> ContextSchema {
            ContextSchema::new("counter")
                .method("add")
                .property("count")
                .readonly("limit")
        }

        fn get(&self, member: &str) -> NetronResult<Value> {
            match member {
                "count" => Ok(Value::from(*self.count.lock())),
                "limit" => Ok(Value::from(100)),
                _ => Err(NetronError::NotExists(member.to_string())),
            }
        }

        fn set(&self, member: &str, value: Value) -> NetronResult<()> {
            match member {
                "count" => {
                    *self.count.lock() = value.as_int().unwrap_or(0);
                    Ok(())
                }
                _ => Err(NetronError::NotExists(member.to_string())),
            }
        }

        fn call<'a>(
            &'a self,
            member: &'a str,
            args: Vec<Value>,
        ) -> netron_core::BoxFuture<'a, NetronResult<Value>> {
            Box::pin(async move {
                match member {
                    "add" => {
                        let delta = args.first().and_then(|v| v.as_int()).unwrap_or(1);
                        let mut count = self.count.lock();
                        *count += delta;
                        Ok(Value::from(*count))
                    }
                    _ => Err(NetronError::NotExists(member.to_string())),
                }
            })
        }
    }

    fn stub() -> Stub {
        let uid = UidSequence::new();
        Stub::new(
            &uid,
            Arc::new(Counter {
                count: parking_lot::Mutex::new(0),
            }),
        )
    }

    #[tokio::test]
    async fn test_unknown_member_not_exists() {
        let stub = stub();
        let err = stub.get("nope", vec![], PeerId(1)).await.unwrap_err();
        assert!(matches!(err, NetronError::NotExists(_)));
    }

    #[tokio::test]
    async fn test_method_invocation() {
        let stub = stub();
        let out = stub
            .get("add", vec![Value::from(5)], PeerId(1))
            .await
            .unwrap();
        assert_eq!(out, Value::from(5));
    }

    #[tokio::test]
    async fn test_property_read_write() {
        let stub = stub();
        stub.set("count", Value::from(42), PeerId(1)).await.unwrap();
        assert_eq!(
            stub.get("count", vec![], PeerId(1)).await.unwrap(),
            Value::from(42)
        );
    }

    #[tokio::test]
    async fn test_readonly_rejected() {
        let stub = stub();
        let err = stub
            .set("limit", Value::from(1), PeerId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, NetronError::InvalidAccess(_)));
    }

    #[tokio::test]
    async fn test_set_on_method_invokes() {
        let stub = stub();
        stub.set("add", Value::from(3), PeerId(1)).await.unwrap();
        assert_eq!(
            stub.get("count", vec![], PeerId(1)).await.unwrap(),
            Value::from(3)
        );
    }

    #[test]
    fn test_definition_schema_members() {
        let stub = stub();
        let def = stub.definition();
        assert_eq!(def.name, "counter");
        assert_eq!(
            def.member("add"),
            Some(&MemberSchema::method())
        );
        assert_eq!(
            def.member("limit"),
            Some(&MemberSchema::property(true))
        );
    }

    #[test]
    fn test_stamp_recurses() {
        let uid = UidSequence::new();
        let def = Definition::from_schema(uid.next_def(), &ContextSchema::new("x"));
        let mut value = Value::Seq(vec![Value::from(1), Value::Definition(def)]);
        stamp_value(&mut value, PeerId(9));
        match &value {
            Value::Seq(items) => match &items[1] {
                Value::Definition(def) => assert_eq!(def.peer_id, Some(PeerId(9))),
                other => panic!("unexpected value: {other:?}"),
            },
            other => panic!("unexpected value: {other:?}"),
        }
    }
}
