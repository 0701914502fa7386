//! Local object surface exposed to peers.

use std::sync::Arc;

use netron_core::{BoxFuture, ContextSchema, NetronResult, Value};

/// An object a Netron instance can expose to its peers.
///
/// The schema is a static declaration of the members the object offers;
/// the stub layer enforces it, so implementations only see member names
/// they declared. Contexts take `&self` throughout and own whatever
/// internal synchronization they need.
pub trait Context: Send + Sync {
    fn schema(&self) -> ContextSchema;

    /// Read a property.
    fn get(&self, member: &str) -> NetronResult<Value>;

    /// Write a property. Readonly enforcement happens in the stub; this
    /// is only reached for writable members.
    fn set(&self, member: &str, value: Value) -> NetronResult<()>;

    /// Invoke a method member.
    fn call<'a>(&'a self, member: &'a str, args: Vec<Value>) -> BoxFuture<'a, NetronResult<Value>>;
}

pub type ContextHandle = Arc<dyn Context>;
