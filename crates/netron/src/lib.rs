//! Netron - distributed object remoting.
//!
//! A [`Netron`] instance exposes local objects ([`Context`]) as
//! remotely callable interfaces. Peers connect over any stream
//! transport, exchange bit-packed packets, and access each other's
//! contexts through [`AbstractPeer`] - the same surface whether the
//! context is local ([`OwnPeer`]) or on the far side of a connection
//! ([`RemotePeer`]).
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use netron::{AbstractPeer, NetCore, Netron, NetronResult};
//! # async fn run(greeter: Arc<dyn netron::Context>) -> NetronResult<()> {
//! let server = NetCore::new(Netron::new());
//! server.netron().attach_context("greeter", greeter)?;
//! server.start("tcp://127.0.0.1:8778").await?;
//!
//! let client = NetCore::new(Netron::new());
//! let peer = client.connect("tcp://127.0.0.1:8778").await?;
//! let iface = peer.query_interface("greeter")?;
//! # let _ = iface;
//! # Ok(())
//! # }
//! ```

mod builtin;
pub mod context;
pub mod events;
pub mod netcore;
pub mod netron;
pub mod own_peer;
pub mod peer;
mod proto;
pub mod remote_peer;
pub mod stub;
pub mod stub_manager;

pub use context::*;
pub use events::*;
pub use netcore::*;
pub use netron::*;
pub use own_peer::*;
pub use peer::*;
pub use remote_peer::*;
pub use stub::*;
pub use stub_manager::*;

pub use netron_core::{
    ContextSchema, DefId, Definition, Definitions, DefinitionsItem, Interface, MemberSchema,
    NetronError, NetronResult, PeerId, Reference, RemoteError, Value,
};
pub use netron_task::{task_fn, TaskManager, TaskObserver, TaskSignal, TaskSpec, TaskState};
pub use netron_wire::{Action, Codec, JsonCodec, Packet};
