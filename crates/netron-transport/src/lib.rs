//! Netron transports: byte-stream abstraction, frame layer and the
//! connection handshake.
//!
//! TCP and (on unix) domain-socket transports cover real deployments;
//! the [`MemoryHub`] transport gives tests the full protocol path
//! in-process.

pub mod framing;
#[cfg(unix)]
pub mod ipc;
pub mod memory;
pub mod negotiate;
pub mod stream;
pub mod tcp;

pub use framing::*;
#[cfg(unix)]
pub use ipc::*;
pub use memory::*;
pub use negotiate::*;
pub use stream::*;
pub use tcp::*;
