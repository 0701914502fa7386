//! Netron Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every layer of the netron
//! protocol:
//! - Identifiers (PeerId, DefId) and the per-instance uid allocator
//! - The error taxonomy and its wire-transmissible form
//! - The payload value model consumed by the pluggable codec
//! - Context schemas, definitions, references and interfaces

pub mod definition;
pub mod definitions;
pub mod error;
pub mod id;
pub mod interface;
pub mod schema;
pub mod uid;
pub mod value;

pub use definition::*;
pub use definitions::*;
pub use error::*;
pub use id::*;
pub use interface::*;
pub use schema::*;
pub use uid::*;
pub use value::*;

use std::future::Future;
use std::pin::Pin;

/// Owned boxed future, used at object-safe async seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
