//! Object-safe transport seam.

use tokio::io::{AsyncRead, AsyncWrite};

use netron_core::{BoxFuture, NetronResult};

/// Marker for any bidirectional byte stream a peer link can ride on.
pub trait TransportStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<S: AsyncRead + AsyncWrite + Send + Unpin> TransportStream for S {}

pub type BoxedStream = Box<dyn TransportStream>;

/// Client side of a transport: dial and hand back a raw stream.
pub trait Transport: Send + Sync {
    /// Human-readable dial target, for logs.
    fn target(&self) -> String;

    fn connect(&self) -> BoxFuture<'_, NetronResult<BoxedStream>>;
}

/// Server side of a transport: a bound gate accepting raw streams.
pub trait TransportListener: Send + Sync {
    /// Address the gate is bound to, for logs.
    fn local_addr(&self) -> String;

    fn accept(&self) -> BoxFuture<'_, NetronResult<BoxedStream>>;
}
