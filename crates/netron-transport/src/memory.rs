//! In-process transport backed by `tokio::io::duplex`.
//!
//! Used by tests and by co-located peers that want the full protocol
//! path without touching the network stack.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use netron_core::{BoxFuture, NetronError, NetronResult};

use crate::stream::{BoxedStream, Transport, TransportListener};

const PIPE_CAPACITY: usize = 256 * 1024;

/// Process-wide registry of named in-memory endpoints.
#[derive(Default)]
pub struct MemoryHub {
    endpoints: Mutex<HashMap<String, mpsc::Sender<DuplexStream>>>,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim an endpoint name and return its gate.
    pub fn bind(self: &Arc<Self>, name: impl Into<String>) -> NetronResult<MemoryGate> {
        let name = name.into();
        let mut endpoints = self.endpoints.lock();
        if endpoints.contains_key(&name) {
            return Err(NetronError::Exists(format!("memory endpoint '{name}'")));
        }
        let (tx, rx) = mpsc::channel(16);
        endpoints.insert(name.clone(), tx);
        Ok(MemoryGate {
            hub: Arc::clone(self),
            name,
            incoming: tokio::sync::Mutex::new(rx),
        })
    }

    /// Dialer for an endpoint on this hub.
    pub fn transport(self: &Arc<Self>, name: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            hub: Arc::clone(self),
            name: name.into(),
        }
    }
}

pub struct MemoryTransport {
    hub: Arc<MemoryHub>,
    name: String,
}

impl Transport for MemoryTransport {
    fn target(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn connect(&self) -> BoxFuture<'_, NetronResult<BoxedStream>> {
        Box::pin(async move {
            let gate_tx = self
                .hub
                .endpoints
                .lock()
                .get(&self.name)
                .cloned()
                .ok_or_else(|| {
                    NetronError::Transport(format!("no memory endpoint '{}'", self.name))
                })?;
            let (ours, theirs) = tokio::io::duplex(PIPE_CAPACITY);
            gate_tx.send(theirs).await.map_err(|_| {
                NetronError::Transport(format!("memory endpoint '{}' is gone", self.name))
            })?;
            Ok(Box::new(ours) as BoxedStream)
        })
    }
}

pub struct MemoryGate {
    hub: Arc<MemoryHub>,
    name: String,
    incoming: tokio::sync::Mutex<mpsc::Receiver<DuplexStream>>,
}

impl TransportListener for MemoryGate {
    fn local_addr(&self) -> String {
        format!("memory://{}", self.name)
    }

    fn accept(&self) -> BoxFuture<'_, NetronResult<BoxedStream>> {
        Box::pin(async move {
            let stream = self
                .incoming
                .lock()
                .await
                .recv()
                .await
                .ok_or(NetronError::ConnectionClosed)?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

impl Drop for MemoryGate {
    fn drop(&mut self) {
        self.hub.endpoints.lock().remove(&self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_connect_and_accept() {
        let hub = MemoryHub::new();
        let gate = hub.bind("a").unwrap();
        let transport = hub.transport("a");

        let (client, served) = tokio::join!(transport.connect(), gate.accept());
        let mut client = client.unwrap();
        let mut served = served.unwrap();

        client.write_all(b"mem").await.unwrap();
        let mut buf = [0u8; 3];
        served.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"mem");
    }

    #[tokio::test]
    async fn test_duplicate_bind_rejected() {
        let hub = MemoryHub::new();
        let _gate = hub.bind("a").unwrap();
        assert!(matches!(hub.bind("a"), Err(NetronError::Exists(_))));
    }

    #[tokio::test]
    async fn test_connect_without_endpoint() {
        let hub = MemoryHub::new();
        let err = hub.transport("missing").connect().await.err().unwrap();
        assert!(matches!(err, NetronError::Transport(_)));
    }

    #[tokio::test]
    async fn test_drop_releases_name() {
        let hub = MemoryHub::new();
        drop(hub.bind("a").unwrap());
        assert!(hub.bind("a").is_ok());
    }
}
