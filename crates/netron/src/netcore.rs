//! Transport lifecycle: gates, dialing, peer establishment.
//!
//! Addresses are scheme-prefixed: `tcp://host:port`,
//! `ipc:///path/to.sock` and `memory://name` (the latter resolving
//! against this NetCore's [`MemoryHub`]).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use netron_core::{NetronError, NetronResult};
use netron_transport::{MemoryHub, TcpGate, TcpTransport, Transport, TransportListener};

use crate::netron::Netron;
use crate::remote_peer::RemotePeer;

enum Addr<'a> {
    Tcp(&'a str),
    #[cfg(unix)]
    Ipc(&'a str),
    Memory(&'a str),
}

fn parse_addr(addr: &str) -> NetronResult<Addr<'_>> {
    match addr.split_once("://") {
        Some(("tcp", rest)) => Ok(Addr::Tcp(rest)),
        #[cfg(unix)]
        Some(("ipc", rest)) => Ok(Addr::Ipc(rest)),
        Some(("memory", rest)) => Ok(Addr::Memory(rest)),
        _ => Err(NetronError::Transport(format!(
            "unsupported address '{addr}'"
        ))),
    }
}

/// Owns every listening gate of a Netron instance and dials outbound
/// connections.
pub struct NetCore {
    netron: Netron,
    hub: Arc<MemoryHub>,
    gates: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl NetCore {
    pub fn new(netron: Netron) -> Self {
        Self::with_hub(netron, MemoryHub::new())
    }

    /// Share a memory hub between instances so `memory://` addresses
    /// resolve across them. In-process wiring for tests and co-located
    /// peers.
    pub fn with_hub(netron: Netron, hub: Arc<MemoryHub>) -> Self {
        NetCore {
            netron,
            hub,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn netron(&self) -> &Netron {
        &self.netron
    }

    /// Open a gate on `addr`. Idempotent: starting an already open gate
    /// is a no-op, and a bind failure leaves no state behind.
    pub async fn start(&self, addr: &str) -> NetronResult<()> {
        if self.gates.lock().contains_key(addr) {
            return Ok(());
        }
        let gate: Box<dyn TransportListener> = match parse_addr(addr)? {
            Addr::Tcp(rest) => Box::new(TcpGate::bind(rest).await?),
            #[cfg(unix)]
            Addr::Ipc(rest) => Box::new(netron_transport::IpcGate::bind(rest)?),
            Addr::Memory(rest) => Box::new(self.hub.bind(rest)?),
        };
        tracing::info!(addr = %gate.local_addr(), "gate opened");

        let netron = self.netron.clone();
        let target = addr.to_string();
        let task = tokio::spawn(async move {
            loop {
                let stream = match gate.accept().await {
                    Ok(stream) => stream,
                    Err(NetronError::ConnectionClosed) => break,
                    Err(err) => {
                        tracing::warn!(addr = %gate.local_addr(), %err, "accept failed");
                        continue;
                    }
                };
                let inner = netron.inner().clone();
                let target = target.clone();
                tokio::spawn(async move {
                    if let Err(err) =
                        RemotePeer::establish(inner, stream, target, false).await
                    {
                        tracing::debug!(%err, "inbound connection rejected");
                    }
                });
            }
        });
        self.gates.lock().insert(addr.to_string(), task);
        Ok(())
    }

    pub fn is_started(&self, addr: &str) -> bool {
        self.gates.lock().contains_key(addr)
    }

    /// Close every gate and drop every connection. Idempotent.
    pub async fn stop(&self) {
        let gates: Vec<_> = self.gates.lock().drain().collect();
        for (addr, task) in gates {
            task.abort();
            tracing::info!(%addr, "gate closed");
        }
        self.netron.disconnect_all();
    }

    /// Dial `addr`, run the handshake and greeting, and return the
    /// connected peer.
    pub async fn connect(&self, addr: &str) -> NetronResult<Arc<RemotePeer>> {
        let transport: Box<dyn Transport> = match parse_addr(addr)? {
            Addr::Tcp(rest) => Box::new(TcpTransport::new(rest)),
            #[cfg(unix)]
            Addr::Ipc(rest) => Box::new(netron_transport::IpcTransport::new(rest)),
            Addr::Memory(rest) => Box::new(self.hub.transport(rest)),
        };
        let stream = transport.connect().await?;
        RemotePeer::establish(
            self.netron.inner().clone(),
            stream,
            transport.target(),
            true,
        )
        .await
    }
}
