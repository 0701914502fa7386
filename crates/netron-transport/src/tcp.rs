//! TCP transport.

use tokio::net::{TcpListener, TcpStream};

use netron_core::{BoxFuture, NetronError, NetronResult};

use crate::stream::{BoxedStream, Transport, TransportListener};

pub struct TcpTransport {
    addr: String,
}

impl TcpTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        TcpTransport { addr: addr.into() }
    }
}

impl Transport for TcpTransport {
    fn target(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    fn connect(&self) -> BoxFuture<'_, NetronResult<BoxedStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| NetronError::Transport(format!("connect {}: {e}", self.addr)))?;
            let _ = stream.set_nodelay(true);
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

pub struct TcpGate {
    listener: TcpListener,
    local: String,
}

impl TcpGate {
    pub async fn bind(addr: &str) -> NetronResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NetronError::Transport(format!("bind {addr}: {e}")))?;
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| addr.to_string());
        Ok(TcpGate { listener, local })
    }
}

impl TransportListener for TcpGate {
    fn local_addr(&self) -> String {
        format!("tcp://{}", self.local)
    }

    fn accept(&self) -> BoxFuture<'_, NetronResult<BoxedStream>> {
        Box::pin(async move {
            let (stream, remote) = self
                .listener
                .accept()
                .await
                .map_err(|e| NetronError::Transport(format!("accept: {e}")))?;
            let _ = stream.set_nodelay(true);
            tracing::debug!(%remote, "tcp connection accepted");
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_and_accept() {
        let gate = TcpGate::bind("127.0.0.1:0").await.unwrap();
        let addr = gate.local_addr();
        let addr = addr.strip_prefix("tcp://").unwrap().to_string();

        let transport = TcpTransport::new(addr);
        let (client, served) = tokio::join!(transport.connect(), gate.accept());
        let mut client = client.unwrap();
        let mut served = served.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        served.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}
