//! Unix domain socket transport.

use std::path::PathBuf;

use tokio::net::{UnixListener, UnixStream};

use netron_core::{BoxFuture, NetronError, NetronResult};

use crate::stream::{BoxedStream, Transport, TransportListener};

pub struct IpcTransport {
    path: PathBuf,
}

impl IpcTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IpcTransport { path: path.into() }
    }
}

impl Transport for IpcTransport {
    fn target(&self) -> String {
        format!("ipc://{}", self.path.display())
    }

    fn connect(&self) -> BoxFuture<'_, NetronResult<BoxedStream>> {
        Box::pin(async move {
            let stream = UnixStream::connect(&self.path).await.map_err(|e| {
                NetronError::Transport(format!("connect {}: {e}", self.path.display()))
            })?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

pub struct IpcGate {
    listener: UnixListener,
    path: PathBuf,
}

impl IpcGate {
    /// Bind the socket, replacing a stale socket file from a previous
    /// run if one is still present.
    pub fn bind(path: impl Into<PathBuf>) -> NetronResult<Self> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(NetronError::Transport(format!(
                    "unlink {}: {e}",
                    path.display()
                )))
            }
        }
        let listener = UnixListener::bind(&path)
            .map_err(|e| NetronError::Transport(format!("bind {}: {e}", path.display())))?;
        Ok(IpcGate { listener, path })
    }
}

impl TransportListener for IpcGate {
    fn local_addr(&self) -> String {
        format!("ipc://{}", self.path.display())
    }

    fn accept(&self) -> BoxFuture<'_, NetronResult<BoxedStream>> {
        Box::pin(async move {
            let (stream, _) = self
                .listener
                .accept()
                .await
                .map_err(|e| NetronError::Transport(format!("accept: {e}")))?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

impl Drop for IpcGate {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_dial_and_accept() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("netron-ipc-test-{}.sock", std::process::id()));
        let gate = IpcGate::bind(&path).unwrap();

        let transport = IpcTransport::new(&path);
        let (client, served) = tokio::join!(transport.connect(), gate.accept());
        let mut client = client.unwrap();
        let mut served = served.unwrap();

        client.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        served.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }
}
