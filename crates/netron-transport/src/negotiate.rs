//! Protocol negotiation handshake.
//!
//! Both ends, immediately after the stream opens, send
//! `proto_len: u8 | proto: proto_len bytes | peer_id: u64 BE` and read
//! the same from the other side. A protocol string mismatch aborts the
//! connection before any packet is exchanged.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use netron_core::{NetronError, NetronResult, PeerId};

pub const NETRON_PROTOCOL: &str = "/netron/1.0.0";

/// Run the symmetric handshake and return the remote peer id.
pub async fn negotiate<S>(stream: &mut S, local_id: PeerId) -> NetronResult<PeerId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let proto = NETRON_PROTOCOL.as_bytes();
    let mut hello = Vec::with_capacity(1 + proto.len() + 8);
    hello.push(proto.len() as u8);
    hello.extend_from_slice(proto);
    hello.extend_from_slice(&local_id.to_bytes());
    stream
        .write_all(&hello)
        .await
        .map_err(|e| NetronError::Transport(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| NetronError::Transport(e.to_string()))?;

    let closed = |e: std::io::Error| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            NetronError::ConnectionClosed
        } else {
            NetronError::Transport(e.to_string())
        }
    };

    let their_len = stream.read_u8().await.map_err(closed)? as usize;
    let mut their_proto = vec![0u8; their_len];
    stream.read_exact(&mut their_proto).await.map_err(closed)?;
    if their_proto != proto {
        let seen = String::from_utf8_lossy(&their_proto).into_owned();
        return Err(NetronError::Transport(format!(
            "protocol mismatch: expected '{NETRON_PROTOCOL}', got '{seen}'"
        )));
    }

    let mut id_bytes = [0u8; 8];
    stream.read_exact(&mut id_bytes).await.map_err(closed)?;
    Ok(PeerId::from_bytes(id_bytes))
}
