//! Length-prefixed frame layer.
//!
//! Every packet travels as `len: u32 BE | body: len bytes`. The length
//! covers the body only, never itself.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use netron_core::{NetronError, NetronResult};

/// Hard ceiling on a single frame body. Anything larger is treated as a
/// corrupt or hostile stream and the connection is dropped.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read one frame. `Ok(None)` means the peer closed cleanly at a frame
/// boundary; an EOF mid-frame is a broken connection.
pub async fn read_frame<R>(reader: &mut R) -> NetronResult<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 4];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = reader
            .read(&mut prefix[filled..])
            .await
            .map_err(|e| NetronError::Transport(e.to_string()))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(NetronError::ConnectionClosed);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(NetronError::InvalidPacket(format!(
            "frame of {len} bytes exceeds limit of {MAX_FRAME_SIZE}"
        )));
    }

    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            NetronError::ConnectionClosed
        } else {
            NetronError::Transport(e.to_string())
        }
    })?;
    Ok(Some(body.freeze()))
}

/// Write one frame and flush it.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> NetronResult<()>
where
    W: AsyncWrite + Unpin,
{
    if body.len() > MAX_FRAME_SIZE {
        return Err(NetronError::InvalidPacket(format!(
            "frame of {} bytes exceeds limit of {MAX_FRAME_SIZE}",
            body.len()
        )));
    }
    let prefix = (body.len() as u32).to_be_bytes();
    writer
        .write_all(&prefix)
        .await
        .map_err(|e| NetronError::Transport(e.to_string()))?;
    writer
        .write_all(body)
        .await
        .map_err(|e| NetronError::Transport(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| NetronError::Transport(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello").await.unwrap();
        write_frame(&mut a, b"").await.unwrap();
        let first = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(&first[..], b"hello");
        let second = read_frame(&mut b).await.unwrap().unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let (a, mut b) = tokio::io::duplex(1024);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_closed() {
        use tokio::io::AsyncWriteExt;
        let (mut a, mut b) = tokio::io::duplex(1024);
        // Announce 10 bytes and deliver only 3.
        a.write_all(&10u32.to_be_bytes()).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);
        assert!(matches!(
            read_frame(&mut b).await,
            Err(NetronError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let len = (MAX_FRAME_SIZE as u32) + 1;
        tokio::io::AsyncWriteExt::write_all(&mut a, &len.to_be_bytes())
            .await
            .unwrap();
        assert!(matches!(
            read_frame(&mut b).await,
            Err(NetronError::InvalidPacket(_))
        ));
    }
}
