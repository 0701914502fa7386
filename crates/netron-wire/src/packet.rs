//! Packet structure and flags field.
//!
//! Frame layout: `flags:u8 | id:u32 (BE) | data:<codec bytes>`.
//!
//! Flags bit layout (LSB to MSB):
//! - bits 0-5: action (0-63)
//! - bit 6: error
//! - bit 7: impulse (1 = request/one-way, 0 = response)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use netron_core::{NetronError, NetronResult, Value};

use crate::Codec;

/// Mask for the six action bits.
pub const ACTION_BITS: u8 = 0x3F;
/// Error flag bit.
pub const ERROR_BIT: u8 = 0x40;
/// Impulse flag bit.
pub const IMPULSE_BIT: u8 = 0x80;

/// Fixed part of the frame: flags byte plus packet id.
pub const PACKET_HEADER_SIZE: usize = 5;

/// The framed unit of wire communication.
///
/// `id` is caller-assigned; uniqueness within a connection's lifetime is
/// the caller's responsibility.
#[derive(Clone, Debug, PartialEq)]
pub struct Packet {
    pub flags: u8,
    pub id: u32,
    pub data: Value,
}

impl Packet {
    /// Create a packet with the given id, impulse flag and action.
    pub fn new(id: u32, impulse: bool, action: u8, data: Value) -> Self {
        let mut pkt = Packet {
            flags: 0,
            id,
            data,
        };
        pkt.set_action(action);
        pkt.set_impulse(impulse);
        pkt
    }

    /// Action code. Always in `0..64`.
    #[inline]
    pub fn action(&self) -> u8 {
        self.flags & ACTION_BITS
    }

    /// Overwrite the action bits. Values above 63 truncate to their low
    /// six bits; the error and impulse bits are never disturbed.
    #[inline]
    pub fn set_action(&mut self, action: u8) {
        self.flags = (self.flags & !ACTION_BITS) | (action & ACTION_BITS);
    }

    #[inline]
    pub fn is_impulse(&self) -> bool {
        self.flags & IMPULSE_BIT != 0
    }

    #[inline]
    pub fn set_impulse(&mut self, impulse: bool) {
        if impulse {
            self.flags |= IMPULSE_BIT;
        } else {
            self.flags &= !IMPULSE_BIT;
        }
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        self.flags & ERROR_BIT != 0
    }

    #[inline]
    pub fn set_error(&mut self, error: bool) {
        if error {
            self.flags |= ERROR_BIT;
        } else {
            self.flags &= !ERROR_BIT;
        }
    }

    /// Serialize into a frame.
    pub fn encode(&self, codec: &dyn Codec) -> NetronResult<Bytes> {
        let body = codec.encode(&self.data)?;
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_SIZE + body.len());
        buf.put_u8(self.flags);
        buf.put_u32(self.id);
        buf.put_slice(&body);
        Ok(buf.freeze())
    }

    /// Parse a frame.
    pub fn decode(mut buf: &[u8], codec: &dyn Codec) -> NetronResult<Packet> {
        if buf.len() < PACKET_HEADER_SIZE {
            return Err(NetronError::InvalidPacket(format!(
                "buffer too short: expected at least {PACKET_HEADER_SIZE}, got {}",
                buf.len()
            )));
        }
        let flags = buf.get_u8();
        let id = buf.get_u32();
        let data = codec.decode(buf)?;
        Ok(Packet { flags, id, data })
    }
}
