//! Payload codec seam.
//!
//! The packet layer is agnostic about how payload values become bytes;
//! any serializer that can round-trip a [`Value`] plugs in here. The
//! format itself is deliberately unspecified by the protocol.

use netron_core::{NetronError, NetronResult, Value};

/// Generic object serializer/deserializer for packet payloads.
pub trait Codec: Send + Sync {
    fn encode(&self, value: &Value) -> NetronResult<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> NetronResult<Value>;
}

/// Default JSON-backed codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode(&self, value: &Value) -> NetronResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| NetronError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> NetronResult<Value> {
        serde_json::from_slice(bytes).map_err(|e| NetronError::Codec(e.to_string()))
    }
}
