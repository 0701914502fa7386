//! Netron Wire Protocol - Binary packet format
//!
//! This crate implements the wire format for netron packets:
//! - 1-byte flags field (action + error + impulse bits)
//! - 4-byte caller-assigned packet id
//! - codec-serialized payload
//!
//! Everything here is pure and stateless; framing onto a stream and
//! request correlation live in the transport and runtime layers.

pub mod action;
pub mod codec;
pub mod packet;

pub use action::*;
pub use codec::*;
pub use packet::*;
