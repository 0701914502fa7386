//! Error types for the netron protocol

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core netron errors.
///
/// The first four variants form the taxonomy that crosses peer
/// boundaries: a stub-level failure is serialized as a [`RemoteError`]
/// inside the response packet and reconstructed into the same variant on
/// the caller's side. The remaining variants are local or
/// connection-level and are never produced by a remote peer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetronError {
    #[error("{0} not exists")]
    NotExists(String),

    #[error("{0} is not writable")]
    InvalidAccess(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not allowed: {0}")]
    NotAllowed(String),

    #[error("{0} already exists")]
    Exists(String),

    #[error("task cancelled")]
    Cancelled,

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("{0}")]
    Internal(String),
}

/// Result type for netron operations.
pub type NetronResult<T> = Result<T, NetronError>;

/// Wire-transmissible error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotExists,
    InvalidAccess,
    InvalidArgument,
    NotAllowed,
    Exists,
    Cancelled,
    Internal,
}

/// The form an error takes inside an error-flagged response packet.
///
/// Only the kind and message survive the boundary; local detail such as
/// transport state stays local.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        RemoteError {
            kind,
            message: message.into(),
        }
    }
}

impl From<&NetronError> for RemoteError {
    fn from(err: &NetronError) -> Self {
        let (kind, message) = match err {
            NetronError::NotExists(m) => (ErrorKind::NotExists, m.clone()),
            NetronError::InvalidAccess(m) => (ErrorKind::InvalidAccess, m.clone()),
            NetronError::InvalidArgument(m) => (ErrorKind::InvalidArgument, m.clone()),
            NetronError::NotAllowed(m) => (ErrorKind::NotAllowed, m.clone()),
            NetronError::Exists(m) => (ErrorKind::Exists, m.clone()),
            NetronError::Cancelled => (ErrorKind::Cancelled, String::new()),
            other => (ErrorKind::Internal, other.to_string()),
        };
        RemoteError { kind, message }
    }
}

impl From<RemoteError> for NetronError {
    fn from(err: RemoteError) -> Self {
        match err.kind {
            ErrorKind::NotExists => NetronError::NotExists(err.message),
            ErrorKind::InvalidAccess => NetronError::InvalidAccess(err.message),
            ErrorKind::InvalidArgument => NetronError::InvalidArgument(err.message),
            ErrorKind::NotAllowed => NetronError::NotAllowed(err.message),
            ErrorKind::Exists => NetronError::Exists(err.message),
            ErrorKind::Cancelled => NetronError::Cancelled,
            ErrorKind::Internal => NetronError::Internal(err.message),
        }
    }
}
