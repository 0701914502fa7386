//! Caller-side context handles.

use serde::{Deserialize, Serialize};

use crate::{DefId, Definition, PeerId};

/// Caller-side handle for a context hosted on a specific peer.
///
/// Carries no live references and no mutable state: the definition id
/// plus the peer id uniquely identify the remote instance, and calls go
/// through the peer that owns the handle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub definition: Definition,
    pub peer_id: PeerId,
}

impl Interface {
    pub fn new(definition: Definition, peer_id: PeerId) -> Self {
        Interface {
            definition,
            peer_id,
        }
    }

    #[inline]
    pub fn def_id(&self) -> DefId {
        self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.definition.has_member(name)
    }
}
