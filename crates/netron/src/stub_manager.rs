//! Definition-id to stub resolution.

use std::collections::HashMap;

use parking_lot::RwLock;

use netron_core::{DefId, Definition, PeerId};

use crate::stub::{RemoteStub, Stub};

#[derive(Clone)]
pub enum StubEntry {
    Local(Stub),
    Remote(RemoteStub),
}

impl StubEntry {
    pub fn definition(&self) -> &Definition {
        match self {
            StubEntry::Local(stub) => stub.definition(),
            StubEntry::Remote(stub) => stub.definition(),
        }
    }
}

/// Owns every stub the local Netron serves, keyed by definition id.
/// Remote stubs are additionally tracked by their origin peer so a
/// dropped connection can sweep everything it installed.
#[derive(Default)]
pub struct StubManager {
    stubs: RwLock<HashMap<DefId, StubEntry>>,
    by_peer: RwLock<HashMap<PeerId, Vec<DefId>>>,
}

impl StubManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_local(&self, stub: Stub) -> DefId {
        let def_id = stub.def_id();
        self.stubs.write().insert(def_id, StubEntry::Local(stub));
        def_id
    }

    pub fn insert_remote(&self, origin: PeerId, stub: RemoteStub) -> DefId {
        let def_id = stub.definition().id;
        self.stubs.write().insert(def_id, StubEntry::Remote(stub));
        self.by_peer.write().entry(origin).or_default().push(def_id);
        def_id
    }

    pub fn get(&self, def_id: DefId) -> Option<StubEntry> {
        self.stubs.read().get(&def_id).cloned()
    }

    pub fn definition(&self, def_id: DefId) -> Option<Definition> {
        self.stubs
            .read()
            .get(&def_id)
            .map(|entry| entry.definition().clone())
    }

    pub fn contains(&self, def_id: DefId) -> bool {
        self.stubs.read().contains_key(&def_id)
    }

    pub fn remove(&self, def_id: DefId) -> Option<StubEntry> {
        self.stubs.write().remove(&def_id)
    }

    /// Drop every remote stub installed by `origin`. Returns the swept
    /// definition ids.
    pub fn remove_for_peer(&self, origin: PeerId) -> Vec<DefId> {
        let ids = self.by_peer.write().remove(&origin).unwrap_or_default();
        let mut stubs = self.stubs.write();
        for id in &ids {
            stubs.remove(id);
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.stubs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.read().is_empty()
    }
}
