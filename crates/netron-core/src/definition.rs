//! Definitions and references - the transmissible description of a
//! context's public surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ContextSchema, DefId, MemberSchema, PeerId};

/// Reflected, transmissible description of a context: a unique id plus
/// the access schema of every exposed member.
///
/// A definition is immutable once minted except for the `peer_id`
/// back-reference, which is stamped when the definition crosses a peer
/// boundary. The back-reference exists for lookup only and never goes on
/// the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: DefId,
    pub parent_id: DefId,
    pub name: String,
    pub description: String,
    pub schema: BTreeMap<String, MemberSchema>,
    #[serde(skip)]
    pub peer_id: Option<PeerId>,
}

impl Definition {
    /// Mint a definition from a context schema.
    pub fn from_schema(id: DefId, schema: &ContextSchema) -> Self {
        Definition {
            id,
            parent_id: DefId::NONE,
            name: schema.name.clone(),
            description: schema.description.clone(),
            schema: schema.members.clone(),
            peer_id: None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&MemberSchema> {
        self.schema.get(name)
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.schema.contains_key(name)
    }
}

/// Lightweight pointer to a definition the receiving side already knows,
/// sent instead of the full definition to save bandwidth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub def_id: DefId,
}

impl Reference {
    pub fn new(def_id: DefId) -> Self {
        Reference { def_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_from_schema() {
        let schema = ContextSchema::new("Calc").method("add").readonly("precision");
        let def = Definition::from_schema(DefId(7), &schema);

        assert_eq!(def.id, DefId(7));
        assert_eq!(def.parent_id, DefId::NONE);
        assert_eq!(def.name, "Calc");
        assert!(def.member("add").unwrap().method);
        assert!(def.member("precision").unwrap().readonly);
        assert!(!def.has_member("sub"));
    }

    #[test]
    fn test_peer_stamp_not_serialized() {
        let schema = ContextSchema::new("Calc").method("add");
        let mut def = Definition::from_schema(DefId(1), &schema);
        def.peer_id = Some(PeerId(42));

        let json = serde_json::to_string(&def).unwrap();
        let back: Definition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.peer_id, None);
        assert_eq!(back.id, def.id);
    }
}
