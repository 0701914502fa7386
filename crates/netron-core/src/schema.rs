//! Static schema descriptors for exposed contexts.
//!
//! A context declares its public surface up front as a [`ContextSchema`]
//! built at registration time. The schema is the source the owning
//! Netron mints a [`crate::Definition`] from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Access description of a single exposed member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSchema {
    pub method: bool,
    pub readonly: bool,
}

impl MemberSchema {
    pub fn method() -> Self {
        MemberSchema {
            method: true,
            readonly: false,
        }
    }

    pub fn property(readonly: bool) -> Self {
        MemberSchema {
            method: false,
            readonly,
        }
    }
}

/// Declared public surface of a context: its name, description and
/// exposed members.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextSchema {
    pub name: String,
    pub description: String,
    pub members: BTreeMap<String, MemberSchema>,
}

impl ContextSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ContextSchema {
            name: name.into(),
            description: String::new(),
            members: BTreeMap::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare a callable method.
    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.members.insert(name.into(), MemberSchema::method());
        self
    }

    /// Declare a writable property.
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.members
            .insert(name.into(), MemberSchema::property(false));
        self
    }

    /// Declare a read-only property.
    pub fn readonly(mut self, name: impl Into<String>) -> Self {
        self.members
            .insert(name.into(), MemberSchema::property(true));
        self
    }

    pub fn member(&self, name: &str) -> Option<&MemberSchema> {
        self.members.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let schema = ContextSchema::new("Greeter")
            .describe("greets people")
            .method("greet")
            .property("counter")
            .readonly("version");

        assert_eq!(schema.name, "Greeter");
        assert!(schema.member("greet").unwrap().method);
        assert!(!schema.member("counter").unwrap().readonly);
        assert!(schema.member("version").unwrap().readonly);
        assert!(schema.member("missing").is_none());
    }
}
