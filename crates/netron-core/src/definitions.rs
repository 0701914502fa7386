//! Ordered, type-checked collection of definition-like items.

use serde::{Deserialize, Serialize};

use crate::{Definition, Interface, NetronError, NetronResult, Reference, Value};

/// An element a [`Definitions`] collection may hold.
///
/// Raw context instances are not representable here: they are stubbed at
/// attach time and travel as their [`Definition`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DefinitionsItem {
    Definition(Definition),
    Reference(Reference),
    Interface(Interface),
}

impl DefinitionsItem {
    /// Validate an untyped value as a collection element. The index is
    /// only used for the error message. Interfaces have no [`Value`]
    /// rendition and enter a collection only through the typed `From`
    /// impl or [`Definitions::push`].
    pub fn try_from_value(index: usize, value: Value) -> NetronResult<Self> {
        match value {
            Value::Definition(def) => Ok(DefinitionsItem::Definition(def)),
            Value::Reference(r) => Ok(DefinitionsItem::Reference(r)),
            other => Err(NetronError::InvalidArgument(format!(
                "invalid definitions element at index {index}: expected definition or reference, got {other:?}"
            ))),
        }
    }
}

impl From<Definition> for DefinitionsItem {
    fn from(def: Definition) -> Self {
        DefinitionsItem::Definition(def)
    }
}

impl From<Reference> for DefinitionsItem {
    fn from(r: Reference) -> Self {
        DefinitionsItem::Reference(r)
    }
}

impl From<Interface> for DefinitionsItem {
    fn from(i: Interface) -> Self {
        DefinitionsItem::Interface(i)
    }
}

/// Ordered, heterogeneous, index-addressable sequence of definitions,
/// references and interfaces.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Definitions {
    items: Vec<DefinitionsItem>,
}

impl Definitions {
    pub fn new() -> Self {
        Definitions { items: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&DefinitionsItem> {
        self.items.get(index)
    }

    pub fn set(&mut self, index: usize, item: impl Into<DefinitionsItem>) -> NetronResult<()> {
        if index >= self.items.len() {
            return Err(NetronError::InvalidArgument(format!(
                "index {index} out of bounds (len {})",
                self.items.len()
            )));
        }
        self.items[index] = item.into();
        Ok(())
    }

    /// Append an already-typed item.
    pub fn push(&mut self, item: impl Into<DefinitionsItem>) {
        self.items.push(item.into());
    }

    /// Append an untyped value, failing fast on anything that is not a
    /// valid element. The reported index is the position the value would
    /// have taken.
    pub fn push_value(&mut self, value: Value) -> NetronResult<()> {
        let item = DefinitionsItem::try_from_value(self.items.len(), value)?;
        self.items.push(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<DefinitionsItem> {
        self.items.pop()
    }

    /// Remove and return the first element.
    pub fn shift(&mut self) -> Option<DefinitionsItem> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    /// Insert at the front.
    pub fn unshift(&mut self, item: impl Into<DefinitionsItem>) {
        self.items.insert(0, item.into());
    }

    /// Remove `delete_count` elements starting at `start`, inserting
    /// `items` in their place; returns the removed elements.
    pub fn splice(
        &mut self,
        start: usize,
        delete_count: usize,
        items: Vec<DefinitionsItem>,
    ) -> Vec<DefinitionsItem> {
        let start = start.min(self.items.len());
        let end = (start + delete_count).min(self.items.len());
        self.items.splice(start..end, items).collect()
    }

    /// Copy of the elements in `[start, end)`, clamped to the length.
    pub fn slice(&self, start: usize, end: usize) -> Definitions {
        let start = start.min(self.items.len());
        let end = end.clamp(start, self.items.len());
        Definitions {
            items: self.items[start..end].to_vec(),
        }
    }

    pub fn index_of(&self, item: &DefinitionsItem) -> Option<usize> {
        self.items.iter().position(|i| i == item)
    }

    pub fn find(&self, pred: impl Fn(&DefinitionsItem) -> bool) -> Option<&DefinitionsItem> {
        self.items.iter().find(|i| pred(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DefinitionsItem> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DefinitionsItem> {
        self.items.iter_mut()
    }

    /// Build from untyped values, reporting the index of the first
    /// invalid element.
    pub fn try_from_values(values: Vec<Value>) -> NetronResult<Self> {
        let mut defs = Definitions::new();
        for value in values {
            defs.push_value(value)?;
        }
        Ok(defs)
    }
}

impl IntoIterator for Definitions {
    type Item = DefinitionsItem;
    type IntoIter = std::vec::IntoIter<DefinitionsItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
