//! Payload value model.
//!
//! Packets carry a [`Value`] as their data field. The generic codec
//! (see `netron-wire`) turns values into bytes and back; the format is
//! the codec's business, the model is fixed here. Besides the plain data
//! variants the model carries the protocol-aware ones: definitions,
//! definition collections, references and taxonomy-preserving errors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Definition, Definitions, Reference, RemoteError};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Definition(Definition),
    Definitions(Definitions),
    Reference(Reference),
    Error(RemoteError),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_definition(&self) -> Option<&Definition> {
        match self {
            Value::Definition(d) => Some(d),
            _ => None,
        }
    }

    /// Consume a Seq into its items; anything else becomes a single-item
    /// argument list, Null an empty one.
    pub fn into_args(self) -> Vec<Value> {
        match self {
            Value::Seq(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl From<Definition> for Value {
    fn from(def: Definition) -> Self {
        Value::Definition(def)
    }
}

impl From<Reference> for Value {
    fn from(r: Reference) -> Self {
        Value::Reference(r)
    }
}
