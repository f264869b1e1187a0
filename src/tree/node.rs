//! Tree values.
//!
//! A [`Node`] is JSON plus one extra variant, [`Node::Alias`], which marks a
//! location whose value lives at another key. Aliases are a distinct variant,
//! so no user string can be mistaken for one.

use crate::tree::key::Key;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// Field name used for aliases in the raw serialized form.
pub const ALIAS_FIELD: &str = "$alias";

/// A value stored in the data tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Node>),
    Object(BTreeMap<String, Node>),
    /// This location's value lives at the target key.
    Alias(Key),
}

impl Node {
    /// An empty object.
    pub fn object() -> Self {
        Node::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_alias(&self) -> bool {
        matches!(self, Node::Alias(_))
    }

    /// Target key if this node is an alias.
    pub fn as_alias(&self) -> Option<&Key> {
        match self {
            Node::Alias(target) => Some(target),
            _ => None,
        }
    }

    /// Child addressed by a single key segment.
    ///
    /// Objects are indexed by name, arrays by decimal index.
    pub fn child(&self, segment: &str) -> Option<&Node> {
        match self {
            Node::Object(map) => map.get(segment),
            Node::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Convert to JSON, keeping aliases in their raw `{"$alias": key}` form.
    pub fn to_raw_json(&self) -> Value {
        match self {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
            Node::Array(items) => Value::Array(items.iter().map(Node::to_raw_json).collect()),
            Node::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_raw_json()))
                    .collect(),
            ),
            Node::Alias(target) => {
                let mut map = serde_json::Map::new();
                map.insert(ALIAS_FIELD.to_string(), Value::String(target.to_string()));
                Value::Object(map)
            }
        }
    }
}

impl From<Value> for Node {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => Node::Number(n),
            Value::String(s) => Node::String(s),
            Value::Array(items) => Node::Array(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => {
                Node::Object(map.into_iter().map(|(k, v)| (k, Node::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for Node {
    fn from(value: &Value) -> Self {
        Node::from(value.clone())
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::String(value.to_string())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::String(value)
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Bool(value)
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Number(value.into())
    }
}

impl From<u64> for Node {
    fn from(value: u64) -> Self {
        Node::Number(value.into())
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map(Node::Number).unwrap_or(Node::Null)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::Array(items)
    }
}

impl From<BTreeMap<String, Node>> for Node {
    fn from(map: BTreeMap<String, Node>) -> Self {
        Node::Object(map)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(n) => n.serialize(serializer),
            Node::String(s) => serializer.serialize_str(s),
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
            Node::Alias(target) => {
                let mut out = serializer.serialize_map(Some(1))?;
                out.serialize_entry(ALIAS_FIELD, &target.to_string())?;
                out.end()
            }
        }
    }
}
