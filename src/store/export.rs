//! JSON export and the serialisability map.
//!
//! Three views of the tree:
//! - `dump`: plain data, aliases expanded, every user key included
//! - `dump_json`: the same as text, minus keys marked non-serialisable
//! - `export_raw`: the tree as stored, aliases kept as `{"$alias": key}`,
//!   minus keys marked non-serialisable
//!
//! Freshness metadata never appears in any of them.

use crate::core::error::ArborResult;
use crate::fetch::FRESHNESS_ROOT;
use crate::refs::Resolver;
use crate::tree::{Key, Node};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Which keys take part in serialised exports.
///
/// A key is excluded when it, or any ancestor, is marked `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Serialisability {
    keys: BTreeMap<Key, bool>,
}

impl Serialisability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: Key, serialisable: bool) {
        self.keys.insert(key, serialisable);
    }

    /// Explicit entry for `key`, if any.
    pub fn get(&self, key: &Key) -> Option<bool> {
        self.keys.get(key).copied()
    }

    pub fn is_serialisable(&self, key: &Key) -> bool {
        (0..=key.len()).all(|len| self.keys.get(&key.truncated(len)) != Some(&false))
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

fn is_metadata(path: &Key) -> bool {
    path.segments().first().map(String::as_str) == Some(FRESHNESS_ROOT)
}

/// Fully dereferenced copy of the tree.
pub fn dump(tree: &Node, resolver: &Resolver) -> ArborResult<Value> {
    let out = resolver.expand_filtered(tree, tree, &Key::root(), &|path| !is_metadata(path))?;
    Ok(out.unwrap_or(Value::Null))
}

/// JSON text of the tree honouring `serialisability`.
///
/// Degrades to an empty string when the tree cannot be rendered.
pub fn dump_json(tree: &Node, resolver: &Resolver, serialisability: &Serialisability) -> String {
    let include = |path: &Key| !is_metadata(path) && serialisability.is_serialisable(path);
    let rendered = resolver
        .expand_filtered(tree, tree, &Key::root(), &include)
        .and_then(|value| Ok(serde_json::to_string(&value.unwrap_or(Value::Null))?));
    match rendered {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "json export failed");
            String::new()
        }
    }
}

/// The tree as stored, aliases intact, excluded keys omitted.
pub fn export_raw(tree: &Node, serialisability: &Serialisability) -> Node {
    raw_at(tree, &Key::root(), &|path| {
        !is_metadata(path) && serialisability.is_serialisable(path)
    })
    .unwrap_or(Node::Null)
}

fn raw_at(node: &Node, path: &Key, include: &dyn Fn(&Key) -> bool) -> Option<Node> {
    if !include(path) {
        return None;
    }
    let out = match node {
        Node::Object(map) => Node::Object(
            map.iter()
                .filter_map(|(k, v)| raw_at(v, &path.child(k.clone()), include).map(|v| (k.clone(), v)))
                .collect(),
        ),
        Node::Array(items) => Node::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| raw_at(v, &path.child(i.to_string()), include).unwrap_or(Node::Null))
                .collect(),
        ),
        other => other.clone(),
    };
    Some(out)
}
