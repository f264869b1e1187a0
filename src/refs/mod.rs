//! References (aliases) between keys.
//!
//! A [`Reference`] names a target key. Stored in the tree it becomes a
//! [`Node::Alias`]; used as an address it resolves straight to its target.
//! [`resolver::Resolver`] rewrites keys through stored aliases and expands
//! aliases nested inside values.

pub mod resolver;

pub use resolver::Resolver;

use crate::tree::{Key, Node};

/// A handle to a key, storable as an alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    target: Key,
}

impl Reference {
    /// Create a reference to `target`.
    pub fn new(target: impl Into<Key>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &Key {
        &self.target
    }

    /// Parse an alias node back into a reference.
    pub fn from_node(node: &Node) -> Option<Self> {
        node.as_alias().map(|target| Self {
            target: target.clone(),
        })
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "->{}", self.target.to_absolute())
    }
}

impl From<Reference> for Node {
    fn from(reference: Reference) -> Self {
        Node::Alias(reference.target)
    }
}

impl From<&Reference> for Node {
    fn from(reference: &Reference) -> Self {
        Node::Alias(reference.target.clone())
    }
}

/// Where a read or write is aimed before alias resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    /// A plain key, resolved by walking the tree.
    Key(Key),
    /// A reference; resolves to its target without walking.
    Reference(Key),
}

impl Address {
    /// The key as written, before resolution.
    pub fn key(&self) -> &Key {
        match self {
            Address::Key(key) | Address::Reference(key) => key,
        }
    }

    /// Prepend `prefix` to this address.
    ///
    /// References are absolute and ignore the prefix.
    pub fn under(self, prefix: &Key) -> Address {
        match self {
            Address::Key(key) => Address::Key(prefix.join(&key)),
            reference @ Address::Reference(_) => reference,
        }
    }
}

/// Anything usable as an address.
pub trait IntoAddress {
    fn into_address(self) -> Address;
}

impl IntoAddress for Address {
    fn into_address(self) -> Address {
        self
    }
}

impl IntoAddress for &str {
    fn into_address(self) -> Address {
        Address::Key(Key::parse(self))
    }
}

impl IntoAddress for String {
    fn into_address(self) -> Address {
        Address::Key(Key::parse(&self))
    }
}

impl IntoAddress for &String {
    fn into_address(self) -> Address {
        Address::Key(Key::parse(self))
    }
}

impl IntoAddress for Key {
    fn into_address(self) -> Address {
        Address::Key(self)
    }
}

impl IntoAddress for &Key {
    fn into_address(self) -> Address {
        Address::Key(self.clone())
    }
}

impl IntoAddress for Reference {
    fn into_address(self) -> Address {
        Address::Reference(self.target)
    }
}

impl IntoAddress for &Reference {
    fn into_address(self) -> Address {
        Address::Reference(self.target.clone())
    }
}
