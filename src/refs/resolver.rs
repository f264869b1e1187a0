//! Alias resolution.
//!
//! Resolution walks the tree from the root along the key. At the first node
//! that is an alias, the alias target replaces the consumed prefix, the
//! unconsumed segments are re-attached, and the walk restarts. Every
//! substitution counts as one hop; more than `max_hops` hops, or a
//! substitution that yields the key it started from, is a reference cycle.

use crate::core::error::{ArborError, ArborResult};
use crate::refs::Address;
use crate::tree::{accessor, Key, Node};
use serde_json::{Map, Value};

/// Rewrites addresses through aliases stored in a tree.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    max_hops: usize,
}

impl Resolver {
    /// Create a resolver with the given hop bound.
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Resolve an address to the key it ultimately designates.
    pub fn resolve(&self, tree: &Node, address: &Address) -> ArborResult<Key> {
        match address {
            Address::Reference(target) => Ok(target.clone()),
            Address::Key(key) => self.resolve_key(tree, key),
        }
    }

    /// Resolve a key through every alias on its path.
    pub fn resolve_key(&self, tree: &Node, key: &Key) -> ArborResult<Key> {
        let mut current = key.clone();
        let mut hops = 0;

        'walk: loop {
            let mut node = tree;
            for (depth, segment) in current.segments().iter().enumerate() {
                match node.child(segment) {
                    Some(Node::Alias(target)) => {
                        hops += 1;
                        let next = target.join(&current.suffix(depth + 1));
                        if hops > self.max_hops || next == current {
                            return Err(ArborError::reference_cycle(key.to_string(), hops));
                        }
                        current = next;
                        continue 'walk;
                    }
                    Some(child) => node = child,
                    None => break 'walk,
                }
            }
            break;
        }

        Ok(current)
    }

    /// Convert a node to JSON, replacing every nested alias with the value
    /// it designates.
    ///
    /// Dangling aliases expand to `null`.
    pub fn expand(&self, tree: &Node, node: &Node) -> ArborResult<Value> {
        self.expand_at(tree, node, &Key::root(), 0, &|_| true)
            .map(|v| v.unwrap_or(Value::Null))
    }

    /// Like [`Resolver::expand`], dropping every subtree whose output path
    /// (relative to `path`) is rejected by `include`.
    ///
    /// Returns `None` when `path` itself is rejected.
    pub fn expand_filtered(
        &self,
        tree: &Node,
        node: &Node,
        path: &Key,
        include: &dyn Fn(&Key) -> bool,
    ) -> ArborResult<Option<Value>> {
        self.expand_at(tree, node, path, 0, include)
    }

    fn expand_at(
        &self,
        tree: &Node,
        node: &Node,
        path: &Key,
        depth: usize,
        include: &dyn Fn(&Key) -> bool,
    ) -> ArborResult<Option<Value>> {
        if !include(path) {
            return Ok(None);
        }

        let value = match node {
            Node::Alias(target) => {
                if depth >= self.max_hops {
                    return Err(ArborError::reference_cycle(target.to_string(), depth + 1));
                }
                let resolved = self.resolve_key(tree, target)?;
                match accessor::get(tree, &resolved) {
                    Some(found) => self
                        .expand_at(tree, found, path, depth + 1, include)?
                        .unwrap_or(Value::Null),
                    None => Value::Null,
                }
            }
            Node::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let child = path.child(i.to_string());
                    // Excluded array slots keep their position as null.
                    out.push(
                        self.expand_at(tree, item, &child, depth, include)?
                            .unwrap_or(Value::Null),
                    );
                }
                Value::Array(out)
            }
            Node::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    let child = path.child(k.clone());
                    if let Some(expanded) = self.expand_at(tree, v, &child, depth, include)? {
                        out.insert(k.clone(), expanded);
                    }
                }
                Value::Object(out)
            }
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(*b),
            Node::Number(n) => Value::Number(n.clone()),
            Node::String(s) => Value::String(s.clone()),
        };
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree_with(entries: &[(&str, Node)]) -> Node {
        let mut tree = std::sync::Arc::new(Node::object());
        for (key, node) in entries {
            tree = accessor::set(tree, &Key::parse(key), node.clone(), Default::default());
        }
        (*tree).clone()
    }

    fn alias(target: &str) -> Node {
        Node::Alias(Key::parse(target))
    }

    #[test]
    fn plain_key_resolves_to_itself() {
        let tree = tree_with(&[("a/b", Node::from(1i64))]);
        let resolver = Resolver::new(8);
        assert_eq!(resolver.resolve_key(&tree, &Key::parse("a/b")).unwrap(), Key::parse("a/b"));
        assert_eq!(
            resolver.resolve_key(&tree, &Key::parse("missing/x")).unwrap(),
            Key::parse("missing/x")
        );
    }

    #[test]
    fn alias_reattaches_suffix() {
        let tree = tree_with(&[
            ("foo/bar", Node::from(json!({"bat": true}))),
            ("stuff", alias("foo/bar")),
        ]);
        let resolver = Resolver::new(8);
        assert_eq!(
            resolver.resolve_key(&tree, &Key::parse("stuff/bat")).unwrap(),
            Key::parse("foo/bar/bat")
        );
    }

    #[test]
    fn alias_chain_reaches_fixed_point() {
        let tree = tree_with(&[
            ("target", Node::from(1i64)),
            ("a", alias("b")),
            ("b", alias("c")),
            ("c", alias("target")),
        ]);
        let resolver = Resolver::new(8);
        assert_eq!(resolver.resolve_key(&tree, &Key::parse("a")).unwrap(), Key::parse("target"));
    }

    #[test]
    fn reference_address_skips_walk() {
        let tree = tree_with(&[("a", alias("b"))]);
        let resolver = Resolver::new(8);
        let key = resolver
            .resolve(&tree, &Address::Reference(Key::parse("a")))
            .unwrap();
        assert_eq!(key, Key::parse("a"));
    }

    #[test]
    fn cycle_is_bounded() {
        let tree = tree_with(&[("a", alias("b")), ("b", alias("a"))]);
        let err = Resolver::new(16).resolve_key(&tree, &Key::parse("a")).unwrap_err();
        assert!(matches!(err, ArborError::ReferenceCycle { hops: 17, .. }));
    }

    #[test]
    fn self_alias_is_a_cycle() {
        let tree = tree_with(&[("a", alias("a"))]);
        let err = Resolver::new(16).resolve_key(&tree, &Key::parse("a")).unwrap_err();
        assert!(matches!(err, ArborError::ReferenceCycle { hops: 1, .. }));
    }

    #[test]
    fn expand_replaces_nested_aliases() {
        let tree = tree_with(&[
            ("data/x", Node::from(1i64)),
            ("view", Node::from(json!({"list": [null]}))),
            ("view/list/0", alias("data")),
            ("view/dangling", alias("nowhere")),
        ]);
        let resolver = Resolver::new(8);
        let view = accessor::get(&tree, &Key::parse("view")).unwrap();
        assert_eq!(
            resolver.expand(&tree, view).unwrap(),
            json!({"list": [{"x": 1}], "dangling": null})
        );
    }

    #[test]
    fn expand_detects_structural_cycle() {
        let tree = tree_with(&[("a/self", alias("a"))]);
        let resolver = Resolver::new(8);
        let a = accessor::get(&tree, &Key::parse("a")).unwrap();
        assert!(matches!(
            resolver.expand(&tree, a),
            Err(ArborError::ReferenceCycle { .. })
        ));
    }

    #[test]
    fn expand_filtered_drops_excluded_paths() {
        let tree = tree_with(&[
            ("keep", Node::from(1i64)),
            ("drop/inner", Node::from(2i64)),
        ]);
        let resolver = Resolver::new(8);
        let excluded = Key::parse("drop");
        let out = resolver
            .expand_filtered(&tree, &tree, &Key::root(), &|path| !path.starts_with(&excluded))
            .unwrap();
        assert_eq!(out, Some(json!({"keep": 1})));
    }
}
