//! Path accessor: read and write a node at a key inside a tree.
//!
//! This layer knows nothing about aliases; callers resolve keys first.
//!
//! Writes take the tree root by `Arc`. In place mode mutates through
//! `Arc::make_mut`, so a root that is shared (for example by a caller holding
//! an older snapshot) is cloned before mutation. Copy-on-write mode always
//! builds a new root, and hands back the original `Arc` untouched when the
//! write changes nothing; callers detect that with `Arc::ptr_eq`, or use
//! [`set_in`] which reports it directly.
//!
//! Numeric segments index arrays up to one past the end (an append). Any
//! larger index turns the array into an object keyed by index.

use crate::tree::key::Key;
use crate::tree::node::Node;
use std::collections::BTreeMap;
use std::sync::Arc;

/// How a write is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessMode {
    /// Deep-merge objects instead of replacing them.
    pub merge: bool,
    /// Copy-on-write.
    pub immutable: bool,
}

/// Read the node at `key`.
pub fn get<'a>(tree: &'a Node, key: &Key) -> Option<&'a Node> {
    let mut current = tree;
    for segment in key.segments() {
        current = current.child(segment)?;
    }
    Some(current)
}

/// Write `value` at `key` and return the resulting root.
pub fn set(mut tree: Arc<Node>, key: &Key, value: Node, mode: AccessMode) -> Arc<Node> {
    set_in(&mut tree, key, value, mode);
    tree
}

/// Write `value` at `key` through `tree`, replacing the root only when the
/// write succeeds. Returns false for a copy-on-write no-op.
pub fn set_in(tree: &mut Arc<Node>, key: &Key, value: Node, mode: AccessMode) -> bool {
    if mode.immutable {
        let mut next = (**tree).clone();
        write(&mut next, key.segments(), value, mode.merge);
        if next == **tree {
            return false;
        }
        *tree = Arc::new(next);
        return true;
    }

    write(Arc::make_mut(tree), key.segments(), value, mode.merge);
    true
}

fn write(target: &mut Node, segments: &[String], value: Node, merge: bool) {
    let Some((head, rest)) = segments.split_first() else {
        if merge {
            deep_merge(target, value);
        } else {
            *target = value;
        }
        return;
    };

    let index = head.parse::<usize>().ok();
    match (&mut *target, index) {
        (Node::Object(_), _) => {}
        (Node::Array(items), Some(index)) if index <= items.len() => {}
        (Node::Array(items), _) => {
            // A named segment, or an index past the end, turns the array
            // into an object keyed by index.
            let map: BTreeMap<String, Node> = std::mem::take(items)
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect();
            *target = Node::Object(map);
        }
        _ => *target = Node::object(),
    }

    let slot = match (target, index) {
        (Node::Array(items), Some(index)) => {
            if index == items.len() {
                items.push(Node::Null);
            }
            match items.get_mut(index) {
                Some(slot) => slot,
                None => return,
            }
        }
        (Node::Object(map), _) => map.entry(head.clone()).or_insert(Node::Null),
        _ => return,
    };
    write(slot, rest, value, merge);
}

/// Merge `source` into `target`.
///
/// Objects merge key by key, recursively; anything else replaces the target.
pub fn deep_merge(target: &mut Node, source: Node) {
    match (target, source) {
        (Node::Object(existing), Node::Object(incoming)) => {
            for (k, v) in incoming {
                match existing.get_mut(&k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        existing.insert(k, v);
                    }
                }
            }
        }
        (target, source) => *target = source,
    }
}
