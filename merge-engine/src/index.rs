//! Identity index over a declaration tree.
//!
//! Maps each identity key to the ordered list of nodes registered under it.
//! A node contributes one entry per key, so multi-name declarations show up
//! in several buckets. Only the left side of a conflict is indexed: it is the
//! declaration later merges are compared against.

use std::collections::HashMap;
use std::ops;

use crate::types::{DeclTree, NodeId, NodeKind};

#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: HashMap<String, Vec<NodeId>>,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every node reachable from the root in one traversal.
    pub fn build(tree: &DeclTree) -> Self {
        let mut index = Self::new();
        index.visit(tree, tree.root());
        index
    }

    fn visit(&mut self, tree: &DeclTree, id: NodeId) {
        match tree.kind(id) {
            NodeKind::ConflictTree(sides) | NodeKind::ScopeConflict(sides) => {
                self.visit(tree, sides.left);
            }
            _ => {
                self.register(tree, id);
                for &child in tree.children(id) {
                    self.visit(tree, child);
                }
            }
        }
    }

    /// Register `id` under each of its identity keys.
    pub fn register(&mut self, tree: &DeclTree, id: NodeId) {
        for key in tree.index_keys(id) {
            self.insert(key, id);
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, id: NodeId) {
        self.entries.entry(key.into()).or_default().push(id);
    }

    /// Drop every entry pointing at one of `ids`. Emptied keys are removed.
    pub fn forget(&mut self, ids: &[NodeId]) {
        self.entries.retain(|_, nodes| {
            nodes.retain(|id| !ids.contains(id));
            !nodes.is_empty()
        });
    }

    /// Nodes registered under `key`, in insertion order. Unseen keys yield an
    /// empty slice.
    pub fn get(&self, key: &str) -> &[NodeId] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Most recently registered node for `key`.
    pub fn last(&self, key: &str) -> Option<NodeId> {
        self.get(key).last().copied()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl ops::Index<&str> for Index {
    type Output = [NodeId];

    fn index(&self, key: &str) -> &[NodeId] {
        self.get(key)
    }
}
