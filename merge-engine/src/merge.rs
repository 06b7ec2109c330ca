//! Structural merge of declaration trees.
//!
//! Input trees are folded, in order, into one accumulating output tree. The
//! merger walks each input in document order while keeping a stack of output
//! scopes and a live [`Index`] of everything already placed in the output:
//!
//! - A **scope** is matched against earlier scopes with the same
//!   fully-qualified name. Compatible scopes are reused so their bodies merge;
//!   incompatible headers are wrapped in a scope conflict and the incoming body
//!   keeps merging into the existing scope.
//! - A plain **tree** is transparent: its comments go to the current scope and
//!   its children are merged directly.
//! - An **indexable leaf** is matched by identity key. Compatible leaves merge
//!   their attributes; incompatible ones end up side by side in a conflict
//!   tree.
//!
//! Structural mismatches never fail the merge. They are recorded as
//! [`Conflict`]s and materialized in the output for human review.

use std::fmt;

use crate::index::Index;
use crate::types::{ConflictSides, DeclTree, NodeId, NodeKind, Scope};

/// What to do with incompatible declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Keep {
    /// Keep both sides in a conflict.
    #[default]
    None,
    /// Keep the declaration already in the output.
    Left,
    /// Replace the declaration already in the output with the incoming one.
    Right,
}

#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub left_label: String,
    pub right_label: String,
    pub keep: Keep,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            left_label: "left".into(),
            right_label: "right".into(),
            keep: Keep::None,
        }
    }
}

impl MergeOptions {
    pub fn new(left_label: impl Into<String>, right_label: impl Into<String>) -> Self {
        Self {
            left_label: left_label.into(),
            right_label: right_label.into(),
            keep: Keep::None,
        }
    }

    pub fn keep(mut self, keep: Keep) -> Self {
        self.keep = keep;
        self
    }
}

/// One pair of incompatible declarations sharing an identity key.
///
/// Both handles point into the merged tree. `right` may be detached when the
/// existing scope was already part of a scope conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub key: String,
    pub left: NodeId,
    pub right: NodeId,
    pub left_label: String,
    pub right_label: String,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conflicting definitions for `{}` ({} vs {})",
            self.key, self.left_label, self.right_label
        )
    }
}

#[derive(Debug)]
pub struct MergeOutput {
    pub tree: DeclTree,
    pub conflicts: Vec<Conflict>,
}

impl MergeOutput {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Merge `left` then `right` into a fresh tree, producing conflicts for
/// incompatible declarations.
pub fn merge_trees(
    left: &DeclTree,
    right: &DeclTree,
    left_label: &str,
    right_label: &str,
) -> MergeOutput {
    merge_trees_with(left, right, &MergeOptions::new(left_label, right_label))
}

pub fn merge_trees_with(left: &DeclTree, right: &DeclTree, options: &MergeOptions) -> MergeOutput {
    merge_all([left, right], options)
}

/// Fold any number of trees, in order, into one output tree.
pub fn merge_all<'a, I>(trees: I, options: &MergeOptions) -> MergeOutput
where
    I: IntoIterator<Item = &'a DeclTree>,
{
    let mut merger = TreeMerger::new(options);
    for (i, tree) in trees.into_iter().enumerate() {
        tracing::debug!(tree = i, nodes = tree.arena_len(), "merging tree");
        merger.merge(tree);
    }
    let mut output = merger.finish();
    coalesce_conflicts(&mut output.tree);
    if output.has_conflicts() {
        tracing::info!(conflicts = output.conflicts.len(), "merge finished with conflicts");
    } else {
        tracing::debug!("merge finished cleanly");
    }
    output
}

struct TreeMerger<'o> {
    options: &'o MergeOptions,
    output: DeclTree,
    index: Index,
    scope_stack: Vec<NodeId>,
    conflicts: Vec<Conflict>,
}

impl<'o> TreeMerger<'o> {
    fn new(options: &'o MergeOptions) -> Self {
        let output = DeclTree::new();
        let root = output.root();
        Self {
            options,
            output,
            index: Index::new(),
            scope_stack: vec![root],
            conflicts: Vec::new(),
        }
    }

    fn finish(self) -> MergeOutput {
        MergeOutput {
            tree: self.output,
            conflicts: self.conflicts,
        }
    }

    fn merge(&mut self, src: &DeclTree) {
        self.visit(src, src.root());
    }

    fn current_scope(&self) -> NodeId {
        self.scope_stack
            .last()
            .copied()
            .unwrap_or_else(|| self.output.root())
    }

    fn current_scope_name(&self) -> String {
        let current = self.current_scope();
        match self.output.kind(current) {
            NodeKind::Scope(_) => self.output.fully_qualified_name(current),
            _ => String::new(),
        }
    }

    fn visit(&mut self, src: &DeclTree, id: NodeId) {
        match src.kind(id) {
            NodeKind::Scope(scope) => self.visit_scope(src, id, scope),
            NodeKind::Tree | NodeKind::Group(_) | NodeKind::VisibilityGroup(_) => {
                let current = self.current_scope();
                self.output
                    .node_mut(current)
                    .merge_comments(&src.node(id).comments);
                for &child in src.children(id) {
                    self.visit(src, child);
                }
            }
            NodeKind::ConflictTree(_) | NodeKind::ScopeConflict(_) => {
                // Unresolved conflicts from an earlier merge are carried over verbatim.
                let copy = self.output.import_subtree(src, id);
                let current = self.current_scope();
                self.output.attach(current, copy);
            }
            _ => self.visit_leaf(src, id),
        }
    }

    fn visit_scope(&mut self, src: &DeclTree, id: NodeId, scope: &Scope) {
        let key = scope.fully_qualified_name(&self.current_scope_name());
        let prev = self
            .index
            .get(&key)
            .iter()
            .rev()
            .copied()
            .find(|&p| self.output.kind(p).is_scope());

        let target = match prev {
            Some(prev) => {
                let compatible = self.output.node(prev).compatible_with(src.node(id));
                if compatible {
                    tracing::debug!(key = %key, "merging into existing scope");
                    self.output
                        .node_mut(prev)
                        .merge_comments(&src.node(id).comments);
                } else {
                    match self.options.keep {
                        Keep::Left => {
                            tracing::debug!(key = %key, "keeping existing scope header");
                        }
                        Keep::Right => {
                            tracing::debug!(key = %key, "replacing existing scope header");
                            let node = self.output.node_mut(prev);
                            node.kind = NodeKind::Scope(scope.clone());
                            node.comments = src.node(id).comments.clone();
                        }
                        Keep::None => self.make_scope_conflict(prev, src, id, key),
                    }
                }
                prev
            }
            None => {
                let copy = self.output.import_node(src, id);
                let current = self.current_scope();
                self.output.attach(current, copy);
                self.index.insert(key, copy);
                copy
            }
        };

        self.scope_stack.push(target);
        for &child in src.children(id) {
            self.visit(src, child);
        }
        self.scope_stack.pop();
    }

    fn visit_leaf(&mut self, src: &DeclTree, id: NodeId) {
        let keys = src.kind(id).index_keys(&self.current_scope_name());
        let prev = keys
            .iter()
            .find_map(|key| self.index.last(key).map(|prev| (key.clone(), prev)));

        let Some((key, prev)) = prev else {
            let copy = self.output.import_node(src, id);
            let current = self.current_scope();
            self.output.attach(current, copy);
            for key in keys {
                self.index.insert(key, copy);
            }
            return;
        };

        if self.output.node(prev).compatible_with(src.node(id)) {
            tracing::debug!(key = %key, "merging compatible declaration");
            self.output.node_mut(prev).merge_with(src.node(id));
            return;
        }

        match self.options.keep {
            Keep::Left => {
                tracing::debug!(key = %key, "keeping existing declaration");
            }
            Keep::Right if self.output.kind(prev).is_container() => {
                self.replace_scope_with_leaf(prev, src, id, keys, &key);
            }
            Keep::Right => {
                tracing::debug!(key = %key, "replacing existing declaration");
                let incoming = src.node(id);
                let node = self.output.node_mut(prev);
                node.kind = incoming.kind.clone();
                node.comments = incoming.comments.clone();
                node.loc = incoming.loc.clone();
            }
            Keep::None => self.make_conflict_tree(prev, src, id, key),
        }
    }

    /// Swap a scope out for an incoming leaf. The scope's body goes with it.
    fn replace_scope_with_leaf(
        &mut self,
        prev: NodeId,
        src: &DeclTree,
        id: NodeId,
        keys: Vec<String>,
        key: &str,
    ) {
        tracing::warn!(key = %key, "replacing scope with a declaration drops its body");
        let anchor = match self.output.parent(prev) {
            Some(p) if matches!(self.output.kind(p), NodeKind::ScopeConflict(_)) => p,
            _ => prev,
        };
        let mut dropped = self.output.descendants(anchor);
        dropped.push(anchor);
        self.index.forget(&dropped);

        let copy = self.output.import_node(src, id);
        self.output.replace(anchor, copy);
        for key in keys {
            self.index.insert(key, copy);
        }
    }

    fn make_scope_conflict(&mut self, prev: NodeId, src: &DeclTree, id: NodeId, key: String) {
        let header = self.output.import_node(src, id);
        let already_conflicted = self
            .output
            .parent(prev)
            .is_some_and(|p| matches!(self.output.kind(p), NodeKind::ScopeConflict(_)));
        if !already_conflicted {
            self.output.wrap_in_scope_conflict(
                prev,
                header,
                &self.options.left_label,
                &self.options.right_label,
            );
        }
        self.record(key, prev, header);
    }

    fn make_conflict_tree(&mut self, prev: NodeId, src: &DeclTree, id: NodeId, key: String) {
        let right = self.output.import_node(src, id);
        let conflict = match self.output.enclosing_conflict_tree(prev) {
            Some(conflict) => conflict,
            None => {
                // A scope already in a scope conflict is wrapped together with its headers.
                let anchor = match self.output.parent(prev) {
                    Some(p) if matches!(self.output.kind(p), NodeKind::ScopeConflict(_)) => p,
                    _ => prev,
                };
                self.output.wrap_in_conflict_tree(
                    anchor,
                    &self.options.left_label,
                    &self.options.right_label,
                )
            }
        };
        let bucket = match self.output.kind(conflict) {
            NodeKind::ConflictTree(sides) => sides.right,
            _ => unreachable!("enclosing conflict is always a conflict tree"),
        };
        self.output.attach(bucket, right);
        self.record(key, prev, right);
    }

    fn record(&mut self, key: String, left: NodeId, right: NodeId) {
        tracing::warn!(
            key = %key,
            left = %self.options.left_label,
            right = %self.options.right_label,
            "conflicting definitions"
        );
        self.conflicts.push(Conflict {
            key,
            left,
            right,
            left_label: self.options.left_label.clone(),
            right_label: self.options.right_label.clone(),
        });
    }
}

/// Fold runs of consecutive conflict trees into the first one of each run.
///
/// Only immediately adjacent siblings are coalesced; any other node between
/// two conflict trees keeps them apart.
pub fn coalesce_conflicts(tree: &mut DeclTree) {
    let root = tree.root();
    coalesce_in(tree, root);
}

fn coalesce_in(tree: &mut DeclTree, id: NodeId) {
    let mut run_head: Option<ConflictSides> = None;
    for child in tree.children(id).to_vec() {
        let Some(sides) = tree.kind(child).conflict_sides().cloned() else {
            run_head = None;
            continue;
        };
        if !matches!(tree.kind(child), NodeKind::ConflictTree(_)) {
            run_head = None;
            continue;
        }
        match &run_head {
            Some(head) => {
                for (from, to) in [(sides.left, head.left), (sides.right, head.right)] {
                    for node in tree.children(from).to_vec() {
                        tree.attach(to, node);
                    }
                }
                tree.detach(child);
            }
            None => run_head = Some(sides),
        }
    }

    for child in tree.children(id).to_vec() {
        for nested in tree.nested_containers(child) {
            coalesce_in(tree, nested);
        }
    }
}
