//! Normalization passes.
//!
//! Each pass is a deterministic tree rewrite. The canonical pipeline runs
//!
//! 1. **Nest singleton methods** into a `class << self` scope per container
//! 2. **Nest non-public methods** (and attributes) into public/protected/private groups
//! 3. **Group nodes** into fixed categories
//! 4. **Sort nodes** by category rank, then name, then original position
//!
//! Grouping must run before sorting: sorting ranks the materialized groups.
//! Every pass is idempotent on its own output, and so is the pipeline.

use std::collections::BTreeMap;

use crate::types::{DeclTree, GroupKind, MixinKind, NodeId, NodeKind, Scope, Visibility};

/// A tree rewrite that can take part in a [`Pipeline`].
pub trait Rewriter: Send + Sync {
    /// Human-readable name for the pass.
    fn name(&self) -> &str;

    fn rewrite(&self, tree: &mut DeclTree);
}

/// Ordered list of rewrites applied to one tree.
pub struct Pipeline {
    passes: Vec<Box<dyn Rewriter>>,
}

impl Pipeline {
    /// nest-singleton → nest-non-public → group → sort.
    pub fn canonical() -> Self {
        Self {
            passes: vec![
                Box::new(NestSingletonMethods),
                Box::new(NestNonPublicMethods),
                Box::new(GroupNodes),
                Box::new(SortNodes),
            ],
        }
    }

    pub fn empty() -> Self {
        Self { passes: Vec::new() }
    }

    pub fn with(mut self, pass: impl Rewriter + 'static) -> Self {
        self.passes.push(Box::new(pass));
        self
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn run(&self, tree: &mut DeclTree) {
        for pass in &self.passes {
            tracing::debug!(pass = pass.name(), "running normalization pass");
            pass.rewrite(tree);
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::canonical()
    }
}

/// Run the canonical pipeline.
pub fn normalize(tree: &mut DeclTree) {
    Pipeline::canonical().run(tree);
}

fn for_each_nested(tree: &mut DeclTree, children: &[NodeId], visit: fn(&mut DeclTree, NodeId)) {
    for &child in children {
        for nested in tree.nested_containers(child) {
            visit(tree, nested);
        }
    }
}

// ──────────────────────────────────────────────────────────────
// Pass 1: nest singleton methods
// ──────────────────────────────────────────────────────────────

pub struct NestSingletonMethods;

impl Rewriter for NestSingletonMethods {
    fn name(&self) -> &str {
        "nest-singleton-methods"
    }

    fn rewrite(&self, tree: &mut DeclTree) {
        let root = tree.root();
        nest_singletons_in(tree, root);
    }
}

fn nest_singletons_in(tree: &mut DeclTree, id: NodeId) {
    let children = tree.children(id).to_vec();
    for_each_nested(tree, &children, nest_singletons_in);

    let singletons: Vec<NodeId> = children
        .into_iter()
        .filter(|&c| tree.kind(c).as_method().is_some_and(|m| m.is_singleton))
        .collect();
    if singletons.is_empty() {
        return;
    }

    tracing::trace!(container = id, count = singletons.len(), "nesting singleton methods");
    let singleton_class = tree.append(id, Scope::SingletonClass);
    for method in singletons {
        if let NodeKind::Method(m) = &mut tree.node_mut(method).kind {
            m.is_singleton = false;
        }
        tree.attach(singleton_class, method);
    }
}

// ──────────────────────────────────────────────────────────────
// Pass 2: nest non-public methods
// ──────────────────────────────────────────────────────────────

pub struct NestNonPublicMethods;

impl Rewriter for NestNonPublicMethods {
    fn name(&self) -> &str {
        "nest-non-public-methods"
    }

    fn rewrite(&self, tree: &mut DeclTree) {
        let root = tree.root();
        nest_non_public_in(tree, root);
    }
}

fn nest_non_public_in(tree: &mut DeclTree, id: NodeId) {
    let children = tree.children(id).to_vec();
    for_each_nested(tree, &children, nest_non_public_in);

    if within_visibility_group(tree, id) {
        return;
    }

    let mut buckets: BTreeMap<Visibility, Vec<NodeId>> = BTreeMap::new();
    for child in children {
        let visibility = match tree.kind(child) {
            NodeKind::Method(method) => method.visibility,
            NodeKind::Attr(attr) => attr.visibility,
            _ => continue,
        };
        buckets.entry(visibility).or_default().push(child);
    }

    for (visibility, members) in buckets {
        let group = tree.append(id, NodeKind::VisibilityGroup(visibility));
        for member in members {
            tree.attach(group, member);
        }
    }
}

/// True when `id` is a visibility group or sits in one below its nearest scope.
/// Methods there are already partitioned.
fn within_visibility_group(tree: &DeclTree, id: NodeId) -> bool {
    let mut current = Some(id);
    while let Some(node) = current {
        match tree.kind(node) {
            NodeKind::VisibilityGroup(_) => return true,
            NodeKind::Scope(_) => return false,
            _ => current = tree.parent(node),
        }
    }
    false
}

// ──────────────────────────────────────────────────────────────
// Pass 3: group nodes
// ──────────────────────────────────────────────────────────────

pub struct GroupNodes;

impl Rewriter for GroupNodes {
    fn name(&self) -> &str {
        "group-nodes"
    }

    fn rewrite(&self, tree: &mut DeclTree) {
        let root = tree.root();
        group_in(tree, root);
    }
}

/// Category a node is grouped under.
pub fn group_kind(kind: &NodeKind) -> GroupKind {
    match kind {
        NodeKind::Mixin(m) => match m.kind {
            MixinKind::Include | MixinKind::Extend => GroupKind::Mixins,
            MixinKind::MixesInClassMethods => GroupKind::MixesInClassMethods,
        },
        NodeKind::Helper(_) => GroupKind::Helpers,
        NodeKind::TypeMember(_) => GroupKind::TypeMembers,
        NodeKind::StructField(_) => GroupKind::StructFields,
        NodeKind::Enum(_) => GroupKind::Enums,
        NodeKind::Method(m) if m.is_initializer() => GroupKind::Inits,
        NodeKind::Method(_)
        | NodeKind::Attr(_)
        | NodeKind::VisibilityGroup(_)
        | NodeKind::Visibility(_) => GroupKind::Methods,
        NodeKind::Group(kind) => *kind,
        NodeKind::Tree
        | NodeKind::Scope(_)
        | NodeKind::Const(_)
        | NodeKind::ConflictTree(_)
        | NodeKind::ScopeConflict(_) => GroupKind::ScopesAndConsts,
    }
}

fn group_in(tree: &mut DeclTree, id: NodeId) {
    let children = tree.children(id).to_vec();
    for_each_nested(tree, &children, group_in);

    if matches!(tree.kind(id), NodeKind::Group(_)) {
        return;
    }

    let mut buckets: BTreeMap<GroupKind, Vec<NodeId>> = BTreeMap::new();
    for child in children {
        tree.detach(child);
        match tree.kind(child) {
            // Regrouping flattens groups from an earlier run back into their bucket.
            NodeKind::Group(kind) => {
                let kind = *kind;
                let members = tree.children(child).to_vec();
                for member in members {
                    tree.detach(member);
                    buckets.entry(kind).or_default().push(member);
                }
            }
            other => {
                let kind = group_kind(other);
                buckets.entry(kind).or_default().push(child);
            }
        }
    }

    for (kind, members) in buckets {
        let group = tree.append(id, NodeKind::Group(kind));
        for member in members {
            tree.attach(group, member);
        }
    }
}

// ──────────────────────────────────────────────────────────────
// Pass 4: sort nodes
// ──────────────────────────────────────────────────────────────

pub struct SortNodes;

impl Rewriter for SortNodes {
    fn name(&self) -> &str {
        "sort-nodes"
    }

    fn rewrite(&self, tree: &mut DeclTree) {
        let root = tree.root();
        sort_in(tree, root);
    }
}

/// `(category, sub-rank)` of a node; lower sorts first.
pub fn sort_rank(kind: &NodeKind) -> (u8, u8) {
    match kind {
        NodeKind::Group(group) => (group.rank(), 0),
        NodeKind::Method(m) if m.is_initializer() => (GroupKind::Inits.rank(), 0),
        NodeKind::Method(m) => (GroupKind::Methods.rank(), u8::from(m.is_singleton)),
        NodeKind::Scope(_) | NodeKind::ScopeConflict(_) | NodeKind::Const(_) => {
            (GroupKind::ScopesAndConsts.rank(), 0)
        }
        NodeKind::Tree | NodeKind::ConflictTree(_) => (GroupKind::ScopesAndConsts.rank() + 1, 0),
        other => (group_kind(other).rank(), 0),
    }
}

/// Name used to order siblings of the same rank. Declarations whose relative
/// order is meaningful (mixins, type members, fields, enums) have none.
fn sort_name(tree: &DeclTree, id: NodeId) -> Option<String> {
    match tree.kind(id) {
        NodeKind::Scope(_)
        | NodeKind::Const(_)
        | NodeKind::Method(_)
        | NodeKind::Attr(_)
        | NodeKind::Helper(_) => tree.kind(id).name().map(str::to_string),
        NodeKind::ScopeConflict(sides) => tree.kind(sides.left).name().map(str::to_string),
        _ => None,
    }
}

fn sort_in(tree: &mut DeclTree, id: NodeId) {
    let children = tree.children(id).to_vec();
    for_each_nested(tree, &children, sort_in);

    // Moving declarations across a visibility marker would change their visibility.
    if children
        .iter()
        .any(|&c| matches!(tree.kind(c), NodeKind::Visibility(_)))
    {
        return;
    }

    let mut keyed: Vec<((u8, u8), Option<String>, usize, NodeId)> = children
        .iter()
        .enumerate()
        .map(|(i, &c)| (sort_rank(tree.kind(c)), sort_name(tree, c), i, c))
        .collect();
    keyed.sort();
    let order = keyed.into_iter().map(|(_, _, _, c)| c).collect();
    tree.reorder_children(id, order);
}
