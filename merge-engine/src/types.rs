//! Declaration node model.
//!
//! Declarations live in an arena ([`DeclTree`]) and are addressed by
//! [`NodeId`] handles. Every node keeps a back-reference to its parent and
//! every container keeps an ordered list of child handles, so detaching or
//! re-parenting a node is a handle reassignment rather than an ownership
//! transfer.
//!
//! Node kinds form a closed set ([`NodeKind`]):
//! - **Containers**: plain trees, scopes (module, class, singleton class),
//!   visibility groups and category groups
//! - **Conflicts**: a conflict tree (two buckets of declarations) or a scope
//!   conflict (two scope headers sharing one body)
//! - **Leaves**: constants, methods, attributes, mixins, visibility markers,
//!   struct fields, enum blocks, helpers and type members
//!
//! The merge-relevant behaviour of each kind (identity keys, compatibility,
//! attribute merging) is an exhaustive match over that set.

use std::fmt;

/// Handle of a node inside a [`DeclTree`].
pub type NodeId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, Visibility::Public)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a declaration came from in its producer's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loc {
    pub file: Option<String>,
    pub begin_line: usize,
    pub begin_column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.file.as_deref().unwrap_or("-"),
            self.begin_line,
            self.begin_column,
            self.end_line,
            self.end_column
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Comment {
    pub text: String,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl From<&str> for Comment {
    fn from(text: &str) -> Self {
        Comment::new(text)
    }
}

// ──────────────────────────────────────────────────────────────
// Parameters and signatures
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Req,
    Opt,
    Rest,
    KwReq,
    KwOpt,
    KwRest,
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub kind: ParamKind,
    pub name: String,
    /// Default expression for optional positional and keyword parameters.
    pub default: Option<String>,
    pub comments: Vec<Comment>,
}

impl Param {
    fn build(kind: ParamKind, name: impl Into<String>, default: Option<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            default,
            comments: Vec::new(),
        }
    }

    pub fn req(name: impl Into<String>) -> Self {
        Self::build(ParamKind::Req, name, None)
    }

    pub fn opt(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::build(ParamKind::Opt, name, Some(default.into()))
    }

    pub fn rest(name: impl Into<String>) -> Self {
        Self::build(ParamKind::Rest, name, None)
    }

    pub fn kw_req(name: impl Into<String>) -> Self {
        Self::build(ParamKind::KwReq, name, None)
    }

    pub fn kw_opt(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self::build(ParamKind::KwOpt, name, Some(default.into()))
    }

    pub fn kw_rest(name: impl Into<String>) -> Self {
        Self::build(ParamKind::KwRest, name, None)
    }

    pub fn block(name: impl Into<String>) -> Self {
        Self::build(ParamKind::Block, name, None)
    }

    pub fn with_comment(mut self, text: impl Into<String>) -> Self {
        self.comments.push(Comment::new(text));
        self
    }

    /// Two parameters have the same shape when kind and name agree.
    /// Default expressions do not take part in merge decisions.
    pub fn same_shape(&self, other: &Param) -> bool {
        self.kind == other.kind && self.name == other.name
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let default = self.default.as_deref().unwrap_or("nil");
        match self.kind {
            ParamKind::Req => write!(f, "{}", self.name),
            ParamKind::Opt => write!(f, "{} = {}", self.name, default),
            ParamKind::Rest => write!(f, "*{}", self.name),
            ParamKind::KwReq => write!(f, "{}:", self.name),
            ParamKind::KwOpt => write!(f, "{}: {}", self.name, default),
            ParamKind::KwRest => write!(f, "**{}", self.name),
            ParamKind::Block => write!(f, "&{}", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigParam {
    pub name: String,
    pub ty: String,
}

/// A type signature attached to a method or attribute.
/// A missing return type means `void`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sig {
    pub params: Vec<SigParam>,
    pub return_type: Option<String>,
    pub is_abstract: bool,
    pub is_override: bool,
    pub is_overridable: bool,
    pub is_final: bool,
    pub type_params: Vec<String>,
}

impl Sig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.params.push(SigParam {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn returns(mut self, ty: impl Into<String>) -> Self {
        self.return_type = Some(ty.into());
        self
    }

    pub fn with_abstract(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_override(mut self) -> Self {
        self.is_override = true;
        self
    }

    pub fn with_overridable(mut self) -> Self {
        self.is_overridable = true;
        self
    }

    pub fn with_final(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn type_param(mut self, name: impl Into<String>) -> Self {
        self.type_params.push(name.into());
        self
    }

    pub fn is_void(&self) -> bool {
        self.return_type.is_none()
    }
}

fn sigs_compatible(left: &[Sig], right: &[Sig]) -> bool {
    left.is_empty() || right.is_empty() || left == right
}

fn merge_sigs(into: &mut Vec<Sig>, other: &[Sig]) {
    for sig in other {
        if !into.contains(sig) {
            into.push(sig.clone());
        }
    }
}

// ──────────────────────────────────────────────────────────────
// Scopes
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Module { name: String },
    Class { name: String, superclass: Option<String> },
    /// The per-owner namespace holding singleton ("static") methods.
    SingletonClass,
}

impl Scope {
    pub fn module(name: impl Into<String>) -> Self {
        Scope::Module { name: name.into() }
    }

    pub fn class(name: impl Into<String>) -> Self {
        Scope::Class {
            name: name.into(),
            superclass: None,
        }
    }

    pub fn subclass(name: impl Into<String>, superclass: impl Into<String>) -> Self {
        Scope::Class {
            name: name.into(),
            superclass: Some(superclass.into()),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Scope::Module { name } | Scope::Class { name, .. } => Some(name),
            Scope::SingletonClass => None,
        }
    }

    /// Qualify this scope under its parent's fully-qualified name.
    /// Names starting with `::` are already absolute.
    pub fn fully_qualified_name(&self, parent: &str) -> String {
        match self {
            Scope::Module { name } | Scope::Class { name, .. } => {
                if name.starts_with("::") {
                    name.clone()
                } else {
                    format!("{parent}::{name}")
                }
            }
            Scope::SingletonClass => format!("{parent}::<self>"),
        }
    }

    /// Same variant, same name and, for classes, the same superclass.
    pub fn compatible_with(&self, other: &Scope) -> bool {
        match (self, other) {
            (Scope::Module { name: a }, Scope::Module { name: b }) => a == b,
            (
                Scope::Class {
                    name: a,
                    superclass: sa,
                },
                Scope::Class {
                    name: b,
                    superclass: sb,
                },
            ) => a == b && sa == sb,
            (Scope::SingletonClass, Scope::SingletonClass) => true,
            _ => false,
        }
    }
}

// ──────────────────────────────────────────────────────────────
// Leaf declarations
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Const {
    pub name: String,
    /// Opaque literal value expression.
    pub value: String,
}

impl Const {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub params: Vec<Param>,
    pub is_singleton: bool,
    pub visibility: Visibility,
    pub sigs: Vec<Sig>,
}

impl Method {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            is_singleton: false,
            visibility: Visibility::Public,
            sigs: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_sig(mut self, sig: Sig) -> Self {
        self.sigs.push(sig);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn singleton(mut self) -> Self {
        self.is_singleton = true;
        self
    }

    pub fn is_initializer(&self) -> bool {
        self.name == "initialize"
    }

    fn compatible_with(&self, other: &Method) -> bool {
        self.name == other.name
            && self.is_singleton == other.is_singleton
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.same_shape(b))
            && sigs_compatible(&self.sigs, &other.sigs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Reader,
    Writer,
    Accessor,
}

impl AttrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttrKind::Reader => "attr_reader",
            AttrKind::Writer => "attr_writer",
            AttrKind::Accessor => "attr_accessor",
        }
    }
}

/// Generated accessor methods for one or more names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    pub kind: AttrKind,
    pub names: Vec<String>,
    pub visibility: Visibility,
    pub sigs: Vec<Sig>,
}

impl Attr {
    pub fn new<I, S>(kind: AttrKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            names: names.into_iter().map(Into::into).collect(),
            visibility: Visibility::Public,
            sigs: Vec::new(),
        }
    }

    pub fn with_sig(mut self, sig: Sig) -> Self {
        self.sigs.push(sig);
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MixinKind {
    Include,
    Extend,
    MixesInClassMethods,
}

impl MixinKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MixinKind::Include => "include",
            MixinKind::Extend => "extend",
            MixinKind::MixesInClassMethods => "mixes_in_class_methods",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mixin {
    pub kind: MixinKind,
    pub names: Vec<String>,
}

impl Mixin {
    pub fn new<I, S>(kind: MixinKind, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind,
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn include(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::new(MixinKind::Include, [name])
    }

    pub fn extend(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::new(MixinKind::Extend, [name])
    }

    pub fn mixes_in_class_methods(name: impl Into<String>) -> Self {
        let name: String = name.into();
        Self::new(MixinKind::MixesInClassMethods, [name])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Mutable field (`prop`).
    Prop,
    /// Immutable field (`const`).
    Const,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub kind: FieldKind,
    pub name: String,
    pub ty: String,
    pub default: Option<String>,
}

impl StructField {
    pub fn prop(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Prop,
            name: name.into(),
            ty: ty.into(),
            default: None,
        }
    }

    pub fn constant(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::Const,
            name: name.into(),
            ty: ty.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumBlock {
    pub names: Vec<String>,
}

impl EnumBlock {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

/// A named marker such as `abstract!`, `final!` or `sealed!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Helper {
    pub name: String,
}

impl Helper {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A generic type member. Variance and bounds stay inside the opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMember {
    pub name: String,
    pub value: String,
}

impl TypeMember {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// ──────────────────────────────────────────────────────────────
// Groups and conflicts
// ──────────────────────────────────────────────────────────────

/// Fixed categories used by grouping and sorting, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    Mixins,
    Helpers,
    TypeMembers,
    MixesInClassMethods,
    StructFields,
    Enums,
    Inits,
    Methods,
    ScopesAndConsts,
}

impl GroupKind {
    pub fn rank(self) -> u8 {
        self as u8
    }
}

/// Both sides of a conflict. The side nodes have the conflict node as their
/// parent but are not listed among its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSides {
    pub left: NodeId,
    pub right: NodeId,
    pub left_label: String,
    pub right_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Structurally transparent container.
    Tree,
    Scope(Scope),
    VisibilityGroup(Visibility),
    Group(GroupKind),
    /// Two buckets (plain trees) of mutually incompatible declarations.
    ConflictTree(ConflictSides),
    /// Two incompatible scope headers; the left scope carries the body.
    ScopeConflict(ConflictSides),
    Const(Const),
    Method(Method),
    Attr(Attr),
    Mixin(Mixin),
    /// Standalone visibility change for flat trees.
    Visibility(Visibility),
    StructField(StructField),
    Enum(EnumBlock),
    Helper(Helper),
    TypeMember(TypeMember),
}

impl NodeKind {
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            NodeKind::Tree | NodeKind::Scope(_) | NodeKind::VisibilityGroup(_) | NodeKind::Group(_)
        )
    }

    pub fn is_scope(&self) -> bool {
        matches!(self, NodeKind::Scope(_))
    }

    pub fn as_scope(&self) -> Option<&Scope> {
        match self {
            NodeKind::Scope(scope) => Some(scope),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match self {
            NodeKind::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn conflict_sides(&self) -> Option<&ConflictSides> {
        match self {
            NodeKind::ConflictTree(sides) | NodeKind::ScopeConflict(sides) => Some(sides),
            _ => None,
        }
    }

    /// The declared name, when the node has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeKind::Scope(scope) => scope.name(),
            NodeKind::Const(c) => Some(&c.name),
            NodeKind::Method(m) => Some(&m.name),
            NodeKind::Attr(a) => a.names.first().map(String::as_str),
            NodeKind::StructField(f) => Some(&f.name),
            NodeKind::Helper(h) => Some(&h.name),
            NodeKind::TypeMember(t) => Some(&t.name),
            NodeKind::Tree
            | NodeKind::VisibilityGroup(_)
            | NodeKind::Group(_)
            | NodeKind::ConflictTree(_)
            | NodeKind::ScopeConflict(_)
            | NodeKind::Mixin(_)
            | NodeKind::Visibility(_)
            | NodeKind::Enum(_) => None,
        }
    }

    /// Identity keys of this node when it sits in the scope named `scope`
    /// (the fully-qualified name of the enclosing scope, empty at top level).
    pub fn index_keys(&self, scope: &str) -> Vec<String> {
        match self {
            NodeKind::Scope(s) => vec![s.fully_qualified_name(scope)],
            NodeKind::Const(c) => vec![format!("{scope}::{}", c.name)],
            NodeKind::Method(m) => {
                if m.is_singleton {
                    vec![format!("{scope}::{}", m.name)]
                } else {
                    vec![format!("{scope}#{}", m.name)]
                }
            }
            NodeKind::Attr(a) => a
                .names
                .iter()
                .flat_map(|name| match a.kind {
                    AttrKind::Reader => vec![format!("{scope}#{name}")],
                    AttrKind::Writer => vec![format!("{scope}#{name}=")],
                    AttrKind::Accessor => {
                        vec![format!("{scope}#{name}"), format!("{scope}#{name}=")]
                    }
                })
                .collect(),
            NodeKind::Mixin(m) => m
                .names
                .iter()
                .map(|name| format!("{scope}.{}({name})", m.kind.as_str()))
                .collect(),
            NodeKind::StructField(f) => match f.kind {
                FieldKind::Prop => vec![
                    format!("{scope}#{}", f.name),
                    format!("{scope}#{}=", f.name),
                ],
                FieldKind::Const => vec![format!("{scope}#{}", f.name)],
            },
            NodeKind::Enum(_) => vec![format!("{scope}.enums")],
            NodeKind::Helper(h) => vec![format!("{scope}.{}!", h.name)],
            NodeKind::TypeMember(t) => vec![format!("{scope}.{}", t.name)],
            NodeKind::Tree
            | NodeKind::VisibilityGroup(_)
            | NodeKind::Group(_)
            | NodeKind::ConflictTree(_)
            | NodeKind::ScopeConflict(_)
            | NodeKind::Visibility(_) => Vec::new(),
        }
    }

    pub fn is_indexable(&self) -> bool {
        !self.index_keys("").is_empty()
    }

    /// Structural equality on the fields that matter for merging.
    /// Signatures only count when both sides carry some.
    pub fn compatible_with(&self, other: &NodeKind) -> bool {
        match (self, other) {
            (NodeKind::Scope(a), NodeKind::Scope(b)) => a.compatible_with(b),
            (NodeKind::Const(a), NodeKind::Const(b)) => a == b,
            (NodeKind::Method(a), NodeKind::Method(b)) => a.compatible_with(b),
            (NodeKind::Attr(a), NodeKind::Attr(b)) => {
                a.kind == b.kind && a.names == b.names && sigs_compatible(&a.sigs, &b.sigs)
            }
            (NodeKind::Mixin(a), NodeKind::Mixin(b)) => a == b,
            (NodeKind::StructField(a), NodeKind::StructField(b)) => a == b,
            (NodeKind::Enum(_), NodeKind::Enum(_)) => true,
            (NodeKind::Helper(a), NodeKind::Helper(b)) => a == b,
            (NodeKind::TypeMember(a), NodeKind::TypeMember(b)) => a == b,
            _ => false,
        }
    }

    /// Union the mergeable attributes of `other` into `self`.
    pub fn merge_with(&mut self, other: &NodeKind) {
        match (self, other) {
            (NodeKind::Method(a), NodeKind::Method(b)) => merge_sigs(&mut a.sigs, &b.sigs),
            (NodeKind::Attr(a), NodeKind::Attr(b)) => merge_sigs(&mut a.sigs, &b.sigs),
            (NodeKind::Enum(a), NodeKind::Enum(b)) => {
                for name in &b.names {
                    if !a.names.contains(name) {
                        a.names.push(name.clone());
                    }
                }
            }
            _ => {}
        }
    }
}

impl From<Scope> for NodeKind {
    fn from(scope: Scope) -> Self {
        NodeKind::Scope(scope)
    }
}

impl From<Const> for NodeKind {
    fn from(c: Const) -> Self {
        NodeKind::Const(c)
    }
}

impl From<Method> for NodeKind {
    fn from(m: Method) -> Self {
        NodeKind::Method(m)
    }
}

impl From<Attr> for NodeKind {
    fn from(a: Attr) -> Self {
        NodeKind::Attr(a)
    }
}

impl From<Mixin> for NodeKind {
    fn from(m: Mixin) -> Self {
        NodeKind::Mixin(m)
    }
}

impl From<StructField> for NodeKind {
    fn from(f: StructField) -> Self {
        NodeKind::StructField(f)
    }
}

impl From<EnumBlock> for NodeKind {
    fn from(e: EnumBlock) -> Self {
        NodeKind::Enum(e)
    }
}

impl From<Helper> for NodeKind {
    fn from(h: Helper) -> Self {
        NodeKind::Helper(h)
    }
}

impl From<TypeMember> for NodeKind {
    fn from(t: TypeMember) -> Self {
        NodeKind::TypeMember(t)
    }
}

// ──────────────────────────────────────────────────────────────
// Arena
// ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub loc: Option<Loc>,
    pub comments: Vec<Comment>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            loc: None,
            comments: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Set-union of comments, keeping first-seen order.
    pub fn merge_comments(&mut self, comments: &[Comment]) {
        for comment in comments {
            if !self.comments.contains(comment) {
                self.comments.push(comment.clone());
            }
        }
    }

    pub fn compatible_with(&self, other: &Node) -> bool {
        self.kind.compatible_with(&other.kind)
    }

    pub fn merge_with(&mut self, other: &Node) {
        self.kind.merge_with(&other.kind);
        self.merge_comments(&other.comments);
    }
}

/// Arena-backed declaration tree. The root is always a plain [`NodeKind::Tree`].
///
/// Handles stay valid for the lifetime of the tree: detached nodes remain in
/// the arena, they just stop being reachable from the root.
#[derive(Debug, Clone)]
pub struct DeclTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for DeclTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DeclTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Tree)],
            root: 0,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes in the arena, detached ones included.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_empty(&self, id: NodeId) -> bool {
        self.nodes[id].children.is_empty()
    }

    /// Allocate a detached node.
    pub fn create(&mut self, kind: impl Into<NodeKind>) -> NodeId {
        self.nodes.push(Node::new(kind.into()));
        self.nodes.len() - 1
    }

    /// Allocate a node and append it to `parent`.
    pub fn append(&mut self, parent: NodeId, kind: impl Into<NodeKind>) -> NodeId {
        let id = self.create(kind);
        self.attach(parent, id);
        id
    }

    pub fn add_comment(&mut self, id: NodeId, text: impl Into<String>) {
        self.nodes[id].comments.push(Comment::new(text));
    }

    pub fn set_loc(&mut self, id: NodeId, loc: Loc) {
        self.nodes[id].loc = Some(loc);
    }

    /// Append `child` to `parent`, detaching it from its previous parent.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) {
        let end = self.nodes[parent].children.len();
        self.insert(parent, end, child);
    }

    /// Insert `child` at `index` among `parent`'s children.
    ///
    /// Panics when `parent` cannot hold children.
    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) {
        assert!(
            self.nodes[parent].kind.is_container(),
            "node {parent} cannot hold children"
        );
        self.detach(child);
        let index = index.min(self.nodes[parent].children.len());
        self.nodes[parent].children.insert(index, child);
        self.nodes[child].parent = Some(parent);
    }

    pub fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child].parent.take() {
            self.nodes[parent].children.retain(|&c| c != child);
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.nodes[id].parent?;
        self.nodes[parent].children.iter().position(|&c| c == id)
    }

    /// Put `new` at the position `old` occupies and detach `old`.
    ///
    /// Panics when `old` is not listed among its parent's children.
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        let parent = self.nodes[old]
            .parent
            .unwrap_or_else(|| panic!("node {old} has no parent to be replaced in"));
        let index = self
            .index_in_parent(old)
            .unwrap_or_else(|| panic!("node {old} is not a child of node {parent}"));
        self.detach(old);
        self.insert(parent, index, new);
    }

    /// Replace the order of `id`'s children. `order` must be a permutation.
    pub fn reorder_children(&mut self, id: NodeId, order: Vec<NodeId>) {
        debug_assert_eq!(order.len(), self.nodes[id].children.len());
        self.nodes[id].children = order;
    }

    fn adopt_side(&mut self, owner: NodeId, side: NodeId) {
        self.detach(side);
        self.nodes[side].parent = Some(owner);
    }

    /// Wrap `node` in a new conflict tree placed where `node` was. `node`
    /// becomes the sole member of the left bucket.
    pub fn wrap_in_conflict_tree(
        &mut self,
        node: NodeId,
        left_label: &str,
        right_label: &str,
    ) -> NodeId {
        let left = self.create(NodeKind::Tree);
        let right = self.create(NodeKind::Tree);
        let conflict = self.create(NodeKind::ConflictTree(ConflictSides {
            left,
            right,
            left_label: left_label.to_string(),
            right_label: right_label.to_string(),
        }));
        self.adopt_side(conflict, left);
        self.adopt_side(conflict, right);
        self.replace(node, conflict);
        self.attach(left, node);
        conflict
    }

    /// Wrap `scope` in a scope conflict placed where `scope` was, with
    /// `right_header` as the other side.
    pub fn wrap_in_scope_conflict(
        &mut self,
        scope: NodeId,
        right_header: NodeId,
        left_label: &str,
        right_label: &str,
    ) -> NodeId {
        let conflict = self.create(NodeKind::ScopeConflict(ConflictSides {
            left: scope,
            right: right_header,
            left_label: left_label.to_string(),
            right_label: right_label.to_string(),
        }));
        self.replace(scope, conflict);
        self.adopt_side(conflict, scope);
        self.adopt_side(conflict, right_header);
        conflict
    }

    /// The conflict tree whose bucket directly contains `id`, if any.
    pub fn enclosing_conflict_tree(&self, id: NodeId) -> Option<NodeId> {
        let bucket = self.parent(id)?;
        let conflict = self.parent(bucket)?;
        match &self.nodes[conflict].kind {
            NodeKind::ConflictTree(sides) if sides.left == bucket || sides.right == bucket => {
                Some(conflict)
            }
            _ => None,
        }
    }

    /// Nearest ancestor that is a scope.
    pub fn parent_scope(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.parent(id);
        while let Some(p) = current {
            if self.nodes[p].kind.is_scope() {
                return Some(p);
            }
            current = self.parent(p);
        }
        None
    }

    /// For a scope, its own fully-qualified name; for any other node, the
    /// name of its enclosing scope (empty at top level).
    pub fn fully_qualified_name(&self, id: NodeId) -> String {
        let parent = self
            .parent_scope(id)
            .map(|p| self.fully_qualified_name(p))
            .unwrap_or_default();
        match &self.nodes[id].kind {
            NodeKind::Scope(scope) => scope.fully_qualified_name(&parent),
            _ => parent,
        }
    }

    pub fn index_keys(&self, id: NodeId) -> Vec<String> {
        let scope = self
            .parent_scope(id)
            .map(|p| self.fully_qualified_name(p))
            .unwrap_or_default();
        self.nodes[id].kind.index_keys(&scope)
    }

    /// Containers reachable directly through `id`: the node itself when it is
    /// a container, or both sides when it is a conflict.
    pub fn nested_containers(&self, id: NodeId) -> Vec<NodeId> {
        match &self.nodes[id].kind {
            NodeKind::ConflictTree(sides) | NodeKind::ScopeConflict(sides) => {
                vec![sides.left, sides.right]
            }
            kind if kind.is_container() => vec![id],
            _ => Vec::new(),
        }
    }

    /// Every node reachable from `id` (excluded) in document order, conflict
    /// sides included.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_descendants(id, &mut out);
        out
    }

    fn collect_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(sides) = self.nodes[id].kind.conflict_sides() {
            for side in [sides.left, sides.right] {
                out.push(side);
                self.collect_descendants(side, out);
            }
        }
        for &child in &self.nodes[id].children {
            out.push(child);
            self.collect_descendants(child, out);
        }
    }

    /// Copy a single node from another tree without its children. Conflict
    /// nodes are always copied with both sides.
    pub fn import_node(&mut self, src: &DeclTree, id: NodeId) -> NodeId {
        if src.kind(id).conflict_sides().is_some() {
            return self.import_subtree(src, id);
        }
        let node = src.node(id);
        let copy = self.create(node.kind.clone());
        self.nodes[copy].comments = node.comments.clone();
        self.nodes[copy].loc = node.loc.clone();
        copy
    }

    /// Deep-copy a subtree from another tree. The copy is detached.
    pub fn import_subtree(&mut self, src: &DeclTree, id: NodeId) -> NodeId {
        let node = src.node(id);
        let kind = match &node.kind {
            NodeKind::ConflictTree(sides) => NodeKind::ConflictTree(self.import_sides(src, sides)),
            NodeKind::ScopeConflict(sides) => {
                NodeKind::ScopeConflict(self.import_sides(src, sides))
            }
            other => other.clone(),
        };
        let copy = self.create(kind);
        self.nodes[copy].comments = node.comments.clone();
        self.nodes[copy].loc = node.loc.clone();
        if let Some(sides) = self.nodes[copy].kind.conflict_sides().cloned() {
            self.adopt_side(copy, sides.left);
            self.adopt_side(copy, sides.right);
        }
        for &child in src.children(id) {
            let child_copy = self.import_subtree(src, child);
            self.attach(copy, child_copy);
        }
        copy
    }

    fn import_sides(&mut self, src: &DeclTree, sides: &ConflictSides) -> ConflictSides {
        ConflictSides {
            left: self.import_subtree(src, sides.left),
            right: self.import_subtree(src, sides.right),
            left_label: sides.left_label.clone(),
            right_label: sides.right_label.clone(),
        }
    }

    /// Structural equality of two subtrees, ignoring handles and locations.
    pub fn structurally_equal(&self, id: NodeId, other: &DeclTree, other_id: NodeId) -> bool {
        let a = self.node(id);
        let b = other.node(other_id);
        if a.comments != b.comments || a.children.len() != b.children.len() {
            return false;
        }
        let kinds_equal = match (&a.kind, &b.kind) {
            (NodeKind::ConflictTree(x), NodeKind::ConflictTree(y))
            | (NodeKind::ScopeConflict(x), NodeKind::ScopeConflict(y)) => {
                x.left_label == y.left_label
                    && x.right_label == y.right_label
                    && self.structurally_equal(x.left, other, y.left)
                    && self.structurally_equal(x.right, other, y.right)
            }
            (x, y) => x == y,
        };
        kinds_equal
            && a
                .children
                .iter()
                .zip(&b.children)
                .all(|(&ca, &cb)| self.structurally_equal(ca, other, cb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_qualified_names() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let foo = tree.append(root, Scope::module("Foo"));
        let bar = tree.append(foo, Scope::class("Bar"));
        let abs = tree.append(bar, Scope::module("::Abs"));
        let single = tree.append(bar, Scope::SingletonClass);
        let method = tree.append(single, Method::new("run"));

        assert_eq!(tree.fully_qualified_name(foo), "::Foo");
        assert_eq!(tree.fully_qualified_name(bar), "::Foo::Bar");
        assert_eq!(tree.fully_qualified_name(abs), "::Abs");
        assert_eq!(tree.fully_qualified_name(single), "::Foo::Bar::<self>");
        assert_eq!(tree.index_keys(method), vec!["::Foo::Bar::<self>#run"]);
    }

    #[test]
    fn test_multi_key_nodes() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let foo = tree.append(root, Scope::class("Foo"));
        let attr = tree.append(foo, Attr::new(AttrKind::Accessor, ["a", "b"]));
        let mixin = tree.append(foo, Mixin::new(MixinKind::Include, ["A", "B"]));
        let marker = tree.append(foo, NodeKind::Visibility(Visibility::Private));

        assert_eq!(
            tree.index_keys(attr),
            vec!["::Foo#a", "::Foo#a=", "::Foo#b", "::Foo#b="]
        );
        assert_eq!(
            tree.index_keys(mixin),
            vec!["::Foo.include(A)", "::Foo.include(B)"]
        );
        assert!(tree.index_keys(marker).is_empty());
    }

    #[test]
    fn test_scope_compatibility_requires_discriminant() {
        assert!(Scope::module("X").compatible_with(&Scope::module("X")));
        assert!(!Scope::class("X").compatible_with(&Scope::module("X")));
        assert!(!Scope::subclass("X", "A").compatible_with(&Scope::subclass("X", "B")));
        assert!(!Scope::class("X").compatible_with(&Scope::subclass("X", "B")));
        assert!(Scope::subclass("X", "A").compatible_with(&Scope::subclass("X", "A")));
    }

    #[test]
    fn test_method_compatibility_ignores_missing_sigs() {
        let bare = NodeKind::from(Method::new("foo").with_param(Param::req("a")));
        let typed = NodeKind::from(
            Method::new("foo")
                .with_param(Param::req("a"))
                .with_sig(Sig::new().param("a", "Integer")),
        );
        let other_sig = NodeKind::from(
            Method::new("foo")
                .with_param(Param::req("a"))
                .with_sig(Sig::new().param("a", "String")),
        );
        let more_params = NodeKind::from(
            Method::new("foo")
                .with_param(Param::req("a"))
                .with_param(Param::req("b")),
        );

        assert!(bare.compatible_with(&typed));
        assert!(typed.compatible_with(&bare));
        assert!(!typed.compatible_with(&other_sig));
        assert!(!bare.compatible_with(&more_params));
    }

    #[test]
    fn test_param_defaults_do_not_change_shape() {
        let a = NodeKind::from(Method::new("foo").with_param(Param::opt("a", "1")));
        let b = NodeKind::from(Method::new("foo").with_param(Param::opt("a", "2")));
        let c = NodeKind::from(Method::new("foo").with_param(Param::kw_opt("a", "1")));
        assert!(a.compatible_with(&b));
        assert!(!a.compatible_with(&c));
    }

    #[test]
    fn test_merge_with_unions_sigs_and_comments() {
        let mut left = Node::new(Method::new("foo").into());
        left.comments.push(Comment::new("shared"));
        let mut right = Node::new(Method::new("foo").with_sig(Sig::new()).into());
        right.comments.push(Comment::new("shared"));
        right.comments.push(Comment::new("extra"));

        left.merge_with(&right);
        left.merge_with(&right);

        let method = left.kind.as_method().unwrap();
        assert_eq!(method.sigs, vec![Sig::new()]);
        assert_eq!(
            left.comments,
            vec![Comment::new("shared"), Comment::new("extra")]
        );
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let a = tree.append(root, Const::new("A", "1"));
        let b = tree.append(root, Const::new("B", "2"));
        let c = tree.append(root, Const::new("C", "3"));

        let conflict = tree.wrap_in_conflict_tree(b, "left", "right");

        assert_eq!(tree.children(root), &[a, conflict, c]);
        let sides = tree.kind(conflict).conflict_sides().unwrap().clone();
        assert_eq!(tree.children(sides.left), &[b]);
        assert_eq!(tree.enclosing_conflict_tree(b), Some(conflict));
        assert_eq!(tree.parent(sides.left), Some(conflict));
    }

    #[test]
    fn test_attach_reparents() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let foo = tree.append(root, Scope::module("Foo"));
        let bar = tree.append(root, Scope::module("Bar"));
        let c = tree.append(foo, Const::new("C", "1"));

        tree.attach(bar, c);

        assert!(tree.is_empty(foo));
        assert_eq!(tree.children(bar), &[c]);
        assert_eq!(tree.parent(c), Some(bar));
        assert_eq!(tree.fully_qualified_name(c), "::Bar");
    }

    #[test]
    #[should_panic]
    fn test_attach_to_leaf_panics() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let c = tree.append(root, Const::new("C", "1"));
        tree.append(c, Const::new("D", "2"));
    }

    #[test]
    fn test_import_subtree_is_structurally_equal() {
        let mut src = DeclTree::new();
        let root = src.root();
        let foo = src.append(root, Scope::class("Foo"));
        src.add_comment(foo, "doc");
        let m = src.append(foo, Method::new("a"));
        src.wrap_in_conflict_tree(m, "l", "r");

        let mut dst = DeclTree::new();
        let copy = dst.import_subtree(&src, foo);
        let dst_root = dst.root();
        dst.attach(dst_root, copy);

        assert!(dst.structurally_equal(dst_root, &src, root));
    }
}
