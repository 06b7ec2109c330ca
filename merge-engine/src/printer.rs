//! Deterministic text rendering of declaration trees.
//!
//! One depth-first walk, each node visited once. Containers indent their
//! bodies by one unit; transparent trees and groups do not. Conflicts render
//! as three-part blocks whose delimiter lines always start at column zero:
//!
//! ```text
//! <<<<<<< left
//!   def foo(a); end
//! =======
//!   def foo(a, b); end
//! >>>>>>> right
//! ```

use std::io;

use thiserror::Error;

use crate::types::{
    Attr, ConflictSides, DeclTree, EnumBlock, FieldKind, Method, NodeId, NodeKind, Param, Scope,
    Sig, StructField, Visibility,
};

#[derive(Debug, Error)]
pub enum PrintError {
    #[error("failed to write rendered tree: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrinterConfig {
    /// Spaces per nesting level.
    pub indent_width: usize,
    /// Emit each node's source location as a comment above it.
    pub print_locs: bool,
    /// When set, the output starts with a `# typed: <sigil>` line.
    pub typed_sigil: Option<String>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            indent_width: 2,
            print_locs: false,
            typed_sigil: None,
        }
    }
}

/// Render a whole tree with the default configuration.
pub fn render(tree: &DeclTree) -> String {
    render_with(tree, &PrinterConfig::default())
}

pub fn render_with(tree: &DeclTree, config: &PrinterConfig) -> String {
    let mut printer = Printer::new(tree, config);
    printer.print_file();
    printer.out
}

/// Render a single node (and its subtree) at indentation level zero.
pub fn render_node(tree: &DeclTree, id: NodeId, config: &PrinterConfig) -> String {
    let mut printer = Printer::new(tree, config);
    printer.visit(id);
    printer.out
}

pub fn write_to(
    tree: &DeclTree,
    config: &PrinterConfig,
    mut out: impl io::Write,
) -> Result<(), PrintError> {
    out.write_all(render_with(tree, config).as_bytes())?;
    out.flush()?;
    Ok(())
}

struct Printer<'t> {
    tree: &'t DeclTree,
    config: &'t PrinterConfig,
    out: String,
    level: usize,
    in_visibility_group: bool,
}

impl<'t> Printer<'t> {
    fn new(tree: &'t DeclTree, config: &'t PrinterConfig) -> Self {
        Self {
            tree,
            config,
            out: String::new(),
            level: 0,
            in_visibility_group: false,
        }
    }

    // ── output primitives ──────────────────────────────────────

    fn indent(&mut self) {
        let width = self.level * self.config.indent_width;
        self.out.extend(std::iter::repeat_n(' ', width));
    }

    fn printl(&mut self, line: &str) {
        self.indent();
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn marker(&mut self, line: &str) {
        self.out.push_str(line);
        self.out.push('\n');
    }

    // ── traversal ─────────────────────────────────────────────

    fn print_file(&mut self) {
        let root = self.tree.root();
        let config = self.config;
        if let Some(sigil) = &config.typed_sigil {
            self.marker(&format!("# typed: {sigil}"));
            if !self.tree.is_empty(root) {
                self.blank();
            }
        }
        self.visit(root);
    }

    fn visit_all(&mut self, ids: &[NodeId]) {
        let mut previous: Option<NodeId> = None;
        for &id in ids {
            if let Some(prev) = previous {
                if !self.is_oneline(prev) || !self.is_oneline(id) {
                    self.blank();
                }
            }
            self.visit(id);
            previous = Some(id);
        }
    }

    fn visit(&mut self, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Tree | NodeKind::Group(_) => {
                self.print_comments(id);
                self.visit_all(tree.children(id));
            }
            NodeKind::VisibilityGroup(visibility) => self.visit_visibility_group(id, *visibility),
            NodeKind::Scope(scope) => {
                self.print_comments(id);
                self.visit_scope(id, scope);
            }
            NodeKind::ConflictTree(sides) => self.visit_conflict_tree(sides),
            NodeKind::ScopeConflict(sides) => self.visit_scope_conflict(sides),
            NodeKind::Const(c) => {
                self.print_comments(id);
                self.printl(&format!("{} = {}", c.name, c.value));
            }
            NodeKind::Method(method) => {
                self.print_comments(id);
                self.visit_method(method);
            }
            NodeKind::Attr(attr) => {
                self.print_comments(id);
                self.visit_attr(attr);
            }
            NodeKind::Mixin(mixin) => {
                self.print_comments(id);
                self.printl(&format!("{} {}", mixin.kind.as_str(), mixin.names.join(", ")));
            }
            NodeKind::Visibility(visibility) => {
                self.print_comments(id);
                self.printl(visibility.as_str());
            }
            NodeKind::StructField(field) => {
                self.print_comments(id);
                self.printl(&struct_field_line(field));
            }
            NodeKind::Enum(block) => {
                self.print_comments(id);
                self.visit_enum(block);
            }
            NodeKind::Helper(helper) => {
                self.print_comments(id);
                self.printl(&format!("{}!", helper.name));
            }
            NodeKind::TypeMember(member) => {
                self.print_comments(id);
                self.printl(&format!("{} = {}", member.name, member.value));
            }
        }
    }

    fn print_comments(&mut self, id: NodeId) {
        let tree = self.tree;
        let node = tree.node(id);
        let config = self.config;
        for comment in &node.comments {
            if comment.text.is_empty() {
                self.printl("#");
            } else {
                for line in comment.text.lines() {
                    if line.is_empty() {
                        self.printl("#");
                    } else {
                        self.printl(&format!("# {line}"));
                    }
                }
            }
        }
        if config.print_locs {
            if let Some(loc) = &node.loc {
                self.printl(&format!("# {loc}"));
            }
        }
    }

    fn visit_scope(&mut self, id: NodeId, scope: &Scope) {
        let tree = self.tree;
        let header = scope_header(scope);
        let children = tree.children(id);
        if children.is_empty() {
            self.printl(&format!("{header}; end"));
            return;
        }
        self.printl(&header);
        self.visit_body(children);
        self.printl("end");
    }

    fn visit_body(&mut self, children: &[NodeId]) {
        // Visibility does not leak into a nested scope.
        let in_group = std::mem::replace(&mut self.in_visibility_group, false);
        self.level += 1;
        self.visit_all(children);
        self.level -= 1;
        self.in_visibility_group = in_group;
    }

    fn visit_visibility_group(&mut self, id: NodeId, visibility: Visibility) {
        self.print_comments(id);
        let tree = self.tree;
        let children = tree.children(id);
        if !visibility.is_public() {
            self.printl(visibility.as_str());
            if !children.is_empty() {
                self.blank();
            }
        }
        let outer = std::mem::replace(&mut self.in_visibility_group, true);
        self.visit_all(children);
        self.in_visibility_group = outer;
    }

    fn visit_conflict_tree(&mut self, sides: &ConflictSides) {
        let tree = self.tree;
        self.marker(&format!("<<<<<<< {}", sides.left_label));
        self.visit_all(tree.children(sides.left));
        self.marker("=======");
        self.visit_all(tree.children(sides.right));
        self.marker(&format!(">>>>>>> {}", sides.right_label));
    }

    fn visit_scope_conflict(&mut self, sides: &ConflictSides) {
        let tree = self.tree;
        let body = tree.children(sides.left);
        let header_of = |side: NodeId| match tree.kind(side) {
            NodeKind::Scope(scope) if body.is_empty() => format!("{}; end", scope_header(scope)),
            NodeKind::Scope(scope) => scope_header(scope),
            _ => String::new(),
        };

        self.marker(&format!("<<<<<<< {}", sides.left_label));
        self.print_comments(sides.left);
        self.printl(&header_of(sides.left));
        self.marker("=======");
        self.print_comments(sides.right);
        self.printl(&header_of(sides.right));
        self.marker(&format!(">>>>>>> {}", sides.right_label));
        if !body.is_empty() {
            self.visit_body(body);
            self.printl("end");
        }
    }

    fn visibility_prefix(&self, visibility: Visibility) -> String {
        if self.in_visibility_group || visibility.is_public() {
            String::new()
        } else {
            format!("{visibility} ")
        }
    }

    fn visit_method(&mut self, method: &Method) {
        for sig in &method.sigs {
            self.printl(&sig_line(sig));
        }
        let prefix = self.visibility_prefix(method.visibility);
        let receiver = if method.is_singleton { "self." } else { "" };
        let head = format!("{prefix}def {receiver}{}", method.name);

        if method.params.is_empty() {
            self.printl(&format!("{head}; end"));
        } else if method.params.iter().any(|p| !p.comments.is_empty()) {
            self.printl(&format!("{head}("));
            self.level += 1;
            let last = method.params.len() - 1;
            for (i, param) in method.params.iter().enumerate() {
                self.printl(&param_line(param, i == last));
            }
            self.level -= 1;
            self.printl("); end");
        } else {
            let params: Vec<String> = method.params.iter().map(Param::to_string).collect();
            self.printl(&format!("{head}({}); end", params.join(", ")));
        }
    }

    fn visit_attr(&mut self, attr: &Attr) {
        for sig in &attr.sigs {
            self.printl(&sig_line(sig));
        }
        let prefix = self.visibility_prefix(attr.visibility);
        let names: Vec<String> = attr.names.iter().map(|n| format!(":{n}")).collect();
        self.printl(&format!("{prefix}{} {}", attr.kind.as_str(), names.join(", ")));
    }

    fn visit_enum(&mut self, block: &EnumBlock) {
        if block.names.is_empty() {
            self.printl("enums do end");
            return;
        }
        self.printl("enums do");
        self.level += 1;
        for name in &block.names {
            self.printl(&format!("{name} = new"));
        }
        self.level -= 1;
        self.printl("end");
    }

    /// Whether the node renders on a single line with nothing attached.
    fn is_oneline(&self, id: NodeId) -> bool {
        let node = self.tree.node(id);
        if !node.comments.is_empty() {
            return false;
        }
        match &node.kind {
            NodeKind::Tree
            | NodeKind::Group(_)
            | NodeKind::VisibilityGroup(_)
            | NodeKind::Scope(_) => node.children().is_empty(),
            NodeKind::ConflictTree(_) | NodeKind::ScopeConflict(_) => false,
            NodeKind::Method(method) => {
                method.sigs.is_empty() && method.params.iter().all(|p| p.comments.is_empty())
            }
            NodeKind::Attr(attr) => attr.sigs.is_empty(),
            NodeKind::Enum(block) => block.names.is_empty(),
            NodeKind::Const(_)
            | NodeKind::Mixin(_)
            | NodeKind::Visibility(_)
            | NodeKind::StructField(_)
            | NodeKind::Helper(_)
            | NodeKind::TypeMember(_) => true,
        }
    }
}

fn scope_header(scope: &Scope) -> String {
    match scope {
        Scope::Module { name } => format!("module {name}"),
        Scope::Class {
            name,
            superclass: Some(superclass),
        } => format!("class {name} < {superclass}"),
        Scope::Class { name, .. } => format!("class {name}"),
        Scope::SingletonClass => "class << self".to_string(),
    }
}

fn param_line(param: &Param, last: bool) -> String {
    let mut line = param.to_string();
    if !last {
        line.push(',');
    }
    for comment in &param.comments {
        line.push_str(" # ");
        line.push_str(&comment.text);
    }
    line
}

fn struct_field_line(field: &StructField) -> String {
    let keyword = match field.kind {
        FieldKind::Prop => "prop",
        FieldKind::Const => "const",
    };
    match &field.default {
        Some(default) => format!("{keyword} :{}, {}, default: {default}", field.name, field.ty),
        None => format!("{keyword} :{}, {}", field.name, field.ty),
    }
}

fn sig_line(sig: &Sig) -> String {
    let mut calls: Vec<String> = Vec::new();
    if sig.is_abstract {
        calls.push("abstract".to_string());
    }
    if sig.is_override {
        calls.push("override".to_string());
    }
    if sig.is_overridable {
        calls.push("overridable".to_string());
    }
    if !sig.type_params.is_empty() {
        let names: Vec<String> = sig.type_params.iter().map(|t| format!(":{t}")).collect();
        calls.push(format!("type_parameters({})", names.join(", ")));
    }
    if !sig.params.is_empty() {
        let params: Vec<String> = sig
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty))
            .collect();
        calls.push(format!("params({})", params.join(", ")));
    }
    match &sig.return_type {
        Some(ty) => calls.push(format!("returns({ty})")),
        None => calls.push("void".to_string()),
    }
    let open = if sig.is_final { "sig(:final)" } else { "sig" };
    format!("{open} {{ {} }}", calls.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::merge_trees;
    use crate::normalize::normalize;
    use crate::types::{
        AttrKind, Const, Helper, Loc, Mixin, Param, Scope, Sig, StructField, TypeMember,
    };

    fn class_with(name: &str, method: Method) -> DeclTree {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let foo = tree.append(root, Scope::class(name));
        tree.append(foo, method);
        tree
    }

    #[test]
    fn test_render_compatible_merge() {
        let left = class_with("Foo", Method::new("bar"));
        let right = class_with("Foo", Method::new("bar").with_sig(Sig::new()));

        let output = merge_trees(&left, &right, "left", "right");

        assert!(output.conflicts.is_empty());
        assert_eq!(
            render(&output.tree),
            "class Foo\n  sig { void }\n  def bar; end\nend\n"
        );
    }

    #[test]
    fn test_render_leaf_conflict() {
        let left = class_with("Foo", Method::new("foo").with_param(Param::req("a")));
        let right = class_with(
            "Foo",
            Method::new("foo")
                .with_param(Param::req("a"))
                .with_param(Param::req("b")),
        );

        let output = merge_trees(&left, &right, "left", "right");

        assert_eq!(output.conflicts.len(), 1);
        assert_eq!(
            render(&output.tree),
            "class Foo\n\
             <<<<<<< left\n\
             \x20 def foo(a); end\n\
             =======\n\
             \x20 def foo(a, b); end\n\
             >>>>>>> right\n\
             end\n"
        );
    }

    #[test]
    fn test_render_scope_conflict_shares_body() {
        let mut left = DeclTree::new();
        let root = left.root();
        let x = left.append(root, Scope::class("X"));
        left.append(x, Method::new("a"));
        let mut right = DeclTree::new();
        let root = right.root();
        right.append(root, Scope::module("X"));

        let output = merge_trees(&left, &right, "left", "right");

        assert_eq!(output.conflicts.len(), 1);
        assert_eq!(
            render(&output.tree),
            "<<<<<<< left\n\
             class X\n\
             =======\n\
             module X\n\
             >>>>>>> right\n\
             \x20 def a; end\n\
             end\n"
        );
    }

    #[test]
    fn test_render_empty_scope_conflict() {
        let mut left = DeclTree::new();
        let root = left.root();
        left.append(root, Scope::subclass("X", "A"));
        let mut right = DeclTree::new();
        let root = right.root();
        right.append(root, Scope::subclass("X", "B"));

        let output = merge_trees(&left, &right, "ours", "theirs");

        assert_eq!(
            render(&output.tree),
            "<<<<<<< ours\nclass X < A; end\n=======\nclass X < B; end\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn test_render_grouped_and_sorted() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        tree.append(root, Const::new("B", "2"));
        tree.append(root, Method::new("m"));
        tree.append(root, Mixin::include("I"));
        tree.append(root, Const::new("A", "1"));

        normalize(&mut tree);

        assert_eq!(render(&tree), "include I\n\ndef m; end\n\nA = 1\nB = 2\n");
    }

    #[test]
    fn test_render_normalized_class() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let foo = tree.append(root, Scope::class("Foo"));
        tree.append(foo, Method::new("helper").with_visibility(Visibility::Private));
        tree.append(foo, Method::new("build").singleton());
        tree.append(foo, Method::new("run"));

        normalize(&mut tree);

        assert_eq!(
            render(&tree),
            "class Foo\n\
             \x20 def run; end\n\
             \n\
             \x20 private\n\
             \n\
             \x20 def helper; end\n\
             \n\
             \x20 class << self\n\
             \x20   def build; end\n\
             \x20 end\n\
             end\n"
        );
    }

    #[test]
    fn test_render_public_attr_stays_above_private_section() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let foo = tree.append(root, Scope::class("Foo"));
        tree.append(foo, Attr::new(AttrKind::Reader, ["x"]));
        tree.append(foo, Method::new("helper").with_visibility(Visibility::Private));
        tree.append(foo, Method::new("run"));

        normalize(&mut tree);
        let out = render(&tree);

        let attr = out.find("attr_reader :x").unwrap();
        let private = out.find("private\n").unwrap();
        let helper = out.find("def helper").unwrap();
        assert!(attr < private, "public attribute printed under private:\n{out}");
        assert!(out.find("def run").unwrap() < private);
        assert!(private < helper);
        assert!(!out.contains("private attr_reader"));
    }

    #[test]
    fn test_render_params_and_sigs() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        tree.append(
            root,
            Method::new("m")
                .with_param(Param::req("a"))
                .with_param(Param::opt("b", "1"))
                .with_param(Param::rest("c"))
                .with_param(Param::kw_req("d"))
                .with_param(Param::kw_opt("e", "2"))
                .with_param(Param::kw_rest("f"))
                .with_param(Param::block("g"))
                .with_sig(
                    Sig::new()
                        .with_abstract()
                        .type_param("U")
                        .param("a", "T.type_parameter(:U)")
                        .returns("String"),
                ),
        );
        tree.append(root, Method::new("s").singleton().with_sig(Sig::new().with_final()));

        assert_eq!(
            render(&tree),
            "sig { abstract.type_parameters(:U).params(a: T.type_parameter(:U)).returns(String) }\n\
             def m(a, b = 1, *c, d:, e: 2, **f, &g); end\n\
             \n\
             sig(:final) { void }\n\
             def self.s; end\n"
        );
    }

    #[test]
    fn test_render_param_comments_span_lines() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        tree.append(
            root,
            Method::new("m")
                .with_param(Param::req("a").with_comment("first"))
                .with_param(Param::req("b")),
        );

        assert_eq!(render(&tree), "def m(\n  a, # first\n  b\n); end\n");
    }

    #[test]
    fn test_blank_lines_only_around_multiline_nodes() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        tree.append(root, Const::new("A", "1"));
        tree.append(root, Const::new("B", "2"));
        let c = tree.append(root, Const::new("C", "3"));
        tree.add_comment(c, "Documented");
        tree.append(root, Const::new("D", "4"));

        assert_eq!(render(&tree), "A = 1\nB = 2\n\n# Documented\nC = 3\n\nD = 4\n");
    }

    #[test]
    fn test_render_leaf_kinds() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let s = tree.append(root, Scope::class("S"));
        tree.append(s, Helper::new("abstract"));
        tree.append(s, TypeMember::new("Elem", "type_member"));
        tree.append(s, StructField::prop("a", "Integer").with_default("0"));
        tree.append(s, StructField::constant("b", "String"));
        tree.append(
            s,
            Attr::new(AttrKind::Reader, ["x", "y"]).with_visibility(Visibility::Private),
        );
        tree.append(s, Mixin::new(crate::types::MixinKind::Extend, ["A", "B"]));
        tree.append(s, EnumBlock::new(["One", "Two"]));

        assert_eq!(
            render(&tree),
            "class S\n\
             \x20 abstract!\n\
             \x20 Elem = type_member\n\
             \x20 prop :a, Integer, default: 0\n\
             \x20 const :b, String\n\
             \x20 private attr_reader :x, :y\n\
             \x20 extend A, B\n\
             \n\
             \x20 enums do\n\
             \x20   One = new\n\
             \x20   Two = new\n\
             \x20 end\n\
             end\n"
        );
    }

    #[test]
    fn test_config_indent_sigil_and_locs() {
        let mut tree = DeclTree::new();
        let root = tree.root();
        let m = tree.append(root, Scope::module("M"));
        let c = tree.append(m, Const::new("C", "1"));
        tree.set_loc(
            c,
            Loc {
                file: Some("m.rb".to_string()),
                begin_line: 3,
                begin_column: 2,
                end_line: 3,
                end_column: 7,
            },
        );
        let config = PrinterConfig {
            indent_width: 4,
            print_locs: true,
            typed_sigil: Some("strict".to_string()),
        };

        assert_eq!(
            render_with(&tree, &config),
            "# typed: strict\n\nmodule M\n    # m.rb:3:2-3:7\n    C = 1\nend\n"
        );
    }

    #[test]
    fn test_render_node_subtree() {
        let tree = class_with("Foo", Method::new("bar"));
        let foo = tree.children(tree.root())[0];
        let bar = tree.children(foo)[0];

        assert_eq!(
            render_node(&tree, bar, &PrinterConfig::default()),
            "def bar; end\n"
        );
    }

    #[test]
    fn test_write_to_buffer() {
        let tree = class_with("Foo", Method::new("bar"));
        let mut buffer = Vec::new();

        write_to(&tree, &PrinterConfig::default(), &mut buffer).unwrap();

        assert_eq!(String::from_utf8(buffer).unwrap(), render(&tree));
    }
}
