//! JSON interchange format for declaration trees.
//!
//! A document is an array of top-level declarations. Every declaration is an
//! object tagged by `"kind"`; containers carry their declarations in
//! `"children"`:
//!
//! ```json
//! [
//!   {"kind": "class", "name": "Foo", "superclass": "Base", "children": [
//!     {"kind": "include", "names": ["Comparable"]},
//!     {"kind": "method", "name": "bar", "params": [{"kind": "req", "name": "a"}],
//!      "sigs": [{"params": [{"name": "a", "type": "Integer"}], "returns": "String"}]}
//!   ]}
//! ]
//! ```

use merge_engine::{
    Attr, AttrKind, Const, DeclTree, EnumBlock, Helper, Loc, Method, Mixin, MixinKind, NodeId,
    NodeKind, Param, ParamKind, Scope, Sig, SigParam, StructField, TypeMember, Visibility,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed declaration tree: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("`{kind}` declaration needs at least one name")]
    MissingNames { kind: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputNode {
    #[serde(flatten)]
    pub decl: InputDecl,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<InputLoc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputDecl {
    Tree {
        #[serde(default)]
        children: Vec<InputNode>,
    },
    Module {
        name: String,
        #[serde(default)]
        children: Vec<InputNode>,
    },
    Class {
        name: String,
        #[serde(default)]
        superclass: Option<String>,
        #[serde(default)]
        children: Vec<InputNode>,
    },
    SingletonClass {
        #[serde(default)]
        children: Vec<InputNode>,
    },
    Const {
        name: String,
        value: String,
    },
    Method {
        name: String,
        #[serde(default)]
        params: Vec<InputParam>,
        #[serde(default)]
        singleton: bool,
        #[serde(default)]
        visibility: InputVisibility,
        #[serde(default)]
        sigs: Vec<InputSig>,
    },
    AttrReader(InputAttr),
    AttrWriter(InputAttr),
    AttrAccessor(InputAttr),
    Include {
        names: Vec<String>,
    },
    Extend {
        names: Vec<String>,
    },
    MixesInClassMethods {
        names: Vec<String>,
    },
    Visibility {
        visibility: InputVisibility,
    },
    Prop(InputField),
    ConstField(InputField),
    Enum {
        #[serde(default)]
        names: Vec<String>,
    },
    Helper {
        name: String,
    },
    TypeMember {
        name: String,
        value: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAttr {
    pub names: Vec<String>,
    #[serde(default)]
    pub visibility: InputVisibility,
    #[serde(default)]
    pub sigs: Vec<InputSig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputVisibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl From<InputVisibility> for Visibility {
    fn from(visibility: InputVisibility) -> Self {
        match visibility {
            InputVisibility::Public => Visibility::Public,
            InputVisibility::Protected => Visibility::Protected,
            InputVisibility::Private => Visibility::Private,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputParamKind {
    Req,
    Opt,
    Rest,
    KwReq,
    KwOpt,
    KwRest,
    Block,
}

impl From<InputParamKind> for ParamKind {
    fn from(kind: InputParamKind) -> Self {
        match kind {
            InputParamKind::Req => ParamKind::Req,
            InputParamKind::Opt => ParamKind::Opt,
            InputParamKind::Rest => ParamKind::Rest,
            InputParamKind::KwReq => ParamKind::KwReq,
            InputParamKind::KwOpt => ParamKind::KwOpt,
            InputParamKind::KwRest => ParamKind::KwRest,
            InputParamKind::Block => ParamKind::Block,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputParam {
    pub kind: InputParamKind,
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSigParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputSig {
    #[serde(default)]
    pub params: Vec<InputSigParam>,
    /// Absent means `void`.
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default, rename = "abstract")]
    pub is_abstract: bool,
    #[serde(default, rename = "override")]
    pub is_override: bool,
    #[serde(default, rename = "overridable")]
    pub is_overridable: bool,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub type_params: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputLoc {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub begin_line: usize,
    #[serde(default)]
    pub begin_column: usize,
    #[serde(default)]
    pub end_line: usize,
    #[serde(default)]
    pub end_column: usize,
}

impl From<&InputLoc> for Loc {
    fn from(loc: &InputLoc) -> Self {
        Loc {
            file: loc.file.clone(),
            begin_line: loc.begin_line,
            begin_column: loc.begin_column,
            end_line: loc.end_line,
            end_column: loc.end_column,
        }
    }
}

impl From<&InputParam> for Param {
    fn from(param: &InputParam) -> Self {
        Param {
            kind: param.kind.into(),
            name: param.name.clone(),
            default: param.default.clone(),
            comments: param
                .comments
                .iter()
                .map(|c| merge_engine::Comment::new(c.as_str()))
                .collect(),
        }
    }
}

impl From<&InputSig> for Sig {
    fn from(sig: &InputSig) -> Self {
        Sig {
            params: sig
                .params
                .iter()
                .map(|p| SigParam {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                })
                .collect(),
            return_type: sig.returns.clone(),
            is_abstract: sig.is_abstract,
            is_override: sig.is_override,
            is_overridable: sig.is_overridable,
            is_final: sig.is_final,
            type_params: sig.type_params.clone(),
        }
    }
}

/// Read and build a declaration tree from a JSON file.
pub fn load_tree(path: &Path) -> Result<DeclTree, InputError> {
    let content = std::fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = parse_tree(&content)?;
    tracing::debug!(path = %path.display(), nodes = tree.arena_len(), "loaded declaration tree");
    Ok(tree)
}

pub fn parse_tree(json: &str) -> Result<DeclTree, InputError> {
    let nodes: Vec<InputNode> = serde_json::from_str(json)?;
    build_tree(&nodes)
}

/// Build a tree whose root holds `nodes` in order.
pub fn build_tree(nodes: &[InputNode]) -> Result<DeclTree, InputError> {
    let mut tree = DeclTree::new();
    let root = tree.root();
    for node in nodes {
        add_node(&mut tree, root, node)?;
    }
    Ok(tree)
}

fn require_names(kind: &'static str, names: &[String]) -> Result<(), InputError> {
    if names.is_empty() {
        return Err(InputError::MissingNames { kind });
    }
    Ok(())
}

fn attr_kind(attr: &InputAttr, kind: AttrKind) -> Result<NodeKind, InputError> {
    require_names(kind.as_str(), &attr.names)?;
    let mut built = Attr::new(kind, attr.names.iter().cloned())
        .with_visibility(attr.visibility.into());
    built.sigs = attr.sigs.iter().map(Sig::from).collect();
    Ok(built.into())
}

fn mixin_kind(names: &[String], kind: MixinKind) -> Result<NodeKind, InputError> {
    require_names(kind.as_str(), names)?;
    Ok(Mixin::new(kind, names.iter().cloned()).into())
}

const NO_CHILDREN: &[InputNode] = &[];

fn add_node(tree: &mut DeclTree, parent: NodeId, node: &InputNode) -> Result<NodeId, InputError> {
    let (kind, children): (NodeKind, &[InputNode]) = match &node.decl {
        InputDecl::Tree { children } => (NodeKind::Tree, children.as_slice()),
        InputDecl::Module { name, children } => {
            (Scope::module(name.as_str()).into(), children.as_slice())
        }
        InputDecl::Class {
            name,
            superclass,
            children,
        } => {
            let scope = match superclass {
                Some(superclass) => Scope::subclass(name.as_str(), superclass.as_str()),
                None => Scope::class(name.as_str()),
            };
            (scope.into(), children.as_slice())
        }
        InputDecl::SingletonClass { children } => {
            (Scope::SingletonClass.into(), children.as_slice())
        }
        InputDecl::Const { name, value } => {
            (Const::new(name.as_str(), value.as_str()).into(), NO_CHILDREN)
        }
        InputDecl::Method {
            name,
            params,
            singleton,
            visibility,
            sigs,
        } => {
            let mut method = Method::new(name.as_str()).with_visibility((*visibility).into());
            method.params = params.iter().map(Param::from).collect();
            method.sigs = sigs.iter().map(Sig::from).collect();
            method.is_singleton = *singleton;
            (method.into(), NO_CHILDREN)
        }
        InputDecl::AttrReader(attr) => (attr_kind(attr, AttrKind::Reader)?, NO_CHILDREN),
        InputDecl::AttrWriter(attr) => (attr_kind(attr, AttrKind::Writer)?, NO_CHILDREN),
        InputDecl::AttrAccessor(attr) => (attr_kind(attr, AttrKind::Accessor)?, NO_CHILDREN),
        InputDecl::Include { names } => (mixin_kind(names, MixinKind::Include)?, NO_CHILDREN),
        InputDecl::Extend { names } => (mixin_kind(names, MixinKind::Extend)?, NO_CHILDREN),
        InputDecl::MixesInClassMethods { names } => {
            (mixin_kind(names, MixinKind::MixesInClassMethods)?, NO_CHILDREN)
        }
        InputDecl::Visibility { visibility } => {
            (NodeKind::Visibility((*visibility).into()), NO_CHILDREN)
        }
        InputDecl::Prop(field) => {
            let mut prop = StructField::prop(field.name.as_str(), field.ty.as_str());
            prop.default = field.default.clone();
            (prop.into(), NO_CHILDREN)
        }
        InputDecl::ConstField(field) => {
            let mut constant = StructField::constant(field.name.as_str(), field.ty.as_str());
            constant.default = field.default.clone();
            (constant.into(), NO_CHILDREN)
        }
        InputDecl::Enum { names } => (EnumBlock::new(names.iter().cloned()).into(), NO_CHILDREN),
        InputDecl::Helper { name } => (Helper::new(name.as_str()).into(), NO_CHILDREN),
        InputDecl::TypeMember { name, value } => {
            (TypeMember::new(name.as_str(), value.as_str()).into(), NO_CHILDREN)
        }
    };

    let id = tree.append(parent, kind);
    for comment in &node.comments {
        tree.add_comment(id, comment.as_str());
    }
    if let Some(loc) = &node.loc {
        tree.set_loc(id, loc.into());
    }
    for child in children {
        add_node(tree, id, child)?;
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use merge_engine::render;

    #[test]
    fn test_parse_nested_class() {
        let tree = parse_tree(
            r#"[
                {"kind": "class", "name": "Foo", "superclass": "Base", "comments": ["Docs"],
                 "children": [
                    {"kind": "include", "names": ["Comparable"]},
                    {"kind": "method", "name": "bar", "params": [{"kind": "req", "name": "a"}],
                     "sigs": [{"params": [{"name": "a", "type": "Integer"}], "returns": "String"}]}
                ]}
            ]"#,
        )
        .unwrap();

        let foo = tree.children(tree.root())[0];
        assert_eq!(
            tree.kind(foo),
            &NodeKind::Scope(Scope::subclass("Foo", "Base"))
        );
        assert_eq!(tree.node(foo).comments.len(), 1);
        assert_eq!(tree.children(foo).len(), 2);
        assert_eq!(
            render(&tree),
            "# Docs\n\
             class Foo < Base\n\
             \x20 include Comparable\n\
             \n\
             \x20 sig { params(a: Integer).returns(String) }\n\
             \x20 def bar(a); end\n\
             end\n"
        );
    }

    #[test]
    fn test_parse_every_leaf_kind() {
        let tree = parse_tree(
            r#"[
                {"kind": "module", "name": "M", "children": [
                    {"kind": "const", "name": "C", "value": "1"},
                    {"kind": "attr_accessor", "names": ["a"], "visibility": "private"},
                    {"kind": "extend", "names": ["E"]},
                    {"kind": "mixes_in_class_methods", "names": ["CM"]},
                    {"kind": "visibility", "visibility": "protected"},
                    {"kind": "prop", "name": "p", "type": "Integer", "default": "0"},
                    {"kind": "const_field", "name": "q", "type": "String"},
                    {"kind": "enum", "names": ["X", "Y"]},
                    {"kind": "helper", "name": "sealed"},
                    {"kind": "type_member", "name": "Elem", "value": "type_member"},
                    {"kind": "singleton_class", "children": [
                        {"kind": "method", "name": "s", "singleton": false,
                         "sigs": [{"final": true}]}
                    ]},
                    {"kind": "tree", "children": []}
                ]}
            ]"#,
        )
        .unwrap();

        let m = tree.children(tree.root())[0];
        assert_eq!(tree.children(m).len(), 12);
        assert_eq!(
            tree.kind(tree.children(m)[5]),
            &NodeKind::StructField(StructField::prop("p", "Integer").with_default("0"))
        );
        assert_eq!(
            tree.kind(tree.children(m)[4]),
            &NodeKind::Visibility(Visibility::Protected)
        );
    }

    #[test]
    fn test_param_kinds_and_loc() {
        let tree = parse_tree(
            r#"[{"kind": "method", "name": "m", "singleton": true,
                 "loc": {"file": "a.rb", "begin_line": 1, "end_line": 2},
                 "params": [
                    {"kind": "opt", "name": "b", "default": "1"},
                    {"kind": "kw_rest", "name": "opts", "comments": ["options"]}
                 ]}]"#,
        )
        .unwrap();

        let m = tree.children(tree.root())[0];
        let method = tree.kind(m).as_method().unwrap();
        assert!(method.is_singleton);
        assert_eq!(method.params[0], Param::opt("b", "1"));
        assert_eq!(method.params[1], Param::kw_rest("opts").with_comment("options"));
        assert_eq!(tree.node(m).loc.as_ref().unwrap().to_string(), "a.rb:1:0-2:0");
    }

    #[test]
    fn test_unknown_kind_is_a_parse_error() {
        let err = parse_tree(r#"[{"kind": "macro", "name": "x"}]"#).unwrap_err();
        assert!(matches!(err, InputError::Parse(_)));
    }

    #[test]
    fn test_mixin_without_names_is_rejected() {
        let err = parse_tree(r#"[{"kind": "include", "names": []}]"#).unwrap_err();
        assert!(matches!(err, InputError::MissingNames { kind: "include" }));
    }

    #[test]
    fn test_load_tree_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");
        std::fs::write(&path, r#"[{"kind": "const", "name": "A", "value": "1"}]"#).unwrap();

        let tree = load_tree(&path).unwrap();

        assert_eq!(render(&tree), "A = 1\n");
    }

    #[test]
    fn test_load_tree_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tree(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, InputError::Read { .. }));
        assert!(err.to_string().contains("missing.json"));
    }
}
