//! # merge-engine
//!
//! Structural merge and normalization of generated interface declarations.
//!
//! ## Approach
//!
//! Independently produced declaration trees are combined in three stages:
//!
//! 1. **Index + merge**. Every declaration has one or more identity keys
//!    derived from its enclosing scope. Trees are folded into one output tree;
//!    same-identity declarations are compared structurally and either merged
//!    or kept side by side in an explicit conflict node.
//!
//! 2. **Normalization**. A fixed pipeline of idempotent rewrites nests
//!    singleton and non-public methods, groups declarations into categories
//!    and sorts them, so merged output is stable regardless of input order.
//!
//! 3. **Printing**. The tree is rendered as RBI-style text with
//!    `<<<<<<<` / `=======` / `>>>>>>>` conflict regions for human review.
//!
//! ## Example
//!
//! ```rust
//! use merge_engine::{merge_trees, normalize, render, DeclTree, Method, Scope, Sig};
//!
//! let mut left = DeclTree::new();
//! let root = left.root();
//! let foo = left.append(root, Scope::class("Foo"));
//! left.append(foo, Method::new("bar"));
//!
//! let mut right = DeclTree::new();
//! let root = right.root();
//! let foo = right.append(root, Scope::class("Foo"));
//! right.append(foo, Method::new("bar").with_sig(Sig::new()));
//!
//! let mut output = merge_trees(&left, &right, "left", "right");
//! assert!(output.conflicts.is_empty());
//!
//! normalize(&mut output.tree);
//! println!("{}", render(&output.tree));
//! ```

pub mod index;
pub mod merge;
pub mod normalize;
pub mod printer;
pub mod types;

// Re-export primary public API
pub use index::Index;
pub use merge::{
    Conflict, Keep, MergeOptions, MergeOutput, coalesce_conflicts, merge_all, merge_trees,
    merge_trees_with,
};
pub use normalize::{Pipeline, Rewriter, normalize};
pub use printer::{PrintError, PrinterConfig, render, render_node, render_with, write_to};
pub use types::{
    Attr, AttrKind, Comment, Const, DeclTree, EnumBlock, FieldKind, GroupKind, Helper, Loc,
    Method, Mixin, MixinKind, Node, NodeId, NodeKind, Param, ParamKind, Scope, Sig, SigParam,
    StructField, TypeMember, Visibility,
};
