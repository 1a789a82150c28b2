// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The parsed Abstract Syntax Tree.
//!
//! Nodes live in a flat arena owned by `Ast` rather than as a web of boxed,
//! parent-pointing cells: every child reference and the `parent` back-link
//! are plain `NodeId` indices into `Ast::nodes`. This sidesteps the
//! cyclic-ownership problems a naive `parent: *mut Node` design runs into
//! and makes clone/free a single `Vec` clone/drop.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};
use crate::flags::Flags;

/// Index into `Ast::nodes`. `usize::MAX` is never a valid id.
pub type NodeId = usize;

/// Zero-width assertion kinds carried by `AstKind::Anchor`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnchorKind {
    StartOfLine,
    EndOfLine,
    StartOfInput,
    EndOfInput,
    ResetMatchStart,
}

/// The tagged shape of one AST node. Most variants with payload fields carry
/// no children of their own (e.g. `Literal`, `Backreference`); container
/// variants (`Alternation`, `Concatenation`, `Group`, `Quantifier`, ...) hold
/// their operands in `AstNode::children`.
#[derive(Clone, Debug, PartialEq)]
pub enum AstKind {
    Root,
    Pattern,
    Alternation,
    Concatenation,
    Sequence,
    Literal,
    Char,
    Dot,
    CharacterClass,
    Group { index: usize },
    NonCapturingGroup,
    NamedGroup { index: usize, name: String },
    Backreference { index: usize },
    NamedBackreference { name: String },
    Quantifier { min: u32, max: Option<u32>, greedy: bool },
    Anchor(AnchorKind),
    WordBoundary,
    NotWordBoundary,
    Lookahead,
    NegativeLookahead,
    Lookbehind,
    NegativeLookbehind,
    AtomicGroup,
    Comment,
    /// `(?i)`, `(?i:...)` and similar inline flag modifiers. Scope is the
    /// whole remainder of the enclosing group when there are no children,
    /// or just the (single) child subtree when there is one.
    Option { flags: Flags },
    /// Present in the data model for completeness; the grammar in this
    /// engine defines no production that constructs it (see DESIGN.md).
    Conditional,
    /// Present in the data model for completeness; `(?|...)` branch-reset
    /// groups have no grammar production in this engine (see DESIGN.md).
    BackrefReset,
    /// Present in the data model for completeness; POSIX classes
    /// (`[:alpha:]`) are represented inside a `CharacterClass` node's raw
    /// bytes, not as a standalone AST kind (see `char_class`).
    PosixClass,
    /// Present in the data model for completeness. This engine is
    /// byte-wise/ASCII only, so `\p{...}` is rejected by the
    /// tokenizer/parser as `InvalidEscape` rather than constructing this.
    UnicodeProperty,
}

/// One node in the arena.
#[derive(Clone, Debug)]
pub struct AstNode {
    pub kind: AstKind,
    pub value: Option<String>,
    pub children: Vec<NodeId>,
    pub flags: Flags,
    pub parent: Option<NodeId>,
    /// Free-form annotation slot used by the parser/compiler to stash
    /// derived state (e.g. "this alternation's branches are all literals").
    pub state_info: Option<String>,
}

impl AstNode {
    fn new(kind: AstKind, flags: Flags) -> AstNode {
        AstNode {
            kind,
            value: None,
            children: Vec::new(),
            flags,
            parent: None,
            state_info: None,
        }
    }
}

/// Owns every node reachable from `root`. Dropping the container frees the
/// whole tree in one pass (the arena's `Vec<AstNode>` drop).
#[derive(Clone, Debug)]
pub struct Ast {
    pub nodes: Vec<AstNode>,
    pub root: NodeId,
    pub flags: Flags,
    pub group_count: usize,
    pub is_valid: bool,
}

impl Ast {
    pub(crate) fn new(flags: Flags) -> Ast {
        let mut nodes = Vec::new();
        nodes.push(AstNode::new(AstKind::Root, flags));
        Ast { nodes, root: 0, flags, group_count: 0, is_valid: false }
    }

    pub(crate) fn add_node(&mut self, kind: AstKind, flags: Flags) -> NodeId {
        self.nodes.push(AstNode::new(kind, flags));
        self.nodes.len() - 1
    }

    /// Attaches `child` as the last child of `parent`, setting the back-link.
    pub(crate) fn add_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id]
    }

    /// Deep-clones the subtree rooted at `id` (including the node itself)
    /// and appends the copies to this arena, returning the new root id.
    pub fn clone_recursive(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id].kind.clone();
        let value = self.nodes[id].value.clone();
        let flags = self.nodes[id].flags;
        let state_info = self.nodes[id].state_info.clone();
        let children = self.nodes[id].children.clone();
        let new_id = self.add_node(kind, flags);
        self.nodes[new_id].value = value;
        self.nodes[new_id].state_info = state_info;
        for child in children {
            let new_child = self.clone_recursive(child);
            self.add_child(new_id, new_child);
        }
        new_id
    }

    /// Serializes the tree to a deterministic, human-readable form (used by
    /// `debug_info` callers and by the fingerprint hash below — NOT part of
    /// the external bytecode format).
    pub fn to_string(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        out.push('(');
        out.push_str(&format!("{:?}", node.kind));
        if let Some(ref v) = node.value {
            out.push(':');
            out.push_str(v);
        }
        for &child in &node.children {
            out.push(' ');
            self.write_node(child, out);
        }
        out.push(')');
    }

    /// Walks the tree checking each node's shape against its kind: child
    /// counts, quantifier operand presence, backreference indices in range.
    /// Sets `is_valid` and returns the outcome.
    pub fn validate(&mut self) -> Result<()> {
        let result = self.validate_node(self.root, 0);
        self.is_valid = result.is_ok();
        result
    }

    fn validate_node(&self, id: NodeId, depth: usize) -> Result<()> {
        const MAX_NESTING: usize = 256;
        if depth > MAX_NESTING {
            return Err(Error::syntax(0, "pattern nesting exceeds the maximum of 256"));
        }
        let node = &self.nodes[id];
        match node.kind {
            AstKind::Alternation => {
                if node.children.len() < 2 {
                    return Err(Error::internal("alternation with fewer than two branches"));
                }
            }
            AstKind::Quantifier { .. } => {
                if node.children.len() != 1 {
                    return Err(Error::internal("quantifier without exactly one operand"));
                }
            }
            AstKind::Backreference { index } => {
                if index == 0 || index > self.group_count {
                    return Err(Error::syntax(0, format!("backreference to unknown group {}", index)));
                }
            }
            _ => {}
        }
        for &child in &node.children {
            self.validate_node(child, depth + 1)?;
        }
        Ok(())
    }
}

/// A deterministic summary of a pattern's structural complexity, computed
/// bottom-up from the AST. Stable across re-parses of the same normalized
/// source and flags.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Fingerprint {
    pub complexity: f64,
    pub state_count: usize,
    pub transition_count: usize,
    pub branching_factor: f64,
    pub max_nesting: usize,
    pub alternation_count: usize,
    pub quantifier_count: usize,
    pub capture_group_count: usize,
    pub hash: u64,
}

struct Accum {
    state_count: usize,
    transition_count: usize,
    alternation_count: usize,
    quantifier_count: usize,
    max_nesting: usize,
    branch_sum: usize,
    branch_nodes: usize,
    complexity: f64,
}

pub fn fingerprint(ast: &Ast) -> Fingerprint {
    let mut acc = Accum {
        state_count: 0,
        transition_count: 0,
        alternation_count: 0,
        quantifier_count: 0,
        max_nesting: 0,
        branch_sum: 0,
        branch_nodes: 0,
        complexity: 0.0,
    };
    walk(ast, ast.root, 0, &mut acc);

    let branching_factor = if acc.branch_nodes > 0 {
        acc.branch_sum as f64 / acc.branch_nodes as f64
    } else {
        0.0
    };

    let mut hasher = DefaultHasher::new();
    hash_node(ast, ast.root, &mut hasher);

    Fingerprint {
        complexity: acc.complexity,
        state_count: acc.state_count,
        transition_count: acc.transition_count,
        branching_factor,
        max_nesting: acc.max_nesting,
        alternation_count: acc.alternation_count,
        quantifier_count: acc.quantifier_count,
        capture_group_count: ast.group_count,
        hash: hasher.finish(),
    }
}

fn walk(ast: &Ast, id: NodeId, depth: usize, acc: &mut Accum) {
    acc.state_count += 1;
    acc.max_nesting = acc.max_nesting.max(depth);
    let node = ast.node(id);
    let branching = node.children.len();
    if branching > 1 {
        acc.branch_sum += branching;
        acc.branch_nodes += 1;
    }
    acc.transition_count += branching.max(1);

    match node.kind {
        AstKind::Alternation => acc.alternation_count += 1,
        AstKind::Quantifier { max, .. } => {
            acc.quantifier_count += 1;
            if max.is_none() {
                // Unbounded repetition contributes extra weight: it is the
                // shape most responsible for pathological backtracking.
                acc.complexity += 4.0 * (depth as f64 + 1.0);
            }
        }
        _ => {}
    }
    acc.complexity += (1.0 + branching as f64) * (depth as f64 + 1.0);

    for &child in &node.children {
        walk(ast, child, depth + 1, acc);
    }
}

/// Hashes the canonical shape of a node: its kind discriminant, its value,
/// and its children in order. Two ASTs with the same shape hash identically
/// regardless of arena insertion order elsewhere in the tree.
fn hash_node<H: Hasher>(ast: &Ast, id: NodeId, hasher: &mut H) {
    let node = ast.node(id);
    format!("{:?}", node.kind).hash(hasher);
    node.value.hash(hasher);
    node.children.len().hash(hasher);
    for &child in &node.children {
        hash_node(ast, child, hasher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::Flags;

    fn leaf(ast: &mut Ast, kind: AstKind) -> NodeId {
        ast.add_node(kind, Flags::empty())
    }

    #[test]
    fn clone_recursive_duplicates_subtree() {
        let mut ast = Ast::new(Flags::empty());
        let a = leaf(&mut ast, AstKind::Literal);
        ast.nodes[a].value = Some("a".into());
        let b = leaf(&mut ast, AstKind::Literal);
        ast.nodes[b].value = Some("b".into());
        let concat = leaf(&mut ast, AstKind::Concatenation);
        ast.add_child(concat, a);
        ast.add_child(concat, b);
        ast.add_child(ast.root, concat);

        let cloned = ast.clone_recursive(concat);
        assert_ne!(cloned, concat);
        assert_eq!(ast.node(cloned).children.len(), 2);
        assert_eq!(ast.to_string(), ast.to_string()); // deterministic
    }

    #[test]
    fn validate_rejects_alternation_with_one_branch() {
        let mut ast = Ast::new(Flags::empty());
        let alt = leaf(&mut ast, AstKind::Alternation);
        let a = leaf(&mut ast, AstKind::Literal);
        ast.add_child(alt, a);
        ast.add_child(ast.root, alt);
        assert!(ast.validate().is_err());
    }

    #[test]
    fn fingerprint_is_deterministic_for_identical_shape() {
        let build = || {
            let mut ast = Ast::new(Flags::empty());
            let a = leaf(&mut ast, AstKind::Literal);
            ast.nodes[a].value = Some("a".into());
            ast.add_child(ast.root, a);
            ast.group_count = 0;
            ast
        };
        let f1 = fingerprint(&build());
        let f2 = fingerprint(&build());
        assert_eq!(f1, f2);
    }
}
