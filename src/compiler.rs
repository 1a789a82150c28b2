// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Lowers an `Ast` into a linear `Instruction` stream (a `Program`).
//!
//! The compiler is a single recursive walk that emits directly into a
//! growable instruction buffer; branches (`Alternation`, `Quantifier`) patch
//! their `SPLIT`/`JUMP` targets after their body has been emitted, once the
//! body's length — and therefore the jump target — is known.

use std::collections::HashMap;

use crate::ast::{AnchorKind, Ast, AstKind, NodeId};
use crate::error::{Error, Result};
use crate::flags::Flags;
use crate::inst::{BoundaryKind, Instruction, InstIdx, Lookaround, Opcode, Operand};
use crate::program::Program;

/// Accumulates instructions during a single compile. Not reused across
/// compiles; `compile` owns one and consumes it into a `Program`.
pub struct Compiler {
    insts: Vec<Instruction>,
    flags: Flags,
    group_count: usize,
    group_names: HashMap<String, usize>,
    pattern: Option<String>,
    max_nesting: usize,
}

const MAX_COMPILE_NESTING: usize = 256;

impl Compiler {
    pub fn create(initial_capacity: usize, flags: Flags) -> Compiler {
        Compiler {
            insts: Vec::with_capacity(initial_capacity),
            flags,
            group_count: 0,
            group_names: HashMap::new(),
            pattern: None,
            max_nesting: 0,
        }
    }

    pub fn ensure_capacity(&mut self, additional: usize) {
        self.insts.reserve(additional);
    }

    pub fn add_instruction(&mut self, opcode: Opcode) -> InstIdx {
        self.insts.push(Instruction::new(opcode, Operand::None));
        self.insts.len() - 1
    }

    pub fn set_operand(&mut self, idx: InstIdx, operand: Operand) {
        self.insts[idx].operand = operand;
    }

    pub fn set_pattern(&mut self, pattern: String) {
        self.pattern = Some(pattern);
    }

    pub fn set_group_count(&mut self, count: usize) {
        self.group_count = count;
    }

    /// Lowers `ast` and consumes `self` into a validated, optimized `Program`.
    pub fn compile(mut self, ast: &Ast) -> Result<Program> {
        self.group_count = ast.group_count;
        let start = self.add_instruction(Opcode::SaveStart);
        self.set_operand(start, Operand::Group(0));
        self.emit(ast, ast.root, 0)?;
        let end = self.add_instruction(Opcode::SaveEnd);
        self.set_operand(end, Operand::Group(0));
        self.add_instruction(Opcode::Accept);

        self.optimize();
        self.validate()?;

        Program::new(self.insts, self.group_count, self.group_names, self.flags, self.pattern)
    }

    fn emit(&mut self, ast: &Ast, id: NodeId, depth: usize) -> Result<()> {
        if depth > MAX_COMPILE_NESTING {
            return Err(Error::internal("compiler nesting exceeds the maximum of 256"));
        }
        self.max_nesting = self.max_nesting.max(depth);
        let node = ast.node(id);
        match &node.kind {
            AstKind::Root | AstKind::Pattern | AstKind::Sequence | AstKind::Concatenation => {
                for &child in &node.children {
                    self.emit(ast, child, depth + 1)?;
                }
            }
            AstKind::Alternation => self.emit_alternation(ast, &node.children, depth)?,
            AstKind::Literal => self.emit_literal(node.value.as_deref().unwrap_or(""), node.flags),
            AstKind::Dot => {
                self.add_instruction(Opcode::MatchAny);
            }
            AstKind::CharacterClass => {
                self.emit_class(node.value.as_deref().unwrap_or(""), node.flags);
            }
            AstKind::Group { index } => {
                let idx = *index;
                let children = node.children.clone();
                self.emit_group(ast, idx, &children, depth)?;
            }
            AstKind::NamedGroup { index, name } => {
                let idx = *index;
                self.group_names.insert(name.clone(), idx);
                let children = node.children.clone();
                self.emit_group(ast, idx, &children, depth)?;
            }
            AstKind::NonCapturingGroup => {
                let children = node.children.clone();
                for child in children {
                    self.emit(ast, child, depth + 1)?;
                }
            }
            AstKind::Quantifier { min, max, greedy } => {
                let (min, max, greedy) = (*min, *max, *greedy);
                let child = node.children[0];
                self.emit_quantifier(ast, child, min, max, greedy, depth)?;
            }
            AstKind::Anchor(kind) => {
                let bk = anchor_to_boundary(*kind);
                let idx = self.add_instruction(Opcode::Boundary);
                self.set_operand(idx, Operand::Boundary(bk));
            }
            AstKind::WordBoundary => {
                let idx = self.add_instruction(Opcode::Boundary);
                self.set_operand(idx, Operand::Boundary(BoundaryKind::WordBoundary));
            }
            AstKind::NotWordBoundary => {
                let idx = self.add_instruction(Opcode::Boundary);
                self.set_operand(idx, Operand::Boundary(BoundaryKind::NotWordBoundary));
            }
            AstKind::Backreference { index } => {
                let idx = self.add_instruction(Opcode::Backref);
                self.set_operand(idx, Operand::Group(*index));
            }
            AstKind::NamedBackreference { .. } => {
                let resolved: usize = node
                    .state_info
                    .as_ref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| Error::internal("named backreference missing resolved index"))?;
                let idx = self.add_instruction(Opcode::Backref);
                self.set_operand(idx, Operand::Group(resolved));
            }
            AstKind::Lookahead => {
                let children = node.children.clone();
                self.emit_lookaround(ast, &children, Opcode::Lookahead, false, false, depth)?;
            }
            AstKind::NegativeLookahead => {
                let children = node.children.clone();
                self.emit_lookaround(ast, &children, Opcode::NegLookahead, false, false, depth)?;
            }
            AstKind::Lookbehind => {
                let children = node.children.clone();
                self.emit_lookaround(ast, &children, Opcode::Lookahead, true, false, depth)?;
            }
            AstKind::NegativeLookbehind => {
                let children = node.children.clone();
                self.emit_lookaround(ast, &children, Opcode::NegLookahead, true, false, depth)?;
            }
            AstKind::AtomicGroup => {
                let children = node.children.clone();
                self.emit_lookaround(ast, &children, Opcode::Lookahead, false, true, depth)?;
            }
            AstKind::Comment => {}
            AstKind::Option { .. } => {
                let children = node.children.clone();
                for child in children {
                    self.emit(ast, child, depth + 1)?;
                }
            }
            AstKind::Conditional | AstKind::BackrefReset | AstKind::PosixClass | AstKind::UnicodeProperty => {
                return Err(Error::unsupported_feature(0, "construct has no lowering rule"));
            }
            AstKind::Char => {
                if let Some(v) = node.value.as_deref() {
                    self.emit_literal(v, node.flags);
                }
            }
        }
        Ok(())
    }

    fn emit_group(&mut self, ast: &Ast, index: usize, children: &[NodeId], depth: usize) -> Result<()> {
        let start = self.add_instruction(Opcode::SaveStart);
        self.set_operand(start, Operand::Group(index));
        for &child in children {
            self.emit(ast, child, depth + 1)?;
        }
        let end = self.add_instruction(Opcode::SaveEnd);
        self.set_operand(end, Operand::Group(index));
        Ok(())
    }

    fn emit_lookaround(
        &mut self,
        ast: &Ast,
        children: &[NodeId],
        opcode: Opcode,
        behind: bool,
        atomic: bool,
        depth: usize,
    ) -> Result<()> {
        let head = self.add_instruction(opcode);
        for &child in children {
            self.emit(ast, child, depth + 1)?;
        }
        self.add_instruction(Opcode::Accept);
        let end = self.insts.len();
        self.set_operand(head, Operand::Lookaround(Lookaround { end, behind, atomic }));
        Ok(())
    }

    fn emit_alternation(&mut self, ast: &Ast, branches: &[NodeId], depth: usize) -> Result<()> {
        let n = branches.len();
        let mut pending_jumps = Vec::with_capacity(n.saturating_sub(1));
        for (i, &branch) in branches.iter().enumerate() {
            if i + 1 < n {
                let split = self.add_instruction(Opcode::Split);
                let body_start = self.insts.len();
                self.emit(ast, branch, depth + 1)?;
                let jump = self.add_instruction(Opcode::Jump);
                pending_jumps.push(jump);
                let next = self.insts.len();
                self.set_operand(split, Operand::Branch { primary: body_start, secondary: next });
            } else {
                self.emit(ast, branch, depth + 1)?;
            }
        }
        let end = self.insts.len();
        for jump in pending_jumps {
            self.set_operand(jump, Operand::Jump(end));
        }
        Ok(())
    }

    fn emit_quantifier(
        &mut self,
        ast: &Ast,
        child: NodeId,
        min: u32,
        max: Option<u32>,
        greedy: bool,
        depth: usize,
    ) -> Result<()> {
        if min == 0 && max == Some(0) {
            return Ok(());
        }
        for _ in 0..min {
            self.emit(ast, child, depth + 1)?;
        }
        match max {
            Some(max) => {
                let extra = max.saturating_sub(min);
                let mut splits = Vec::with_capacity(extra as usize);
                for _ in 0..extra {
                    let split = self.add_instruction(Opcode::Split);
                    splits.push(split);
                    let body_start = self.insts.len();
                    self.emit(ast, child, depth + 1)?;
                    let (primary, secondary) = (body_start, 0);
                    self.set_operand(split, Operand::Branch { primary, secondary });
                }
                let end = self.insts.len();
                for split in splits {
                    let body_start = match &self.insts[split].operand {
                        Operand::Branch { primary, .. } => *primary,
                        _ => unreachable!(),
                    };
                    let (primary, secondary) =
                        if greedy { (body_start, end) } else { (end, body_start) };
                    self.set_operand(split, Operand::Branch { primary, secondary });
                }
            }
            None => {
                let split = self.add_instruction(Opcode::Split);
                let body_start = self.insts.len();
                self.emit(ast, child, depth + 1)?;
                let jump = self.add_instruction(Opcode::Jump);
                self.set_operand(jump, Operand::Jump(split));
                let end = self.insts.len();
                let (primary, secondary) =
                    if greedy { (body_start, end) } else { (end, body_start) };
                self.set_operand(split, Operand::Branch { primary, secondary });
            }
        }
        Ok(())
    }

    fn emit_literal(&mut self, value: &str, flags: Flags) {
        let fold = flags.contains(Flags::CASE_INSENSITIVE);
        for &b in value.as_bytes() {
            if fold && b.is_ascii_alphabetic() {
                let other = flip_ascii_case(b);
                let idx = self.add_instruction(Opcode::MatchClass);
                self.set_operand(idx, Operand::Class { bytes: vec![b, other] });
            } else {
                let idx = self.add_instruction(Opcode::MatchChar);
                self.set_operand(idx, Operand::Char(b));
            }
        }
    }

    fn emit_class(&mut self, raw: &str, flags: Flags) {
        let bytes = if flags.contains(Flags::CASE_INSENSITIVE) && needs_case_fold(raw) {
            fold_class_body(raw).into_bytes()
        } else {
            raw.as_bytes().to_vec()
        };
        let idx = self.add_instruction(Opcode::MatchClass);
        self.set_operand(idx, Operand::Class { bytes });
    }

    /// Removes `NOP`s and collapses jump-to-jump chains, rewriting every
    /// operand that carries an instruction index through a relocation table.
    pub fn optimize(&mut self) {
        let mut keep = vec![true; self.insts.len()];
        for (i, inst) in self.insts.iter().enumerate() {
            if inst.opcode == Opcode::Nop {
                keep[i] = false;
            }
        }
        let mut relocation = vec![0usize; self.insts.len()];
        let mut next = 0usize;
        for i in 0..self.insts.len() {
            relocation[i] = next;
            if keep[i] {
                next += 1;
            }
        }
        let final_len = next;
        let old = std::mem::take(&mut self.insts);
        let mut rewritten = Vec::with_capacity(final_len);
        for (i, mut inst) in old.into_iter().enumerate() {
            if !keep[i] {
                continue;
            }
            relocate_operand(&mut inst.operand, &relocation);
            rewritten.push(inst);
        }
        self.insts = rewritten;
    }

    /// Checks every jump-like operand lands in bounds and every group index
    /// is within `[0, group_count]`, and that no `MATCH_CLASS` carries an
    /// empty byte payload.
    pub fn validate(&self) -> Result<()> {
        let len = self.insts.len();
        for inst in &self.insts {
            match &inst.operand {
                Operand::Jump(target) if *target > len => {
                    return Err(Error::internal("jump target out of range"));
                }
                Operand::Branch { primary, secondary } if *primary > len || *secondary > len => {
                    return Err(Error::internal("split target out of range"));
                }
                Operand::Group(index) if *index > self.group_count => {
                    return Err(Error::internal("group index out of range"));
                }
                Operand::Class { bytes } if inst.opcode == Opcode::MatchClass && bytes.is_empty() => {
                    return Err(Error::internal("empty character class"));
                }
                Operand::Lookaround(l) if l.end > len => {
                    return Err(Error::internal("lookaround end out of range"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn debug_info(&self) -> String {
        let mut out = String::new();
        for (i, inst) in self.insts.iter().enumerate() {
            out.push_str(&format!("{:04} {:?} {:?}\n", i, inst.opcode, inst.operand));
        }
        out
    }
}

fn anchor_to_boundary(kind: AnchorKind) -> BoundaryKind {
    match kind {
        AnchorKind::StartOfLine => BoundaryKind::StartOfLine,
        AnchorKind::EndOfLine => BoundaryKind::EndOfLine,
        AnchorKind::StartOfInput => BoundaryKind::StartOfInput,
        AnchorKind::EndOfInput => BoundaryKind::EndOfInput,
        AnchorKind::ResetMatchStart => BoundaryKind::ResetMatchStart,
    }
}

fn relocate_operand(operand: &mut Operand, relocation: &[usize]) {
    match operand {
        Operand::Jump(t) => *t = relocation.get(*t).copied().unwrap_or(*t),
        Operand::Branch { primary, secondary } => {
            *primary = relocation.get(*primary).copied().unwrap_or(*primary);
            *secondary = relocation.get(*secondary).copied().unwrap_or(*secondary);
        }
        Operand::Lookaround(l) => {
            l.end = relocation.get(l.end).copied().unwrap_or(l.end);
        }
        _ => {}
    }
}

fn flip_ascii_case(b: u8) -> u8 {
    if b.is_ascii_uppercase() {
        b.to_ascii_lowercase()
    } else {
        b.to_ascii_uppercase()
    }
}

/// A whole-value shorthand (`\d`, `\W`, ...) is already case-invariant or
/// already spans both cases; folding it would wrongly union unrelated bytes.
fn needs_case_fold(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    !(bytes.len() == 2 && bytes[0] == b'\\' && matches!(bytes[1], b'd' | b'D' | b'w' | b'W' | b's' | b'S'))
}

fn fold_class_body(raw: &str) -> String {
    let (prefix, body) = match raw.strip_prefix('^') {
        Some(rest) => ("^", rest),
        None => ("", raw),
    };
    let mut folded = String::new();
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        // Escape sequences (`\d`, `\b`, `\n`, ...) have a fixed meaning
        // unrelated to letter case; copy them through unflipped rather than
        // risk e.g. turning a literal backspace escape into the letter `B`.
        if c == '\\' {
            folded.push('\\');
            if let Some(next) = chars.next() {
                folded.push(next);
            }
            continue;
        }
        folded.push(flip_ascii_char(c));
    }
    format!("{}{}{}", prefix, body, folded)
}

fn flip_ascii_char(c: char) -> char {
    if c.is_ascii_uppercase() {
        c.to_ascii_lowercase()
    } else if c.is_ascii_lowercase() {
        c.to_ascii_uppercase()
    } else {
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn compile_src(src: &str) -> Program {
        let ast = parser::parse(src, Flags::empty()).unwrap();
        Compiler::create(16, Flags::empty()).compile(&ast).unwrap()
    }

    #[test]
    fn literal_compiles_one_match_char_per_byte() {
        let p = compile_src("ab");
        let chars = p.instructions.iter().filter(|i| i.opcode == Opcode::MatchChar).count();
        assert_eq!(chars, 2);
    }

    #[test]
    fn alternation_has_balanced_splits_and_jumps() {
        let p = compile_src("a|b|c");
        let splits = p.instructions.iter().filter(|i| i.opcode == Opcode::Split).count();
        assert_eq!(splits, 2);
    }

    #[test]
    fn bounded_quantifier_unrolls() {
        let p = compile_src("a{2,4}");
        let chars = p.instructions.iter().filter(|i| i.opcode == Opcode::MatchChar).count();
        assert_eq!(chars, 4);
        let splits = p.instructions.iter().filter(|i| i.opcode == Opcode::Split).count();
        assert_eq!(splits, 2);
    }

    #[test]
    fn unbounded_quantifier_emits_one_split_and_loop_jump() {
        let p = compile_src("a+");
        let splits = p.instructions.iter().filter(|i| i.opcode == Opcode::Split).count();
        assert_eq!(splits, 1);
        let jumps = p.instructions.iter().filter(|i| i.opcode == Opcode::Jump).count();
        assert_eq!(jumps, 1);
    }

    #[test]
    fn group_wraps_body_in_save_pair() {
        let p = compile_src("(a)");
        let saves: Vec<_> = p.instructions.iter().filter(|i| {
            matches!(i.opcode, Opcode::SaveStart | Opcode::SaveEnd)
        }).collect();
        // whole-match save pair (group 0) + this group's own pair
        assert_eq!(saves.len(), 4);
    }

    #[test]
    fn lookahead_terminates_with_accept_and_records_end() {
        let p = compile_src("(?=a)b");
        let look = p.instructions.iter().find(|i| i.opcode == Opcode::Lookahead).unwrap();
        match &look.operand {
            Operand::Lookaround(l) => assert!(!l.behind && !l.atomic),
            _ => panic!("expected lookaround operand"),
        }
    }

    #[test]
    fn empty_bounded_repetition_emits_nothing_for_the_operand() {
        let p = compile_src("a{0,0}b");
        let chars = p.instructions.iter().filter(|i| i.opcode == Opcode::MatchChar).count();
        assert_eq!(chars, 1);
    }
}
