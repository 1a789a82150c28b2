// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The bounded-backtracking bytecode VM.
//!
//! Backtrack points are not a linked list of heap-allocated choice frames;
//! they live in a `BacktrackStack`, columnar `Vec`s checked out of
//! `backtracker::global()`'s thread-local pool for the duration of one
//! `run_one` call. Pushing a choice point grows buffers that came from the
//! previous run on this thread rather than starting from nothing each time.

use std::time::Instant;

use crate::backtracker::{self, Scratch};
use crate::captures::Captures;
use crate::inst::{BoundaryKind, Opcode, Operand};
use crate::program::Program;
use crate::registry::BailoutConfig;

/// Outcome of a top-level match attempt.
#[derive(Clone, Debug)]
pub enum MatchOutcome {
    Match(Captures),
    NoMatch,
    LimitExceeded,
}

/// Outcome of one internal `run_one` dispatch loop (a single instruction
/// subrange, possibly nested inside a lookaround).
enum RunResult {
    Matched { end: usize },
    Failed,
    LimitExceeded,
}

struct Budget {
    max_depth: usize,
    max_transitions: u64,
    max_duration_ms: u64,
    transitions: u64,
    start: Instant,
}

impl Budget {
    fn from_config(config: &BailoutConfig) -> Budget {
        Budget {
            max_depth: config.max_depth.unwrap_or(crate::registry::DEFAULT_MAX_DEPTH),
            max_transitions: config.max_transitions.unwrap_or(u64::MAX),
            max_duration_ms: config.max_duration_ms.unwrap_or(u64::MAX),
            transitions: 0,
            start: Instant::now(),
        }
    }

    /// Returns `false` once any configured ceiling has been crossed.
    fn tick(&mut self) -> bool {
        self.transitions += 1;
        if self.transitions > self.max_transitions {
            return false;
        }
        if self.max_duration_ms != u64::MAX {
            let elapsed = self.start.elapsed().as_millis() as u64;
            if elapsed > self.max_duration_ms {
                return false;
            }
        }
        true
    }
}

/// Columnar choice-point stack: parallel buffers rather than one allocation
/// per pushed backtrack point. The buffers themselves are checked out of
/// `backtracker::global()`'s thread-local pool for the lifetime of one
/// `run_one` call and handed back on `release`, so a run reuses whatever the
/// previous run on this thread left behind instead of growing fresh `Vec`s.
struct BacktrackStack {
    scratch: Scratch,
    max_depth: usize,
}

impl BacktrackStack {
    fn acquire(max_depth: usize) -> BacktrackStack {
        let brokers = backtracker::global();
        brokers.set_max_depth(max_depth);
        BacktrackStack { scratch: brokers.acquire(), max_depth }
    }

    fn release(self) {
        backtracker::global().release(self.scratch);
    }

    /// `guard` is the loop-guard snapshot (see `run_one`'s `last_split_sp`)
    /// to restore alongside `captures` if this choice point is later popped.
    fn push(&mut self, pc: usize, sp: usize, captures: &Captures, guard: &[usize]) -> bool {
        if self.scratch.pcs.len() >= self.max_depth {
            return false;
        }
        self.scratch.pcs.push(pc);
        self.scratch.sps.push(sp);
        self.scratch.snapshots.push(captures.slots().to_vec());
        self.scratch.guards.push(guard.to_vec());
        true
    }

    fn pop(&mut self) -> Option<(usize, usize, Vec<usize>, Vec<usize>)> {
        Some((
            self.scratch.pcs.pop()?,
            self.scratch.sps.pop()?,
            self.scratch.snapshots.pop()?,
            self.scratch.guards.pop()?,
        ))
    }
}

/// Interprets one compiled `Program` against one input buffer.
pub struct Vm<'p, 'i> {
    program: &'p Program,
    input: &'i [u8],
}

impl<'p, 'i> Vm<'p, 'i> {
    pub fn new(program: &'p Program, input: &'i [u8]) -> Vm<'p, 'i> {
        Vm { program, input }
    }

    /// Searches for the leftmost match starting at or after `start_offset`.
    pub fn find(&self, start_offset: usize, config: &BailoutConfig) -> MatchOutcome {
        let mut budget = Budget::from_config(config);
        for start in start_offset..=self.input.len() {
            let mut captures =
                Captures::with_names(self.program.group_count, self.program.group_names.clone());
            match self.run_one(0, start, &mut captures, &mut budget) {
                RunResult::Matched { end } => {
                    captures.record(0, start, end);
                    return MatchOutcome::Match(captures);
                }
                RunResult::Failed => continue,
                RunResult::LimitExceeded => return MatchOutcome::LimitExceeded,
            }
        }
        MatchOutcome::NoMatch
    }

    /// Runs one dispatch loop starting at `pc0`/`sp0`, acquiring a pooled
    /// `BacktrackStack` for its duration and handing it back before
    /// returning.
    fn run_one(&self, pc0: usize, sp0: usize, captures: &mut Captures, budget: &mut Budget) -> RunResult {
        let mut stack = BacktrackStack::acquire(budget.max_depth);
        let result = self.run_dispatch(pc0, sp0, captures, budget, &mut stack);
        stack.release();
        result
    }

    fn run_dispatch(
        &self,
        pc0: usize,
        sp0: usize,
        captures: &mut Captures,
        budget: &mut Budget,
        stack: &mut BacktrackStack,
    ) -> RunResult {
        let mut pc = pc0;
        let mut sp = sp0;
        // Per-instruction "last position this SPLIT was entered at" guard.
        // An unbounded quantifier whose body can match the empty string
        // (`(a*)*b`) would otherwise loop through the same SPLIT forever
        // without consuming input; re-entering a SPLIT at the same `sp` it
        // was last entered at means the body made no progress, so the loop
        // is dead and only its exit branch is worth taking.
        let mut last_split_sp = vec![usize::MAX; self.program.instructions.len()];

        macro_rules! backtrack {
            () => {{
                match stack.pop() {
                    Some((p, s, snap, guard_snap)) => {
                        pc = p;
                        sp = s;
                        captures.slots_mut().copy_from_slice(&snap);
                        last_split_sp.copy_from_slice(&guard_snap);
                        continue;
                    }
                    None => return RunResult::Failed,
                }
            }};
        }

        loop {
            if !budget.tick() {
                return RunResult::LimitExceeded;
            }
            let inst = &self.program.instructions[pc];
            match inst.opcode {
                Opcode::Nop => pc += 1,
                Opcode::MatchChar => {
                    let want = match &inst.operand {
                        Operand::Char(b) => *b,
                        _ => unreachable!("MatchChar without Char operand"),
                    };
                    if sp < self.input.len() && self.input[sp] == want {
                        sp += 1;
                        pc += 1;
                    } else {
                        backtrack!();
                    }
                }
                Opcode::MatchClass => {
                    let class = self.program.class_for(pc);
                    if sp < self.input.len() && class.map_or(false, |c| c.matches(self.input[sp])) {
                        sp += 1;
                        pc += 1;
                    } else {
                        backtrack!();
                    }
                }
                Opcode::MatchAny => {
                    let dot_all = self.program.flags.contains(crate::flags::Flags::DOT_ALL);
                    if sp < self.input.len() && (dot_all || self.input[sp] != b'\n') {
                        sp += 1;
                        pc += 1;
                    } else {
                        backtrack!();
                    }
                }
                Opcode::Jump => {
                    pc = match &inst.operand {
                        Operand::Jump(t) => *t,
                        _ => unreachable!("Jump without Jump operand"),
                    };
                }
                Opcode::Split => {
                    let (primary, secondary) = match &inst.operand {
                        Operand::Branch { primary, secondary } => (*primary, *secondary),
                        _ => unreachable!("Split without Branch operand"),
                    };
                    if last_split_sp[pc] == sp {
                        // Already took `primary` from here at this exact
                        // position once; doing so again can't consume any
                        // more input, so stop looping and fall through.
                        pc = secondary;
                    } else {
                        if !stack.push(secondary, sp, captures, &last_split_sp) {
                            return RunResult::LimitExceeded;
                        }
                        last_split_sp[pc] = sp;
                        pc = primary;
                    }
                }
                Opcode::SaveStart | Opcode::SaveEnd => {
                    let group = match &inst.operand {
                        Operand::Group(g) => *g,
                        _ => unreachable!("Save without Group operand"),
                    };
                    let slot = group * 2 + if inst.opcode == Opcode::SaveEnd { 1 } else { 0 };
                    captures.slots_mut()[slot] = sp;
                    pc += 1;
                }
                Opcode::Accept => return RunResult::Matched { end: sp },
                Opcode::Fail => backtrack!(),
                Opcode::RepeatStart | Opcode::RepeatEnd => pc += 1,
                Opcode::Boundary => {
                    let kind = match &inst.operand {
                        Operand::Boundary(k) => *k,
                        _ => unreachable!("Boundary without Boundary operand"),
                    };
                    if self.boundary_holds(kind, sp) {
                        if kind == BoundaryKind::ResetMatchStart {
                            captures.slots_mut()[0] = sp;
                        }
                        pc += 1;
                    } else {
                        backtrack!();
                    }
                }
                Opcode::Backref => {
                    let group = match &inst.operand {
                        Operand::Group(g) => *g,
                        _ => unreachable!("Backref without Group operand"),
                    };
                    let ci = self.program.flags.contains(crate::flags::Flags::CASE_INSENSITIVE);
                    match captures.get_content(self.input, group) {
                        Some(text) if self.matches_backref(sp, text, ci) => {
                            sp += text.len();
                            pc += 1;
                        }
                        _ => backtrack!(),
                    }
                }
                Opcode::Lookahead => {
                    let l = match &inst.operand {
                        Operand::Lookaround(l) => *l,
                        _ => unreachable!("Lookahead without Lookaround operand"),
                    };
                    if l.atomic {
                        match self.run_one(pc + 1, sp, captures, budget) {
                            RunResult::Matched { end } => {
                                sp = end;
                                pc = l.end;
                            }
                            RunResult::Failed => backtrack!(),
                            RunResult::LimitExceeded => return RunResult::LimitExceeded,
                        }
                    } else if l.behind {
                        match self.run_lookbehind(pc, sp, captures, budget) {
                            Some(trial) => {
                                *captures = trial;
                                pc = l.end;
                            }
                            None => backtrack!(),
                        }
                    } else {
                        let mut trial = captures.clone();
                        match self.run_one(pc + 1, sp, &mut trial, budget) {
                            RunResult::Matched { .. } => {
                                *captures = trial;
                                pc = l.end;
                            }
                            RunResult::Failed => backtrack!(),
                            RunResult::LimitExceeded => return RunResult::LimitExceeded,
                        }
                    }
                }
                Opcode::NegLookahead => {
                    let l = match &inst.operand {
                        Operand::Lookaround(l) => *l,
                        _ => unreachable!("NegLookahead without Lookaround operand"),
                    };
                    if l.behind {
                        match self.run_lookbehind(pc, sp, captures, budget) {
                            Some(_) => backtrack!(),
                            None => pc = l.end,
                        }
                    } else {
                        let mut trial = captures.clone();
                        match self.run_one(pc + 1, sp, &mut trial, budget) {
                            RunResult::Matched { .. } => backtrack!(),
                            RunResult::Failed => pc = l.end,
                            RunResult::LimitExceeded => return RunResult::LimitExceeded,
                        }
                    }
                }
            }
        }
    }

    /// Tries every candidate start position at or before `sp`, looking for
    /// one whose nested match ends exactly at `sp`. Worst case `O(sp)`
    /// nested attempts, which is exactly the shape the bailout registry
    /// exists to bound.
    fn run_lookbehind(&self, head_pc: usize, sp: usize, base: &Captures, budget: &mut Budget) -> Option<Captures> {
        for start in (0..=sp).rev() {
            let mut trial = base.clone();
            match self.run_one(head_pc + 1, start, &mut trial, budget) {
                RunResult::Matched { end } if end == sp => return Some(trial),
                RunResult::LimitExceeded => return None,
                _ => continue,
            }
        }
        None
    }

    /// Compares `input[sp..sp+text.len()]` against `text`, byte-wise
    /// case-folding ASCII letters when `ci` (the `CaseInsensitive` flag) is
    /// set.
    fn matches_backref(&self, sp: usize, text: &[u8], ci: bool) -> bool {
        let end = match sp.checked_add(text.len()) {
            Some(e) if e <= self.input.len() => e,
            _ => return false,
        };
        let candidate = &self.input[sp..end];
        if !ci {
            return candidate == text;
        }
        candidate.iter().zip(text.iter()).all(|(&a, &b)| a.eq_ignore_ascii_case(&b))
    }

    fn boundary_holds(&self, kind: BoundaryKind, sp: usize) -> bool {
        let multiline = self.program.flags.contains(crate::flags::Flags::MULTILINE);
        match kind {
            BoundaryKind::StartOfInput => sp == 0,
            BoundaryKind::EndOfInput => sp == self.input.len(),
            BoundaryKind::StartOfLine => {
                sp == 0 || (multiline && self.input.get(sp - 1) == Some(&b'\n'))
            }
            BoundaryKind::EndOfLine => {
                sp == self.input.len()
                    || (multiline && self.input.get(sp) == Some(&b'\n'))
                    || (sp + 1 == self.input.len() && self.input[sp] == b'\n')
            }
            BoundaryKind::WordBoundary => self.is_word_boundary(sp),
            BoundaryKind::NotWordBoundary => !self.is_word_boundary(sp),
            BoundaryKind::ResetMatchStart => true,
        }
    }

    fn is_word_boundary(&self, sp: usize) -> bool {
        let before = sp > 0 && is_word_byte(self.input[sp - 1]);
        let after = sp < self.input.len() && is_word_byte(self.input[sp]);
        before != after
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::flags::Flags;
    use crate::parser;

    fn program(src: &str, flags: Flags) -> Program {
        let ast = parser::parse(src, flags).unwrap();
        Compiler::create(16, flags).compile(&ast).unwrap()
    }

    fn run(src: &str, input: &str) -> MatchOutcome {
        let p = program(src, Flags::empty());
        Vm::new(&p, input.as_bytes()).find(0, &BailoutConfig::default())
    }

    #[test]
    fn matches_simple_literal() {
        assert!(matches!(run("abc", "xxabcxx"), MatchOutcome::Match(_)));
    }

    #[test]
    fn no_match_when_absent() {
        assert!(matches!(run("abc", "xyz"), MatchOutcome::NoMatch));
    }

    #[test]
    fn captures_group_span() {
        let p = program("a(b+)c", Flags::empty());
        match Vm::new(&p, b"xabbbcX").find(0, &BailoutConfig::default()) {
            MatchOutcome::Match(caps) => {
                assert_eq!(caps.get_content(b"xabbbcX", 1), Some(&b"bbb"[..]));
            }
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn backreference_requires_identical_repeat() {
        let p = program(r"(ab)\1", Flags::empty());
        assert!(matches!(
            Vm::new(&p, b"abab").find(0, &BailoutConfig::default()),
            MatchOutcome::Match(_)
        ));
        assert!(matches!(
            Vm::new(&p, b"abcd").find(0, &BailoutConfig::default()),
            MatchOutcome::NoMatch
        ));
    }

    #[test]
    fn backreference_folds_case_when_flag_is_set() {
        let p = program(r"(ab)\1", Flags::CASE_INSENSITIVE);
        assert!(matches!(
            Vm::new(&p, b"abAB").find(0, &BailoutConfig::default()),
            MatchOutcome::Match(_)
        ));
    }

    #[test]
    fn lookahead_does_not_consume_input() {
        let p = program(r"a(?=b)", Flags::empty());
        match Vm::new(&p, b"ab").find(0, &BailoutConfig::default()) {
            MatchOutcome::Match(caps) => assert_eq!(caps.get_by_index(0), Some((0, 1))),
            _ => panic!("expected a match"),
        }
    }

    #[test]
    fn negative_lookahead_rejects_when_body_matches() {
        assert!(matches!(run("a(?!b)", "ab"), MatchOutcome::NoMatch));
        assert!(matches!(run("a(?!b)", "ac"), MatchOutcome::Match(_)));
    }

    #[test]
    fn nested_unbounded_quantifier_terminates_without_bailout() {
        // `(a*)*` can match the empty string, so the outer `*` can loop
        // through its body forever at the same position once the a-run is
        // exhausted. A complete search still has to terminate in `NoMatch`.
        let p = program("(a*)*b", Flags::empty());
        let outcome = Vm::new(&p, b"aaaa").find(0, &BailoutConfig::default());
        assert!(matches!(outcome, MatchOutcome::NoMatch));
    }

    #[test]
    fn sequential_runs_reuse_pooled_scratch_without_cross_contamination() {
        let p = program("a(b+)c", Flags::empty());
        for _ in 0..3 {
            match Vm::new(&p, b"xabbbcX").find(0, &BailoutConfig::default()) {
                MatchOutcome::Match(caps) => {
                    assert_eq!(caps.get_content(b"xabbbcX", 1), Some(&b"bbb"[..]))
                }
                _ => panic!("expected a match"),
            }
        }
    }

    #[test]
    fn bailout_stops_pathological_backtracking() {
        let p = program("(a+)+b", Flags::empty());
        let long_input = "a".repeat(40);
        let config = BailoutConfig { max_transitions: Some(5_000), ..Default::default() };
        let outcome = Vm::new(&p, long_input.as_bytes()).find(0, &config);
        assert!(matches!(outcome, MatchOutcome::LimitExceeded));
    }

    #[test]
    fn word_boundary_detects_edges() {
        assert!(matches!(run(r"\bfoo\b", "a foo b"), MatchOutcome::Match(_)));
        assert!(matches!(run(r"\bfoo\b", "afoob"), MatchOutcome::NoMatch));
    }
}
