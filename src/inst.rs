// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The bytecode instruction set executed by the VM.
//!
//! `Opcode` and `Operand` are kept as an explicit tagged sum rather than an
//! opaque union: a `MATCH_CLASS` instruction really does carry the class's
//! raw bytes, a `SPLIT` really does carry two branch targets, and so on.
//! Bit-for-bit layout of an `Instruction` on the wire is defined by
//! `program`'s reader/writer, not by this in-memory shape.

/// Index of an instruction within a `Program`.
pub type InstIdx = usize;

/// The zero-width assertion a `BOUNDARY` instruction checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundaryKind {
    StartOfLine,
    EndOfLine,
    StartOfInput,
    EndOfInput,
    WordBoundary,
    NotWordBoundary,
    /// `\K`: resets the reported start of the whole match (slot 0) to the
    /// current input position. Zero-width, always succeeds.
    ResetMatchStart,
}

/// The operation an instruction performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Nop,
    MatchChar,
    MatchClass,
    MatchAny,
    Jump,
    Split,
    SaveStart,
    SaveEnd,
    Accept,
    Fail,
    RepeatStart,
    RepeatEnd,
    Boundary,
    Backref,
    Lookahead,
    NegLookahead,
}

/// A lookaround's nested sub-program is delimited by an explicit end index
/// rather than a sentinel opcode, so the VM always knows where the nested
/// region stops without scanning for a terminator.
/// `end` points one past the nested region's own `ACCEPT`. `behind` selects
/// lookbehind (the nested program is tried ending at the current position
/// rather than starting from it). `atomic` repurposes the positive
/// `LOOKAHEAD` instruction to implement atomic groups: on a nested match the
/// VM advances past it and commits its captures instead of leaving the
/// input position untouched (see `compiler` and `vm`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lookaround {
    pub end: InstIdx,
    pub behind: bool,
    pub atomic: bool,
}

/// The operand payload carried by an instruction. Every opcode above reads
/// exactly one of these shapes; which one is documented on the opcode.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    None,
    Char(u8),
    /// Raw class body bytes exactly as captured by the tokenizer (e.g. the
    /// text between `[` and `]`, or a shorthand like `\d`). Interpreted into
    /// ranges once, eagerly, by `Program::new` and cached alongside the
    /// instruction stream (see `char_class`).
    Class { bytes: Vec<u8> },
    Jump(InstIdx),
    /// `SPLIT`'s two branch targets. `primary` is attempted first; for a
    /// greedy quantifier that's the loop body, for non-greedy it's the exit.
    Branch { primary: InstIdx, secondary: InstIdx },
    Group(usize),
    Repeat { min: u32, max: Option<u32>, greedy: bool },
    Boundary(BoundaryKind),
    Lookaround(Lookaround),
}

/// One bytecode instruction: an opcode plus its operand.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Instruction {
        Instruction { opcode, operand }
    }

    pub fn nop() -> Instruction {
        Instruction::new(Opcode::Nop, Operand::None)
    }

    pub fn accept() -> Instruction {
        Instruction::new(Opcode::Accept, Operand::None)
    }

    pub fn fail() -> Instruction {
        Instruction::new(Opcode::Fail, Operand::None)
    }

    /// `true` for instructions whose fallthrough is implicit (`pc + 1`)
    /// rather than carried by a jump-like operand.
    pub fn falls_through(&self) -> bool {
        !matches!(self.opcode, Opcode::Jump | Opcode::Accept | Opcode::Fail)
    }
}
