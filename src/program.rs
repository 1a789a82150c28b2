// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The compiled, immutable bytecode program and its on-disk `RBC1` format.
//!
//! Once built, a `Program` never changes: every character class it
//! references has already been interpreted into byte ranges (`char_class`),
//! so running it requires no synchronization and a `Program` can be shared
//! across threads behind a plain `Arc` with no interior mutability anywhere
//! in the hot path.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use crate::char_class::{self, ParsedClass};
use crate::error::{Error, Result};
use crate::flags::Flags;
use crate::inst::{BoundaryKind, InstIdx, Instruction, Lookaround, Opcode, Operand};

const MAGIC: &[u8; 4] = b"RBC1";
const FORMAT_VERSION: u32 = 1;

/// A compiled pattern: its instruction stream, capture group count, the
/// flags it was compiled under, and (eagerly) every character class body it
/// references, already parsed into ranges.
#[derive(Clone, Debug)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub instruction_count: usize,
    pub capacity: usize,
    pub group_count: usize,
    pub flags: Flags,
    pub original_pattern: Option<String>,
    pub char_classes: HashMap<InstIdx, ParsedClass>,
    /// Named-group -> index lookup. Not part of the `RBC1` wire format (see
    /// `serialize`), so a program that round-trips through bytes loses its
    /// names; only a freshly compiled `Program` carries them.
    pub group_names: HashMap<String, usize>,
}

impl Program {
    /// Builds a `Program` from a freshly compiled instruction stream,
    /// validating jump/group bounds and eagerly parsing every `MATCH_CLASS`
    /// operand's raw bytes into a `ParsedClass`.
    pub fn new(
        instructions: Vec<Instruction>,
        group_count: usize,
        group_names: HashMap<String, usize>,
        flags: Flags,
        original_pattern: Option<String>,
    ) -> Result<Program> {
        let instruction_count = instructions.len();
        let mut char_classes = HashMap::new();
        for (idx, inst) in instructions.iter().enumerate() {
            if let Operand::Class { bytes } = &inst.operand {
                let body = std::str::from_utf8(bytes).map_err(|_| {
                    Error::internal("character class bytes are not valid UTF-8")
                })?;
                char_classes.insert(idx, char_class::parse(body));
            }
        }
        let program = Program {
            capacity: instruction_count,
            instructions,
            instruction_count,
            group_count,
            flags,
            original_pattern,
            char_classes,
            group_names,
        };
        program.validate()?;
        Ok(program)
    }

    pub fn validate(&self) -> Result<()> {
        let len = self.instructions.len();
        for inst in &self.instructions {
            match &inst.operand {
                Operand::Jump(t) if *t > len => {
                    return Err(Error::internal("jump target out of range"));
                }
                Operand::Branch { primary, secondary } if *primary > len || *secondary > len => {
                    return Err(Error::internal("split target out of range"));
                }
                Operand::Lookaround(Lookaround { end, .. }) if *end > len => {
                    return Err(Error::internal("lookaround end out of range"));
                }
                Operand::Group(index) if *index > self.group_count => {
                    return Err(Error::internal("group index out of range"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn class_for(&self, idx: InstIdx) -> Option<&ParsedClass> {
        self.char_classes.get(&idx)
    }

    /// Serializes this program to the `RBC1` wire format (little-endian,
    /// byte-swapped transparently on big-endian hosts by `write_u32`).
    ///
    /// The trailing section carries, in instruction order, each
    /// `MATCH_CLASS`'s raw class-body bytes as `length(u32) + bytes` — the
    /// same bytes `Operand::Class` already carries inline, written out once
    /// more so a reader can rebuild `char_classes` without re-scanning every
    /// instruction's operand tag.
    pub fn serialize<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(MAGIC)?;
        write_u32(&mut w, FORMAT_VERSION)?;
        write_u32(&mut w, self.flags.bits())?;
        write_u32(&mut w, self.group_count as u32)?;
        write_u32(&mut w, self.instruction_count as u32)?;
        let pattern_bytes = self.original_pattern.as_deref().unwrap_or("").as_bytes();
        write_u32(&mut w, pattern_bytes.len() as u32)?;
        w.write_all(pattern_bytes)?;
        for inst in &self.instructions {
            write_instruction(&mut w, inst)?;
        }
        for inst in &self.instructions {
            if let Operand::Class { bytes } = &inst.operand {
                write_u32(&mut w, bytes.len() as u32)?;
                w.write_all(bytes)?;
            }
        }
        Ok(())
    }

    /// Parses a program previously written by `serialize`.
    pub fn deserialize<R: Read>(mut r: R) -> Result<Program> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic).map_err(read_err)?;
        if &magic != MAGIC {
            return Err(Error::internal("bad RBC1 magic"));
        }
        let version = read_u32(&mut r)?;
        if version != FORMAT_VERSION {
            return Err(Error::unsupported_feature(0, format!("unsupported bytecode version {}", version)));
        }
        let flags = Flags::from_bits_truncate(read_u32(&mut r)?);
        let group_count = read_u32(&mut r)? as usize;
        let instruction_count = read_u32(&mut r)? as usize;
        let pattern_len = read_u32(&mut r)? as usize;
        let mut pattern_bytes = vec![0u8; pattern_len];
        r.read_exact(&mut pattern_bytes).map_err(read_err)?;
        let original_pattern = if pattern_bytes.is_empty() {
            None
        } else {
            Some(String::from_utf8(pattern_bytes).map_err(|_| Error::internal("pattern bytes are not valid UTF-8"))?)
        };

        let mut instructions = Vec::with_capacity(instruction_count);
        for _ in 0..instruction_count {
            instructions.push(read_instruction(&mut r)?);
        }

        // Trailing section: for each MATCH_CLASS, in instruction order,
        // length(u32) + raw body bytes. Re-parsed here the same way
        // `Program::new` parses a freshly compiled program's classes.
        let mut char_classes = HashMap::new();
        for (idx, inst) in instructions.iter().enumerate() {
            if matches!(inst.operand, Operand::Class { .. }) {
                let len = read_u32(&mut r)? as usize;
                let mut bytes = vec![0u8; len];
                r.read_exact(&mut bytes).map_err(read_err)?;
                let body = std::str::from_utf8(&bytes)
                    .map_err(|_| Error::internal("character class bytes are not valid UTF-8"))?;
                char_classes.insert(idx, char_class::parse(body));
            }
        }

        let program = Program {
            capacity: instructions.len(),
            instructions,
            instruction_count,
            group_count,
            flags,
            original_pattern,
            char_classes,
            group_names: HashMap::new(),
        };
        program.validate()?;
        Ok(program)
    }
}

fn read_err(e: io::Error) -> Error {
    Error::internal(format!("truncated RBC1 stream: {}", e))
}

fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(read_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn opcode_tag(opcode: Opcode) -> u8 {
    match opcode {
        Opcode::Nop => 0,
        Opcode::MatchChar => 1,
        Opcode::MatchClass => 2,
        Opcode::MatchAny => 3,
        Opcode::Jump => 4,
        Opcode::Split => 5,
        Opcode::SaveStart => 6,
        Opcode::SaveEnd => 7,
        Opcode::Accept => 8,
        Opcode::Fail => 9,
        Opcode::RepeatStart => 10,
        Opcode::RepeatEnd => 11,
        Opcode::Boundary => 12,
        Opcode::Backref => 13,
        Opcode::Lookahead => 14,
        Opcode::NegLookahead => 15,
    }
}

fn opcode_from_tag(tag: u8) -> Result<Opcode> {
    Ok(match tag {
        0 => Opcode::Nop,
        1 => Opcode::MatchChar,
        2 => Opcode::MatchClass,
        3 => Opcode::MatchAny,
        4 => Opcode::Jump,
        5 => Opcode::Split,
        6 => Opcode::SaveStart,
        7 => Opcode::SaveEnd,
        8 => Opcode::Accept,
        9 => Opcode::Fail,
        10 => Opcode::RepeatStart,
        11 => Opcode::RepeatEnd,
        12 => Opcode::Boundary,
        13 => Opcode::Backref,
        14 => Opcode::Lookahead,
        15 => Opcode::NegLookahead,
        other => return Err(Error::internal(format!("unknown opcode tag {}", other))),
    })
}

fn boundary_tag(kind: BoundaryKind) -> u8 {
    match kind {
        BoundaryKind::StartOfLine => 0,
        BoundaryKind::EndOfLine => 1,
        BoundaryKind::StartOfInput => 2,
        BoundaryKind::EndOfInput => 3,
        BoundaryKind::WordBoundary => 4,
        BoundaryKind::NotWordBoundary => 5,
        BoundaryKind::ResetMatchStart => 6,
    }
}

fn boundary_from_tag(tag: u8) -> Result<BoundaryKind> {
    Ok(match tag {
        0 => BoundaryKind::StartOfLine,
        1 => BoundaryKind::EndOfLine,
        2 => BoundaryKind::StartOfInput,
        3 => BoundaryKind::EndOfInput,
        4 => BoundaryKind::WordBoundary,
        5 => BoundaryKind::NotWordBoundary,
        6 => BoundaryKind::ResetMatchStart,
        other => return Err(Error::internal(format!("unknown boundary tag {}", other))),
    })
}

/// Operand wire tags. Independent from `Opcode`'s tags since some opcodes
/// (`Lookahead`/`NegLookahead`) share the same operand shape.
const OPERAND_NONE: u8 = 0;
const OPERAND_CHAR: u8 = 1;
const OPERAND_CLASS: u8 = 2;
const OPERAND_JUMP: u8 = 3;
const OPERAND_BRANCH: u8 = 4;
const OPERAND_GROUP: u8 = 5;
const OPERAND_REPEAT: u8 = 6;
const OPERAND_BOUNDARY: u8 = 7;
const OPERAND_LOOKAROUND: u8 = 8;

fn write_instruction<W: Write>(w: &mut W, inst: &Instruction) -> io::Result<()> {
    w.write_all(&[opcode_tag(inst.opcode)])?;
    match &inst.operand {
        Operand::None => w.write_all(&[OPERAND_NONE]),
        Operand::Char(b) => {
            w.write_all(&[OPERAND_CHAR, *b])
        }
        Operand::Class { bytes } => {
            w.write_all(&[OPERAND_CLASS])?;
            write_u32(w, bytes.len() as u32)?;
            w.write_all(bytes)
        }
        Operand::Jump(t) => {
            w.write_all(&[OPERAND_JUMP])?;
            write_u32(w, *t as u32)
        }
        Operand::Branch { primary, secondary } => {
            w.write_all(&[OPERAND_BRANCH])?;
            write_u32(w, *primary as u32)?;
            write_u32(w, *secondary as u32)
        }
        Operand::Group(idx) => {
            w.write_all(&[OPERAND_GROUP])?;
            write_u32(w, *idx as u32)
        }
        Operand::Repeat { min, max, greedy } => {
            w.write_all(&[OPERAND_REPEAT])?;
            write_u32(w, *min)?;
            write_u32(w, max.unwrap_or(u32::MAX))?;
            w.write_all(&[*greedy as u8])
        }
        Operand::Boundary(kind) => w.write_all(&[OPERAND_BOUNDARY, boundary_tag(*kind)]),
        Operand::Lookaround(l) => {
            w.write_all(&[OPERAND_LOOKAROUND])?;
            write_u32(w, l.end as u32)?;
            w.write_all(&[l.behind as u8, l.atomic as u8])
        }
    }
}

fn read_instruction<R: Read>(r: &mut R) -> Result<Instruction> {
    let mut opcode_byte = [0u8; 1];
    r.read_exact(&mut opcode_byte).map_err(read_err)?;
    let opcode = opcode_from_tag(opcode_byte[0])?;

    let mut tag = [0u8; 1];
    r.read_exact(&mut tag).map_err(read_err)?;
    let operand = match tag[0] {
        OPERAND_NONE => Operand::None,
        OPERAND_CHAR => {
            let mut b = [0u8; 1];
            r.read_exact(&mut b).map_err(read_err)?;
            Operand::Char(b[0])
        }
        OPERAND_CLASS => {
            let len = read_u32(r)? as usize;
            let mut bytes = vec![0u8; len];
            r.read_exact(&mut bytes).map_err(read_err)?;
            Operand::Class { bytes }
        }
        OPERAND_JUMP => Operand::Jump(read_u32(r)? as InstIdx),
        OPERAND_BRANCH => {
            let primary = read_u32(r)? as InstIdx;
            let secondary = read_u32(r)? as InstIdx;
            Operand::Branch { primary, secondary }
        }
        OPERAND_GROUP => Operand::Group(read_u32(r)? as usize),
        OPERAND_REPEAT => {
            let min = read_u32(r)?;
            let max_raw = read_u32(r)?;
            let mut greedy_byte = [0u8; 1];
            r.read_exact(&mut greedy_byte).map_err(read_err)?;
            let max = if max_raw == u32::MAX { None } else { Some(max_raw) };
            Operand::Repeat { min, max, greedy: greedy_byte[0] != 0 }
        }
        OPERAND_BOUNDARY => {
            let mut kind_byte = [0u8; 1];
            r.read_exact(&mut kind_byte).map_err(read_err)?;
            Operand::Boundary(boundary_from_tag(kind_byte[0])?)
        }
        OPERAND_LOOKAROUND => {
            let end = read_u32(r)? as InstIdx;
            let mut flags_byte = [0u8; 2];
            r.read_exact(&mut flags_byte).map_err(read_err)?;
            Operand::Lookaround(Lookaround { end, behind: flags_byte[0] != 0, atomic: flags_byte[1] != 0 })
        }
        other => return Err(Error::internal(format!("unknown operand tag {}", other))),
    };
    Ok(Instruction::new(opcode, operand))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::Compiler;
    use crate::parser;

    fn compile(src: &str) -> Program {
        let ast = parser::parse(src, Flags::empty()).unwrap();
        Compiler::create(16, Flags::empty()).compile(&ast).unwrap()
    }

    #[test]
    fn round_trips_through_rbc1_bytes() {
        let program = compile("a(b|c)+");
        let mut buf = Vec::new();
        program.serialize(&mut buf).unwrap();
        let restored = Program::deserialize(&buf[..]).unwrap();
        assert_eq!(restored.instruction_count, program.instruction_count);
        assert_eq!(restored.group_count, program.group_count);
        assert_eq!(restored.char_classes.len(), program.char_classes.len());
    }

    #[test]
    fn char_classes_are_parsed_eagerly_at_construction() {
        let program = compile("[a-z]+");
        assert_eq!(program.char_classes.len(), 1);
    }

    #[test]
    fn char_class_round_trips_through_rbc1_bytes() {
        let program = compile("[a-z]+@[0-9]");
        let mut buf = Vec::new();
        program.serialize(&mut buf).unwrap();
        let restored = Program::deserialize(&buf[..]).unwrap();
        assert_eq!(restored.char_classes.len(), program.char_classes.len());
        for (idx, class) in &program.char_classes {
            assert_eq!(restored.char_classes.get(idx), Some(class));
        }
    }

    #[test]
    fn rejects_truncated_stream() {
        let program = compile("abc");
        let mut buf = Vec::new();
        program.serialize(&mut buf).unwrap();
        buf.truncate(buf.len() - 4);
        assert!(Program::deserialize(&buf[..]).is_err());
    }
}
