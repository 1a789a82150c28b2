// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Compilation and execution flags.
//!
//! Bit positions are part of the serialized-bytecode format (see
//! `program::RBC1`) and must never be renumbered once shipped.

use bitflags::bitflags;

bitflags! {
    /// A bitset of compilation/execution options.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flags: u32 {
        /// `i` — case-insensitive literal and class matching.
        const CASE_INSENSITIVE = 1 << 0;
        /// `m` — `^`/`$` match at line boundaries, not just text boundaries.
        const MULTILINE        = 1 << 1;
        /// `s` — `.` also matches `\n`.
        const DOT_ALL          = 1 << 2;
        /// `x` — whitespace and `#`-comments in the pattern are insignificant.
        const EXTENDED         = 1 << 3;
        /// `U` — swap the default greediness of quantifiers.
        const UNGREEDY         = 1 << 4;
        /// Enables the `R'...'` / `R"..."` literal prefix form.
        const RIFT_SYNTAX      = 1 << 5;
        /// Parser keeps going after a recoverable syntax error instead of
        /// aborting the whole compile.
        const ERROR_RECOVERY   = 1 << 6;
        /// Hint: prefer faster bytecode over smaller bytecode.
        const OPTIMIZE_SPEED   = 1 << 7;
        /// Hint: prefer smaller bytecode over faster bytecode.
        const OPTIMIZE_SIZE    = 1 << 8;
    }
}

impl Flags {
    /// Maps a single flag letter (as used in `R'...'<letters>` and inline
    /// `(?letters)` groups) to its bit, if recognized.
    pub fn from_letter(c: char) -> Option<Flags> {
        match c {
            'i' => Some(Flags::CASE_INSENSITIVE),
            'm' => Some(Flags::MULTILINE),
            's' => Some(Flags::DOT_ALL),
            'x' => Some(Flags::EXTENDED),
            'U' => Some(Flags::UNGREEDY),
            'r' => Some(Flags::RIFT_SYNTAX),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip_known_flags() {
        assert_eq!(Flags::from_letter('i'), Some(Flags::CASE_INSENSITIVE));
        assert_eq!(Flags::from_letter('U'), Some(Flags::UNGREEDY));
        assert_eq!(Flags::from_letter('q'), None);
    }

    #[test]
    fn bits_are_stable() {
        assert_eq!(Flags::CASE_INSENSITIVE.bits(), 1);
        assert_eq!(Flags::MULTILINE.bits(), 2);
        assert_eq!(Flags::RIFT_SYNTAX.bits(), 32);
    }
}
