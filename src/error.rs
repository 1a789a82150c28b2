// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The error taxonomy shared by every stage of the engine: tokenizer,
//! parser, compiler, VM and the public facade all report failures through
//! the same `Error` record.

use std::error;
use std::fmt;

/// The kind of failure that occurred. `None` is a sentinel and is never
/// returned from a fallible operation; it exists so callers can initialize
/// an `Error` slot before a call completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Sentinel. Not a real error.
    None,
    /// The pattern does not conform to the grammar.
    Syntax,
    /// An escape sequence was unknown or truncated.
    InvalidEscape,
    /// The parser encountered a token that is disallowed in the current
    /// production.
    UnexpectedToken,
    /// A caller-supplied pointer, index or length was invalid.
    InvalidParameter,
    /// Allocation failed.
    Memory,
    /// An output buffer was too small to hold the result.
    BufferOverflow,
    /// A feature was used without its enabling flag, e.g. `R'...'` without
    /// `Flags::RIFT_SYNTAX`.
    UnsupportedFeature,
    /// A compiled AST failed structural validation.
    InvalidAutomaton,
    /// A compiled bytecode program failed structural validation.
    InvalidBytecode,
    /// A bailout limit (depth, duration or transition count) was exceeded.
    LimitExceeded,
    /// An internal invariant was violated; indicates a bug in the engine
    /// itself rather than a bad pattern or input.
    Internal,
    /// Fallback for errors translated from a foreign caller that don't map
    /// cleanly onto any other variant.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            ErrorKind::None => "None",
            ErrorKind::Syntax => "Syntax",
            ErrorKind::InvalidEscape => "InvalidEscape",
            ErrorKind::UnexpectedToken => "UnexpectedToken",
            ErrorKind::InvalidParameter => "InvalidParameter",
            ErrorKind::Memory => "Memory",
            ErrorKind::BufferOverflow => "BufferOverflow",
            ErrorKind::UnsupportedFeature => "UnsupportedFeature",
            ErrorKind::InvalidAutomaton => "InvalidAutomaton",
            ErrorKind::InvalidBytecode => "InvalidBytecode",
            ErrorKind::LimitExceeded => "LimitExceeded",
            ErrorKind::Internal => "Internal",
            ErrorKind::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A uniform error record: a code, the byte offset in the source where the
/// failure was detected (0 if not applicable), and a short human-readable
/// message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub position: usize,
    pub message: String,
}

impl Error {
    pub fn new<S: Into<String>>(kind: ErrorKind, position: usize, message: S) -> Error {
        Error { kind: kind, position: position, message: message.into() }
    }

    pub fn syntax<S: Into<String>>(position: usize, message: S) -> Error {
        Error::new(ErrorKind::Syntax, position, message)
    }

    pub fn invalid_escape<S: Into<String>>(position: usize, message: S) -> Error {
        Error::new(ErrorKind::InvalidEscape, position, message)
    }

    pub fn unexpected_token<S: Into<String>>(position: usize, message: S) -> Error {
        Error::new(ErrorKind::UnexpectedToken, position, message)
    }

    pub fn unsupported_feature<S: Into<String>>(position: usize, message: S) -> Error {
        Error::new(ErrorKind::UnsupportedFeature, position, message)
    }

    pub fn limit_exceeded<S: Into<String>>(message: S) -> Error {
        Error::new(ErrorKind::LimitExceeded, 0, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Error {
        Error::new(ErrorKind::Internal, 0, message)
    }
}

impl fmt::Display for Error {
    /// Renders as `"Error <code> at position <pos>: <message>"`, omitting
    /// the position clause when it is zero.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.position == 0 {
            write!(f, "Error {}: {}", self.kind, self.message)
        } else {
            write!(f, "Error {} at position {}: {}", self.kind, self.position, self.message)
        }
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        &self.message
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_omits_zero_position() {
        let e = Error::syntax(0, "bad pattern");
        assert_eq!(format!("{}", e), "Error Syntax: bad pattern");
    }

    #[test]
    fn display_includes_nonzero_position() {
        let e = Error::syntax(4, "unbalanced paren");
        assert_eq!(format!("{}", e), "Error Syntax at position 4: unbalanced paren");
    }
}
