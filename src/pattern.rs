// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! `Pattern`: the public façade over compile + match.
//!
//! Everything upstream of this (tokenizer, parser, compiler) only needs to
//! run once per pattern; `Pattern` holds the resulting immutable `Program`
//! behind an `Arc` so clones are cheap and a single compiled pattern can be
//! shared across threads.

use std::sync::Arc;

use crate::ast;
use crate::captures::Captures;
use crate::compiler::Compiler;
use crate::error::Result;
use crate::flags::Flags;
use crate::parser;
use crate::program::Program;
use crate::registry::{BailoutConfig, Registry};
use crate::vm::{MatchOutcome, Vm};

/// A single successful match: the whole span plus per-group captures.
#[derive(Clone, Debug)]
pub struct Match<'t> {
    text: &'t str,
    captures: Captures,
}

impl<'t> Match<'t> {
    pub fn start(&self) -> usize {
        self.captures.get_by_index(0).map(|(s, _)| s).unwrap_or(0)
    }

    pub fn end(&self) -> usize {
        self.captures.get_by_index(0).map(|(_, e)| e).unwrap_or(0)
    }

    pub fn as_str(&self) -> &'t str {
        &self.text[self.start()..self.end()]
    }

    pub fn group(&self, index: usize) -> Option<&'t str> {
        self.captures.get_content(self.text.as_bytes(), index).map(|b| {
            std::str::from_utf8(b).expect("capture span splits a UTF-8 sequence")
        })
    }

    pub fn named_group(&self, name: &str) -> Option<&'t str> {
        let (start, end) = self.captures.get_by_name(name)?;
        Some(&self.text[start..end])
    }
}

#[derive(Clone)]
pub struct Pattern {
    program: Arc<Program>,
    fingerprint: ast::Fingerprint,
}

impl Pattern {
    /// Tokenizes, parses, and compiles `source` under `flags` into a
    /// ready-to-run `Pattern`.
    pub fn compile(source: &str, flags: Flags) -> Result<Pattern> {
        let ast = parser::parse(source, flags)?;
        let fingerprint = ast::fingerprint(&ast);
        let program = Compiler::create(source.len() * 2, flags).compile(&ast)?;
        Ok(Pattern { program: Arc::new(program), fingerprint })
    }

    pub fn fingerprint(&self) -> ast::Fingerprint {
        self.fingerprint
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// A stable identity for this compiled pattern, suitable as the
    /// `pattern_id` half of `Registry::get_effective` — two `Pattern`s
    /// compiled from the same normalized source and flags share an id,
    /// matching `Fingerprint::hash`'s own determinism guarantee.
    pub fn pattern_id(&self) -> u64 {
        self.fingerprint.hash
    }

    /// Finds the leftmost match at or after `start`, using `registry`'s
    /// layered bailout config for this pattern and `match_id` instead of an
    /// ad hoc `BailoutConfig`.
    pub fn find_at_with_registry<'t>(
        &self,
        text: &'t str,
        start: usize,
        registry: &Registry,
        match_id: u64,
    ) -> Option<Match<'t>> {
        let config = registry.get_effective(self.pattern_id(), match_id);
        self.find_at(text, start, &config)
    }

    /// Finds the leftmost match at or after `start`.
    pub fn find_at<'t>(&self, text: &'t str, start: usize, config: &BailoutConfig) -> Option<Match<'t>> {
        match Vm::new(&self.program, text.as_bytes()).find(start, config) {
            MatchOutcome::Match(captures) => Some(Match { text, captures }),
            MatchOutcome::NoMatch | MatchOutcome::LimitExceeded => None,
        }
    }

    pub fn find<'t>(&self, text: &'t str) -> Option<Match<'t>> {
        self.find_at(text, 0, &BailoutConfig::default())
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    /// All non-overlapping matches, scanning left to right. A zero-width
    /// match advances by one byte so the scan always terminates.
    pub fn find_all<'t>(&self, text: &'t str) -> Vec<Match<'t>> {
        let mut out = Vec::new();
        let mut pos = 0;
        let config = BailoutConfig::default();
        while pos <= text.len() {
            match self.find_at(text, pos, &config) {
                Some(m) => {
                    let end = m.end();
                    pos = if end > m.start() { end } else { end + 1 };
                    out.push(m);
                }
                None => break,
            }
        }
        out
    }

    /// Replaces every non-overlapping match with `replacement`.
    pub fn replace(&self, text: &str, replacement: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for m in self.find_all(text) {
            out.push_str(&text[last..m.start()]);
            out.push_str(replacement);
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    /// Splits `text` on every non-overlapping match.
    pub fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let mut out = Vec::new();
        let mut last = 0;
        for m in self.find_all(text) {
            out.push(&text[last..m.start()]);
            last = m.end();
        }
        out.push(&text[last..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_and_matches() {
        let p = Pattern::compile("a+b", Flags::empty()).unwrap();
        assert!(p.matches("xxaaabxx"));
        assert!(!p.matches("xyz"));
    }

    #[test]
    fn groups_are_reachable_by_index() {
        let p = Pattern::compile(r"(\w+)@(\w+)", Flags::empty()).unwrap();
        let m = p.find("user@host").unwrap();
        assert_eq!(m.group(1), Some("user"));
        assert_eq!(m.group(2), Some("host"));
    }

    #[test]
    fn find_all_collects_non_overlapping_matches() {
        let p = Pattern::compile("ab", Flags::empty()).unwrap();
        let matches = p.find_all("ababXab");
        assert_eq!(matches.len(), 3);
    }

    #[test]
    fn replace_substitutes_every_match() {
        let p = Pattern::compile("a+", Flags::empty()).unwrap();
        assert_eq!(p.replace("baaab aab", "X"), "bX Xb");
    }

    #[test]
    fn split_breaks_on_matches() {
        let p = Pattern::compile(",", Flags::empty()).unwrap();
        assert_eq!(p.split("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn fingerprint_is_exposed_after_compile() {
        let p = Pattern::compile("a*b", Flags::empty()).unwrap();
        assert!(p.fingerprint().quantifier_count >= 1);
    }

    #[test]
    fn named_group_is_reachable_by_name() {
        let p = Pattern::compile(r"(?<user>\w+)@(?<host>\w+)", Flags::empty()).unwrap();
        let m = p.find("user@host").unwrap();
        assert_eq!(m.named_group("user"), Some("user"));
        assert_eq!(m.named_group("host"), Some("host"));
        assert_eq!(m.named_group("nope"), None);
    }

    #[test]
    fn find_at_with_registry_honours_a_pattern_scoped_limit() {
        use crate::registry::Scope;

        let p = Pattern::compile("(a*)*b", Flags::empty()).unwrap();
        let registry = Registry::new();
        registry.set(
            Scope::Pattern(p.pattern_id()),
            BailoutConfig { max_transitions: Some(5_000), ..Default::default() },
        );
        let input = "a".repeat(40);
        assert_eq!(p.find_at_with_registry(&input, 0, &registry, 1), None);
    }

    #[test]
    fn find_at_skips_to_the_requested_offset() {
        let p = Pattern::compile("ab", Flags::empty()).unwrap();
        let config = BailoutConfig::default();
        assert_eq!(p.find_at("ababab", 0, &config).map(|m| m.start()), Some(0));
        assert_eq!(p.find_at("ababab", 1, &config).map(|m| m.start()), Some(2));
        assert_eq!(p.find_at("ababab", 5, &config), None);
    }
}
