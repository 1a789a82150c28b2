// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Recursive-descent parser: token stream -> `Ast`.
//!
//! ```text
//! pattern       := alternation
//! alternation   := concatenation ('|' concatenation)*
//! concatenation := repetition*
//! repetition    := atom quantifier?
//! atom          := literal | '.' | anchor | char_class | group | backref | escape
//! group         := '(' group_body ')'
//! ```
//! (the `group_body` production itself is documented on `parse_special_group`).

use std::collections::HashMap;

use crate::ast::{AnchorKind, Ast, AstKind, NodeId};
use crate::error::{Error, ErrorKind, Result};
use crate::flags::Flags;
use crate::token::{Token, TokenKind, Tokenizer};

const MAX_NESTING: usize = 256;

/// Parses `source` under `flags`, honouring the `R'...'` literal wrapper
/// when the source begins with it.
///
/// The wrapper is recognised through the tokenizer's dedicated
/// `RiftPrefix`/`RiftQuoteStart`/`RiftQuoteEnd` tokens rather than by
/// inspecting `source` directly, so a leading `R'` is only ever treated as
/// the literal form when the scanner itself agrees that's what it is.
pub fn parse(source: &str, flags: Flags) -> Result<Ast> {
    let mut probe = Tokenizer::create(source);
    let prefix = probe.next();
    if prefix.kind != TokenKind::RiftPrefix {
        return parse_inner(source, flags);
    }
    if !flags.contains(Flags::RIFT_SYNTAX) {
        return Err(Error::unsupported_feature(
            0,
            "R'...' literal syntax requires Flags::RIFT_SYNTAX",
        ));
    }
    let quote_tok = probe.scan_rift_quote_start();
    let quote = match (quote_tok.kind, &quote_tok.value) {
        (TokenKind::RiftQuoteStart, Some(q)) => q.chars().next().unwrap(),
        _ => return Err(Error::syntax(quote_tok.position, "unterminated R'...' literal")),
    };
    let (inner, end_tok) = probe.scan_rift_body(quote);
    if end_tok.kind != TokenKind::RiftQuoteEnd {
        return Err(Error::syntax(end_tok.position, "unterminated R'...' literal"));
    }
    let mut extra = Flags::empty();
    for c in end_tok.value.unwrap_or_default().chars() {
        match Flags::from_letter(c) {
            Some(f) => extra |= f,
            None => break,
        }
    }
    parse_inner(&inner, flags | extra)
}

fn parse_inner(source: &str, flags: Flags) -> Result<Ast> {
    let mut p = Parser {
        cur: Token { kind: TokenKind::End, value: None, position: 0 },
        tok: Tokenizer::create(source),
        ast: Ast::new(flags),
        group_index: 0,
        names: HashMap::new(),
    };
    p.cur = p.tok.next();
    let root_body = p.parse_alternation(flags, 0)?;
    p.expect_end()?;
    p.ast.add_child(p.ast.root, root_body);
    p.ast.group_count = p.group_index;
    p.ast.validate()?;
    Ok(p.ast)
}

struct Parser<'s> {
    tok: Tokenizer<'s>,
    cur: Token,
    ast: Ast,
    group_index: usize,
    names: HashMap<String, usize>,
}

impl<'s> Parser<'s> {
    fn bump(&mut self) -> Token {
        let next = self.tok.next();
        std::mem::replace(&mut self.cur, next)
    }

    fn check_depth(&self, depth: usize) -> Result<()> {
        if depth > MAX_NESTING {
            Err(Error::syntax(self.cur.position, "pattern nesting exceeds the maximum of 256"))
        } else {
            Ok(())
        }
    }

    fn expect_rparen(&mut self, open_pos: usize) -> Result<()> {
        if self.cur.kind == TokenKind::RParen {
            self.bump();
            Ok(())
        } else {
            Err(Error::syntax(open_pos, "unbalanced parenthesis"))
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        match self.cur.kind {
            TokenKind::End => Ok(()),
            TokenKind::RParen => Err(Error::syntax(self.cur.position, "unmatched closing parenthesis")),
            _ => Err(Error::unexpected_token(
                self.cur.position,
                format!("unexpected token {:?}", self.cur.kind),
            )),
        }
    }

    fn parse_alternation(&mut self, flags: Flags, depth: usize) -> Result<NodeId> {
        self.check_depth(depth)?;
        let mut branches = vec![self.parse_concatenation(flags, depth + 1)?];
        while self.cur.kind == TokenKind::Pipe {
            self.bump();
            branches.push(self.parse_concatenation(flags, depth + 1)?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().unwrap())
        } else {
            let node = self.ast.add_node(AstKind::Alternation, flags);
            for b in branches {
                self.ast.add_child(node, b);
            }
            Ok(node)
        }
    }

    /// An empty concatenation (zero children) matches the empty string; this
    /// is how `a||b` accepts a middle branch that matches nothing.
    fn parse_concatenation(&mut self, flags: Flags, depth: usize) -> Result<NodeId> {
        let node = self.ast.add_node(AstKind::Concatenation, flags);
        let mut active_flags = flags;
        loop {
            match self.cur.kind {
                TokenKind::Pipe | TokenKind::RParen | TokenKind::End => break,
                _ => {
                    let (rep, updated) = self.parse_repetition(active_flags, depth)?;
                    active_flags = updated;
                    self.ast.add_child(node, rep);
                }
            }
        }
        Ok(node)
    }

    fn parse_repetition(&mut self, flags: Flags, depth: usize) -> Result<(NodeId, Flags)> {
        let (atom, flags) = self.parse_atom(flags, depth)?;
        let node = self.maybe_wrap_quantifier(atom, flags)?;
        Ok((node, flags))
    }

    fn maybe_wrap_quantifier(&mut self, operand: NodeId, flags: Flags) -> Result<NodeId> {
        let pos = self.cur.position;
        let (min, max) = match self.cur.kind {
            TokenKind::Star => { self.bump(); (0u32, None) }
            TokenKind::Plus => { self.bump(); (1u32, None) }
            TokenKind::Question => { self.bump(); (0u32, Some(1u32)) }
            TokenKind::LBrace => {
                let body = self.cur.value.clone().unwrap_or_default();
                self.bump();
                parse_brace_body(&body, pos)?
            }
            _ => return Ok(operand),
        };
        if let Some(max_v) = max {
            if max_v < min {
                return Err(Error::syntax(pos, "quantifier max is less than min"));
            }
        }
        let mut greedy = !flags.contains(Flags::UNGREEDY);
        if self.cur.kind == TokenKind::Question {
            self.bump();
            greedy = !greedy;
        }
        if matches!(self.cur.kind, TokenKind::Star | TokenKind::Plus | TokenKind::Question | TokenKind::LBrace) {
            return Err(Error::syntax(self.cur.position, "repeated quantifier"));
        }
        let q = self.ast.add_node(AstKind::Quantifier { min, max, greedy }, flags);
        self.ast.add_child(q, operand);
        Ok(q)
    }

    fn parse_atom(&mut self, flags: Flags, depth: usize) -> Result<(NodeId, Flags)> {
        let tok = self.cur.clone();
        match tok.kind {
            TokenKind::Literal => {
                self.bump();
                let n = self.ast.add_node(AstKind::Literal, flags);
                self.ast.nodes[n].value = tok.value;
                Ok((n, flags))
            }
            TokenKind::Dot => {
                self.bump();
                Ok((self.ast.add_node(AstKind::Dot, flags), flags))
            }
            TokenKind::Caret => {
                self.bump();
                Ok((self.ast.add_node(AstKind::Anchor(AnchorKind::StartOfLine), flags), flags))
            }
            TokenKind::Dollar => {
                self.bump();
                Ok((self.ast.add_node(AstKind::Anchor(AnchorKind::EndOfLine), flags), flags))
            }
            TokenKind::StartOfInput => {
                self.bump();
                Ok((self.ast.add_node(AstKind::Anchor(AnchorKind::StartOfInput), flags), flags))
            }
            TokenKind::EndOfInput => {
                self.bump();
                Ok((self.ast.add_node(AstKind::Anchor(AnchorKind::EndOfInput), flags), flags))
            }
            TokenKind::WordBoundary => {
                self.bump();
                Ok((self.ast.add_node(AstKind::WordBoundary, flags), flags))
            }
            TokenKind::NotWordBoundary => {
                self.bump();
                Ok((self.ast.add_node(AstKind::NotWordBoundary, flags), flags))
            }
            TokenKind::CharClass => {
                self.bump();
                let n = self.ast.add_node(AstKind::CharacterClass, flags);
                self.ast.nodes[n].value = tok.value;
                Ok((n, flags))
            }
            TokenKind::EscapeSequence => {
                self.bump();
                let letter = tok.value.clone().unwrap_or_default();
                if letter == "K" {
                    Ok((self.ast.add_node(AstKind::Anchor(AnchorKind::ResetMatchStart), flags), flags))
                } else {
                    let n = self.ast.add_node(AstKind::CharacterClass, flags);
                    self.ast.nodes[n].value = Some(format!("\\{}", letter));
                    Ok((n, flags))
                }
            }
            TokenKind::Backreference => {
                self.bump();
                let digits = tok.value.clone().unwrap_or_default();
                let index: usize = digits.parse().map_err(|_| {
                    Error::syntax(tok.position, "invalid numeric backreference")
                })?;
                if index == 0 {
                    return Err(Error::syntax(tok.position, "backreference to group 0 is invalid"));
                }
                Ok((self.ast.add_node(AstKind::Backreference { index }, flags), flags))
            }
            TokenKind::NamedBackreference => {
                self.bump();
                let name = tok.value.clone().unwrap_or_default();
                let index = *self.names.get(&name).ok_or_else(|| {
                    Error::syntax(tok.position, format!("unknown group name '{}'", name))
                })?;
                let id = self.ast.add_node(AstKind::NamedBackreference { name }, flags);
                // Stash the resolved index alongside the name so the compiler
                // doesn't need to repeat the name lookup.
                self.ast.nodes[id].state_info = Some(index.to_string());
                Ok((id, flags))
            }
            TokenKind::LParen => self.parse_capturing_group(flags, depth),
            TokenKind::NonCapturing
            | TokenKind::NamedGroup
            | TokenKind::Lookahead
            | TokenKind::NegLookahead
            | TokenKind::Lookbehind
            | TokenKind::NegLookbehind
            | TokenKind::AtomicGroup
            | TokenKind::Comment
            | TokenKind::Option => self.parse_special_group(tok, flags, depth),
            TokenKind::Error => {
                let reason = tok.value.clone().unwrap_or_else(|| "invalid pattern syntax".into());
                let kind = if reason.contains("escape") || reason.contains("property") || reason.contains("backslash") {
                    ErrorKind::InvalidEscape
                } else {
                    ErrorKind::Syntax
                };
                Err(Error::new(kind, tok.position, reason))
            }
            _ => Err(Error::unexpected_token(tok.position, format!("unexpected token {:?}", tok.kind))),
        }
    }

    fn parse_capturing_group(&mut self, flags: Flags, depth: usize) -> Result<(NodeId, Flags)> {
        let open_pos = self.cur.position;
        self.bump();
        self.group_index += 1;
        let index = self.group_index;
        let body = self.parse_alternation(flags, depth + 1)?;
        self.expect_rparen(open_pos)?;
        let node = self.ast.add_node(AstKind::Group { index }, flags);
        self.ast.add_child(node, body);
        Ok((node, flags))
    }

    fn parse_special_group(&mut self, tok: Token, flags: Flags, depth: usize) -> Result<(NodeId, Flags)> {
        let open_pos = tok.position;
        match tok.kind {
            TokenKind::NonCapturing => {
                self.bump();
                let body = self.parse_alternation(flags, depth + 1)?;
                self.expect_rparen(open_pos)?;
                let node = self.ast.add_node(AstKind::NonCapturingGroup, flags);
                self.ast.add_child(node, body);
                Ok((node, flags))
            }
            TokenKind::NamedGroup => {
                let name = tok.value.clone().unwrap_or_default();
                self.bump();
                self.group_index += 1;
                let index = self.group_index;
                self.names.insert(name.clone(), index);
                let body = self.parse_alternation(flags, depth + 1)?;
                self.expect_rparen(open_pos)?;
                let node = self.ast.add_node(AstKind::NamedGroup { index, name }, flags);
                self.ast.add_child(node, body);
                Ok((node, flags))
            }
            TokenKind::Lookahead | TokenKind::NegLookahead | TokenKind::Lookbehind
            | TokenKind::NegLookbehind | TokenKind::AtomicGroup => {
                self.bump();
                let body = self.parse_alternation(flags, depth + 1)?;
                self.expect_rparen(open_pos)?;
                let kind = match tok.kind {
                    TokenKind::Lookahead => AstKind::Lookahead,
                    TokenKind::NegLookahead => AstKind::NegativeLookahead,
                    TokenKind::Lookbehind => AstKind::Lookbehind,
                    TokenKind::NegLookbehind => AstKind::NegativeLookbehind,
                    TokenKind::AtomicGroup => AstKind::AtomicGroup,
                    _ => unreachable!(),
                };
                let node = self.ast.add_node(kind, flags);
                self.ast.add_child(node, body);
                Ok((node, flags))
            }
            TokenKind::Comment => {
                // Tokenizer already consumed the body and the closing `)`.
                self.bump();
                Ok((self.ast.add_node(AstKind::Comment, flags), flags))
            }
            TokenKind::Option => {
                let raw = tok.value.clone().unwrap_or_default();
                self.bump();
                let has_body = raw.ends_with(':');
                let letters = if has_body { &raw[..raw.len() - 1] } else { raw.as_str() };
                let mut new_flags = flags;
                let mut negate = false;
                for c in letters.chars() {
                    if c == '-' {
                        negate = true;
                        continue;
                    }
                    match Flags::from_letter(c) {
                        Some(f) => {
                            if negate {
                                new_flags.remove(f);
                            } else {
                                new_flags.insert(f);
                            }
                        }
                        None => {
                            return Err(Error::syntax(tok.position, format!("unknown inline flag '{}'", c)));
                        }
                    }
                }
                let node = self.ast.add_node(AstKind::Option { flags: new_flags }, new_flags);
                if has_body {
                    let body = self.parse_alternation(new_flags, depth + 1)?;
                    self.expect_rparen(open_pos)?;
                    self.ast.add_child(node, body);
                    Ok((node, flags))
                } else {
                    // Scopes over the remainder of the enclosing group/pattern.
                    Ok((node, new_flags))
                }
            }
            _ => unreachable!("dispatched only for group-open token kinds"),
        }
    }
}

fn parse_brace_body(s: &str, pos: usize) -> Result<(u32, Option<u32>)> {
    let has_comma = s.contains(',');
    let mut parts = s.splitn(2, ',');
    let min_s = parts.next().unwrap_or("").trim();
    let min: u32 = min_s
        .parse()
        .map_err(|_| Error::syntax(pos, format!("invalid repetition count '{}'", min_s)))?;
    if !has_comma {
        return Ok((min, Some(min)));
    }
    let max_s = parts.next().unwrap_or("").trim();
    if max_s.is_empty() {
        Ok((min, None))
    } else {
        let max: u32 = max_s
            .parse()
            .map_err(|_| Error::syntax(pos, format!("invalid repetition count '{}'", max_s)))?;
        if max < min {
            return Err(Error::syntax(pos, "quantifier max is less than min"));
        }
        Ok((min, Some(max)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(src: &str) -> Ast {
        parse(src, Flags::empty()).unwrap_or_else(|e| panic!("parse({:?}) failed: {}", src, e))
    }

    #[test]
    fn simple_literal_concatenation() {
        let ast = ok("abc");
        assert_eq!(ast.group_count, 0);
        assert!(ast.is_valid);
    }

    #[test]
    fn alternation_and_group_numbering() {
        let ast = ok("(a)(b)");
        assert_eq!(ast.group_count, 2);
    }

    #[test]
    fn empty_alternative_is_permitted() {
        let ast = ok("a||b");
        assert!(ast.is_valid);
    }

    #[test]
    fn brace_quantifier_min_greater_than_max_is_syntax_error() {
        let err = parse("a{3,1}", Flags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn repeated_quantifier_on_same_atom_is_syntax_error() {
        let err = parse("a**", Flags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn quantifier_inside_its_own_group_is_allowed() {
        let ast = ok("(a*)*");
        assert!(ast.is_valid);
    }

    #[test]
    fn unbalanced_paren_reports_opener_position() {
        let err = parse("(a", Flags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn trailing_backslash_is_invalid_escape() {
        let err = parse("a\\", Flags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidEscape);
    }

    #[test]
    fn rift_literal_requires_flag() {
        let err = parse("R'[^A-Z0-9]'", Flags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnsupportedFeature);
        assert_eq!(err.position, 0);
    }

    #[test]
    fn rift_literal_parses_inner_when_enabled() {
        let ast = ok_with("R'[^A-Z0-9]'", Flags::RIFT_SYNTAX);
        assert!(ast.is_valid);
    }

    fn ok_with(src: &str, flags: Flags) -> Ast {
        parse(src, flags).unwrap_or_else(|e| panic!("parse({:?}) failed: {}", src, e))
    }

    #[test]
    fn backreference_to_unknown_group_is_syntax_error() {
        let err = parse(r"\1", Flags::empty()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
    }

    #[test]
    fn named_group_and_backreference() {
        let ast = ok(r"(?<word>\w+)\k<word>");
        assert_eq!(ast.group_count, 1);
    }
}
