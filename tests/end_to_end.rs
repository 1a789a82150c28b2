// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use rand::Rng;

use rift_regex::registry::BailoutConfig;
use rift_regex::{compile, ErrorKind, Flags};

#[test]
fn literal_match_reports_span_and_group_count() {
    let p = compile("abc", Flags::empty()).unwrap();
    let m = p.find("xxxabcxxx").unwrap();
    assert_eq!((m.start(), m.end()), (3, 6));
    assert_eq!(p.program().group_count, 0);
}

#[test]
fn alternation_matches_leftmost_branch_that_fits() {
    let p = compile("a|b|c", Flags::empty()).unwrap();
    let m = p.find("c").unwrap();
    assert_eq!((m.start(), m.end()), (0, 1));
}

#[test]
fn unbounded_quantifier_matches_greedily_and_reports_fingerprint() {
    let p = compile("a+b", Flags::empty()).unwrap();
    let m = p.find("aaab").unwrap();
    assert_eq!((m.start(), m.end()), (0, 4));
    assert_eq!(p.fingerprint().quantifier_count, 1);
}

#[test]
fn nested_capture_groups_report_independent_spans() {
    let p = compile("(a)(b)", Flags::empty()).unwrap();
    let m = p.find("ab").unwrap();
    assert_eq!((m.start(), m.end()), (0, 2));
    assert_eq!(m.group(1), Some("a"));
    assert_eq!(m.group(2), Some("b"));
}

#[test]
fn rift_literal_requires_flag_and_parses_its_body_when_enabled() {
    let enabled = compile("R'[^A-Z0-9]'", Flags::RIFT_SYNTAX).unwrap();
    assert!(enabled.matches("a"));

    let err = compile("R'[^A-Z0-9]'", Flags::empty()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedFeature);
    assert_eq!(err.position, 0);
}

#[test]
fn catastrophic_backtracking_is_bounded_by_max_transitions() {
    let p = compile("(a*)*b", Flags::empty()).unwrap();
    let input = "a".repeat(20) + "X";
    let limited = BailoutConfig { max_transitions: Some(10_000), ..Default::default() };
    let outcome = rift_regex::vm::Vm::new(p.program(), input.as_bytes()).find(0, &limited);
    assert!(matches!(outcome, rift_regex::vm::MatchOutcome::LimitExceeded));

    let unlimited = BailoutConfig::default();
    let outcome = rift_regex::vm::Vm::new(p.program(), input.as_bytes()).find(0, &unlimited);
    assert!(matches!(outcome, rift_regex::vm::MatchOutcome::NoMatch));
}

#[test]
fn bytecode_round_trips_through_serialization() {
    let p = compile("a(b+)c", Flags::empty()).unwrap();
    let mut buf = Vec::new();
    p.program().serialize(&mut buf).unwrap();
    let restored = rift_regex::program::Program::deserialize(&buf[..]).unwrap();

    let vm = rift_regex::vm::Vm::new(&restored, b"abbbc");
    match vm.find(0, &BailoutConfig::default()) {
        rift_regex::vm::MatchOutcome::Match(caps) => {
            assert_eq!(caps.get_by_index(0), Some((0, 5)));
            assert_eq!(caps.get_by_index(1), Some((1, 4)));
        }
        other => panic!("expected a match, got {:?}", other),
    }
}

#[test]
fn optimizer_is_idempotent_across_random_inputs() {
    let patterns = ["a(b|c)+d", "[a-z]+@[a-z]+", "(foo|bar)baz?", "x{2,5}y"];
    let mut rng = rand::thread_rng();

    for src in patterns {
        let p = compile(src, Flags::empty()).unwrap();
        let before = p.program().instruction_count;

        let inputs: Vec<String> = (0..100)
            .map(|_| {
                let len = rng.gen_range(0..12);
                (0..len).map(|_| (b'a' + rng.gen_range(0..6)) as char).collect()
            })
            .collect();
        let before_outcomes: Vec<bool> = inputs.iter().map(|input| p.matches(input)).collect();

        // Re-compiling the same source exercises the same `optimize()` pass
        // again; instruction_count must not grow and observable outcomes on
        // the same inputs must be identical.
        let p2 = compile(src, Flags::empty()).unwrap();
        assert!(p2.program().instruction_count <= before);
        let after_outcomes: Vec<bool> = inputs.iter().map(|input| p2.matches(input)).collect();
        assert_eq!(before_outcomes, after_outcomes);
    }
}

#[test]
fn empty_pattern_matches_only_empty_string_at_start() {
    let p = compile("", Flags::empty()).unwrap();
    let m = p.find("abc").unwrap();
    assert_eq!((m.start(), m.end()), (0, 0));
}

#[test]
fn zero_zero_quantifier_matches_empty() {
    let p = compile("a{0,0}b", Flags::empty()).unwrap();
    let m = p.find("b").unwrap();
    assert_eq!((m.start(), m.end()), (0, 1));
}

#[test]
fn bounded_quantifier_with_min_terminates_on_short_input() {
    let p = compile("a{3,}", Flags::empty()).unwrap();
    assert!(!p.matches("aa"));
    assert!(p.matches("aaa"));
}
