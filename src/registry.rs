// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The three-layer bailout-limit registry.
//!
//! A limit can be set globally, per compiled pattern, or per single match
//! call; the effective limit for a given run is the narrowest of whichever
//! layers have one set, computed by `get_effective`. Readers vastly
//! outnumber writers (every match reads; limits are set rarely), so each
//! layer is a `RwLock` rather than a `Mutex`.

use std::collections::HashMap;
use std::sync::RwLock;

/// Which layer a `BailoutConfig` applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Pattern(u64),
    Match(u64),
}

/// A set of optional limits. `None` on any field means "inherit from the
/// next broader layer". `override_` is carried along per layer but never
/// blocks inheritance of the fields this layer itself left unset — it only
/// marks that this layer's *set* fields should win over a broader layer's.
#[derive(Clone, Copy, Debug, Default)]
pub struct BailoutConfig {
    pub override_: bool,
    pub max_depth: Option<usize>,
    pub max_duration_ms: Option<u64>,
    pub max_transitions: Option<u64>,
}

impl BailoutConfig {
    fn layer(self, broader: BailoutConfig) -> BailoutConfig {
        BailoutConfig {
            override_: self.override_ || broader.override_,
            max_depth: self.max_depth.or(broader.max_depth),
            max_duration_ms: self.max_duration_ms.or(broader.max_duration_ms),
            max_transitions: self.max_transitions.or(broader.max_transitions),
        }
    }
}

/// Default ceiling applied when no layer names a `max_depth`; keeps a
/// pattern with no explicit limit from running away indefinitely.
pub const DEFAULT_MAX_DEPTH: usize = 1_000_000;

#[derive(Default)]
pub struct Registry {
    global: RwLock<BailoutConfig>,
    patterns: RwLock<HashMap<u64, BailoutConfig>>,
    matches: RwLock<HashMap<u64, BailoutConfig>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    pub fn set(&self, scope: Scope, config: BailoutConfig) {
        match scope {
            Scope::Global => *self.global.write().unwrap() = config,
            Scope::Pattern(id) => {
                self.patterns.write().unwrap().insert(id, config);
            }
            Scope::Match(id) => {
                self.matches.write().unwrap().insert(id, config);
            }
        }
    }

    pub fn clear(&self, scope: Scope) {
        match scope {
            Scope::Global => *self.global.write().unwrap() = BailoutConfig::default(),
            Scope::Pattern(id) => {
                self.patterns.write().unwrap().remove(&id);
            }
            Scope::Match(id) => {
                self.matches.write().unwrap().remove(&id);
            }
        }
    }

    /// Layers match-scoped, then pattern-scoped, then global config on top
    /// of an all-`None` base, falling back to `DEFAULT_MAX_DEPTH` if nothing
    /// in the stack ever set a depth limit.
    pub fn get_effective(&self, pattern_id: u64, match_id: u64) -> BailoutConfig {
        let global = *self.global.read().unwrap();
        let pattern = self
            .patterns
            .read()
            .unwrap()
            .get(&pattern_id)
            .copied()
            .unwrap_or_default();
        let m = self
            .matches
            .read()
            .unwrap()
            .get(&match_id)
            .copied()
            .unwrap_or_default();

        let mut effective = m.layer(pattern.layer(global));
        if effective.max_depth.is_none() {
            effective.max_depth = Some(DEFAULT_MAX_DEPTH);
        }
        effective
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_scope_overrides_pattern_scope() {
        let reg = Registry::new();
        reg.set(Scope::Pattern(1), BailoutConfig { max_depth: Some(100), ..Default::default() });
        reg.set(Scope::Match(7), BailoutConfig { max_depth: Some(5), ..Default::default() });
        let eff = reg.get_effective(1, 7);
        assert_eq!(eff.max_depth, Some(5));
    }

    #[test]
    fn unset_layers_fall_back_to_global() {
        let reg = Registry::new();
        reg.set(Scope::Global, BailoutConfig { max_transitions: Some(42), ..Default::default() });
        let eff = reg.get_effective(1, 1);
        assert_eq!(eff.max_transitions, Some(42));
    }

    #[test]
    fn overriding_layer_still_inherits_fields_it_leaves_unset() {
        let reg = Registry::new();
        reg.set(Scope::Global, BailoutConfig { max_transitions: Some(42), ..Default::default() });
        reg.set(
            Scope::Pattern(1),
            BailoutConfig { override_: true, max_depth: Some(5), ..Default::default() },
        );
        let eff = reg.get_effective(1, 1);
        assert_eq!(eff.max_depth, Some(5));
        assert_eq!(eff.max_transitions, Some(42));
    }

    #[test]
    fn default_depth_applies_when_nothing_is_configured() {
        let reg = Registry::new();
        let eff = reg.get_effective(1, 1);
        assert_eq!(eff.max_depth, Some(DEFAULT_MAX_DEPTH));
    }

    #[test]
    fn clear_removes_a_layer_and_restores_inheritance() {
        let reg = Registry::new();
        reg.set(Scope::Global, BailoutConfig { max_transitions: Some(42), ..Default::default() });
        reg.set(Scope::Pattern(1), BailoutConfig { max_transitions: Some(9), ..Default::default() });
        assert_eq!(reg.get_effective(1, 1).max_transitions, Some(9));

        reg.clear(Scope::Pattern(1));
        assert_eq!(reg.get_effective(1, 1).max_transitions, Some(42));

        reg.clear(Scope::Global);
        assert_eq!(reg.get_effective(1, 1).max_transitions, None);
    }
}
