// Copyright 2014-2015 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Per-thread reuse of backtracking scratch buffers.
//!
//! Each thread keeps its own small pool of `Scratch` buffers in a
//! `thread_local!`, so repeated matches on the same thread don't pay for a
//! fresh `Vec` grow every call. A single `Mutex`-guarded config is shared
//! across threads so `set_max_depth` takes effect for every thread's next
//! `acquire`, without needing a lock on the hot path itself.

use std::cell::RefCell;
use std::sync::{Mutex, OnceLock};

const SCRATCH_CAP_CEILING: usize = 4096;

#[derive(Clone, Copy, Debug)]
pub struct BacktrackerConfig {
    pub max_depth: usize,
}

impl Default for BacktrackerConfig {
    fn default() -> BacktrackerConfig {
        BacktrackerConfig { max_depth: crate::registry::DEFAULT_MAX_DEPTH }
    }
}

/// The columnar buffers backing one in-flight backtracking run, checked out
/// from the thread-local pool and returned when the run completes.
pub struct Scratch {
    pub pcs: Vec<usize>,
    pub sps: Vec<usize>,
    pub snapshots: Vec<Vec<usize>>,
    pub guards: Vec<Vec<usize>>,
}

impl Scratch {
    fn with_capacity(cap: usize) -> Scratch {
        Scratch {
            pcs: Vec::with_capacity(cap),
            sps: Vec::with_capacity(cap),
            snapshots: Vec::with_capacity(cap),
            guards: Vec::with_capacity(cap),
        }
    }

    pub fn clear(&mut self) {
        self.pcs.clear();
        self.sps.clear();
        self.snapshots.clear();
        self.guards.clear();
    }
}

thread_local! {
    static LOCAL_POOL: RefCell<Vec<Scratch>> = RefCell::new(Vec::new());
}

/// Broker between the VM and each thread's local scratch pool.
pub struct ThreadBacktrackers {
    shared_config: Mutex<BacktrackerConfig>,
}

impl ThreadBacktrackers {
    pub fn new() -> ThreadBacktrackers {
        ThreadBacktrackers { shared_config: Mutex::new(BacktrackerConfig::default()) }
    }

    /// Visible to the next `acquire` call on any thread, including ones
    /// already holding an older, smaller buffer.
    pub fn set_max_depth(&self, max_depth: usize) {
        self.shared_config.lock().unwrap().max_depth = max_depth;
    }

    pub fn acquire(&self) -> Scratch {
        let max_depth = self.shared_config.lock().unwrap().max_depth;
        let target_cap = max_depth.min(SCRATCH_CAP_CEILING);
        LOCAL_POOL.with(|pool| {
            let mut pool = pool.borrow_mut();
            match pool.pop() {
                Some(mut s) if s.pcs.capacity() >= target_cap => {
                    s.clear();
                    s
                }
                _ => Scratch::with_capacity(target_cap),
            }
        })
    }

    pub fn release(&self, scratch: Scratch) {
        LOCAL_POOL.with(|pool| pool.borrow_mut().push(scratch));
    }
}

impl Default for ThreadBacktrackers {
    fn default() -> ThreadBacktrackers {
        ThreadBacktrackers::new()
    }
}

static GLOBAL: OnceLock<ThreadBacktrackers> = OnceLock::new();

/// The process-wide broker the VM acquires scratch buffers from. One
/// instance is enough: `LOCAL_POOL` is already per-thread, and every caller
/// on a given thread wants to land in the same pool regardless of which
/// pattern is running.
pub fn global() -> &'static ThreadBacktrackers {
    GLOBAL.get_or_init(ThreadBacktrackers::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_reuses_the_buffer() {
        let brokers = ThreadBacktrackers::new();
        let mut s = brokers.acquire();
        s.pcs.push(1);
        brokers.release(s);
        let s2 = brokers.acquire();
        assert!(s2.pcs.is_empty());
    }

    #[test]
    fn set_max_depth_affects_subsequent_acquires() {
        let brokers = ThreadBacktrackers::new();
        brokers.set_max_depth(10);
        let s = brokers.acquire();
        assert!(s.pcs.capacity() >= 10);
    }

    #[test]
    fn clear_empties_the_guard_buffer_too() {
        let brokers = ThreadBacktrackers::new();
        let mut s = brokers.acquire();
        s.guards.push(vec![1, 2, 3]);
        s.clear();
        assert!(s.guards.is_empty());
    }

    #[test]
    fn global_returns_the_same_instance_every_call() {
        let a = global() as *const ThreadBacktrackers;
        let b = global() as *const ThreadBacktrackers;
        assert_eq!(a, b);
    }
}
