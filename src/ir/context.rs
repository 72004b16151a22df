//! The `Context`: state shared across multiple `Section`s.
//!
//! In the system `jitcore` descends from, constants were heap-allocated,
//! pointer-identity `Value` objects living in a shared arena so sections
//! could alias them. Here a constant is a plain `Copy` `(Type, u64)` pair
//! (see [`Const`](super::value::Const)) with structural equality, so no
//! allocator is needed to share it — any two sections can embed the same
//! `Const` value directly. `Context` is kept as the construction API's
//! entry point (matching the external interface contract) and owns the
//! one genuinely cross-section resource: interned comment/debug strings.

use rustc_hash::FxHashMap;
use std::cell::RefCell;

pub struct Context {
    strings: RefCell<FxHashMap<String, ()>>,
}

impl Context {
    pub fn new() -> Self {
        Context { strings: RefCell::new(FxHashMap::default()) }
    }

    /// Intern a string for reuse across sections built from this
    /// context (comment text, debug labels).
    pub fn intern(&self, s: &str) -> String {
        let mut strings = self.strings.borrow_mut();
        if let Some((k, _)) = strings.get_key_value(s) {
            return k.clone();
        }
        strings.insert(s.to_string(), ());
        s.to_string()
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
