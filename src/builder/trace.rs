//! The trace builder: a `FoldingBuilder` extended with load forwarding,
//! redundant-store elimination, alias-aware cache invalidation, and
//! memoized guards, for building straight-line traces.

use super::fold::FoldingBuilder;
use crate::ir::{AliasGroup, Block, LoadFlags, Section, Value};
use crate::types::Type;
use rustc_hash::FxHashMap;

/// `(aliasing_group, base, offset)` — the key a cached load or store is
/// indexed by.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
struct MemKey {
    group: AliasGroup,
    base: Value,
    offset: i64,
    size: u32,
}

pub struct TraceBuilder<'s> {
    folding: FoldingBuilder<'s>,
    /// Cache of known values at a `(group, base, offset, size)` location,
    /// populated by loads and stores, invalidated by aliasing stores.
    loads: FxHashMap<MemKey, Value>,
    /// `(v, expected)` guards already enforced on this trace.
    guards: FxHashMap<(Value, bool), ()>,
}

impl<'s> TraceBuilder<'s> {
    pub fn new(section: &'s mut Section) -> Self {
        TraceBuilder {
            folding: FoldingBuilder::new(section),
            loads: FxHashMap::default(),
            guards: FxHashMap::default(),
        }
    }

    pub fn folding(&mut self) -> &mut FoldingBuilder<'s> {
        &mut self.folding
    }

    pub fn move_to_end(&mut self, block: Block) -> &mut Self {
        self.folding.move_to_end(block);
        self
    }

    pub fn section(&self) -> &Section {
        self.folding.section()
    }

    pub fn build_const(&self, ty: Type, bits: u64) -> Value {
        self.folding.build_const(ty, bits)
    }

    fn key(&self, group: AliasGroup, ptr: Value, offset: i64, ty: Type) -> MemKey {
        MemKey { group, base: ptr, offset, size: ty.byte_size() }
    }

    /// Any two `MemKey`s in the same non-negative group, or the same
    /// negative group, are treated as potentially intersecting unless
    /// their `(base, offset, size)` provably do not overlap.
    fn may_intersect(a: &MemKey, b: &MemKey) -> bool {
        if a.group != b.group {
            return false;
        }
        if a.base != b.base {
            return a.group.is_may_alias();
        }
        let (lo_a, hi_a) = (a.offset, a.offset + a.size as i64);
        let (lo_b, hi_b) = (b.offset, b.offset + b.size as i64);
        lo_a < hi_b && lo_b < hi_a
    }

    pub fn fold_load(&mut self, ty: Type, ptr: Value, flags: LoadFlags, group: AliasGroup, offset: i64) -> Value {
        let key = self.key(group, ptr, offset, ty);
        if let Some(&v) = self.loads.get(&key) {
            return v;
        }
        let v = self.folding.fold_load(ty, ptr, flags, group, offset);
        self.loads.insert(key, v);
        v
    }

    pub fn fold_store(&mut self, ptr: Value, value: Value, group: AliasGroup, offset: i64) {
        let ty = self.section().type_of(value);
        let key = self.key(group, ptr, offset, ty);

        if group.is_exact() {
            if let Some(&current) = self.loads.get(&key) {
                if current == value {
                    // Redundant store to a location already holding this value.
                    return;
                }
            }
        }

        self.loads.retain(|k, _| !Self::may_intersect(k, &key));
        self.folding.fold_store(ptr, value, group, offset);
        self.loads.insert(key, value);
    }

    /// `init_store` seeds the cache with a known value at a location
    /// without emitting a store instruction, used to prime a trace with
    /// the values its preceding interpretation already established.
    pub fn init_store(&mut self, ptr: Value, value: Value, group: AliasGroup, offset: i64) {
        let ty = self.section().type_of(value);
        let key = self.key(group, ptr, offset, ty);
        self.loads.insert(key, value);
    }

    /// Enforce `v == expected` on this trace. A no-op if the same guard
    /// was already established; otherwise splits the current block into
    /// a success branch and an `Exit`-failure branch.
    pub fn build_guard(&mut self, v: Value, expected: bool) {
        if self.guards.contains_key(&(v, expected)) {
            return;
        }
        let cond = if expected { v } else { self.folding_not(v) };
        if let Some(c) = cond.as_const() {
            // Guard already known statically; nothing to branch on.
            if c.as_bool() {
                self.guards.insert((v, expected), ());
            }
            return;
        }

        let success = self.folding.build_block(&[]);
        let failure = self.folding.build_block(&[]);
        self.folding.fold_branch(cond, success, failure);

        self.folding.move_to_end(failure);
        self.folding.build_exit();

        self.folding.move_to_end(success);
        self.guards.insert((v, expected), ());
    }

    fn folding_not(&mut self, v: Value) -> Value {
        let ty = self.section().type_of(v);
        let ones = self.build_const(ty, ty.mask());
        self.folding.fold_xor(ty, v, ones)
    }
}
