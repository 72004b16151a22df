//! Per-block memory-dependency tracking.
//!
//! Every load/store gets a `MemDep` tag: the most recent store of the
//! same aliasing group in its block, or a block-entry sentinel if none
//! precedes it. `isel` may only merge two memory ops (e.g. fold a load
//! into an `add [mem], reg` store) when their `MemDep`s are equal —
//! otherwise an intervening same-group store could have changed the
//! value between them.

use crate::ir::{AliasGroup, Block, Inst, InstKind, Section};
use rustc_hash::FxHashMap;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum MemDep {
    /// No store of this group precedes the access within its block.
    BlockEntry(Block),
    /// The access depends on this preceding store of the same group.
    Store(Inst),
}

pub struct MemDeps {
    deps: FxHashMap<Inst, MemDep>,
}

impl MemDeps {
    pub fn of(&self, inst: Inst) -> MemDep {
        self.deps[&inst]
    }

    /// Whether a load and a store (or two loads) may be fused because
    /// nothing could have changed the loaded value between them.
    pub fn mergeable(&self, a: Inst, b: Inst) -> bool {
        self.deps.get(&a) == self.deps.get(&b)
    }
}

pub fn analyze(section: &Section) -> MemDeps {
    let mut deps = FxHashMap::default();
    for block in section.blocks() {
        let mut last_store: FxHashMap<AliasGroup, Inst> = FxHashMap::default();
        for inst in section.insts_forward(block) {
            match &section.inst(inst).kind {
                InstKind::Load(l) => {
                    let dep = last_store
                        .get(&l.group)
                        .copied()
                        .map(MemDep::Store)
                        .unwrap_or(MemDep::BlockEntry(block));
                    deps.insert(inst, dep);
                }
                InstKind::Store(s) => {
                    let dep = last_store
                        .get(&s.group)
                        .copied()
                        .map(MemDep::Store)
                        .unwrap_or(MemDep::BlockEntry(block));
                    deps.insert(inst, dep);
                    last_store.insert(s.group, inst);
                }
                _ => {}
            }
        }
    }
    MemDeps { deps }
}
