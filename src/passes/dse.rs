//! `DeadStoreElim`: per-block forward walk tracking the last store per
//! exact aliasing group; a store with no intervening load of that group
//! before the next store to it is dead.

use crate::ir::{AliasGroup, Inst, InstKind, Section};
use rustc_hash::FxHashMap;

pub fn run(section: &mut Section) {
    let blocks: Vec<_> = section.blocks().collect();
    for block in blocks {
        let mut last_store: FxHashMap<AliasGroup, Inst> = FxHashMap::default();
        let insts: Vec<_> = section.insts_forward(block).collect();
        for inst in insts {
            match &section.inst(inst).kind {
                InstKind::Store(s) if s.group.is_exact() => {
                    let group = s.group;
                    if let Some(&prev) = last_store.get(&group) {
                        section.unlink_inst(prev);
                    }
                    last_store.insert(group, inst);
                }
                InstKind::Load(l) if l.group.is_exact() => {
                    last_store.remove(&l.group);
                }
                _ => {}
            }
        }
    }
}
