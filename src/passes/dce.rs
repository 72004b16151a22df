//! `DeadCodeElim`: backward sweep from terminators and side-effecting
//! instructions; unreachable-use instructions are unlinked.

use crate::entity::NameMap;
use crate::ir::{Name, Section, Value};
use log::trace;

/// Run dead code elimination over `section`, unlinking every
/// instruction whose result is never consumed by a side-effecting or
/// terminator instruction (directly or transitively).
pub fn run(section: &mut Section) {
    section.autoname();
    let mut used: NameMap<Name, bool> = NameMap::with_capacity(section.name_count());
    let blocks: Vec<_> = section.blocks().collect();

    loop {
        let mut changed = false;
        for &block in blocks.iter().rev() {
            for inst in section.insts_reverse(block) {
                let data = section.inst(inst);
                if is_live(data.kind.opcode().has_side_effect(), data.name, &used) {
                    data.kind.for_each_arg(|v| mark(section, &mut used, v, &mut changed));
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut removed = 0u32;
    for &block in &blocks {
        let insts: Vec<_> = section.insts_forward(block).collect();
        for inst in insts {
            let data = section.inst(inst);
            if !is_live(data.kind.opcode().has_side_effect(), data.name, &used) {
                section.unlink_inst(inst);
                removed += 1;
            }
        }
    }
    trace!("dce: removed {} dead instruction(s)", removed);
}

fn is_live(has_side_effect: bool, name: Option<Name>, used: &NameMap<Name, bool>) -> bool {
    has_side_effect || name.map(|n| used.get(n)).unwrap_or(false)
}

fn mark(section: &Section, used: &mut NameMap<Name, bool>, v: Value, changed: &mut bool) {
    if let Some(name) = section.name_of(v) {
        if !used.get(name) {
            used.set(name, true);
            *changed = true;
        }
    }
}
