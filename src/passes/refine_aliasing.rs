//! `RefineAliasing`: splits a non-negative (may-alias) group into fresh
//! negative (exact) groups, one per distinct offset, whenever every
//! access in the group shares a base pointer and a type whose size the
//! offset is a multiple of.

use crate::ir::{AliasGroup, Inst, InstKind, Section, Value};
use rustc_hash::FxHashMap;

pub fn run(section: &mut Section) {
    let mut groups: FxHashMap<i64, Vec<Inst>> = FxHashMap::default();
    let mut min_group: i64 = 0;

    for block in section.blocks().collect::<Vec<_>>() {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            let data = section.inst(inst);
            let group = match &data.kind {
                InstKind::Load(l) => Some(l.group),
                InstKind::Store(s) => Some(s.group),
                _ => None,
            };
            if let Some(g) = group {
                if g.0 < min_group {
                    min_group = g.0;
                }
                if g.is_may_alias() {
                    groups.entry(g.0).or_default().push(inst);
                }
            }
        }
    }

    let mut next_group = min_group - 1;

    for insts in groups.into_values() {
        if !conforms(section, &insts) {
            continue;
        }
        let mut offset_group: FxHashMap<i64, AliasGroup> = FxHashMap::default();
        for &inst in &insts {
            let offset = access_offset(section, inst);
            let fresh = *offset_group.entry(offset).or_insert_with(|| {
                let g = AliasGroup(next_group);
                next_group -= 1;
                g
            });
            set_group(section, inst, fresh);
        }
    }
}

fn access_base(section: &Section, inst: Inst) -> Value {
    match &section.inst(inst).kind {
        InstKind::Load(l) => l.ptr,
        InstKind::Store(s) => s.ptr,
        _ => unreachable!("access_base on non-memory instruction"),
    }
}

fn access_offset(section: &Section, inst: Inst) -> i64 {
    match &section.inst(inst).kind {
        InstKind::Load(l) => l.offset,
        InstKind::Store(s) => s.offset,
        _ => unreachable!("access_offset on non-memory instruction"),
    }
}

fn access_byte_size(section: &Section, inst: Inst) -> u32 {
    let data = section.inst(inst);
    match &data.kind {
        InstKind::Load(_) => data.ty.byte_size(),
        InstKind::Store(s) => section.type_of(s.value).byte_size(),
        _ => unreachable!("access_byte_size on non-memory instruction"),
    }
}

fn conforms(section: &Section, insts: &[Inst]) -> bool {
    let Some(&first) = insts.first() else { return false };
    let base = access_base(section, first);
    let size = access_byte_size(section, first);
    insts.iter().all(|&inst| {
        access_base(section, inst) == base
            && access_byte_size(section, inst) == size
            && access_offset(section, inst).rem_euclid(size as i64) == 0
    })
}

fn set_group(section: &mut Section, inst: Inst, group: AliasGroup) {
    match &mut section.inst_mut(inst).kind {
        InstKind::Load(l) => l.group = group,
        InstKind::Store(s) => s.group = group,
        _ => unreachable!("set_group on non-memory instruction"),
    }
}
