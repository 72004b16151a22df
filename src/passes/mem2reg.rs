//! `ChainLoopMem2Reg`: promotes exact-aliasing, `InBounds`-flagged loads
//! from a loop-invariant pointer into a block parameter threaded by the
//! loop's backedge, turning a per-iteration memory round-trip into a
//! register-resident SSA value.

use super::loop_info::{find_loops, Loop};
use crate::ir::{AliasGroup, Inst, InstData, InstKind, JumpData, LoadData, Section, Value};
use rustc_hash::FxHashMap;

pub fn run(section: &mut Section) {
    let loops = find_loops(section);
    for lp in &loops {
        promote_loop(section, lp);
    }
}

fn is_invariant(section: &Section, lp: &Loop, v: Value) -> bool {
    match v {
        Value::Const(_) => true,
        Value::Arg(a) => !lp.chain.contains(a.block),
        Value::Inst(i) => !lp.chain.contains(section.inst(i).block),
    }
}

struct Candidate {
    group: AliasGroup,
    ptr: Value,
    offset: i64,
    load: LoadData,
}

fn find_candidates(section: &Section, lp: &Loop) -> Vec<Candidate> {
    let mut seen: FxHashMap<AliasGroup, ()> = FxHashMap::default();
    let mut out = Vec::new();
    for &block in &lp.chain.blocks {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            if let InstKind::Load(l) = &section.inst(inst).kind {
                if l.group.is_exact()
                    && l.flags.in_bounds()
                    && is_invariant(section, lp, l.ptr)
                    && seen.insert(l.group, ()).is_none()
                {
                    out.push(Candidate { group: l.group, ptr: l.ptr, offset: l.offset, load: l.clone() });
                }
            }
        }
    }
    out
}

fn promote_loop(section: &mut Section, lp: &Loop) {
    let Some(preheader) = lp.preheader else { return };
    let Some(ph_term) = section.terminator(preheader) else { return };

    for candidate in find_candidates(section, lp) {
        let load_ty = find_load_result_ty(section, &candidate);

        let initial = section.insert_inst_before(
            ph_term,
            InstData {
                kind: InstKind::Load(candidate.load.clone()),
                ty: load_ty,
                block: preheader,
                prev: None,
                next: None,
                name: None,
            },
        );
        let param_index = section.add_param(lp.header, load_ty);
        append_jump_arg(section, ph_term, Value::Inst(initial));

        let param_value = section.arg(lp.header, param_index);
        let mut current = param_value;
        for &block in &lp.chain.blocks {
            for inst in section.insts_forward(block).collect::<Vec<_>>() {
                let kind = section.inst(inst).kind.clone();
                match &kind {
                    InstKind::Load(l) if l.group == candidate.group => {
                        retarget_load(section, inst, current);
                    }
                    InstKind::Store(s) if s.group == candidate.group => {
                        current = s.value;
                    }
                    _ => {}
                }
            }
        }

        let Some(extent_term) = section.terminator(lp.extent) else { continue };
        append_jump_arg(section, extent_term, current);
    }
}

fn find_load_result_ty(section: &Section, candidate: &Candidate) -> crate::types::Type {
    for block in section.blocks().collect::<Vec<_>>() {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            let data = section.inst(inst);
            if let InstKind::Load(l) = &data.kind {
                if l.group == candidate.group && l.ptr == candidate.ptr && l.offset == candidate.offset {
                    return data.ty;
                }
            }
        }
    }
    crate::types::Type::Int64
}

fn retarget_load(section: &mut Section, inst: Inst, value: Value) {
    // Replace every remaining use of `inst`'s result with `value`, then
    // unlink the now-redundant load. Limited to the loop's own chain
    // plus everything after it, which this single substitution pass
    // over the whole section covers uniformly.
    let mut subst = FxHashMap::default();
    subst.insert(inst, value);
    for block in section.blocks().collect::<Vec<_>>() {
        for other in section.insts_forward(block).collect::<Vec<_>>() {
            super::subst::rewrite_operands(section, other, &subst);
        }
    }
    section.unlink_inst(inst);
}

fn append_jump_arg(section: &mut Section, jump_inst: Inst, extra: Value) {
    let (target, mut args) = match &section.inst(jump_inst).kind {
        InstKind::Jump(j) => (j.target, j.args.as_slice().to_vec()),
        _ => return,
    };
    args.push(extra);
    let slice = section.arena.alloc_slice(&args);
    section.inst_mut(jump_inst).kind = InstKind::Jump(JumpData { target, args: slice });
}
