//! `LoopInvCodeMotion`: given a `Loop` descriptor, hoist any instruction
//! whose operands are all loop-invariant (and, for loads, whose
//! aliasing group is never stored to inside the loop) into the
//! preheader. Stores, terminators and comments always stay put.

use super::loop_info::{find_loops, Chain, Loop};
use super::subst::rewrite_operands;
use crate::ir::{AliasGroup, Inst, InstData, InstKind, Opcode, Section, Value};
use rustc_hash::{FxHashMap, FxHashSet};

pub fn run(section: &mut Section) {
    let loops = find_loops(section);
    for lp in &loops {
        hoist_loop(section, lp);
    }
}

fn stored_groups(section: &Section, chain: &Chain) -> FxHashSet<AliasGroup> {
    let mut groups = FxHashSet::default();
    for &block in &chain.blocks {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            if let InstKind::Store(s) = &section.inst(inst).kind {
                groups.insert(s.group);
            }
        }
    }
    groups
}

fn is_invariant(section: &Section, chain: &Chain, v: Value, hoisted: &FxHashMap<Inst, Value>) -> bool {
    match v {
        Value::Const(_) => true,
        Value::Arg(a) => !chain.contains(a.block),
        Value::Inst(i) => hoisted.contains_key(&i) || !chain.contains(section.inst(i).block),
    }
}

fn substitute_value(v: Value, hoisted: &FxHashMap<Inst, Value>) -> Value {
    match v {
        Value::Inst(i) => hoisted.get(&i).copied().unwrap_or(v),
        _ => v,
    }
}

fn substitute_kind(mut kind: InstKind, hoisted: &FxHashMap<Inst, Value>) -> InstKind {
    let s = |v: Value| substitute_value(v, hoisted);
    match &mut kind {
        InstKind::Add(b) | InstKind::Sub(b) | InstKind::Mul(b) | InstKind::DivU(b)
        | InstKind::DivS(b) | InstKind::ModU(b) | InstKind::ModS(b) | InstKind::And(b)
        | InstKind::Or(b) | InstKind::Xor(b) | InstKind::Shl(b) | InstKind::ShrU(b)
        | InstKind::ShrS(b) | InstKind::Eq(b) | InstKind::LtU(b) | InstKind::LtS(b) => {
            b.lhs = s(b.lhs);
            b.rhs = s(b.rhs);
        }
        InstKind::ResizeU(x) | InstKind::ResizeS(x) | InstKind::ResizeX(x) => *x = s(*x),
        InstKind::Load(l) => l.ptr = s(l.ptr),
        InstKind::AddPtr(a) => a.ptr = s(a.ptr),
        InstKind::Select(sel) => {
            sel.cond = s(sel.cond);
            sel.if_true = s(sel.if_true);
            sel.if_false = s(sel.if_false);
        }
        InstKind::Freeze(x) | InstKind::AssumeConst(x) => *x = s(*x),
        _ => {}
    }
    kind
}

fn hoist_loop(section: &mut Section, lp: &Loop) {
    let Some(preheader) = lp.preheader else { return };
    let Some(ph_term) = section.terminator(preheader) else { return };
    let stored = stored_groups(section, &lp.chain);
    let mut hoisted: FxHashMap<Inst, Value> = FxHashMap::default();

    loop {
        let mut progress = false;
        for &block in &lp.chain.blocks {
            for inst in section.insts_forward(block).collect::<Vec<_>>() {
                if hoisted.contains_key(&inst) {
                    continue;
                }
                let (kind, ty) = {
                    let data = section.inst(inst);
                    (data.kind.clone(), data.ty)
                };
                let opcode = kind.opcode();
                if opcode.is_terminator() || opcode == Opcode::Comment || opcode == Opcode::Store {
                    continue;
                }
                let mut all_invariant = true;
                kind.for_each_arg(|v| {
                    if !is_invariant(section, &lp.chain, v, &hoisted) {
                        all_invariant = false;
                    }
                });
                if !all_invariant {
                    continue;
                }
                if let InstKind::Load(l) = &kind {
                    if stored.contains(&l.group) {
                        continue;
                    }
                }

                let rewritten = substitute_kind(kind, &hoisted);
                let new_inst = section.insert_inst_before(
                    ph_term,
                    InstData { kind: rewritten, ty, block: preheader, prev: None, next: None, name: None },
                );
                hoisted.insert(inst, Value::Inst(new_inst));
                section.unlink_inst(inst);
                progress = true;
            }
        }
        if !progress {
            break;
        }
    }

    for block in section.blocks().collect::<Vec<_>>() {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            rewrite_operands(section, inst, &hoisted);
        }
    }
}
