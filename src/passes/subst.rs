//! Shared operand-substitution helper used by any pass that replaces
//! one instruction's result with another `Value` throughout the rest of
//! the section (`CommonSubexprElim`, `Simplify`).

use crate::ir::{Inst, InstKind, Section, Value};
use rustc_hash::FxHashMap;

pub fn rewrite(v: Value, subst: &FxHashMap<Inst, Value>) -> Value {
    match v {
        Value::Inst(i) => subst.get(&i).copied().unwrap_or(v),
        _ => v,
    }
}

/// Rewrite every `Value` operand of `inst` through `subst`, in place.
pub fn rewrite_operands(section: &mut Section, inst: Inst, subst: &FxHashMap<Inst, Value>) {
    if subst.is_empty() {
        return;
    }
    let data = section.inst_mut(inst);
    match &mut data.kind {
        InstKind::Add(b) | InstKind::Sub(b) | InstKind::Mul(b) | InstKind::DivU(b)
        | InstKind::DivS(b) | InstKind::ModU(b) | InstKind::ModS(b) | InstKind::And(b)
        | InstKind::Or(b) | InstKind::Xor(b) | InstKind::Shl(b) | InstKind::ShrU(b)
        | InstKind::ShrS(b) | InstKind::Eq(b) | InstKind::LtU(b) | InstKind::LtS(b) => {
            b.lhs = rewrite(b.lhs, subst);
            b.rhs = rewrite(b.rhs, subst);
        }
        InstKind::ResizeU(x) | InstKind::ResizeS(x) | InstKind::ResizeX(x) => {
            *x = rewrite(*x, subst);
        }
        InstKind::Load(l) => l.ptr = rewrite(l.ptr, subst),
        InstKind::Store(s) => {
            s.ptr = rewrite(s.ptr, subst);
            s.value = rewrite(s.value, subst);
        }
        InstKind::AddPtr(a) => a.ptr = rewrite(a.ptr, subst),
        InstKind::Branch(b) => b.cond = rewrite(b.cond, subst),
        InstKind::Select(s) => {
            s.cond = rewrite(s.cond, subst);
            s.if_true = rewrite(s.if_true, subst);
            s.if_false = rewrite(s.if_false, subst);
        }
        InstKind::Freeze(x) | InstKind::AssumeConst(x) | InstKind::Output(x) => {
            *x = rewrite(*x, subst);
        }
        InstKind::Jump(j) => {
            for v in j.args.as_mut_slice() {
                *v = rewrite(*v, subst);
            }
        }
        InstKind::Exit | InstKind::Comment(_) | InstKind::Input(_) => {}
    }
}
