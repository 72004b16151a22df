//! `UsedBits`: a backward demand analysis. Each named value gets a
//! bitset of the bits whose value can still affect a side-effecting or
//! terminator consumer; used by `Simplify` to drop masks and resizes
//! that only touch dead bits.

use crate::entity::NameMap;
use crate::ir::{Inst, InstKind, Name, Section, Value};
use crate::types::Type;

pub type UsedBits = NameMap<Name, u64>;

/// Compute `UsedBits` for every named value in `section` by iterating a
/// backward dataflow to a fixed point (loops make a single reverse
/// sweep insufficient; the lattice is 64 bits per value so this always
/// converges quickly).
pub fn analyze(section: &Section) -> UsedBits {
    let mut table: UsedBits = NameMap::with_capacity(section.name_count());
    let blocks: Vec<_> = section.blocks().collect();

    loop {
        let mut changed = false;
        for &block in blocks.iter().rev() {
            for inst in section.insts_reverse(block) {
                let data = section.inst(inst);
                let opcode = data.kind.opcode();
                let own_demand = if opcode.has_side_effect() {
                    data.ty.mask()
                } else {
                    name_demand(section, &table, inst)
                };
                demand_operands(section, &mut table, &data.kind, data.ty, own_demand, &mut changed);
            }
        }
        if !changed {
            break;
        }
    }
    table
}

fn name_demand(section: &Section, table: &UsedBits, inst: Inst) -> u64 {
    match section.inst(inst).name {
        Some(name) => table.get(name),
        None => 0,
    }
}

fn demand(section: &Section, table: &mut UsedBits, v: Value, bits: u64, changed: &mut bool) {
    if bits == 0 {
        return;
    }
    if let Some(name) = section.name_of(v) {
        let cur = table.get(name);
        let merged = cur | bits;
        if merged != cur {
            table.set(name, merged);
            *changed = true;
        }
    }
}

/// The conservative carry-aware demand transfer for `add`/`sub`/`mul`:
/// if any bit at or below `top` is demanded, every bit up to and
/// including `top` must be demanded of both operands (carries only
/// propagate upward).
fn below_highest(mask: u64) -> u64 {
    if mask == 0 {
        0
    } else {
        let top = 63 - mask.leading_zeros();
        if top >= 63 {
            u64::MAX
        } else {
            (1u64 << (top + 1)) - 1
        }
    }
}

fn demand_operands(
    section: &Section,
    table: &mut UsedBits,
    kind: &InstKind,
    ty: Type,
    result_demand: u64,
    changed: &mut bool,
) {
    use InstKind::*;
    let mut d = |v: Value, bits: u64| demand(section, table, v, bits, changed);

    match kind {
        Add(b) | Sub(b) | Mul(b) => {
            let carry_mask = below_highest(result_demand) & ty.mask();
            d(b.lhs, carry_mask);
            d(b.rhs, carry_mask);
        }
        DivU(b) | DivS(b) | ModU(b) | ModS(b) => {
            d(b.lhs, ty.mask());
            d(b.rhs, ty.mask());
        }
        And(b) | Or(b) | Xor(b) => {
            d(b.lhs, result_demand);
            d(b.rhs, result_demand);
        }
        Shl(b) => shift_operands(section, &mut d, b, ty, result_demand, |r, k| {
            if k >= 64 { 0 } else { r >> k }
        }),
        ShrU(b) | ShrS(b) => shift_operands(section, &mut d, b, ty, result_demand, |r, k| {
            if k >= 64 { 0 } else { (r << k) & ty.mask() }
        }),
        Eq(b) | LtU(b) | LtS(b) => {
            let lty = section.type_of(b.lhs);
            d(b.lhs, lty.mask());
            d(b.rhs, lty.mask());
        }
        ResizeU(x) => {
            let src_ty = section.type_of(*x);
            d(*x, result_demand & src_ty.mask());
        }
        ResizeX(x) => {
            let src_ty = section.type_of(*x);
            d(*x, result_demand & src_ty.mask());
        }
        ResizeS(x) => {
            let src_ty = section.type_of(*x);
            let mut want = result_demand & src_ty.mask();
            if result_demand & !src_ty.mask() != 0 {
                want |= 1u64 << (src_ty.bit_width() - 1);
            }
            d(*x, want);
        }
        Select(s) => {
            let cond_ty = section.type_of(s.cond);
            d(s.cond, cond_ty.mask());
            d(s.if_true, result_demand);
            d(s.if_false, result_demand);
        }
        Load(l) => {
            d(l.ptr, Type::Ptr.mask());
        }
        Store(s) => {
            d(s.ptr, Type::Ptr.mask());
            let val_ty = section.type_of(s.value);
            d(s.value, val_ty.mask());
        }
        AddPtr(a) => {
            d(a.ptr, Type::Ptr.mask());
        }
        Jump(j) => {
            for (i, &arg) in j.args.as_slice().iter().enumerate() {
                let target_arg = section.arg(j.target, i as u32);
                let want = match section.name_of(target_arg) {
                    Some(name) => table.get(name),
                    None => section.arg_type(j.target, i as u32).mask(),
                };
                demand(section, table, arg, want, changed);
            }
        }
        Branch(b) => {
            d(b.cond, Type::Bool.mask());
        }
        Freeze(x) | AssumeConst(x) => {
            d(*x, result_demand);
        }
        Output(x) => {
            let ty = section.type_of(*x);
            d(*x, ty.mask());
        }
        Exit | Comment(_) | Input(_) => {}
    }
}

fn shift_operands(
    section: &Section,
    d: &mut impl FnMut(Value, u64),
    b: &crate::ir::BinArgs,
    ty: Type,
    result_demand: u64,
    shift_result: impl Fn(u64, u32) -> u64,
) {
    if let Value::Const(c) = b.rhs {
        let k = c.bits as u32;
        if (k as u64) < ty.bit_width() as u64 {
            d(b.lhs, shift_result(result_demand, k) & ty.mask());
        } else {
            d(b.lhs, 0);
        }
    } else {
        d(b.lhs, ty.mask());
    }
    let _ = section;
    d(b.rhs, ty.mask());
}
