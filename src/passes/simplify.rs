//! `Simplify`: a capped fixed-point loop that substitutes instructions
//! via two driver analyses in turn: `KnownBits` (constant folding,
//! redundant masks, same-width resize collapse), then `UsedBits` (drop
//! masks/sets whose affected bits are dead, demote an extending resize
//! to `resizeX` when only in-range bits are ever read).

use super::subst::rewrite_operands;
use crate::analysis::{known_bits, used_bits};
use crate::analysis::known_bits::Bits;
use crate::ir::{Const, Inst, InstKind, Section, Value};
use crate::types::Type;
use log::{debug, trace};
use rustc_hash::FxHashMap;

pub const DEFAULT_MAX_ITERS: u32 = 32;

/// Run `Simplify` to a fixed point (or until `max_iters` rounds have
/// passed). Returns whether anything changed.
pub fn run(section: &mut Section, max_iters: u32) -> bool {
    let mut changed_any = false;
    for round in 0..max_iters {
        section.autoname();
        let kb = known_bits::analyze(section);
        let c1 = apply_known_bits(section, &kb);

        section.autoname();
        let ub = used_bits::analyze(section);
        let c2 = apply_used_bits(section, &ub);

        trace!("simplify: round {} changed_known_bits={} changed_used_bits={}", round, c1, c2);
        changed_any |= c1 || c2;
        if !(c1 || c2) {
            debug!("simplify: reached fixed point after {} round(s)", round + 1);
            break;
        }
    }
    changed_any
}

fn split_const(lhs: Value, rhs: Value) -> Option<(Value, Const)> {
    if let Some(c) = rhs.as_const() {
        Some((lhs, c))
    } else if let Some(c) = lhs.as_const() {
        Some((rhs, c))
    } else {
        None
    }
}

fn known_zero_covers(bits: Bits, mask: u64) -> bool {
    bits.mask & mask == mask && bits.value & mask == 0
}

fn apply_known_bits(section: &mut Section, kb: &known_bits::KnownBits) -> bool {
    let mut subst: FxHashMap<Inst, Value> = FxHashMap::default();
    let mut changed = false;

    for block in section.blocks().collect::<Vec<_>>() {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            rewrite_operands(section, inst, &subst);

            let (opcode, name, ty, kind) = {
                let data = section.inst(inst);
                (data.kind.opcode(), data.name, data.ty, data.kind.clone())
            };
            if opcode.has_side_effect() {
                continue;
            }

            if ty != Type::Void {
                if let Some(name) = name {
                    let bits = kb.get(name);
                    if bits.is_fully_known(ty) {
                        subst.insert(inst, Value::Const(Const::new(ty, bits.value)));
                        section.unlink_inst(inst);
                        changed = true;
                        continue;
                    }
                }
            }

            match &kind {
                InstKind::ResizeU(x) | InstKind::ResizeS(x) | InstKind::ResizeX(x) => {
                    if section.type_of(*x) == ty {
                        subst.insert(inst, *x);
                        section.unlink_inst(inst);
                        changed = true;
                    }
                }
                InstKind::And(b) => {
                    if let Some((var, konst)) = split_const(b.lhs, b.rhs) {
                        let var_bits = match section.name_of(var) {
                            Some(n) => kb.get(n),
                            None => match var.as_const() {
                                Some(c) => Bits::exact(c.ty, c.bits),
                                None => Bits::unknown(),
                            },
                        };
                        let zero_positions = !konst.bits & ty.mask();
                        if known_zero_covers(var_bits, zero_positions) {
                            subst.insert(inst, var);
                            section.unlink_inst(inst);
                            changed = true;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    changed
}

fn apply_used_bits(section: &mut Section, ub: &used_bits::UsedBits) -> bool {
    let mut subst: FxHashMap<Inst, Value> = FxHashMap::default();
    let mut changed = false;

    for block in section.blocks().collect::<Vec<_>>() {
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            rewrite_operands(section, inst, &subst);

            let (name, ty, kind) = {
                let data = section.inst(inst);
                (data.name, data.ty, data.kind.clone())
            };
            let demand = match name {
                Some(n) => ub.get(n),
                None => ty.mask(),
            };

            match &kind {
                InstKind::And(b) => {
                    if let Some((var, konst)) = split_const(b.lhs, b.rhs) {
                        if demand & !konst.bits & ty.mask() == 0 {
                            subst.insert(inst, var);
                            section.unlink_inst(inst);
                            changed = true;
                        }
                    }
                }
                InstKind::Or(b) => {
                    if let Some((var, konst)) = split_const(b.lhs, b.rhs) {
                        if demand & konst.bits == 0 {
                            subst.insert(inst, var);
                            section.unlink_inst(inst);
                            changed = true;
                        }
                    }
                }
                InstKind::ResizeU(x) | InstKind::ResizeS(x) => {
                    let src_ty = section.type_of(*x);
                    if ty.bit_width() > src_ty.bit_width() && demand & !src_ty.mask() == 0 {
                        let xv = *x;
                        section.inst_mut(inst).kind = InstKind::ResizeX(xv);
                        changed = true;
                    }
                }
                _ => {}
            }
        }
    }
    changed
}
