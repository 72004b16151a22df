//! `CommonSubexprElim`: per-block value numbering. Side-effecting and
//! terminator instructions bypass the cache; a store invalidates any
//! cached load whose access interval could intersect it. Constants are
//! already value-equal `Value::Const`s and need no separate dedup
//! table.

use super::subst::rewrite_operands;
use crate::ir::{AliasGroup, Inst, InstKind, LoadFlags, Opcode, Section, Value};
use crate::types::Type;
use rustc_hash::FxHashMap;

#[derive(PartialEq, Eq, Hash)]
enum CseKey {
    Bin(Opcode, Value, Value, Type),
    Resize(Opcode, Value, Type),
    Select(Value, Value, Value, Type),
    AddPtr(Value, i64),
    Load(Value, LoadFlags, AliasGroup, i64, Type),
    Freeze(Value, Type),
    AssumeConst(Value, Type),
}

struct MemAccess {
    group: AliasGroup,
    base: Value,
    offset: i64,
    size: u32,
}

fn may_intersect(a: &MemAccess, b: &MemAccess) -> bool {
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

pub fn run(section: &mut Section) {
    let blocks: Vec<_> = section.blocks().collect();
    let mut subst: FxHashMap<Inst, Value> = FxHashMap::default();

    for block in blocks {
        let mut cache: FxHashMap<CseKey, Value> = FxHashMap::default();
        let mut load_access: FxHashMap<CseKey, MemAccess> = FxHashMap::default();
        let insts: Vec<_> = section.insts_forward(block).collect();

        for inst in insts {
            rewrite_operands(section, inst, &subst);
            let data = section.inst(inst);
            let opcode = data.kind.opcode();

            if opcode.has_side_effect() {
                if let InstKind::Store(s) = &data.kind {
                    let access = MemAccess {
                        group: s.group,
                        base: s.ptr,
                        offset: s.offset,
                        size: section.type_of(s.value).byte_size(),
                    };
                    let stale: Vec<CseKey> = load_access
                        .iter()
                        .filter(|(_, a)| may_intersect(a, &access))
                        .map(|(k, _)| clone_key(k))
                        .collect();
                    for k in stale {
                        cache.remove(&k);
                        load_access.remove(&k);
                    }
                }
                continue;
            }

            let Some(key) = key_of(&data.kind, data.ty) else { continue };
            if let Some(&existing) = cache.get(&key) {
                subst.insert(inst, existing);
                section.unlink_inst(inst);
            } else {
                if let InstKind::Load(l) = &data.kind {
                    load_access.insert(
                        clone_key(&key),
                        MemAccess { group: l.group, base: l.ptr, offset: l.offset, size: data.ty.byte_size() },
                    );
                }
                cache.insert(key, Value::Inst(inst));
            }
        }
    }
}

fn clone_key(k: &CseKey) -> CseKey {
    match *k {
        CseKey::Bin(op, l, r, ty) => CseKey::Bin(op, l, r, ty),
        CseKey::Resize(op, v, ty) => CseKey::Resize(op, v, ty),
        CseKey::Select(c, t, f, ty) => CseKey::Select(c, t, f, ty),
        CseKey::AddPtr(p, o) => CseKey::AddPtr(p, o),
        CseKey::Load(p, flags, g, o, ty) => CseKey::Load(p, flags, g, o, ty),
        CseKey::Freeze(v, ty) => CseKey::Freeze(v, ty),
        CseKey::AssumeConst(v, ty) => CseKey::AssumeConst(v, ty),
    }
}

fn key_of(kind: &InstKind, ty: Type) -> Option<CseKey> {
    use InstKind::*;
    Some(match kind {
        Add(b) | Sub(b) | Mul(b) | DivU(b) | DivS(b) | ModU(b) | ModS(b) | And(b) | Or(b)
        | Xor(b) | Shl(b) | ShrU(b) | ShrS(b) | Eq(b) | LtU(b) | LtS(b) => {
            CseKey::Bin(kind.opcode(), b.lhs, b.rhs, ty)
        }
        ResizeU(x) | ResizeS(x) | ResizeX(x) => CseKey::Resize(kind.opcode(), *x, ty),
        Select(s) => CseKey::Select(s.cond, s.if_true, s.if_false, ty),
        AddPtr(a) => CseKey::AddPtr(a.ptr, a.offset),
        Load(l) => CseKey::Load(l.ptr, l.flags, l.group, l.offset, ty),
        Freeze(x) => CseKey::Freeze(*x, ty),
        AssumeConst(x) => CseKey::AssumeConst(*x, ty),
        Store(_) | Jump(_) | Branch(_) | Exit | Comment(_) | Input(_) | Output(_) => return None,
    })
}

