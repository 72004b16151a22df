//! `KnownBits`: a forward per-bit lattice describing, for every named
//! value, which of its bits are statically known and what they are.

use crate::entity::NameMap;
use crate::ir::{InstKind, Name, Section, Value};
use crate::types::Type;

/// `mask` has a bit set iff that bit of the value is known; `value`
/// gives the known bits (bits outside `mask` are meaningless).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub struct Bits {
    pub mask: u64,
    pub value: u64,
}

impl Bits {
    pub fn unknown() -> Self {
        Bits { mask: 0, value: 0 }
    }

    pub fn exact(ty: Type, bits: u64) -> Self {
        Bits { mask: ty.mask(), value: bits & ty.mask() }
    }

    pub fn is_fully_known(self, ty: Type) -> bool {
        self.mask & ty.mask() == ty.mask()
    }

    pub fn const_value(self, ty: Type) -> Option<u64> {
        if self.is_fully_known(ty) {
            Some(self.value & ty.mask())
        } else {
            None
        }
    }

    /// Pointwise meet of two lattices: a bit is known only if both sides
    /// know it and agree on its value.
    pub fn meet(self, other: Self) -> Self {
        let known_both = self.mask & other.mask;
        let agree = !(self.value ^ other.value);
        let mask = known_both & agree;
        Bits { mask, value: self.value & mask }
    }

    fn and(self, other: Self) -> Self {
        let known_zero = (self.mask & !self.value) | (other.mask & !other.value);
        let known_one = self.mask & self.value & other.mask & other.value;
        Bits { mask: known_zero | known_one, value: known_one }
    }

    fn or(self, other: Self) -> Self {
        let known_one = (self.mask & self.value) | (other.mask & other.value);
        let known_zero = self.mask & !self.value & other.mask & !other.value;
        Bits { mask: known_one | known_zero, value: known_one }
    }

    fn xor(self, other: Self) -> Self {
        let mask = self.mask & other.mask;
        Bits { mask, value: (self.value ^ other.value) & mask }
    }
}

pub type KnownBits = NameMap<Name, Bits>;

/// Compute `KnownBits` for every named value in `section`. Requires
/// `section.autoname()` to have already been run.
pub fn analyze(section: &Section) -> KnownBits {
    let mut table: KnownBits = NameMap::with_capacity(section.name_count());

    for block in section.blocks() {
        for inst in section.insts_forward(block) {
            let data = section.inst(inst);
            let ty = data.ty;
            let bits = transfer(section, &table, &data.kind, ty);
            if let Some(name) = data.name {
                table.set(name, bits);
            }
        }
    }
    table
}

fn bits_of(section: &Section, table: &KnownBits, v: Value) -> Bits {
    match v {
        Value::Const(c) => Bits::exact(c.ty, c.bits),
        _ => match section.name_of(v) {
            Some(name) => table.get(name),
            None => Bits::unknown(),
        },
    }
}

pub(crate) fn transfer(section: &Section, table: &KnownBits, kind: &InstKind, ty: Type) -> Bits {
    use InstKind::*;
    let v = |x: Value| bits_of(section, table, x);

    match kind {
        Add(b) => {
            let (a, c) = (v(b.lhs), v(b.rhs));
            match (a.const_value(ty), c.const_value(ty)) {
                (Some(x), Some(y)) => Bits::exact(ty, x.wrapping_add(y)),
                _ => Bits::unknown(),
            }
        }
        Sub(b) => {
            let (a, c) = (v(b.lhs), v(b.rhs));
            match (a.const_value(ty), c.const_value(ty)) {
                (Some(x), Some(y)) => Bits::exact(ty, x.wrapping_sub(y)),
                _ => Bits::unknown(),
            }
        }
        Mul(b) => {
            let (a, c) = (v(b.lhs), v(b.rhs));
            match (a.const_value(ty), c.const_value(ty)) {
                (Some(x), Some(y)) => Bits::exact(ty, x.wrapping_mul(y)),
                _ => Bits::unknown(),
            }
        }
        DivU(b) => const_binop(v(b.lhs), v(b.rhs), ty, |x, y| (y != 0).then(|| x / y)),
        DivS(b) => const_binop_signed(v(b.lhs), v(b.rhs), ty, |x, y| (y != 0).then(|| x.wrapping_div(y))),
        ModU(b) => const_binop(v(b.lhs), v(b.rhs), ty, |x, y| (y != 0).then(|| x % y)),
        ModS(b) => const_binop_signed(v(b.lhs), v(b.rhs), ty, |x, y| (y != 0).then(|| x.wrapping_rem(y))),
        And(b) => v(b.lhs).and(v(b.rhs)),
        Or(b) => v(b.lhs).or(v(b.rhs)),
        Xor(b) => v(b.lhs).xor(v(b.rhs)),
        Shl(b) => shift(v(b.lhs), v(b.rhs), ty, Shift::Left),
        ShrU(b) => shift(v(b.lhs), v(b.rhs), ty, Shift::RightUnsigned),
        ShrS(b) => shift(v(b.lhs), v(b.rhs), ty, Shift::RightSigned),
        Eq(b) => {
            let lty = section.type_of(b.lhs);
            const_binop(v(b.lhs), v(b.rhs), lty, |x, y| Some((x == y) as u64))
        }
        LtU(b) => {
            let lty = section.type_of(b.lhs);
            const_binop(v(b.lhs), v(b.rhs), lty, |x, y| Some((x < y) as u64))
        }
        LtS(b) => {
            let lty = section.type_of(b.lhs);
            const_binop_signed(v(b.lhs), v(b.rhs), lty, |x, y| Some((x < y) as u64))
        }
        ResizeU(x) => resize_u(v(*x), ty),
        ResizeS(x) => resize_s(v(*x), section.type_of(*x), ty),
        ResizeX(x) => resize_x(v(*x), section.type_of(*x), ty),
        Select(s) => v(s.if_true).meet(v(s.if_false)),
        AssumeConst(x) => v(*x),
        Load(_) | Store(_) | AddPtr(_) | Jump(_) | Branch(_) | Exit | Comment(_) | Freeze(_)
        | Input(_) | Output(_) => Bits::unknown(),
    }
}

fn const_binop(a: Bits, b: Bits, ty: Type, f: impl Fn(u64, u64) -> Option<u64>) -> Bits {
    match (a.const_value(ty), b.const_value(ty)) {
        (Some(x), Some(y)) => match f(x, y) {
            Some(r) => Bits::exact(ty, r),
            None => Bits::unknown(),
        },
        _ => Bits::unknown(),
    }
}

fn const_binop_signed(a: Bits, b: Bits, ty: Type, f: impl Fn(i64, i64) -> Option<i64>) -> Bits {
    match (a.const_value(ty), b.const_value(ty)) {
        (Some(x), Some(y)) => {
            let width = ty.bit_width();
            let sign_extend = |v: u64| -> i64 {
                if width >= 64 {
                    v as i64
                } else {
                    let shift = 64 - width;
                    ((v << shift) as i64) >> shift
                }
            };
            match f(sign_extend(x), sign_extend(y)) {
                Some(r) => Bits::exact(ty, r as u64),
                None => Bits::unknown(),
            }
        }
        _ => Bits::unknown(),
    }
}

enum Shift {
    Left,
    RightUnsigned,
    RightSigned,
}

fn shift(a: Bits, amt: Bits, ty: Type, kind: Shift) -> Bits {
    let width = ty.bit_width();
    let k = match amt.const_value(ty) {
        Some(k) if (k as u32) < width => k as u32,
        _ => return Bits::unknown(),
    };
    if k == 0 {
        return a;
    }
    match kind {
        Shift::Left => {
            let mask = (a.mask << k) & ty.mask();
            let value = (a.value << k) & ty.mask();
            // Low k bits are known zero (shifted in).
            let low_known = (1u64 << k) - 1;
            Bits { mask: mask | low_known, value }
        }
        Shift::RightUnsigned => {
            let mask = a.mask >> k;
            let value = a.value >> k;
            let top_known = (!0u64 << (width - k)) & ty.mask();
            Bits { mask: mask | top_known, value }
        }
        Shift::RightSigned => {
            let sign_bit = width - 1;
            let sign_known = (a.mask >> sign_bit) & 1 == 1;
            let sign_val = (a.value >> sign_bit) & 1;
            let shifted_mask = a.mask >> k;
            let shifted_value = a.value >> k;
            let top_mask_bits = (!0u64 << (width - k)) & ty.mask();
            if sign_known {
                let top_val = if sign_val == 1 { top_mask_bits } else { 0 };
                Bits {
                    mask: (shifted_mask & !top_mask_bits) | top_mask_bits,
                    value: (shifted_value & !top_mask_bits) | top_val,
                }
            } else {
                Bits { mask: shifted_mask & !top_mask_bits, value: shifted_value & !top_mask_bits }
            }
        }
    }
}

fn resize_u(a: Bits, ty: Type) -> Bits {
    Bits { mask: a.mask & ty.mask(), value: a.value & ty.mask() }
}

/// Bit-preserving reinterpretation: truncation keeps known low bits
/// (like `resize_u`); widening leaves the new upper bits unknown, since
/// `ResizeX` makes no zero- or sign-extension guarantee.
fn resize_x(a: Bits, src_ty: Type, ty: Type) -> Bits {
    if ty.bit_width() <= src_ty.bit_width() {
        resize_u(a, ty)
    } else {
        Bits { mask: a.mask & src_ty.mask(), value: a.value & src_ty.mask() }
    }
}

fn resize_s(a: Bits, src_ty: Type, ty: Type) -> Bits {
    let src_width = src_ty.bit_width();
    let dst_width = ty.bit_width();
    if dst_width <= src_width {
        return resize_u(a, ty);
    }
    let sign_bit = src_width - 1;
    let sign_known = (a.mask >> sign_bit) & 1 == 1;
    let sign_val = (a.value >> sign_bit) & 1;
    let low_mask = src_ty.mask();
    if sign_known {
        let ext_mask = ty.mask() & !low_mask;
        let ext_val = if sign_val == 1 { ext_mask } else { 0 };
        Bits { mask: (a.mask & low_mask) | ext_mask, value: (a.value & low_mask) | ext_val }
    } else {
        Bits { mask: a.mask & low_mask, value: a.value & low_mask }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::fold::FoldingBuilder;
    use crate::ir::Section;

    #[test]
    fn and_with_low_mask_known_zero_above() {
        let mut section = Section::new();
        let entry = section.build_block(&[Type::Int64]);
        let mut fb = FoldingBuilder::new(&mut section);
        fb.move_to_end(entry);
        let x = fb.section().arg(entry, 0);
        let sixty_three = fb.build_const(Type::Int64, 63);
        let masked = fb.fold_and(Type::Int64, x, sixty_three);
        fb.build_output(masked);
        section.autoname();

        let table = analyze(&section);
        let name = section.name_of(masked).unwrap();
        let bits = table.get(name);
        assert_eq!(bits.mask & !0x3fu64, !0x3fu64, "top bits above bit 5 must be known");
        assert_eq!(bits.value & !0x3fu64, 0);
    }
}
