//! The folding builder: every `fold_<op>` entry point applies local
//! peephole simplification before falling back to inserting a plain
//! instruction. Every rule either returns an existing value, folds a
//! constant, or inserts exactly one new instruction — none recurse.

use super::Builder;
use crate::ir::{AliasGroup, BinArgs, Block, Const, InstKind, LoadFlags, Opcode, Section, Value};
use crate::types::Type;

pub struct FoldingBuilder<'s> {
    builder: Builder<'s>,
}

impl<'s> FoldingBuilder<'s> {
    pub fn new(section: &'s mut Section) -> Self {
        FoldingBuilder { builder: Builder::new(section) }
    }

    pub fn builder(&mut self) -> &mut Builder<'s> {
        &mut self.builder
    }

    pub fn move_to_end(&mut self, block: Block) -> &mut Self {
        self.builder.move_to_end(block);
        self
    }

    pub fn build_block(&mut self, param_types: &[Type]) -> Block {
        self.builder.build_block(param_types)
    }

    pub fn build_const(&self, ty: Type, bits: u64) -> Value {
        self.builder.build_const(ty, bits)
    }

    pub fn section(&self) -> &Section {
        self.builder.section()
    }

    // -- value inspection helpers -----------------------------------------

    fn as_const(&self, v: Value) -> Option<Const> {
        v.as_const()
    }

    fn bin_args(&self, v: Value) -> Option<(Opcode, BinArgs)> {
        let inst = v.as_inst()?;
        let kind = &self.section().inst(inst).kind;
        let op = kind.opcode();
        let args = match kind {
            InstKind::Add(b)
            | InstKind::Sub(b)
            | InstKind::Mul(b)
            | InstKind::DivU(b)
            | InstKind::DivS(b)
            | InstKind::ModU(b)
            | InstKind::ModS(b)
            | InstKind::And(b)
            | InstKind::Or(b)
            | InstKind::Xor(b)
            | InstKind::Shl(b)
            | InstKind::ShrU(b)
            | InstKind::ShrS(b)
            | InstKind::Eq(b)
            | InstKind::LtU(b)
            | InstKind::LtS(b) => Some(*b),
            _ => None,
        }?;
        Some((op, args))
    }

    fn add_ptr_args(&self, v: Value) -> Option<crate::ir::AddPtrData> {
        let inst = v.as_inst()?;
        match &self.section().inst(inst).kind {
            InstKind::AddPtr(a) => Some(*a),
            _ => None,
        }
    }

    fn select_args(&self, v: Value) -> Option<crate::ir::SelectData> {
        let inst = v.as_inst()?;
        match &self.section().inst(inst).kind {
            InstKind::Select(s) => Some(*s),
            _ => None,
        }
    }

    /// `x` such that `v == xor(x, all_ones)`, i.e. `v` is a bitwise
    /// complement of `x`. Relies on `fold_xor`'s commutative ordering
    /// always placing the constant operand on the right.
    fn as_not(&self, v: Value) -> Option<Value> {
        let (op, args) = self.bin_args(v)?;
        if op != Opcode::Xor {
            return None;
        }
        let rhs = self.as_const(args.rhs)?;
        let ty = self.section().type_of(args.lhs);
        if rhs.bits == ty.mask() {
            Some(args.lhs)
        } else {
            None
        }
    }

    fn build_not(&mut self, v: Value) -> Value {
        let ty = self.section().type_of(v);
        let ones = self.build_const(ty, ty.mask());
        self.fold_xor(ty, v, ones)
    }

    // -- distributive constant propagation over select --------------------

    /// `(c ? a : b) op (c ? d : e) -> c ? (a op d) : (b op e)` whenever
    /// both combined branches fold to constants. A scalar constant on
    /// either side is treated as `(c ? k : k)`.
    fn try_distribute_select(
        &mut self,
        ty: Type,
        lhs: Value,
        rhs: Value,
        op: impl Fn(&mut Self, Type, Value, Value) -> Value,
    ) -> Option<Value> {
        let lhs_sel = self.select_args(lhs);
        let rhs_sel = self.select_args(rhs);

        let (cond, (a, b), (d, e)) = match (lhs_sel, rhs_sel) {
            (Some(l), Some(r)) if l.cond == r.cond => (l.cond, (l.if_true, l.if_false), (r.if_true, r.if_false)),
            (Some(l), None) => {
                let k = self.as_const(rhs)?;
                let k = Value::Const(k);
                (l.cond, (l.if_true, l.if_false), (k, k))
            }
            (None, Some(r)) => {
                let k = self.as_const(lhs)?;
                let k = Value::Const(k);
                (r.cond, (k, k), (r.if_true, r.if_false))
            }
            _ => return None,
        };

        let true_branch = op(self, ty, a, d);
        let false_branch = op(self, ty, b, e);
        if self.as_const(true_branch).is_some() && self.as_const(false_branch).is_some() {
            Some(self.fold_select(cond, true_branch, false_branch, ty))
        } else {
            None
        }
    }

    fn eval_binop(op: Opcode, ty: Type, a: Const, b: Const) -> Option<u64> {
        let width = ty.bit_width();
        let bits = match op {
            Opcode::Add => a.bits.wrapping_add(b.bits),
            Opcode::Sub => a.bits.wrapping_sub(b.bits),
            Opcode::Mul => a.bits.wrapping_mul(b.bits),
            Opcode::DivU => {
                if b.bits == 0 {
                    return None;
                }
                a.bits / b.bits
            }
            Opcode::DivS => {
                if b.bits == 0 {
                    return None;
                }
                a.as_i64().wrapping_div(b.as_i64()) as u64
            }
            Opcode::ModU => {
                if b.bits == 0 {
                    return None;
                }
                a.bits % b.bits
            }
            Opcode::ModS => {
                if b.bits == 0 {
                    return None;
                }
                a.as_i64().wrapping_rem(b.as_i64()) as u64
            }
            Opcode::And => a.bits & b.bits,
            Opcode::Or => a.bits | b.bits,
            Opcode::Xor => a.bits ^ b.bits,
            Opcode::Shl => {
                let amt = b.bits;
                if amt >= width as u64 {
                    0
                } else {
                    a.bits.wrapping_shl(amt as u32)
                }
            }
            Opcode::ShrU => {
                let amt = b.bits;
                if amt >= width as u64 {
                    0
                } else {
                    a.bits.wrapping_shr(amt as u32)
                }
            }
            Opcode::ShrS => {
                let amt = b.bits;
                let shifted = if amt >= 64 { if a.as_i64() < 0 { -1 } else { 0 } } else { a.as_i64() >> amt.min(63) };
                shifted as u64
            }
            Opcode::Eq => (a.bits == b.bits) as u64,
            Opcode::LtU => (a.bits < b.bits) as u64,
            Opcode::LtS => (a.as_i64() < b.as_i64()) as u64,
            _ => unreachable!("eval_binop called with non-binary opcode"),
        };
        Some(bits)
    }

    // -- arithmetic ---------------------------------------------------------

    pub fn fold_add(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        let (lhs, rhs) = normalize_commutative(self, lhs, rhs);
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return lhs;
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::Add, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
            if let Some((Opcode::Add, inner)) = self.bin_args(lhs) {
                if let Some(c1) = self.as_const(inner.rhs) {
                    let sum = Self::eval_binop(Opcode::Add, ty, c1, rc).unwrap();
                    return self.fold_add(ty, inner.lhs, self.build_const(ty, sum));
                }
            }
        }
        if let Some(v) = self.try_distribute_select(ty, lhs, rhs, Self::fold_add) {
            return v;
        }
        self.builder.build_add(ty, lhs, rhs)
    }

    pub fn fold_sub(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let Some(rc) = self.as_const(rhs) {
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::Sub, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
            let neg = Const::new(ty, 0u64.wrapping_sub(rc.bits));
            return self.fold_add(ty, lhs, Value::Const(neg));
        }
        self.builder.build_sub(ty, lhs, rhs)
    }

    pub fn fold_mul(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        let (lhs, rhs) = normalize_commutative(self, lhs, rhs);
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return self.build_const(ty, 0);
            }
            if rc.bits == 1 {
                return lhs;
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::Mul, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_mul(ty, lhs, rhs)
    }

    pub fn fold_div_u(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let (Some(lc), Some(rc)) = (self.as_const(lhs), self.as_const(rhs)) {
            if let Some(bits) = Self::eval_binop(Opcode::DivU, ty, lc, rc) {
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_div_u(ty, lhs, rhs)
    }

    /// Signed division folding is left conservative: only both-constant
    /// operands with a nonzero divisor are folded, matching the host's
    /// wrapping semantics. See DESIGN.md for the open-question decision.
    pub fn fold_div_s(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let (Some(lc), Some(rc)) = (self.as_const(lhs), self.as_const(rhs)) {
            if let Some(bits) = Self::eval_binop(Opcode::DivS, ty, lc, rc) {
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_div_s(ty, lhs, rhs)
    }

    pub fn fold_mod_u(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits != 0 && rc.bits.is_power_of_two() {
                let mask = self.build_const(ty, rc.bits - 1);
                return self.fold_and(ty, lhs, mask);
            }
            if let Some(lc) = self.as_const(lhs) {
                if let Some(bits) = Self::eval_binop(Opcode::ModU, ty, lc, rc) {
                    return self.build_const(ty, bits);
                }
            }
        }
        self.builder.build_mod_u(ty, lhs, rhs)
    }

    pub fn fold_mod_s(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let (Some(lc), Some(rc)) = (self.as_const(lhs), self.as_const(rhs)) {
            if let Some(bits) = Self::eval_binop(Opcode::ModS, ty, lc, rc) {
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_mod_s(ty, lhs, rhs)
    }

    // -- bitwise --------------------------------------------------------------

    pub fn fold_and(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        let (lhs, rhs) = normalize_commutative(self, lhs, rhs);
        if lhs == rhs {
            return lhs;
        }
        if let Some(n) = self.as_not(lhs) {
            if n == rhs {
                return self.build_const(ty, 0);
            }
        }
        if let Some(n) = self.as_not(rhs) {
            if n == lhs {
                return self.build_const(ty, 0);
            }
        }
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == ty.mask() {
                return lhs;
            }
            if rc.bits == 0 {
                return self.build_const(ty, 0);
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::And, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        if let Some(v) = self.try_distribute_select(ty, lhs, rhs, Self::fold_and) {
            return v;
        }
        self.builder.build_and(ty, lhs, rhs)
    }

    pub fn fold_or(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        let (lhs, rhs) = normalize_commutative(self, lhs, rhs);
        if lhs == rhs {
            return lhs;
        }
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return lhs;
            }
            if rc.bits == ty.mask() {
                return self.build_const(ty, ty.mask());
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::Or, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_or(ty, lhs, rhs)
    }

    pub fn fold_xor(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        let (lhs, rhs) = normalize_commutative(self, lhs, rhs);
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return lhs;
            }
            if rc.bits == ty.mask() {
                if let Some(inner) = self.as_not(lhs) {
                    return inner;
                }
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::Xor, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_xor(ty, lhs, rhs)
    }

    pub fn fold_shl(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return lhs;
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::Shl, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_shl(ty, lhs, rhs)
    }

    pub fn fold_shr_u(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return lhs;
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::ShrU, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_shr_u(ty, lhs, rhs)
    }

    pub fn fold_shr_s(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return lhs;
            }
            if let Some(lc) = self.as_const(lhs) {
                let bits = Self::eval_binop(Opcode::ShrS, ty, lc, rc).unwrap();
                return self.build_const(ty, bits);
            }
        }
        self.builder.build_shr_s(ty, lhs, rhs)
    }

    // -- comparison -------------------------------------------------------------

    pub fn fold_eq(&mut self, lhs: Value, rhs: Value) -> Value {
        let (lhs, rhs) = normalize_commutative(self, lhs, rhs);
        let ty = self.section().type_of(lhs);
        if lhs == rhs {
            return self.build_const(Type::Bool, 1);
        }
        if ty == Type::Bool {
            if let Some(rc) = self.as_const(rhs) {
                if rc.bits == 1 {
                    return lhs;
                }
                if rc.bits == 0 {
                    return self.build_not(lhs);
                }
            }
        }
        if let Some((Opcode::Xor, args)) = self.bin_args(lhs) {
            if let Some(rc) = self.as_const(rhs) {
                if rc.bits == 0 {
                    return self.fold_eq(args.lhs, args.rhs);
                }
            }
        }
        if let (Some(lc), Some(rc)) = (self.as_const(lhs), self.as_const(rhs)) {
            let bits = Self::eval_binop(Opcode::Eq, ty, lc, rc).unwrap();
            return self.build_const(Type::Bool, bits);
        }
        self.builder.build_eq(lhs, rhs)
    }

    pub fn fold_lt_u(&mut self, lhs: Value, rhs: Value) -> Value {
        if let Some(rc) = self.as_const(rhs) {
            if rc.bits == 0 {
                return self.build_const(Type::Bool, 0);
            }
        }
        let ty = self.section().type_of(lhs);
        if let (Some(lc), Some(rc)) = (self.as_const(lhs), self.as_const(rhs)) {
            let bits = Self::eval_binop(Opcode::LtU, ty, lc, rc).unwrap();
            return self.build_const(Type::Bool, bits);
        }
        self.builder.build_lt_u(lhs, rhs)
    }

    pub fn fold_lt_s(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.section().type_of(lhs);
        if let (Some(lc), Some(rc)) = (self.as_const(lhs), self.as_const(rhs)) {
            let bits = Self::eval_binop(Opcode::LtS, ty, lc, rc).unwrap();
            return self.build_const(Type::Bool, bits);
        }
        self.builder.build_lt_s(lhs, rhs)
    }

    /// `ne(a, b) := not(eq(a, b))`.
    pub fn fold_ne(&mut self, lhs: Value, rhs: Value) -> Value {
        let e = self.fold_eq(lhs, rhs);
        self.build_not(e)
    }
    pub fn fold_gt_u(&mut self, lhs: Value, rhs: Value) -> Value {
        self.fold_lt_u(rhs, lhs)
    }
    pub fn fold_gt_s(&mut self, lhs: Value, rhs: Value) -> Value {
        self.fold_lt_s(rhs, lhs)
    }
    pub fn fold_le_u(&mut self, lhs: Value, rhs: Value) -> Value {
        let g = self.fold_gt_u(lhs, rhs);
        self.build_not(g)
    }
    pub fn fold_le_s(&mut self, lhs: Value, rhs: Value) -> Value {
        let g = self.fold_gt_s(lhs, rhs);
        self.build_not(g)
    }
    pub fn fold_ge_u(&mut self, lhs: Value, rhs: Value) -> Value {
        let l = self.fold_lt_u(lhs, rhs);
        self.build_not(l)
    }
    pub fn fold_ge_s(&mut self, lhs: Value, rhs: Value) -> Value {
        let l = self.fold_lt_s(lhs, rhs);
        self.build_not(l)
    }

    // -- casts --------------------------------------------------------------

    pub fn fold_resize_u(&mut self, v: Value, ty: Type) -> Value {
        let src_ty = self.section().type_of(v);
        if src_ty == ty {
            return v;
        }
        if let Some(c) = self.as_const(v) {
            return self.build_const(ty, c.bits);
        }
        self.builder.build_resize_u(v, ty)
    }

    pub fn fold_resize_s(&mut self, v: Value, ty: Type) -> Value {
        let src_ty = self.section().type_of(v);
        if src_ty == ty {
            return v;
        }
        if let Some(c) = self.as_const(v) {
            return self.build_const(ty, c.as_i64() as u64);
        }
        self.builder.build_resize_s(v, ty)
    }

    pub fn fold_resize_x(&mut self, v: Value, ty: Type) -> Value {
        let src_ty = self.section().type_of(v);
        if src_ty == ty {
            return v;
        }
        if let Some(c) = self.as_const(v) {
            return self.build_const(ty, c.bits);
        }
        self.builder.build_resize_x(v, ty)
    }

    // -- memory --------------------------------------------------------------

    pub fn fold_load(&mut self, ty: Type, ptr: Value, flags: LoadFlags, group: AliasGroup, offset: i64) -> Value {
        if let Some(a) = self.add_ptr_args(ptr) {
            return self.builder.build_load(ty, a.ptr, flags, group, offset.wrapping_add(a.offset));
        }
        self.builder.build_load(ty, ptr, flags, group, offset)
    }

    pub fn fold_store(&mut self, ptr: Value, value: Value, group: AliasGroup, offset: i64) {
        if let Some(a) = self.add_ptr_args(ptr) {
            self.builder.build_store(a.ptr, value, group, offset.wrapping_add(a.offset));
            return;
        }
        self.builder.build_store(ptr, value, group, offset);
    }

    pub fn fold_add_ptr(&mut self, ptr: Value, offset: i64) -> Value {
        if offset == 0 {
            return ptr;
        }
        if let Some(a) = self.add_ptr_args(ptr) {
            return self.builder.build_add_ptr(a.ptr, a.offset.wrapping_add(offset));
        }
        self.builder.build_add_ptr(ptr, offset)
    }

    // -- control flow / select ------------------------------------------------

    pub fn fold_select(&mut self, cond: Value, if_true: Value, if_false: Value, ty: Type) -> Value {
        if let Some(c) = self.as_const(cond) {
            return if c.as_bool() { if_true } else { if_false };
        }
        if if_true == if_false {
            return if_true;
        }
        if let Some(inner) = self.as_not(cond) {
            return self.fold_select(inner, if_false, if_true, ty);
        }
        if ty == Type::Bool {
            if let (Some(t), Some(f)) = (self.as_const(if_true), self.as_const(if_false)) {
                if t.bits == 1 && f.bits == 0 {
                    return cond;
                }
                if t.bits == 0 && f.bits == 1 {
                    return self.build_not(cond);
                }
            }
        }
        if let Some(s) = self.select_args(if_true) {
            if s.cond == cond {
                return self.fold_select(cond, s.if_true, if_false, ty);
            }
        }
        if let Some(s) = self.select_args(if_false) {
            if s.cond == cond {
                return self.fold_select(cond, if_true, s.if_false, ty);
            }
        }
        self.builder.build_select(cond, if_true, if_false, ty)
    }

    pub fn build_jump(&mut self, target: Block, args: &[Value]) {
        self.builder.build_jump(target, args);
    }

    pub fn fold_branch(&mut self, cond: Value, if_true: Block, if_false: Block) {
        if let Some(inner) = self.as_not(cond) {
            self.builder.build_branch(inner, if_false, if_true);
            return;
        }
        self.builder.build_branch(cond, if_true, if_false);
    }

    pub fn build_exit(&mut self) {
        self.builder.build_exit();
    }

    // -- pseudo --------------------------------------------------------------

    pub fn build_comment(&mut self, text: String) {
        self.builder.build_comment(text);
    }

    pub fn build_freeze(&mut self, v: Value, ty: Type) -> Value {
        self.builder.build_freeze(v, ty)
    }

    pub fn build_assume_const(&mut self, v: Value, ty: Type) -> Value {
        self.builder.build_assume_const(v, ty)
    }

    pub fn build_input(&mut self, index: u32, ty: Type) -> Value {
        self.builder.build_input(index, ty)
    }

    pub fn build_output(&mut self, v: Value) {
        self.builder.build_output(v);
    }
}

/// Commutative operations normalize so a constant operand, if any, ends
/// up on the right.
fn normalize_commutative(_fb: &FoldingBuilder<'_>, lhs: Value, rhs: Value) -> (Value, Value) {
    if lhs.is_const() && !rhs.is_const() {
        (rhs, lhs)
    } else {
        (lhs, rhs)
    }
}
