//! Instruction selection: lowers a verified `Section` into per-block
//! sequences of pre-allocation x86-64 pseudo-instructions operating on
//! virtual registers.
//!
//! Selection walks each block in reverse. A `needed` set (seeded with
//! every side-effecting instruction and terminator) drives a simple
//! demand-driven tree match: selecting an instruction may consume one or
//! more of its producer instructions directly (folding them into an
//! addressing mode or a memory-form ALU op) rather than materializing
//! them into their own register, provided the producer has exactly one
//! use (so no other consumer still needs its raw value) and the fold is
//! permitted by `memdep`. Producers that are folded away are recorded in
//! `consumed` so the reverse walk skips emitting them a second time.

use super::memdep::{self, MemDeps};
use super::vreg::{PhysReg, VReg, VRegInfo};
use crate::analysis::uses::{self, Uses};
use crate::entity::{NameMap, PrimaryMap};
use crate::ir::{Block, Inst, InstKind, Name, Section, Value};
use crate::types::Type;
use rustc_hash::FxHashSet;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Width {
    B8,
    B16,
    B32,
    B64,
}

impl Width {
    pub fn of(ty: Type) -> Width {
        match ty {
            Type::Void => Width::B8,
            Type::Bool | Type::Int8 => Width::B8,
            Type::Int16 => Width::B16,
            Type::Int32 | Type::Float32 => Width::B32,
            Type::Int64 | Type::Float64 | Type::Ptr => Width::B64,
        }
    }

    pub fn bytes(self) -> u32 {
        match self {
            Width::B8 => 1,
            Width::B16 => 2,
            Width::B32 => 4,
            Width::B64 => 8,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Condition {
    Eq,
    Ne,
    LtU,
    GeU,
    LtS,
    GeS,
}

impl Condition {
    pub fn negate(self) -> Condition {
        match self {
            Condition::Eq => Condition::Ne,
            Condition::Ne => Condition::Eq,
            Condition::LtU => Condition::GeU,
            Condition::GeU => Condition::LtU,
            Condition::LtS => Condition::GeS,
            Condition::GeS => Condition::LtS,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Mul,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ShiftOp {
    Shl,
    ShrU,
    ShrS,
}

/// The right-hand operand of a two-address ALU or compare instruction.
#[derive(Copy, Clone, Debug)]
pub enum RM {
    Reg(VReg),
    Imm(i64),
}

#[derive(Copy, Clone, Debug)]
pub enum ShiftAmt {
    Imm(u8),
    /// The shift count is already in the fixed `rcx` vreg.
    Cl,
}

/// A single x86-64 pseudo-instruction, operands still virtual registers.
/// One-for-one with the recipes `encode` knows how to emit, after
/// `regalloc` has resolved every `VReg` to a `PhysReg` (or a stack slot,
/// materialized as an explicit spill load/store around the instruction).
#[derive(Clone, Debug)]
pub enum X86Inst {
    MovRR { dst: VReg, src: VReg },
    MovImm { dst: VReg, imm: i64, width: Width },
    Load { dst: VReg, base: VReg, disp: i32, width: Width },
    Store { base: VReg, disp: i32, src: VReg, width: Width },
    Lea { dst: VReg, base: VReg, index: Option<(VReg, u8)>, disp: i32 },
    Alu { op: AluOp, dst: VReg, rhs: RM, width: Width },
    /// Folded `store(add(load(p), x))`-shaped read-modify-write.
    AluMem { op: AluOp, base: VReg, disp: i32, src: VReg, width: Width },
    Cmp { lhs: VReg, rhs: RM, width: Width },
    SetCc { dst: VReg, cc: Condition },
    CmovCc { dst: VReg, src: VReg, cc: Condition, width: Width },
    Movzx { dst: VReg, src: VReg, src_width: Width },
    Movsx { dst: VReg, src: VReg, src_width: Width },
    Shift { op: ShiftOp, dst: VReg, amt: ShiftAmt, width: Width },
    /// Sign-extends `rax` into `rdx` ahead of a signed division.
    Cqo,
    /// `rax`/`rdx` are implicit; `divisor` and the instruction's own
    /// width select the encoding. Quotient ends in `rax`, remainder in
    /// `rdx`.
    Div { signed: bool, divisor: VReg, width: Width },
    Jmp { target: Block },
    Jcc { cc: Condition, target: Block },
    Ret,
    /// Forces `vreg` to remain resident without otherwise affecting it;
    /// used after loops (keep pre-loop values live across the backedge)
    /// and around div/mod (pin the non-result half of `rdx:rax`).
    /// Erased by `regalloc` once its liveness job is done.
    PseudoUse { vreg: VReg },
}

pub struct X86Block {
    pub block: Block,
    pub insts: Vec<X86Inst>,
}

pub struct IselOutput {
    pub blocks: Vec<X86Block>,
    /// `None` for names that were never materialized into a register
    /// (the IR value existed but isel found no live use of it).
    pub vreg_of: NameMap<Name, Option<VReg>>,
    pub vreg_info: PrimaryMap<VReg, VRegInfo>,
    /// Entry-block parameters, in order, and the physical register each
    /// is pinned to — the calling convention `deploy`'s caller must
    /// honor.
    pub entry_pins: Vec<(VReg, PhysReg)>,
}

struct Ctx<'s> {
    section: &'s Section,
    uses: Uses,
    memdeps: MemDeps,
    vreg_of: NameMap<Name, Option<VReg>>,
    vreg_info: PrimaryMap<VReg, VRegInfo>,
    needed: FxHashSet<Inst>,
    consumed: FxHashSet<Inst>,
}

impl<'s> Ctx<'s> {
    fn vreg(&mut self, v: Value) -> VReg {
        match v {
            Value::Const(c) => {
                // Constants are materialized at point of use via MovImm
                // by the caller; callers needing a VReg for a constant
                // should prefer `RM::Imm` where the recipe allows it.
                // Here we fall back to allocating a fresh vreg the
                // caller is responsible for initializing.
                let _ = c;
                self.vreg_info.push(VRegInfo::default())
            }
            _ => match self.section.name_of(v) {
                Some(name) => {
                    if let Some(existing) = self.vreg_of.get(name) {
                        return existing;
                    }
                    let vr = self.vreg_info.push(VRegInfo::default());
                    self.vreg_of.set(name, Some(vr));
                    vr
                }
                None => self.vreg_info.push(VRegInfo::default()),
            },
        }
    }

    fn need(&mut self, v: Value) {
        if let Value::Inst(i) = v {
            self.needed.insert(i);
        }
    }

    fn single_use_producer(&self, v: Value) -> Option<Inst> {
        match v {
            Value::Inst(i) if self.uses.of(i).len() == 1 => Some(i),
            _ => None,
        }
    }

    fn imm_of(&self, v: Value) -> Option<i64> {
        match v {
            Value::Const(c) => Some(c.bits as i64),
            _ => None,
        }
    }
}

pub fn select(section: &Section, input_regs: &[PhysReg]) -> IselOutput {
    let uses = uses::analyze(section);
    let memdeps = memdep::analyze(section);

    let mut ctx = Ctx {
        section,
        uses,
        memdeps,
        vreg_of: NameMap::with_capacity(section.name_count()),
        vreg_info: PrimaryMap::new(),
        needed: FxHashSet::default(),
        consumed: FxHashSet::default(),
    };

    // Entry-block parameters are pre-pinned to the supplied physical
    // registers.
    let entry = section.entry();
    let mut entry_pins = Vec::new();
    for (index, &reg) in input_regs.iter().enumerate() {
        let arg = section.arg(entry, index as u32);
        let vr = ctx.vreg(arg);
        ctx.vreg_info[vr].fixed = Some(reg);
        entry_pins.push((vr, reg));
    }

    seed_needed(&mut ctx);

    let mut blocks = Vec::new();
    for block in section.blocks() {
        let insts = select_block(&mut ctx, block);
        blocks.push(X86Block { block, insts });
    }

    IselOutput { blocks, vreg_of: ctx.vreg_of, vreg_info: ctx.vreg_info, entry_pins }
}

fn seed_needed(ctx: &mut Ctx) {
    for block in ctx.section.blocks().collect::<Vec<_>>() {
        for inst in ctx.section.insts_forward(block) {
            let opcode = ctx.section.inst(inst).kind.opcode();
            if opcode.has_side_effect() || opcode.is_terminator() {
                ctx.needed.insert(inst);
            }
        }
    }
}

fn select_block(ctx: &mut Ctx, block: Block) -> Vec<X86Inst> {
    let mut out = Vec::new();
    let insts: Vec<Inst> = ctx.section.insts_forward(block).collect();
    for &inst in insts.iter().rev() {
        if ctx.consumed.contains(&inst) {
            continue;
        }
        let opcode = ctx.section.inst(inst).kind.opcode();
        if !ctx.needed.contains(&inst) && !opcode.has_side_effect() && !opcode.is_terminator() {
            continue; // unused pure op, nothing left needs it
        }
        // `select_inst` appends this instruction's pieces in forward
        // order into a group of its own; reverse just the group before
        // folding it into `out`, so the final whole-vector reverse below
        // undoes this and restores forward order *within* each group,
        // while still reversing the (correct) order *between* groups.
        let mut group = Vec::new();
        select_inst(ctx, &mut group, inst);
        group.reverse();
        out.extend(group);
    }
    out.reverse();
    out
}

fn select_inst(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst) {
    let ty = ctx.section.inst(inst).ty;
    let width = Width::of(ty);
    let kind = ctx.section.inst(inst).kind.clone();

    match &kind {
        InstKind::Add(b) | InstKind::Sub(b) | InstKind::Mul(b) | InstKind::And(b)
        | InstKind::Or(b) | InstKind::Xor(b) => {
            select_binop(ctx, out, inst, &kind, b.lhs, b.rhs, width);
        }
        InstKind::DivU(b) | InstKind::DivS(b) | InstKind::ModU(b) | InstKind::ModS(b) => {
            select_divmod(ctx, out, inst, &kind, b.lhs, b.rhs, width);
        }
        InstKind::Shl(b) | InstKind::ShrU(b) | InstKind::ShrS(b) => {
            select_shift(ctx, out, inst, &kind, b.lhs, b.rhs, width);
        }
        InstKind::Eq(b) | InstKind::LtU(b) | InstKind::LtS(b) => {
            let cc = condition_of(&kind);
            let lty = ctx.section.type_of(b.lhs);
            let dst = ctx.vreg(Value::Inst(inst));
            emit_cmp(ctx, out, b.lhs, b.rhs, Width::of(lty));
            out.push(X86Inst::SetCc { dst, cc });
        }
        InstKind::ResizeU(src) => select_resize_u(ctx, out, inst, *src, width),
        InstKind::ResizeS(src) => select_resize_s(ctx, out, inst, *src, width),
        InstKind::ResizeX(src) => {
            let dst = ctx.vreg(Value::Inst(inst));
            let src_vr = materialize(ctx, out, *src);
            out.push(X86Inst::MovRR { dst, src: src_vr });
        }
        InstKind::Select(s) => select_select(ctx, out, inst, s, width),
        InstKind::Load(l) => {
            let dst = ctx.vreg(Value::Inst(inst));
            let base = materialize(ctx, out, l.ptr);
            out.push(X86Inst::Load { dst, base, disp: l.offset as i32, width });
        }
        InstKind::Store(s) => select_store(ctx, out, inst, s, width),
        InstKind::AddPtr(a) => {
            let dst = ctx.vreg(Value::Inst(inst));
            let base = materialize(ctx, out, a.ptr);
            out.push(X86Inst::Lea { dst, base, index: None, disp: a.offset as i32 });
        }
        InstKind::Jump(j) => {
            for (index, &arg) in j.args.as_slice().iter().enumerate() {
                let target_arg = ctx.section.arg(j.target, index as u32);
                let tw = Width::of(ctx.section.type_of(target_arg));
                let dst = ctx.vreg(target_arg);
                move_into(ctx, out, dst, arg, tw);
            }
            out.push(X86Inst::Jmp { target: j.target });
        }
        InstKind::Branch(b) => {
            if let Some(producer) = ctx.single_use_producer(b.cond) {
                let pk = ctx.section.inst(producer).kind.clone();
                if let Some(cc) = comparison_cc(&pk) {
                    if let InstKind::Eq(bin) | InstKind::LtU(bin) | InstKind::LtS(bin) = &pk {
                        let lty = ctx.section.type_of(bin.lhs);
                        emit_cmp(ctx, out, bin.lhs, bin.rhs, Width::of(lty));
                        out.push(X86Inst::Jcc { cc, target: b.if_true });
                        out.push(X86Inst::Jmp { target: b.if_false });
                        ctx.consumed.insert(producer);
                        return;
                    }
                }
            }
            let cond_vr = materialize(ctx, out, b.cond);
            out.push(X86Inst::Cmp { lhs: cond_vr, rhs: RM::Imm(0), width: Width::B8 });
            out.push(X86Inst::Jcc { cc: Condition::Ne, target: b.if_true });
            out.push(X86Inst::Jmp { target: b.if_false });
        }
        InstKind::Exit => {
            out.push(X86Inst::Ret);
        }
        InstKind::Comment(_) => {}
        InstKind::Freeze(src) | InstKind::AssumeConst(src) => {
            let dst = ctx.vreg(Value::Inst(inst));
            let src_vr = materialize(ctx, out, *src);
            out.push(X86Inst::MovRR { dst, src: src_vr });
        }
        InstKind::Input(_) => {
            // Bound to a fixed physical register by the caller of
            // `select` via `input_regs`; nothing to emit.
            ctx.vreg(Value::Inst(inst));
        }
        InstKind::Output(v) => {
            let _ = materialize(ctx, out, *v);
        }
    }
}

fn condition_of(kind: &InstKind) -> Condition {
    match kind {
        InstKind::Eq(_) => Condition::Eq,
        InstKind::LtU(_) => Condition::LtU,
        InstKind::LtS(_) => Condition::LtS,
        _ => unreachable!("condition_of called on a non-comparison opcode"),
    }
}

fn comparison_cc(kind: &InstKind) -> Option<Condition> {
    match kind {
        InstKind::Eq(_) | InstKind::LtU(_) | InstKind::LtS(_) => Some(condition_of(kind)),
        _ => None,
    }
}

fn alu_op(kind: &InstKind) -> AluOp {
    match kind {
        InstKind::Add(_) => AluOp::Add,
        InstKind::Sub(_) => AluOp::Sub,
        InstKind::Mul(_) => AluOp::Mul,
        InstKind::And(_) => AluOp::And,
        InstKind::Or(_) => AluOp::Or,
        InstKind::Xor(_) => AluOp::Xor,
        _ => unreachable!("alu_op called on a non-arithmetic opcode"),
    }
}

/// Copy `v` into the already-allocated `dst` vreg (constants fold into
/// an immediate move, named values into a register move).
fn move_into(ctx: &mut Ctx, out: &mut Vec<X86Inst>, dst: VReg, v: Value, width: Width) {
    match ctx.imm_of(v) {
        Some(imm) => out.push(X86Inst::MovImm { dst, imm, width }),
        None => {
            let src = materialize(ctx, out, v);
            out.push(X86Inst::MovRR { dst, src });
        }
    }
}

/// Ensure `v` has a concrete vreg, emitting whatever is necessary
/// (marking its producer needed, or materializing a constant) and
/// returning that vreg.
fn materialize(ctx: &mut Ctx, out: &mut Vec<X86Inst>, v: Value) -> VReg {
    match v {
        Value::Const(c) => {
            let vr = ctx.vreg_info.push(VRegInfo::default());
            out.push(X86Inst::MovImm { dst: vr, imm: c.bits as i64, width: Width::of(c.ty) });
            vr
        }
        _ => {
            ctx.need(v);
            ctx.vreg(v)
        }
    }
}

fn select_binop(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, kind: &InstKind, lhs: Value, rhs: Value, width: Width) {
    // Every pointer-typed add lowers through LEA: a constant addend folds
    // into the displacement, `mul(idx, {2,4,8})` folds into a scaled
    // index, and anything else falls back to `lea [base + idx*1 + 0]`.
    if matches!(kind, InstKind::Add(_)) && ctx.section.type_of(Value::Inst(inst)) == Type::Ptr {
        if let Some(disp) = ctx.imm_of(rhs) {
            let dst = ctx.vreg(Value::Inst(inst));
            let base = materialize(ctx, out, lhs);
            out.push(X86Inst::Lea { dst, base, index: None, disp: disp as i32 });
            return;
        }
        if let Some(mul_inst) = ctx.single_use_producer(rhs) {
            if let InstKind::Mul(b) = ctx.section.inst(mul_inst).kind.clone() {
                let scaled = ctx
                    .imm_of(b.rhs)
                    .filter(|s| matches!(s, 2 | 4 | 8))
                    .map(|s| (b.lhs, s as u8))
                    .or_else(|| {
                        ctx.imm_of(b.lhs).filter(|s| matches!(s, 2 | 4 | 8)).map(|s| (b.rhs, s as u8))
                    });
                if let Some((idx_val, scale)) = scaled {
                    let dst = ctx.vreg(Value::Inst(inst));
                    let base = materialize(ctx, out, lhs);
                    let idx = materialize(ctx, out, idx_val);
                    out.push(X86Inst::Lea { dst, base, index: Some((idx, scale)), disp: 0 });
                    ctx.consumed.insert(mul_inst);
                    return;
                }
            }
        }
        let dst = ctx.vreg(Value::Inst(inst));
        let base = materialize(ctx, out, lhs);
        let idx = materialize(ctx, out, rhs);
        out.push(X86Inst::Lea { dst, base, index: Some((idx, 1)), disp: 0 });
        return;
    }

    let op = alu_op(kind);
    let dst = ctx.vreg(Value::Inst(inst));

    // Commutative ops may put either side first; prefer a constant on
    // the right so it folds into an immediate form.
    let (a, b) = if op != AluOp::Sub && ctx.imm_of(lhs).is_some() && ctx.imm_of(rhs).is_none() {
        (rhs, lhs)
    } else {
        (lhs, rhs)
    };

    move_into(ctx, out, dst, a, width);
    match ctx.imm_of(b) {
        Some(imm) => out.push(X86Inst::Alu { op, dst, rhs: RM::Imm(imm), width }),
        None => {
            let src = materialize(ctx, out, b);
            out.push(X86Inst::Alu { op, dst, rhs: RM::Reg(src), width });
        }
    }
}

fn select_shift(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, kind: &InstKind, lhs: Value, rhs: Value, width: Width) {
    let op = match kind {
        InstKind::Shl(_) => ShiftOp::Shl,
        InstKind::ShrU(_) => ShiftOp::ShrU,
        InstKind::ShrS(_) => ShiftOp::ShrS,
        _ => unreachable!(),
    };
    let dst = ctx.vreg(Value::Inst(inst));
    move_into(ctx, out, dst, lhs, width);
    match ctx.imm_of(rhs) {
        Some(imm) => out.push(X86Inst::Shift { op, dst, amt: ShiftAmt::Imm(imm as u8), width }),
        None => {
            // Shift-by-register goes through the fixed `rcx` slot.
            let amt_src = materialize(ctx, out, rhs);
            let rcx = ctx.vreg_info.push(VRegInfo::default());
            ctx.vreg_info[rcx].fixed = Some(PhysReg::Rcx);
            out.push(X86Inst::MovRR { dst: rcx, src: amt_src });
            out.push(X86Inst::Shift { op, dst, amt: ShiftAmt::Cl, width });
        }
    }
}

fn select_divmod(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, kind: &InstKind, lhs: Value, rhs: Value, width: Width) {
    let (signed, wants_remainder) = match kind {
        InstKind::DivU(_) => (false, false),
        InstKind::DivS(_) => (true, false),
        InstKind::ModU(_) => (false, true),
        InstKind::ModS(_) => (true, true),
        _ => unreachable!(),
    };

    let rax = ctx.vreg_info.push(VRegInfo::default());
    ctx.vreg_info[rax].fixed = Some(PhysReg::Rax);
    let rdx = ctx.vreg_info.push(VRegInfo::default());
    ctx.vreg_info[rdx].fixed = Some(PhysReg::Rdx);

    move_into(ctx, out, rax, lhs, width);
    if signed {
        out.push(X86Inst::Cqo);
    } else {
        out.push(X86Inst::MovImm { dst: rdx, imm: 0, width });
    }
    let divisor = materialize(ctx, out, rhs);
    out.push(X86Inst::Div { signed, divisor, width });

    let dst = ctx.vreg(Value::Inst(inst));
    if wants_remainder {
        out.push(X86Inst::MovRR { dst, src: rdx });
        out.push(X86Inst::PseudoUse { vreg: rax });
    } else {
        out.push(X86Inst::MovRR { dst, src: rax });
        out.push(X86Inst::PseudoUse { vreg: rdx });
    }
}

fn select_resize_u(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, src: Value, dst_width: Width) {
    let src_ty = ctx.section.type_of(src);
    let dst = ctx.vreg(Value::Inst(inst));
    if src_ty == Type::Bool {
        move_into(ctx, out, dst, src, dst_width);
        out.push(X86Inst::Alu { op: AluOp::And, dst, rhs: RM::Imm(1), width: dst_width });
        return;
    }
    let src_width = Width::of(src_ty);
    if dst_width.bytes() > src_width.bytes() {
        let src_vr = materialize(ctx, out, src);
        out.push(X86Inst::Movzx { dst, src: src_vr, src_width });
    } else {
        move_into(ctx, out, dst, src, dst_width);
        let mask = if dst_width.bytes() >= 8 { u64::MAX } else { (1u64 << (dst_width.bytes() * 8)) - 1 };
        out.push(X86Inst::Alu { op: AluOp::And, dst, rhs: RM::Imm(mask as i64), width: dst_width });
    }
}

fn select_resize_s(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, src: Value, dst_width: Width) {
    let src_ty = ctx.section.type_of(src);
    let dst = ctx.vreg(Value::Inst(inst));
    if src_ty == Type::Bool {
        // 0/1 -> 0/-1: negate after masking to the low bit.
        let src_vr = materialize(ctx, out, src);
        out.push(X86Inst::MovRR { dst, src: src_vr });
        out.push(X86Inst::Alu { op: AluOp::And, dst, rhs: RM::Imm(1), width: dst_width });
        out.push(X86Inst::Cmp { lhs: dst, rhs: RM::Imm(0), width: dst_width });
        out.push(X86Inst::MovImm { dst, imm: 0, width: dst_width });
        let neg_one = ctx.vreg_info.push(VRegInfo::default());
        out.push(X86Inst::MovImm { dst: neg_one, imm: -1, width: dst_width });
        out.push(X86Inst::CmovCc { dst, src: neg_one, cc: Condition::Ne, width: dst_width });
        return;
    }
    let src_width = Width::of(src_ty);
    if dst_width.bytes() > src_width.bytes() {
        let src_vr = materialize(ctx, out, src);
        out.push(X86Inst::Movsx { dst, src: src_vr, src_width });
    } else {
        move_into(ctx, out, dst, src, dst_width);
    }
}

fn select_select(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, s: &crate::ir::SelectData, width: Width) {
    let dst = ctx.vreg(Value::Inst(inst));
    if let Some(producer) = ctx.single_use_producer(s.cond) {
        let pk = ctx.section.inst(producer).kind.clone();
        if let Some(cc) = comparison_cc(&pk) {
            if let InstKind::Eq(b) | InstKind::LtU(b) | InstKind::LtS(b) = &pk {
                let lty = ctx.section.type_of(b.lhs);
                move_into(ctx, out, dst, s.if_false, width);
                emit_cmp(ctx, out, b.lhs, b.rhs, Width::of(lty));
                let true_vr = materialize(ctx, out, s.if_true);
                out.push(X86Inst::CmovCc { dst, src: true_vr, cc, width });
                ctx.consumed.insert(producer);
                return;
            }
        }
    }
    move_into(ctx, out, dst, s.if_false, width);
    let cond_vr = materialize(ctx, out, s.cond);
    out.push(X86Inst::Cmp { lhs: cond_vr, rhs: RM::Imm(0), width: Width::B8 });
    let true_vr = materialize(ctx, out, s.if_true);
    out.push(X86Inst::CmovCc { dst, src: true_vr, cc: Condition::Ne, width });
}

fn emit_cmp(ctx: &mut Ctx, out: &mut Vec<X86Inst>, lhs: Value, rhs: Value, width: Width) {
    let lhs_vr = materialize(ctx, out, lhs);
    match ctx.imm_of(rhs) {
        Some(imm) => out.push(X86Inst::Cmp { lhs: lhs_vr, rhs: RM::Imm(imm), width }),
        None => {
            let rhs_vr = materialize(ctx, out, rhs);
            out.push(X86Inst::Cmp { lhs: lhs_vr, rhs: RM::Reg(rhs_vr), width });
        }
    }
}

fn select_store(ctx: &mut Ctx, out: &mut Vec<X86Inst>, inst: Inst, s: &crate::ir::StoreData, width: Width) {
    // Fuse `store(p, add(load(p), x))` into `add [mem], x` when the load
    // and the store see the same memory state.
    if let Some(add_inst) = ctx.single_use_producer(s.value) {
        let add_kind = ctx.section.inst(add_inst).kind.clone();
        if let InstKind::Add(b) | InstKind::Sub(b) | InstKind::And(b) | InstKind::Or(b) | InstKind::Xor(b) =
            &add_kind
        {
            if let Value::Inst(load_inst) = b.lhs {
                if let InstKind::Load(l) = &ctx.section.inst(load_inst).kind {
                    if l.ptr == s.ptr
                        && l.group == s.group
                        && l.offset == s.offset
                        && ctx.uses.of(load_inst).len() == 1
                        && ctx.memdeps.mergeable(load_inst, inst)
                    {
                        let op = alu_op(&add_kind);
                        let base = materialize(ctx, out, s.ptr);
                        let src = materialize(ctx, out, b.rhs);
                        out.push(X86Inst::AluMem { op, base, disp: s.offset as i32, src, width });
                        ctx.consumed.insert(add_inst);
                        ctx.consumed.insert(load_inst);
                        return;
                    }
                }
            }
        }
    }

    let base = materialize(ctx, out, s.ptr);
    let value_ty = ctx.section.type_of(s.value);
    let value_width = Width::of(value_ty);
    let src = if value_ty == Type::Bool {
        // Mask to the low bit first so the stored byte is always 0/1,
        // regardless of how the boolean was produced.
        let raw = materialize(ctx, out, s.value);
        let masked = ctx.vreg_info.push(VRegInfo::default());
        out.push(X86Inst::MovRR { dst: masked, src: raw });
        out.push(X86Inst::Alu { op: AluOp::And, dst: masked, rhs: RM::Imm(1), width: Width::B8 });
        masked
    } else {
        materialize(ctx, out, s.value)
    };
    out.push(X86Inst::Store { base, disp: s.offset as i32, src, width: value_width });
}
