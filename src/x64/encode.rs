//! Flat-byte machine code emission.
//!
//! Each physical instruction has a fixed emission recipe: REX prefix (if
//! needed), opcode byte(s), ModR/M, SIB (if the addressing mode needs
//! one), displacement, immediate. Branches always use the 32-bit
//! relative form, so a single forward pass suffices: every branch
//! records a `Fixup` (buffer position of its displacement field, the
//! target block) and, once every block's start offset is known, a final
//! pass patches each displacement to `offset[target] - reference_point`
//! (`reference_point` is the first byte after the 4-byte field, since
//! x86 relative branches are relative to the next instruction).

use super::isel::{AluOp, Condition, ShiftOp, ShiftAmt, Width};
use super::regalloc::{PBlock, PInst, PRM, PhysProgram};
use super::vreg::PhysReg;
use crate::ir::Block;
use log::{debug, trace};
use rustc_hash::FxHashMap;

struct Fixup {
    pos: usize,
    target: Block,
}

pub struct EncodedCode {
    pub bytes: Vec<u8>,
}

pub fn encode(program: &PhysProgram) -> EncodedCode {
    let mut buf: Vec<u8> = Vec::new();
    let mut fixups: Vec<Fixup> = Vec::new();
    let mut block_offsets: FxHashMap<Block, usize> = FxHashMap::default();

    emit_prologue(&mut buf, program.frame_size);

    for block in &program.blocks {
        block_offsets.insert(block.block, buf.len());
        emit_block(&mut buf, block, &mut fixups, program.frame_size);
    }

    trace!("encode: resolving {} branch fixup(s)", fixups.len());
    for fixup in &fixups {
        let target_off = block_offsets[&fixup.target] as i64;
        let reference = (fixup.pos + 4) as i64;
        let disp = (target_off - reference) as i32;
        buf[fixup.pos..fixup.pos + 4].copy_from_slice(&disp.to_le_bytes());
    }

    debug!("encode: emitted {} byte(s) across {} block(s)", buf.len(), program.blocks.len());
    EncodedCode { bytes: buf }
}

fn emit_prologue(buf: &mut Vec<u8>, frame_size: u32) {
    // push rbp
    buf.push(0x55);
    // mov rbp, rsp
    push_rex(buf, true, false, false, false);
    buf.push(0x89);
    buf.push(modrm(0b11, PhysReg::Rsp.low_bits(), PhysReg::Rbp.low_bits()));
    if frame_size > 0 {
        // sub rsp, frame_size
        push_rex(buf, true, false, false, false);
        buf.push(0x81);
        buf.push(modrm(0b11, 5, PhysReg::Rsp.low_bits()));
        buf.extend_from_slice(&(frame_size as i32).to_le_bytes());
    }
}

fn emit_epilogue(buf: &mut Vec<u8>, frame_size: u32) {
    if frame_size > 0 {
        push_rex(buf, true, false, false, false);
        buf.push(0x81);
        buf.push(modrm(0b11, 0, PhysReg::Rsp.low_bits()));
        buf.extend_from_slice(&(frame_size as i32).to_le_bytes());
    }
    // pop rbp
    buf.push(0x5D);
    buf.push(0xC3);
}

fn modrm(mod_: u8, reg: u8, rm: u8) -> u8 {
    (mod_ << 6) | ((reg & 7) << 3) | (rm & 7)
}

fn sib(scale: u8, index: u8, base: u8) -> u8 {
    (scale << 6) | ((index & 7) << 3) | (base & 7)
}

fn push_rex(buf: &mut Vec<u8>, w: bool, r: bool, x: bool, b: bool) {
    if w || r || x || b {
        buf.push(0x40 | ((w as u8) << 3) | ((r as u8) << 2) | ((x as u8) << 1) | (b as u8));
    }
}

fn size_prefix(buf: &mut Vec<u8>, width: Width) {
    if width == Width::B16 {
        buf.push(0x66);
    }
}

/// ModR/M + optional SIB + disp32 for `[base + index*scale + disp]`
/// (`index` optional), used by loads, stores, and LEA.
fn emit_mem(buf: &mut Vec<u8>, reg: PhysReg, base: PhysReg, index: Option<(PhysReg, u8)>, disp: i32) {
    let needs_sib = base.low_bits() == 0b100 || index.is_some();
    if needs_sib {
        buf.push(modrm(0b10, reg.low_bits(), 0b100));
        let (idx_reg, scale) = index.unwrap_or((PhysReg::Rsp, 1));
        let scale_bits = match scale {
            1 => 0,
            2 => 1,
            4 => 2,
            8 => 3,
            _ => 0,
        };
        let idx_field = if index.is_some() { idx_reg.low_bits() } else { 0b100 };
        buf.push(sib(scale_bits, idx_field, base.low_bits()));
    } else {
        buf.push(modrm(0b10, reg.low_bits(), base.low_bits()));
    }
    buf.extend_from_slice(&disp.to_le_bytes());
}

fn rex_for_mem(buf: &mut Vec<u8>, w: bool, reg: PhysReg, base: PhysReg, index: Option<(PhysReg, u8)>) {
    let x = index.map(|(r, _)| r.is_extended()).unwrap_or(false);
    push_rex(buf, w, reg.is_extended(), x, base.is_extended());
}

fn alu_group1_ext(op: AluOp) -> u8 {
    match op {
        AluOp::Add => 0,
        AluOp::Or => 1,
        AluOp::And => 4,
        AluOp::Sub => 5,
        AluOp::Xor => 6,
        AluOp::Mul => unreachable!("imul has no group-1 immediate extension"),
    }
}

/// `r, r/m` direction opcode (dst = reg field, src = rm field) for the
/// register/register form of a two-address ALU op.
fn alu_rm_to_r_opcode(op: AluOp) -> u8 {
    match op {
        AluOp::Add => 0x03,
        AluOp::Sub => 0x2B,
        AluOp::And => 0x23,
        AluOp::Or => 0x0B,
        AluOp::Xor => 0x33,
        AluOp::Mul => unreachable!("imul uses its own two-byte opcode"),
    }
}

/// `r/m, r` direction opcode (dst = rm field, src = reg field), used for
/// the `add [mem], reg`-shaped folded store.
fn alu_r_to_rm_opcode(op: AluOp) -> u8 {
    match op {
        AluOp::Add => 0x01,
        AluOp::Sub => 0x29,
        AluOp::And => 0x21,
        AluOp::Or => 0x09,
        AluOp::Xor => 0x31,
        AluOp::Mul => unreachable!("imul cannot target memory directly"),
    }
}

fn cc_bits(cc: Condition) -> u8 {
    match cc {
        Condition::Eq => 0x4,
        Condition::Ne => 0x5,
        Condition::LtU => 0x2,
        Condition::GeU => 0x3,
        Condition::LtS => 0xC,
        Condition::GeS => 0xD,
    }
}

fn emit_block(buf: &mut Vec<u8>, block: &PBlock, fixups: &mut Vec<Fixup>, frame_size: u32) {
    for inst in &block.insts {
        emit_inst(buf, inst, fixups, frame_size);
    }
}

fn emit_inst(buf: &mut Vec<u8>, inst: &PInst, fixups: &mut Vec<Fixup>, frame_size: u32) {
    match inst {
        PInst::MovRR { dst, src } => {
            emit_rr_op(buf, Width::B64, 0x89, *src, *dst);
        }
        PInst::MovImm { dst, imm, width } => {
            push_rex(buf, true, false, false, dst.is_extended());
            buf.push(0xB8 | dst.low_bits());
            buf.extend_from_slice(&imm.to_le_bytes());
            let _ = width;
        }
        PInst::Load { dst, base, disp, width } => {
            let opcode = match width {
                Width::B8 => 0x8A,
                _ => 0x8B,
            };
            size_prefix(buf, *width);
            rex_for_mem(buf, *width == Width::B64, *dst, *base, None);
            buf.push(opcode);
            emit_mem(buf, *dst, *base, None, *disp);
        }
        PInst::Store { base, disp, src, width } => {
            let opcode = match width {
                Width::B8 => 0x88,
                _ => 0x89,
            };
            size_prefix(buf, *width);
            rex_for_mem(buf, *width == Width::B64, *src, *base, None);
            buf.push(opcode);
            emit_mem(buf, *src, *base, None, *disp);
        }
        PInst::Lea { dst, base, index, disp } => {
            rex_for_mem(buf, true, *dst, *base, *index);
            buf.push(0x8D);
            emit_mem(buf, *dst, *base, *index, *disp);
        }
        PInst::Alu { op, dst, rhs, width } => match (op, rhs) {
            (AluOp::Mul, PRM::Reg(r)) => {
                size_prefix(buf, *width);
                push_rex(buf, *width == Width::B64, dst.is_extended(), false, r.is_extended());
                buf.push(0x0F);
                buf.push(0xAF);
                buf.push(modrm(0b11, dst.low_bits(), r.low_bits()));
            }
            (AluOp::Mul, PRM::Imm(imm)) => {
                size_prefix(buf, *width);
                push_rex(buf, *width == Width::B64, dst.is_extended(), false, dst.is_extended());
                buf.push(0x69);
                buf.push(modrm(0b11, dst.low_bits(), dst.low_bits()));
                buf.extend_from_slice(&(*imm as i32).to_le_bytes());
            }
            (op, PRM::Reg(r)) => emit_rr_op(buf, *width, alu_rm_to_r_opcode(*op), *dst, *r),
            (op, PRM::Imm(imm)) => emit_group1_imm(buf, *width, alu_group1_ext(*op), *dst, *imm),
        },
        PInst::AluMem { op, base, disp, src, width } => {
            size_prefix(buf, *width);
            rex_for_mem(buf, *width == Width::B64, *src, *base, None);
            buf.push(alu_r_to_rm_opcode(*op));
            emit_mem(buf, *src, *base, None, *disp);
        }
        PInst::Cmp { lhs, rhs, width } => match rhs {
            PRM::Reg(r) => emit_rr_op(buf, *width, 0x3B, *lhs, *r),
            PRM::Imm(imm) => emit_group1_imm(buf, *width, 7, *lhs, *imm),
        },
        PInst::SetCc { dst, cc } => {
            push_rex(buf, false, false, false, dst.is_extended());
            buf.push(0x0F);
            buf.push(0x90 | cc_bits(*cc));
            buf.push(modrm(0b11, 0, dst.low_bits()));
        }
        PInst::CmovCc { dst, src, cc, width } => {
            push_rex(buf, *width == Width::B64, dst.is_extended(), false, src.is_extended());
            buf.push(0x0F);
            buf.push(0x40 | cc_bits(*cc));
            buf.push(modrm(0b11, dst.low_bits(), src.low_bits()));
        }
        PInst::Movzx { dst, src, src_width } => {
            push_rex(buf, true, dst.is_extended(), false, src.is_extended());
            buf.push(0x0F);
            buf.push(if *src_width == Width::B8 { 0xB6 } else { 0xB7 });
            buf.push(modrm(0b11, dst.low_bits(), src.low_bits()));
        }
        PInst::Movsx { dst, src, src_width } => {
            push_rex(buf, true, dst.is_extended(), false, src.is_extended());
            if *src_width == Width::B32 {
                buf.push(0x63);
            } else {
                buf.push(0x0F);
                buf.push(if *src_width == Width::B8 { 0xBE } else { 0xBF });
            }
            buf.push(modrm(0b11, dst.low_bits(), src.low_bits()));
        }
        PInst::Shift { op, dst, amt, width } => {
            let ext = match op {
                ShiftOp::Shl => 4,
                ShiftOp::ShrU => 5,
                ShiftOp::ShrS => 7,
            };
            size_prefix(buf, *width);
            push_rex(buf, *width == Width::B64, false, false, dst.is_extended());
            match amt {
                ShiftAmt::Imm(k) => {
                    buf.push(0xC1);
                    buf.push(modrm(0b11, ext, dst.low_bits()));
                    buf.push(*k);
                }
                ShiftAmt::Cl => {
                    buf.push(0xD3);
                    buf.push(modrm(0b11, ext, dst.low_bits()));
                }
            }
        }
        PInst::Cqo => {
            push_rex(buf, true, false, false, false);
            buf.push(0x99);
        }
        PInst::Div { signed, divisor, width } => {
            size_prefix(buf, *width);
            push_rex(buf, *width == Width::B64, false, false, divisor.is_extended());
            buf.push(0xF7);
            buf.push(modrm(0b11, if *signed { 7 } else { 6 }, divisor.low_bits()));
        }
        PInst::Jmp { target } => {
            buf.push(0xE9);
            let pos = buf.len();
            buf.extend_from_slice(&0i32.to_le_bytes());
            fixups.push(Fixup { pos, target: *target });
        }
        PInst::Jcc { cc, target } => {
            buf.push(0x0F);
            buf.push(0x80 | cc_bits(*cc));
            let pos = buf.len();
            buf.extend_from_slice(&0i32.to_le_bytes());
            fixups.push(Fixup { pos, target: *target });
        }
        PInst::Ret => emit_epilogue(buf, frame_size),
        PInst::SpillStore { slot, src, width } => {
            let disp = -((*slot as i32 + 1) * 8);
            size_prefix(buf, *width);
            rex_for_mem(buf, *width == Width::B64, *src, PhysReg::Rbp, None);
            buf.push(if *width == Width::B8 { 0x88 } else { 0x89 });
            emit_mem(buf, *src, PhysReg::Rbp, None, disp);
        }
        PInst::SpillLoad { dst, slot, width } => {
            let disp = -((*slot as i32 + 1) * 8);
            size_prefix(buf, *width);
            rex_for_mem(buf, *width == Width::B64, *dst, PhysReg::Rbp, None);
            buf.push(if *width == Width::B8 { 0x8A } else { 0x8B });
            emit_mem(buf, *dst, PhysReg::Rbp, None, disp);
        }
    }
}

fn emit_rr_op(buf: &mut Vec<u8>, width: Width, opcode: u8, reg: PhysReg, rm: PhysReg) {
    size_prefix(buf, width);
    push_rex(buf, width == Width::B64, reg.is_extended(), false, rm.is_extended());
    buf.push(opcode);
    buf.push(modrm(0b11, reg.low_bits(), rm.low_bits()));
}

fn emit_group1_imm(buf: &mut Vec<u8>, width: Width, ext: u8, dst: PhysReg, imm: i64) {
    size_prefix(buf, width);
    push_rex(buf, width == Width::B64, false, false, dst.is_extended());
    if imm >= i8::MIN as i64 && imm <= i8::MAX as i64 {
        buf.push(0x83);
        buf.push(modrm(0b11, ext, dst.low_bits()));
        buf.push(imm as i8 as u8);
    } else {
        buf.push(0x81);
        buf.push(modrm(0b11, ext, dst.low_bits()));
        buf.extend_from_slice(&(imm as i32).to_le_bytes());
    }
}
