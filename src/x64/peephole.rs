//! Peephole cleanups applied after register allocation, once every
//! operand is a concrete physical register.

use super::isel::{AluOp, Width};
use super::regalloc::{PInst, PRM, PhysProgram};

pub fn run(mut program: PhysProgram) -> PhysProgram {
    let next_in_layout: Vec<Option<crate::ir::Block>> =
        (0..program.blocks.len()).map(|i| program.blocks.get(i + 1).map(|b| b.block)).collect();

    for (i, block) in program.blocks.iter_mut().enumerate() {
        for inst in block.insts.iter_mut() {
            zero_idiom(inst);
        }
        if let Some(PInst::Jmp { target }) = block.insts.last() {
            if Some(*target) == next_in_layout[i] {
                block.insts.pop();
            }
        }
    }
    program
}

/// `mov {8,32,64} r, 0` carries a useless wide immediate; `xor r, r`
/// encodes in two bytes and clears the same bits.
fn zero_idiom(inst: &mut PInst) {
    if let PInst::MovImm { dst, imm: 0, .. } = *inst {
        *inst = PInst::Alu { op: AluOp::Xor, dst, rhs: PRM::Reg(dst), width: Width::B64 };
    }
}
