//! The x86-64 backend: instruction selection, register allocation,
//! peephole cleanup, encoding, and deployment into executable memory.
//!
//! ```text
//! Section -> isel::select -> regalloc::run -> peephole::run -> encode::encode -> deploy
//! ```
//!
//! Memory-dependence analysis (`memdep`) runs inside `isel::select`
//! itself, gating the store/load fusion peepholes.

pub mod deploy;
pub mod encode;
pub mod isel;
pub mod memdep;
pub mod peephole;
pub mod regalloc;
pub mod vreg;

use crate::entity::EntityRef;
use crate::error::CodegenResult;
use crate::ir::Section;
use std::io::{self, Write};
use std::path::Path;

pub use vreg::PhysReg;

/// Compiles one `Section` into executable x86-64 machine code.
///
/// Built from a section whose entry block's parameter count matches
/// `input_physical_regs`: those parameters are pinned to the given
/// registers rather than assigned by the allocator, fixing the calling
/// convention the deployed function expects.
pub struct X86CodeGen {
    program: regalloc::PhysProgram,
    code: Vec<u8>,
}

impl X86CodeGen {
    pub fn new(mut section: Section, input_physical_regs: &[PhysReg]) -> Self {
        section.autoname();
        let selected = isel::select(&section, input_physical_regs);
        let allocated = regalloc::run(selected);
        let program = peephole::run(allocated);
        let code = encode::encode(&program).bytes;
        X86CodeGen { program, code }
    }

    /// Map the encoded bytes into executable memory and return a typed
    /// callable over it. The returned `ExecutableCode` owns the mapping;
    /// the function pointer is only valid as long as it's alive.
    pub fn deploy(&self) -> CodegenResult<deploy::ExecutableCode> {
        deploy::ExecutableCode::new(&self.code)
    }

    /// Raw encoded bytes, for inspection or handing to an external
    /// loader.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Write the raw encoded bytes to `path`.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        deploy::save(&self.code, path)
    }

    /// Emit a textual disassembly-like listing of the selected,
    /// allocated, peephole-cleaned program (physical registers, not the
    /// original IR).
    pub fn write(&self, w: &mut dyn Write) -> io::Result<()> {
        for block in &self.program.blocks {
            writeln!(w, "b{}:", block.block.index())?;
            for inst in &block.insts {
                writeln!(w, "  {}", fmt_inst(inst))?;
            }
        }
        Ok(())
    }
}

fn fmt_inst(inst: &regalloc::PInst) -> String {
    use regalloc::PInst;
    match inst {
        PInst::MovRR { dst, src } => format!("mov {}, {}", dst.name64(), src.name64()),
        PInst::MovImm { dst, imm, .. } => format!("mov {}, {}", dst.name64(), imm),
        PInst::Load { dst, base, disp, .. } => {
            format!("mov {}, [{} + {}]", dst.name64(), base.name64(), disp)
        }
        PInst::Store { base, disp, src, .. } => {
            format!("mov [{} + {}], {}", base.name64(), disp, src.name64())
        }
        PInst::Lea { dst, base, index, disp } => match index {
            Some((idx, scale)) => format!(
                "lea {}, [{} + {}*{} + {}]",
                dst.name64(),
                base.name64(),
                idx.name64(),
                scale,
                disp
            ),
            None => format!("lea {}, [{} + {}]", dst.name64(), base.name64(), disp),
        },
        PInst::Alu { op, dst, rhs, .. } => {
            format!("{} {}, {}", alu_mnemonic(*op), dst.name64(), fmt_prm(rhs))
        }
        PInst::AluMem { op, base, disp, src, .. } => {
            format!("{} [{} + {}], {}", alu_mnemonic(*op), base.name64(), disp, src.name64())
        }
        PInst::Cmp { lhs, rhs, .. } => format!("cmp {}, {}", lhs.name64(), fmt_prm(rhs)),
        PInst::SetCc { dst, cc } => format!("set{} {}", cc_mnemonic(*cc), dst.name64()),
        PInst::CmovCc { dst, src, cc, .. } => {
            format!("cmov{} {}, {}", cc_mnemonic(*cc), dst.name64(), src.name64())
        }
        PInst::Movzx { dst, src, .. } => format!("movzx {}, {}", dst.name64(), src.name64()),
        PInst::Movsx { dst, src, .. } => format!("movsx {}, {}", dst.name64(), src.name64()),
        PInst::Shift { op, dst, amt, .. } => {
            let amt_s = match amt {
                isel::ShiftAmt::Imm(k) => k.to_string(),
                isel::ShiftAmt::Cl => "cl".to_string(),
            };
            format!("{} {}, {}", shift_mnemonic(*op), dst.name64(), amt_s)
        }
        PInst::Cqo => "cqo".to_string(),
        PInst::Div { signed, divisor, .. } => {
            format!("{} {}", if *signed { "idiv" } else { "div" }, divisor.name64())
        }
        PInst::Jmp { target } => format!("jmp b{}", target.index()),
        PInst::Jcc { cc, target } => format!("j{} b{}", cc_mnemonic(*cc), target.index()),
        PInst::Ret => "ret".to_string(),
        PInst::SpillStore { slot, src, .. } => format!("mov [rbp - {}], {}", (slot + 1) * 8, src.name64()),
        PInst::SpillLoad { dst, slot, .. } => format!("mov {}, [rbp - {}]", dst.name64(), (slot + 1) * 8),
    }
}

fn fmt_prm(rm: &regalloc::PRM) -> String {
    match rm {
        regalloc::PRM::Reg(r) => r.name64().to_string(),
        regalloc::PRM::Imm(i) => i.to_string(),
    }
}

fn alu_mnemonic(op: isel::AluOp) -> &'static str {
    match op {
        isel::AluOp::Add => "add",
        isel::AluOp::Sub => "sub",
        isel::AluOp::And => "and",
        isel::AluOp::Or => "or",
        isel::AluOp::Xor => "xor",
        isel::AluOp::Mul => "imul",
    }
}

fn shift_mnemonic(op: isel::ShiftOp) -> &'static str {
    match op {
        isel::ShiftOp::Shl => "shl",
        isel::ShiftOp::ShrU => "shr",
        isel::ShiftOp::ShrS => "sar",
    }
}

fn cc_mnemonic(cc: isel::Condition) -> &'static str {
    match cc {
        isel::Condition::Eq => "e",
        isel::Condition::Ne => "ne",
        isel::Condition::LtU => "b",
        isel::Condition::GeU => "ae",
        isel::Condition::LtS => "l",
        isel::Condition::GeS => "ge",
    }
}
