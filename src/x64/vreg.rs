//! Virtual registers and the sixteen general-purpose x86-64 physical
//! registers they are eventually assigned to.

use crate::entity::entity_ref;

entity_ref!(
    /// One virtual register per named IR value, created on demand by
    /// `isel`. Never reused across a compilation.
    VReg
);

/// The sixteen general-purpose x86-64 registers, in their encoding
/// order. `Rsp` and `Rbp` are reserved for the stack/frame pointer and
/// are never handed out by `regalloc`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum PhysReg {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl PhysReg {
    /// Registers `regalloc` may hand out. `Rsp`/`Rbp` are excluded: the
    /// frame pointer anchors spill slots and the stack pointer anchors
    /// the call frame.
    pub const ALLOCATABLE: [PhysReg; 14] = [
        PhysReg::Rax,
        PhysReg::Rcx,
        PhysReg::Rdx,
        PhysReg::Rbx,
        PhysReg::Rsi,
        PhysReg::Rdi,
        PhysReg::R8,
        PhysReg::R9,
        PhysReg::R10,
        PhysReg::R11,
        PhysReg::R12,
        PhysReg::R13,
        PhysReg::R14,
        PhysReg::R15,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the encoding needs a REX prefix purely to reach this
    /// register (`R8`-`R15`), independent of operand width.
    pub fn is_extended(self) -> bool {
        self.index() >= 8
    }

    /// The low 3 bits of the register's encoding, used in ModR/M and SIB
    /// bytes; the 4th bit goes into REX.R/X/B.
    pub fn low_bits(self) -> u8 {
        (self.index() & 7) as u8
    }

    pub fn name64(self) -> &'static str {
        match self {
            PhysReg::Rax => "rax",
            PhysReg::Rcx => "rcx",
            PhysReg::Rdx => "rdx",
            PhysReg::Rbx => "rbx",
            PhysReg::Rsp => "rsp",
            PhysReg::Rbp => "rbp",
            PhysReg::Rsi => "rsi",
            PhysReg::Rdi => "rdi",
            PhysReg::R8 => "r8",
            PhysReg::R9 => "r9",
            PhysReg::R10 => "r10",
            PhysReg::R11 => "r11",
            PhysReg::R12 => "r12",
            PhysReg::R13 => "r13",
            PhysReg::R14 => "r14",
            PhysReg::R15 => "r15",
        }
    }
}

/// Per-virtual-register bookkeeping, live across instruction selection
/// and register allocation.
///
/// `min`/`max` are x86-instruction positions (a dense index over the
/// selected, not-yet-allocated instruction stream) bracketing the
/// register's live range. `current_reg`/`stack_offset` are filled in (and
/// mutated) by `regalloc` as it walks the stream.
#[derive(Copy, Clone, Debug)]
pub struct VRegInfo {
    pub fixed: Option<PhysReg>,
    pub min: u32,
    pub max: u32,
    pub current_reg: Option<PhysReg>,
    pub stack_offset: u32,
}

impl Default for VRegInfo {
    /// `min` starts at `u32::MAX` so the first `touch()` always narrows
    /// it; a `VRegInfo` that is never touched (dead, should not happen
    /// past verification) reports an empty `[MAX, 0]` range.
    fn default() -> Self {
        VRegInfo { fixed: None, min: u32::MAX, max: 0, current_reg: None, stack_offset: 0 }
    }
}

impl VRegInfo {
    pub fn touch(&mut self, pos: u32) {
        if pos > self.max {
            self.max = pos;
        }
        if pos < self.min {
            self.min = pos;
        }
    }
}
