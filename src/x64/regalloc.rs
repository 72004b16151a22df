//! Linear-scan register allocation over the pre-allocated x86-64
//! pseudo-instructions `isel` produced.
//!
//! A single forward walk assigns a global position to every instruction,
//! computing each virtual register's `[min, max]` live-range interval.
//! A second forward walk then maintains a sixteen-slot `RegFileState`
//! (one entry per physical register) and resolves every `VReg` operand
//! to a `PhysReg`, spilling to a growing frame-relative stack slot pool
//! when every allocatable register is in use. Jumps into a block visited
//! for the first time record that block's live-in assignment as its
//! committed entry state; jumps into an already-visited block reconcile
//! the current state to match it.

use super::isel::{Condition, IselOutput, ShiftAmt, ShiftOp, Width, X86Block, X86Inst, AluOp, RM};
use super::vreg::{PhysReg, VReg, VRegInfo};
use crate::entity::{EntityRef, PrimaryMap};
use crate::ir::Block;
use log::{debug, trace};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Committed entry state for a block boundary: almost always well under
/// eight live registers, so this stays inline.
type CommittedState = SmallVec<[(PhysReg, VReg); 8]>;

#[derive(Copy, Clone, Debug)]
pub enum PRM {
    Reg(PhysReg),
    Imm(i64),
}

#[derive(Clone, Debug)]
pub enum PInst {
    MovRR { dst: PhysReg, src: PhysReg },
    MovImm { dst: PhysReg, imm: i64, width: Width },
    Load { dst: PhysReg, base: PhysReg, disp: i32, width: Width },
    Store { base: PhysReg, disp: i32, src: PhysReg, width: Width },
    Lea { dst: PhysReg, base: PhysReg, index: Option<(PhysReg, u8)>, disp: i32 },
    Alu { op: AluOp, dst: PhysReg, rhs: PRM, width: Width },
    AluMem { op: AluOp, base: PhysReg, disp: i32, src: PhysReg, width: Width },
    Cmp { lhs: PhysReg, rhs: PRM, width: Width },
    SetCc { dst: PhysReg, cc: Condition },
    CmovCc { dst: PhysReg, src: PhysReg, cc: Condition, width: Width },
    Movzx { dst: PhysReg, src: PhysReg, src_width: Width },
    Movsx { dst: PhysReg, src: PhysReg, src_width: Width },
    Shift { op: ShiftOp, dst: PhysReg, amt: ShiftAmt, width: Width },
    Cqo,
    Div { signed: bool, divisor: PhysReg, width: Width },
    Jmp { target: Block },
    Jcc { cc: Condition, target: Block },
    Ret,
    SpillStore { slot: u32, src: PhysReg, width: Width },
    SpillLoad { dst: PhysReg, slot: u32, width: Width },
}

pub struct PBlock {
    pub block: Block,
    pub insts: Vec<PInst>,
}

pub struct PhysProgram {
    pub blocks: Vec<PBlock>,
    /// Total bytes of spill space the prologue must reserve below `rbp`.
    pub frame_size: u32,
}

/// Which virtual register an operand slot reads/writes, used by the
/// liveness prepass.
fn for_each_vreg(inst: &X86Inst, mut read: impl FnMut(VReg), mut write: impl FnMut(VReg)) {
    match *inst {
        X86Inst::MovRR { dst, src } => {
            read(src);
            write(dst);
        }
        X86Inst::MovImm { dst, .. } => write(dst),
        X86Inst::Load { dst, base, .. } => {
            read(base);
            write(dst);
        }
        X86Inst::Store { base, src, .. } => {
            read(base);
            read(src);
        }
        X86Inst::Lea { dst, base, index, .. } => {
            read(base);
            if let Some((idx, _)) = index {
                read(idx);
            }
            write(dst);
        }
        X86Inst::Alu { dst, rhs, .. } => {
            read(dst);
            if let RM::Reg(r) = rhs {
                read(r);
            }
            write(dst);
        }
        X86Inst::AluMem { base, src, .. } => {
            read(base);
            read(src);
        }
        X86Inst::Cmp { lhs, rhs, .. } => {
            read(lhs);
            if let RM::Reg(r) = rhs {
                read(r);
            }
        }
        X86Inst::SetCc { dst, .. } => write(dst),
        X86Inst::CmovCc { dst, src, .. } => {
            read(dst);
            read(src);
            write(dst);
        }
        X86Inst::Movzx { dst, src, .. } | X86Inst::Movsx { dst, src, .. } => {
            read(src);
            write(dst);
        }
        X86Inst::Shift { dst, amt, .. } => {
            read(dst);
            if let ShiftAmt::Cl = amt {
                // The rcx vreg is read as an implicit operand threaded
                // through by `isel`'s own `MovRR` into the fixed rcx
                // slot; nothing extra to do here.
            }
            write(dst);
        }
        X86Inst::Cqo => {}
        X86Inst::Div { divisor, .. } => read(divisor),
        X86Inst::Jmp { .. } | X86Inst::Jcc { .. } | X86Inst::Ret => {}
        X86Inst::PseudoUse { vreg } => read(vreg),
    }
}

pub fn run(input: IselOutput) -> PhysProgram {
    let IselOutput { blocks, vreg_of: _, mut vreg_info, entry_pins } = input;
    debug!("regalloc: {} blocks, {} vregs", blocks.len(), vreg_info.len());

    // Pass 1: global positions and live-range intervals.
    let mut pos: u32 = 0;
    for block in &blocks {
        for inst in &block.insts {
            for_each_vreg(
                inst,
                |v| vreg_info[v].touch(pos),
                |v| vreg_info[v].touch(pos),
            );
            pos += 1;
        }
    }

    let mut alloc = Allocator {
        vreg_info,
        regfile: [None; 16],
        clock: [0; 16],
        now: 0,
        free_slots: Vec::new(),
        next_slot: 0,
        committed: FxHashMap::default(),
        pos: 0,
    };

    for (vr, reg) in &entry_pins {
        alloc.regfile[reg.index()] = Some(*vr);
    }

    let mut out_blocks = Vec::with_capacity(blocks.len());
    for block in &blocks {
        let insts = alloc.run_block(block);
        out_blocks.push(PBlock { block: block.block, insts });
    }

    debug!("regalloc: spilled to {} stack slots", alloc.next_slot);
    PhysProgram { blocks: out_blocks, frame_size: alloc.next_slot * 8 }
}

struct Allocator {
    vreg_info: PrimaryMap<VReg, VRegInfo>,
    regfile: [Option<VReg>; 16],
    clock: [u32; 16],
    now: u32,
    free_slots: Vec<u32>,
    next_slot: u32,
    committed: FxHashMap<Block, CommittedState>,
    pos: u32,
}

impl Allocator {
    fn touch(&mut self, reg: PhysReg) {
        self.now += 1;
        self.clock[reg.index()] = self.now;
    }

    fn current_reg(&self, vr: VReg) -> Option<PhysReg> {
        self.vreg_info[vr].current_reg
    }

    fn alloc_slot(&mut self) -> u32 {
        self.free_slots.pop().unwrap_or_else(|| {
            let slot = self.next_slot;
            self.next_slot += 1;
            slot
        })
    }

    /// Evict whatever currently occupies `reg`, spilling it to a fresh
    /// stack slot if it has no other register to move to.
    fn evict(&mut self, reg: PhysReg, out: &mut Vec<PInst>) {
        if let Some(occupant) = self.regfile[reg.index()] {
            let slot = self.alloc_slot();
            let width = Width::B64;
            out.push(PInst::SpillStore { slot, src: reg, width });
            self.vreg_info[occupant].current_reg = None;
            self.vreg_info[occupant].stack_offset = slot + 1;
            self.regfile[reg.index()] = None;
        }
    }

    fn pick_free_or_evict(&mut self, out: &mut Vec<PInst>) -> PhysReg {
        for &r in &PhysReg::ALLOCATABLE {
            if self.regfile[r.index()].is_none() {
                return r;
            }
        }
        let victim = PhysReg::ALLOCATABLE
            .iter()
            .min_by_key(|r| self.clock[r.index()])
            .copied()
            .unwrap();
        self.evict(victim, out);
        victim
    }

    /// Resolve a read operand to a physical register, loading it from
    /// its spill slot or choosing a fresh register if necessary.
    fn resolve_read(&mut self, vr: VReg, out: &mut Vec<PInst>) -> PhysReg {
        if let Some(reg) = self.current_reg(vr) {
            self.touch(reg);
            return reg;
        }
        let reg = self.pick_free_or_evict(out);
        let slot = self.vreg_info[vr].stack_offset;
        if slot > 0 {
            out.push(PInst::SpillLoad { dst: reg, slot: slot - 1, width: Width::B64 });
            self.free_slots.push(slot - 1);
            self.vreg_info[vr].stack_offset = 0;
        }
        self.regfile[reg.index()] = Some(vr);
        self.vreg_info[vr].current_reg = Some(reg);
        self.touch(reg);
        reg
    }

    /// Resolve a write operand (the destination of a defining
    /// instruction), placing it into its fixed register if pinned,
    /// otherwise any free/evicted register.
    fn resolve_write(&mut self, vr: VReg, out: &mut Vec<PInst>) -> PhysReg {
        if let Some(fixed) = self.vreg_info[vr].fixed {
            if self.regfile[fixed.index()] != Some(vr) {
                self.evict(fixed, out);
                self.regfile[fixed.index()] = Some(vr);
            }
            self.vreg_info[vr].current_reg = Some(fixed);
            self.touch(fixed);
            return fixed;
        }
        if let Some(reg) = self.current_reg(vr) {
            self.touch(reg);
            return reg;
        }
        let reg = self.pick_free_or_evict(out);
        self.regfile[reg.index()] = Some(vr);
        self.vreg_info[vr].current_reg = Some(reg);
        self.touch(reg);
        reg
    }

    fn ensure_fixed(&mut self, vr: VReg, out: &mut Vec<PInst>) -> PhysReg {
        let fixed = self.vreg_info[vr].fixed.expect("ensure_fixed on an unpinned vreg");
        if self.regfile[fixed.index()] != Some(vr) {
            self.evict(fixed, out);
            let src = self.resolve_read(vr, out);
            if src != fixed {
                out.push(PInst::MovRR { dst: fixed, src });
                if self.regfile[src.index()] == Some(vr) {
                    self.regfile[src.index()] = None;
                }
            }
            self.regfile[fixed.index()] = Some(vr);
            self.vreg_info[vr].current_reg = Some(fixed);
        }
        self.touch(fixed);
        fixed
    }

    fn free_dead(&mut self, pos: u32) {
        for reg in &mut self.regfile {
            if let Some(vr) = *reg {
                if self.vreg_info[vr].max == pos {
                    *reg = None;
                }
            }
        }
    }

    fn rm(&mut self, rm: RM, out: &mut Vec<PInst>) -> PRM {
        match rm {
            RM::Imm(i) => PRM::Imm(i),
            RM::Reg(v) => PRM::Reg(self.resolve_read(v, out)),
        }
    }

    fn run_block(&mut self, block: &X86Block) -> Vec<PInst> {
        let mut out = Vec::new();

        if let Some(state) = self.committed.get(&block.block).cloned() {
            self.regfile = [None; 16];
            for (reg, vr) in &state {
                self.regfile[reg.index()] = Some(*vr);
                self.vreg_info[*vr].current_reg = Some(*reg);
            }
        }

        for inst in &block.insts {
            self.step(inst, &mut out);
            self.free_dead(self.pos);
            self.pos += 1;
        }

        out
    }

    fn step(&mut self, inst: &X86Inst, out: &mut Vec<PInst>) {
        #[cfg(feature = "trace-log")]
        trace!("regalloc: pos {} {:?}", self.pos, inst);
        match inst {
            X86Inst::MovRR { dst, src } => {
                // Foldable mov: if `src`'s live range ends exactly here
                // and `dst` is unpinned, alias `dst` onto `src`'s current
                // register instead of emitting a copy.
                if self.vreg_info[*dst].fixed.is_none() && self.vreg_info[*src].max == self.pos {
                    let reg = self.resolve_read(*src, out);
                    self.regfile[reg.index()] = Some(*dst);
                    self.vreg_info[*dst].current_reg = Some(reg);
                    self.touch(reg);
                    return;
                }
                let src_reg = self.resolve_read(*src, out);
                let dst_reg = self.resolve_write(*dst, out);
                if src_reg != dst_reg {
                    out.push(PInst::MovRR { dst: dst_reg, src: src_reg });
                }
            }
            X86Inst::MovImm { dst, imm, width } => {
                let reg = self.resolve_write(*dst, out);
                out.push(PInst::MovImm { dst: reg, imm: *imm, width: *width });
            }
            X86Inst::Load { dst, base, disp, width } => {
                let base_reg = self.resolve_read(*base, out);
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::Load { dst: dst_reg, base: base_reg, disp: *disp, width: *width });
            }
            X86Inst::Store { base, disp, src, width } => {
                let base_reg = self.resolve_read(*base, out);
                let src_reg = self.resolve_read(*src, out);
                out.push(PInst::Store { base: base_reg, disp: *disp, src: src_reg, width: *width });
            }
            X86Inst::Lea { dst, base, index, disp } => {
                let base_reg = self.resolve_read(*base, out);
                let idx_reg = index.map(|(v, scale)| (self.resolve_read(v, out), scale));
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::Lea { dst: dst_reg, base: base_reg, index: idx_reg, disp: *disp });
            }
            X86Inst::Alu { op, dst, rhs, width } => {
                let rhs_p = self.rm(*rhs, out);
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::Alu { op: *op, dst: dst_reg, rhs: rhs_p, width: *width });
            }
            X86Inst::AluMem { op, base, disp, src, width } => {
                let base_reg = self.resolve_read(*base, out);
                let src_reg = self.resolve_read(*src, out);
                out.push(PInst::AluMem { op: *op, base: base_reg, disp: *disp, src: src_reg, width: *width });
            }
            X86Inst::Cmp { lhs, rhs, width } => {
                let lhs_reg = self.resolve_read(*lhs, out);
                let rhs_p = self.rm(*rhs, out);
                out.push(PInst::Cmp { lhs: lhs_reg, rhs: rhs_p, width: *width });
            }
            X86Inst::SetCc { dst, cc } => {
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::SetCc { dst: dst_reg, cc: *cc });
            }
            X86Inst::CmovCc { dst, src, cc, width } => {
                let src_reg = self.resolve_read(*src, out);
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::CmovCc { dst: dst_reg, src: src_reg, cc: *cc, width: *width });
            }
            X86Inst::Movzx { dst, src, src_width } => {
                let src_reg = self.resolve_read(*src, out);
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::Movzx { dst: dst_reg, src: src_reg, src_width: *src_width });
            }
            X86Inst::Movsx { dst, src, src_width } => {
                let src_reg = self.resolve_read(*src, out);
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::Movsx { dst: dst_reg, src: src_reg, src_width: *src_width });
            }
            X86Inst::Shift { op, dst, amt, width } => {
                let dst_reg = self.resolve_write(*dst, out);
                out.push(PInst::Shift { op: *op, dst: dst_reg, amt: *amt, width: *width });
            }
            X86Inst::Cqo => out.push(PInst::Cqo),
            X86Inst::Div { signed, divisor, width } => {
                let divisor_reg = self.resolve_read(*divisor, out);
                out.push(PInst::Div { signed: *signed, divisor: divisor_reg, width: *width });
            }
            X86Inst::Jmp { target } => {
                self.reconcile_or_commit(*target, out);
                out.push(PInst::Jmp { target: *target });
            }
            X86Inst::Jcc { cc, target } => {
                self.reconcile_or_commit(*target, out);
                out.push(PInst::Jcc { cc: *cc, target: *target });
            }
            X86Inst::Ret => out.push(PInst::Ret),
            X86Inst::PseudoUse { vreg } => {
                self.resolve_read(*vreg, out);
            }
        }
    }

    /// Block-boundary matching: reconcile the current register file to
    /// an already-committed target state, or, the first time `target` is
    /// reached, commit the current state (pruned to registers still
    /// live at the target) as its entry state.
    fn reconcile_or_commit(&mut self, target: Block, out: &mut Vec<PInst>) {
        if let Some(state) = self.committed.get(&target).cloned() {
            trace!("regalloc: reconciling to committed state at {:?}", target);
            for (reg, vr) in &state {
                if self.regfile[reg.index()] == Some(*vr) {
                    continue;
                }
                if let Some(cur) = self.vreg_info[*vr].current_reg {
                    out.push(PInst::MovRR { dst: *reg, src: cur });
                } else if self.vreg_info[*vr].stack_offset > 0 {
                    let slot = self.vreg_info[*vr].stack_offset - 1;
                    out.push(PInst::SpillLoad { dst: *reg, slot, width: Width::B64 });
                }
            }
            return;
        }
        let state: CommittedState = self
            .regfile
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| {
                slot.filter(|vr| self.vreg_info[*vr].max > self.pos)
                    .map(|vr| (phys_reg_from_index(i), vr))
            })
            .collect();
        trace!("regalloc: committing entry state at {:?} ({} live regs)", target, state.len());
        self.committed.insert(target, state);
    }
}

fn phys_reg_from_index(i: usize) -> PhysReg {
    PhysReg::ALLOCATABLE
        .iter()
        .copied()
        .chain(std::iter::once(PhysReg::Rsp))
        .chain(std::iter::once(PhysReg::Rbp))
        .find(|r| r.index() == i)
        .expect("valid physical register index")
}
