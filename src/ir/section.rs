//! `Section`: an ordered list of blocks, the unit external lowering
//! passes and the backend consume.

use super::block::{ArgData, BlockData};
use super::entities::{Block, Inst, Name};
use super::inst::InstData;
use super::value::{ArgRef, Value};
use crate::arena::Arena;
use crate::entity::{EntityRef, PrimaryMap};
use crate::types::Type;

/// A self-contained compilation unit: an ordered list of blocks plus the
/// arena backing their variable-length payloads (jump argument lists,
/// block parameter lists). The first block is the entry block; its
/// `Arg`s are the section's inputs.
pub struct Section {
    pub(crate) arena: Arena,
    blocks: PrimaryMap<Block, BlockData>,
    insts: PrimaryMap<Inst, InstData>,
    name_count: u32,
    /// Reverse map from a dense `Name` back to the `Value` it names,
    /// rebuilt by every `autoname()` call.
    name_values: Vec<Value>,
}

impl Section {
    pub fn new() -> Self {
        Section {
            arena: Arena::new(),
            blocks: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            name_count: 0,
            name_values: Vec::new(),
        }
    }

    pub fn build_block(&mut self, param_types: &[Type]) -> Block {
        let params = param_types
            .iter()
            .map(|&ty| ArgData { ty, name: None })
            .collect();
        self.blocks.push(BlockData { params, first: None, last: None })
    }

    pub fn entry(&self) -> Block {
        Block::new(0)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> impl DoubleEndedIterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    pub fn block_data(&self, block: Block) -> &BlockData {
        &self.blocks[block]
    }

    pub fn params(&self, block: Block) -> &[ArgData] {
        &self.blocks[block].params
    }

    pub fn param_count(&self, block: Block) -> usize {
        self.blocks[block].params.len()
    }

    pub fn arg(&self, block: Block, index: u32) -> Value {
        debug_assert!((index as usize) < self.blocks[block].params.len());
        Value::Arg(ArgRef { block, index })
    }

    pub fn arg_type(&self, block: Block, index: u32) -> Type {
        self.blocks[block].params[index as usize].ty
    }

    /// Append a new parameter of type `ty` to `block`, returning its
    /// index. Used by `ChainLoopMem2Reg` to thread a promoted memory
    /// value through a loop header; existing `Jump`s that target
    /// `block` must be updated by the caller to supply the extra
    /// argument.
    pub fn add_param(&mut self, block: Block, ty: Type) -> u32 {
        let idx = self.blocks[block].params.len() as u32;
        self.blocks[block].params.push(ArgData { ty, name: None });
        idx
    }

    // -- Instruction storage --------------------------------------------

    pub fn inst(&self, inst: Inst) -> &InstData {
        &self.insts[inst]
    }

    pub fn inst_mut(&mut self, inst: Inst) -> &mut InstData {
        &mut self.insts[inst]
    }

    /// Append `data` to the end of `block`'s instruction list, returning
    /// the new instruction's arena reference.
    pub fn append_inst(&mut self, block: Block, data: InstData) -> Inst {
        let prev = self.blocks[block].last;
        let inst = self.insts.push(InstData { prev, next: None, block, ..data });
        if let Some(prev) = prev {
            self.insts[prev].next = Some(inst);
        } else {
            self.blocks[block].first = Some(inst);
        }
        self.blocks[block].last = Some(inst);
        inst
    }

    /// Insert `data` immediately before `before` in its block.
    pub fn insert_inst_before(&mut self, before: Inst, data: InstData) -> Inst {
        let block = self.insts[before].block;
        let prev = self.insts[before].prev;
        let inst = self.insts.push(InstData { prev, next: Some(before), block, ..data });
        match prev {
            Some(prev) => self.insts[prev].next = Some(inst),
            None => self.blocks[block].first = Some(inst),
        }
        self.insts[before].prev = Some(inst);
        inst
    }

    /// Logically delete `inst` from its block's list. The arena slot is
    /// never reclaimed until the whole `Section` is dropped.
    pub fn unlink_inst(&mut self, inst: Inst) {
        let (block, prev, next) = {
            let data = &self.insts[inst];
            (data.block, data.prev, data.next)
        };
        match prev {
            Some(prev) => self.insts[prev].next = next,
            None => self.blocks[block].first = next,
        }
        match next {
            Some(next) => self.insts[next].prev = prev,
            None => self.blocks[block].last = prev,
        }
    }

    /// Forward iteration over the (live) instructions of `block`.
    pub fn insts_forward(&self, block: Block) -> InstIter<'_> {
        InstIter { section: self, cur: self.blocks[block].first, rev: false }
    }

    /// Reverse iteration over the (live) instructions of `block`.
    pub fn insts_reverse(&self, block: Block) -> InstIter<'_> {
        InstIter { section: self, cur: self.blocks[block].last, rev: true }
    }

    pub fn terminator(&self, block: Block) -> Option<Inst> {
        self.blocks[block].last
    }

    // -- Types ------------------------------------------------------------

    pub fn type_of(&self, value: Value) -> Type {
        match value {
            Value::Const(c) => c.ty,
            Value::Arg(a) => self.arg_type(a.block, a.index),
            Value::Inst(i) => self.insts[i].ty,
        }
    }

    // -- Naming -------------------------------------------------------------

    /// Assign a dense name to every live `Arg` and `Inst`, in block
    /// layout order, arguments before the block's instructions. Any
    /// `NameMap` built against a prior naming is invalid after this call.
    pub fn autoname(&mut self) {
        let mut next = 0u32;
        self.name_values.clear();
        let blocks: Vec<Block> = self.blocks.keys().collect();
        for block in blocks {
            let nparams = self.blocks[block].params.len();
            for index in 0..nparams {
                let name = Name::new(next);
                next += 1;
                self.blocks[block].params[index].name = Some(name);
                self.name_values.push(Value::Arg(ArgRef { block, index: index as u32 }));
            }
            let mut cur = self.blocks[block].first;
            while let Some(inst) = cur {
                let name = Name::new(next);
                next += 1;
                self.insts[inst].name = Some(name);
                self.name_values.push(Value::Inst(inst));
                cur = self.insts[inst].next;
            }
        }
        self.name_count = next;
    }

    pub fn name_count(&self) -> usize {
        self.name_count as usize
    }

    pub fn name_of(&self, value: Value) -> Option<Name> {
        match value {
            Value::Const(_) => None,
            Value::Arg(a) => self.blocks[a.block].params[a.index as usize].name,
            Value::Inst(i) => self.insts[i].name,
        }
    }

    pub fn value_of_name(&self, name: Name) -> Value {
        self.name_values[name.index()]
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over a block's live instructions (forward or reverse).
pub struct InstIter<'a> {
    section: &'a Section,
    cur: Option<Inst>,
    rev: bool,
}

impl<'a> Iterator for InstIter<'a> {
    type Item = Inst;
    fn next(&mut self) -> Option<Inst> {
        let cur = self.cur?;
        let data = &self.section.insts[cur];
        self.cur = if self.rev { data.prev } else { data.next };
        Some(cur)
    }
}
