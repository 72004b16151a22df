//! A cursor for navigating and editing a [`Section`]'s instruction lists,
//! modeled on the position-tracking cursor used by lowering passes to
//! walk and rewrite code in place.

use super::entities::{Block, Inst};
use super::inst::InstData;
use super::section::Section;

/// Where a [`FuncCursor`] currently sits.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CursorPosition {
    /// Not positioned in any block; `next_inst`/`prev_inst` panic.
    Nowhere,
    /// Positioned so the next `next_inst()` call yields `block`'s first
    /// instruction.
    Before(Block),
    /// Positioned at a specific instruction; appending inserts after it.
    At(Inst),
    /// Positioned past `block`'s last instruction.
    After(Block),
}

/// A cursor over one [`Section`], used by passes to walk instructions
/// forward while inserting, replacing, or deleting as they go.
pub struct FuncCursor<'f> {
    section: &'f mut Section,
    position: CursorPosition,
}

impl<'f> FuncCursor<'f> {
    pub fn new(section: &'f mut Section) -> Self {
        FuncCursor { section, position: CursorPosition::Nowhere }
    }

    pub fn position(&self) -> CursorPosition {
        self.position
    }

    pub fn set_position(&mut self, position: CursorPosition) -> &mut Self {
        self.position = position;
        self
    }

    pub fn at_position(&mut self, position: CursorPosition) -> &mut Self {
        self.set_position(position)
    }

    pub fn at_inst(&mut self, inst: Inst) -> &mut Self {
        self.set_position(CursorPosition::At(inst))
    }

    pub fn at_first_inst(&mut self, block: Block) -> &mut Self {
        self.set_position(CursorPosition::Before(block))
    }

    pub fn at_last_inst(&mut self, block: Block) -> &mut Self {
        self.set_position(CursorPosition::After(block))
    }

    pub fn section(&self) -> &Section {
        self.section
    }

    pub fn section_mut(&mut self) -> &mut Section {
        self.section
    }

    /// The block the cursor currently lies in, if any.
    pub fn current_block(&self) -> Option<Block> {
        match self.position {
            CursorPosition::Nowhere => None,
            CursorPosition::Before(b) | CursorPosition::After(b) => Some(b),
            CursorPosition::At(inst) => Some(self.section.inst(inst).block),
        }
    }

    /// Advance to and return the next instruction, or `None` and move to
    /// `After(block)` once the list is exhausted.
    pub fn next_inst(&mut self) -> Option<Inst> {
        match self.position {
            CursorPosition::Nowhere => None,
            CursorPosition::Before(block) => {
                match self.section.block_data(block).first {
                    Some(inst) => {
                        self.position = CursorPosition::At(inst);
                        Some(inst)
                    }
                    None => {
                        self.position = CursorPosition::After(block);
                        None
                    }
                }
            }
            CursorPosition::At(inst) => {
                let block = self.section.inst(inst).block;
                match self.section.inst(inst).next {
                    Some(next) => {
                        self.position = CursorPosition::At(next);
                        Some(next)
                    }
                    None => {
                        self.position = CursorPosition::After(block);
                        None
                    }
                }
            }
            CursorPosition::After(_) => None,
        }
    }

    /// Insert `data` before the cursor's current instruction, without
    /// moving the cursor: repeated calls while `At` the same instruction
    /// insert in call order immediately before it. Only valid `At` an
    /// instruction or `After` a block (appending).
    pub fn insert_inst(&mut self, data: InstData) -> Inst {
        match self.position {
            CursorPosition::At(before) => self.section.insert_inst_before(before, data),
            CursorPosition::After(block) => self.section.append_inst(block, data),
            CursorPosition::Before(_) | CursorPosition::Nowhere => {
                panic!("insert_inst: cursor is not positioned at an instruction or block end")
            }
        }
    }

    /// Remove the instruction at the cursor and move the cursor to the
    /// instruction that followed it.
    pub fn remove_inst(&mut self) -> Inst {
        let inst = match self.position {
            CursorPosition::At(inst) => inst,
            _ => panic!("remove_inst: cursor is not positioned at an instruction"),
        };
        let block = self.section.inst(inst).block;
        let next = self.section.inst(inst).next;
        self.section.unlink_inst(inst);
        self.position = match next {
            Some(next) => CursorPosition::At(next),
            None => CursorPosition::After(block),
        };
        inst
    }
}
