//! `Block`: an ordered parameter list and an intrusive instruction list.

use super::entities::{Inst, Name};
use crate::types::Type;

#[derive(Clone, Debug)]
pub struct ArgData {
    pub ty: Type,
    pub name: Option<Name>,
}

/// The storage record for one block. The instruction list is intrusive
/// (see [`InstData`](super::inst::InstData)'s `prev`/`next`); `first`/
/// `last` are the list head/tail, both arena indices rather than raw
/// pointers so blocks never form an ownership cycle with their
/// instructions.
#[derive(Clone, Debug, Default)]
pub struct BlockData {
    pub params: Vec<ArgData>,
    pub first: Option<Inst>,
    pub last: Option<Inst>,
}

impl BlockData {
    pub fn is_empty(&self) -> bool {
        self.first.is_none()
    }
}
