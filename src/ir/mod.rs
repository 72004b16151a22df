//! The intermediate representation: typed values, block-structured
//! instructions, and the [`Section`] that owns them.

pub mod aliasing;
pub mod block;
pub mod context;
pub mod cursor;
pub mod entities;
pub mod flags;
pub mod inst;
pub mod section;
pub mod value;

pub use aliasing::AliasGroup;
pub use block::{ArgData, BlockData};
pub use context::Context;
pub use cursor::{CursorPosition, FuncCursor};
pub use entities::{Block, Inst, Name};
pub use flags::LoadFlags;
pub use inst::{
    AddPtrData, BinArgs, BranchData, InstData, InstKind, JumpData, LoadData, Opcode, SelectData,
    StoreData,
};
pub use section::Section;
pub use value::{ArgRef, Const, Value};
