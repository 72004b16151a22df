//! Construction APIs over a [`Section`](crate::ir::Section): a plain
//! `Builder` that inserts exactly what it is asked to, and a
//! [`fold::FoldingBuilder`] layered on top that applies local peephole
//! simplification before inserting anything.

pub mod fold;
pub mod trace;

use crate::arena::Slice;
use crate::ir::{
    AddPtrData, Block, BinArgs, BranchData, Const, FuncCursor, Inst, InstData, InstKind,
    JumpData, LoadData, LoadFlags, AliasGroup, Section, SelectData, StoreData, Value,
};
use crate::types::Type;

/// Inserts instructions at a cursor position with no simplification.
/// `fold::FoldingBuilder` wraps this and is almost always what callers
/// want; this type exists for passes that need to emit exactly the
/// instruction they ask for (e.g. `LoopInvCodeMotion` hoisting an
/// existing instruction's clone).
pub struct Builder<'s> {
    cursor: FuncCursor<'s>,
}

impl<'s> Builder<'s> {
    pub fn new(section: &'s mut Section) -> Self {
        Builder { cursor: FuncCursor::new(section) }
    }

    pub fn move_to_end(&mut self, block: Block) -> &mut Self {
        self.cursor.at_last_inst(block);
        self
    }

    /// Position so that the next inserted instruction becomes (or stays)
    /// the first instruction of `block`; later calls to `build_*` insert
    /// in call order immediately before whatever was first when this was
    /// called.
    pub fn move_to_begin(&mut self, block: Block) -> &mut Self {
        match self.cursor.section().block_data(block).first {
            Some(first) => {
                self.cursor.at_inst(first);
            }
            None => {
                self.cursor.at_last_inst(block);
            }
        }
        self
    }

    pub fn move_before(&mut self, inst: Inst) -> &mut Self {
        self.cursor.at_inst(inst);
        self
    }

    pub fn current_block(&self) -> Block {
        self.cursor.current_block().expect("builder has no position")
    }

    pub fn build_block(&mut self, param_types: &[Type]) -> Block {
        self.cursor.section_mut().build_block(param_types)
    }

    pub fn build_const(&self, ty: Type, bits: u64) -> Value {
        Value::Const(Const::new(ty, bits))
    }

    pub fn section(&self) -> &Section {
        self.cursor.section()
    }

    pub fn section_mut(&mut self) -> &mut Section {
        self.cursor.section_mut()
    }

    fn insert(&mut self, kind: InstKind, ty: Type) -> Inst {
        let block = self.current_block();
        let data = InstData { kind, ty, block, prev: None, next: None, name: None };
        self.cursor.insert_inst(data)
    }

    pub fn build_bin(&mut self, kind_ctor: impl FnOnce(BinArgs) -> InstKind, ty: Type, lhs: Value, rhs: Value) -> Value {
        Value::Inst(self.insert(kind_ctor(BinArgs { lhs, rhs }), ty))
    }

    pub fn build_add(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Add, ty, lhs, rhs)
    }
    pub fn build_sub(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Sub, ty, lhs, rhs)
    }
    pub fn build_mul(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Mul, ty, lhs, rhs)
    }
    pub fn build_div_u(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::DivU, ty, lhs, rhs)
    }
    pub fn build_div_s(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::DivS, ty, lhs, rhs)
    }
    pub fn build_mod_u(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::ModU, ty, lhs, rhs)
    }
    pub fn build_mod_s(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::ModS, ty, lhs, rhs)
    }
    pub fn build_and(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::And, ty, lhs, rhs)
    }
    pub fn build_or(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Or, ty, lhs, rhs)
    }
    pub fn build_xor(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Xor, ty, lhs, rhs)
    }
    pub fn build_shl(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Shl, ty, lhs, rhs)
    }
    pub fn build_shr_u(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::ShrU, ty, lhs, rhs)
    }
    pub fn build_shr_s(&mut self, ty: Type, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::ShrS, ty, lhs, rhs)
    }
    pub fn build_eq(&mut self, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::Eq, Type::Bool, lhs, rhs)
    }
    pub fn build_lt_u(&mut self, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::LtU, Type::Bool, lhs, rhs)
    }
    pub fn build_lt_s(&mut self, lhs: Value, rhs: Value) -> Value {
        self.build_bin(InstKind::LtS, Type::Bool, lhs, rhs)
    }

    pub fn build_resize_u(&mut self, v: Value, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::ResizeU(v), ty))
    }

    pub fn build_resize_s(&mut self, v: Value, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::ResizeS(v), ty))
    }

    pub fn build_resize_x(&mut self, v: Value, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::ResizeX(v), ty))
    }

    pub fn build_load(&mut self, ty: Type, ptr: Value, flags: LoadFlags, group: AliasGroup, offset: i64) -> Value {
        Value::Inst(self.insert(InstKind::Load(LoadData { ptr, flags, group, offset }), ty))
    }

    pub fn build_store(&mut self, ptr: Value, value: Value, group: AliasGroup, offset: i64) -> Inst {
        self.insert(InstKind::Store(StoreData { ptr, value, group, offset }), Type::Void)
    }

    pub fn build_add_ptr(&mut self, ptr: Value, offset: i64) -> Value {
        Value::Inst(self.insert(InstKind::AddPtr(AddPtrData { ptr, offset }), Type::Ptr))
    }

    pub fn build_jump(&mut self, target: Block, args: &[Value]) -> Inst {
        let slice: Slice<Value> = self.section().arena.alloc_slice(args);
        self.insert(InstKind::Jump(JumpData { target, args: slice }), Type::Void)
    }

    pub fn build_branch(&mut self, cond: Value, if_true: Block, if_false: Block) -> Inst {
        self.insert(InstKind::Branch(BranchData { cond, if_true, if_false }), Type::Void)
    }

    pub fn build_exit(&mut self) -> Inst {
        self.insert(InstKind::Exit, Type::Void)
    }

    pub fn build_select(&mut self, cond: Value, if_true: Value, if_false: Value, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::Select(SelectData { cond, if_true, if_false }), ty))
    }

    pub fn build_comment(&mut self, text: String) -> Inst {
        self.insert(InstKind::Comment(text), Type::Void)
    }

    pub fn build_freeze(&mut self, v: Value, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::Freeze(v), ty))
    }

    pub fn build_assume_const(&mut self, v: Value, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::AssumeConst(v), ty))
    }

    pub fn build_input(&mut self, index: u32, ty: Type) -> Value {
        Value::Inst(self.insert(InstKind::Input(index), ty))
    }

    pub fn build_output(&mut self, v: Value) -> Inst {
        self.insert(InstKind::Output(v), Type::Void)
    }
}
