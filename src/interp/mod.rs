//! A concrete-valued reference interpreter.
//!
//! State is the current `Block`, a program-counter `Inst`, and a
//! `NameMap` of concrete (fully-known) values. Every operand the
//! interpreter reads must be constant at that point in execution; this
//! is asserted rather than recovered from, since the interpreter exists
//! to check the backend and the optimizer against a ground truth, not
//! to run arbitrary untyped programs. Requires `section.autoname()` to
//! have already been run.

use crate::analysis::known_bits::{self, Bits, KnownBits};
use crate::ir::{Inst, InstKind, Section, Value};
use crate::types::Type;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Event {
    /// A plain instruction executed; no control transfer happened.
    Step,
    /// A `Jump` or `Branch` transferred control into a new block.
    EnterBlock,
    /// An `Exit` terminator was reached.
    Exit,
}

pub struct Interpreter<'s> {
    section: &'s Section,
    block: crate::ir::Block,
    pc: Option<Inst>,
    values: KnownBits,
    inputs: Vec<u64>,
    outputs: Vec<u64>,
}

impl<'s> Interpreter<'s> {
    pub fn new(section: &'s Section, inputs: &[u64]) -> Self {
        let block = section.entry();
        let pc = section.insts_forward(block).next();
        Interpreter {
            section,
            block,
            pc,
            values: KnownBits::with_capacity(section.name_count()),
            inputs: inputs.to_vec(),
            outputs: Vec::new(),
        }
    }

    pub fn current_block(&self) -> crate::ir::Block {
        self.block
    }

    pub fn outputs(&self) -> &[u64] {
        &self.outputs
    }

    pub fn value_of(&self, v: Value) -> Option<u64> {
        self.const_value_of(v).const_value(self.section.type_of(v))
    }

    fn const_value_of(&self, v: Value) -> Bits {
        match v {
            Value::Const(c) => Bits::exact(c.ty, c.bits),
            _ => match self.section.name_of(v) {
                Some(name) => self.values.get(name),
                None => Bits::unknown(),
            },
        }
    }

    fn advance(&mut self) {
        self.pc = self.pc.and_then(|inst| self.section.inst(inst).next);
    }

    /// Execute one instruction, returning the event it produced.
    pub fn step(&mut self) -> Event {
        let inst = self.pc.expect("interpreter stepped past a terminator");
        let data = self.section.inst(inst);
        let ty = data.ty;

        match &data.kind {
            InstKind::Jump(j) => {
                let target = j.target;
                let values: Vec<Bits> = j.args.as_slice().iter().map(|&a| self.const_value_of(a)).collect();
                for (index, bits) in values.into_iter().enumerate() {
                    let param = self.section.arg(target, index as u32);
                    if let Some(name) = self.section.name_of(param) {
                        self.values.set(name, bits);
                    }
                }
                self.block = target;
                self.pc = self.section.insts_forward(target).next();
                Event::EnterBlock
            }
            InstKind::Branch(b) => {
                let cond = self
                    .const_value_of(b.cond)
                    .const_value(Type::Bool)
                    .expect("branch condition must be constant at runtime");
                let target = if cond != 0 { b.if_true } else { b.if_false };
                self.block = target;
                self.pc = self.section.insts_forward(target).next();
                Event::EnterBlock
            }
            InstKind::Exit => {
                self.pc = None;
                Event::Exit
            }
            InstKind::Input(index) => {
                let bits = *self.inputs.get(*index as usize).expect("missing interpreter input");
                self.bind(data.name, Bits::exact(ty, bits));
                self.advance();
                Event::Step
            }
            InstKind::Output(v) => {
                let v = *v;
                let value = self
                    .const_value_of(v)
                    .const_value(self.section.type_of(v))
                    .expect("output value must be constant at runtime");
                self.outputs.push(value);
                self.advance();
                Event::Step
            }
            InstKind::Load(l) => {
                let ptr = self
                    .const_value_of(l.ptr)
                    .const_value(Type::Ptr)
                    .expect("load pointer must be constant at runtime");
                let addr = (ptr as i64 + l.offset) as usize;
                let bits = unsafe { read_memory(addr, ty) };
                self.bind(data.name, Bits::exact(ty, bits));
                self.advance();
                Event::Step
            }
            InstKind::Store(s) => {
                let ptr = self
                    .const_value_of(s.ptr)
                    .const_value(Type::Ptr)
                    .expect("store pointer must be constant at runtime");
                let value_ty = self.section.type_of(s.value);
                let value = self
                    .const_value_of(s.value)
                    .const_value(value_ty)
                    .expect("stored value must be constant at runtime");
                let addr = (ptr as i64 + s.offset) as usize;
                unsafe { write_memory(addr, value_ty, value) };
                self.advance();
                Event::Step
            }
            kind => {
                let bits = known_bits::transfer(self.section, &self.values, kind, ty);
                self.bind(data.name, bits);
                self.advance();
                Event::Step
            }
        }
    }

    fn bind(&mut self, name: Option<crate::ir::Name>, bits: Bits) {
        if let Some(name) = name {
            self.values.set(name, bits);
        }
    }

    /// Step until `event` occurs (or the section exits, whichever is
    /// first).
    pub fn run_until(&mut self, event: Event) -> Event {
        loop {
            let e = self.step();
            if e == event || e == Event::Exit {
                return e;
            }
        }
    }

    /// Step up to `n` times, stopping early on `Exit`.
    pub fn run_for(&mut self, n: u32) -> Event {
        let mut last = Event::Step;
        for _ in 0..n {
            last = self.step();
            if last == Event::Exit {
                break;
            }
        }
        last
    }

    /// Run to completion.
    pub fn run(&mut self) {
        loop {
            if self.step() == Event::Exit {
                break;
            }
        }
    }
}

unsafe fn read_memory(addr: usize, ty: Type) -> u64 {
    match ty {
        Type::Void => 0,
        Type::Bool | Type::Int8 => (addr as *const u8).read_unaligned() as u64,
        Type::Int16 => (addr as *const u16).read_unaligned() as u64,
        Type::Int32 | Type::Float32 => (addr as *const u32).read_unaligned() as u64,
        Type::Int64 | Type::Float64 | Type::Ptr => (addr as *const u64).read_unaligned(),
    }
}

unsafe fn write_memory(addr: usize, ty: Type, value: u64) {
    match ty {
        Type::Void => {}
        Type::Bool | Type::Int8 => (addr as *mut u8).write_unaligned(value as u8),
        Type::Int16 => (addr as *mut u16).write_unaligned(value as u16),
        Type::Int32 | Type::Float32 => (addr as *mut u32).write_unaligned(value as u32),
        Type::Int64 | Type::Float64 | Type::Ptr => (addr as *mut u64).write_unaligned(value),
    }
}
