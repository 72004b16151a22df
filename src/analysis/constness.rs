//! `ConstnessAnalysis`: partitions named values into "constness groups"
//! under staged evaluation. Values in the same group become constant
//! together once the staging inputs that group depends on are fixed;
//! group `ALWAYS` is always constant.

use crate::entity::NameMap;
use crate::ir::{InstKind, Name, Section, Value};

/// The top group: a value in this group is constant regardless of any
/// staging input.
pub const ALWAYS: u32 = 0;

pub type Constness = NameMap<Name, u32>;

pub fn analyze(section: &Section) -> Constness {
    let mut table: Constness = NameMap::with_capacity(section.name_count());
    let mut next_group: u32 = 1;

    for block in section.blocks() {
        for inst in section.insts_forward(block) {
            let data = section.inst(inst);
            let group = transfer(section, &table, &data.kind, &mut next_group);
            if let Some(name) = data.name {
                table.set(name, group);
            }
        }
    }
    table
}

fn group_of(section: &Section, table: &Constness, v: Value) -> u32 {
    match v {
        Value::Const(_) => ALWAYS,
        _ => match section.name_of(v) {
            Some(name) => table.get(name),
            None => ALWAYS,
        },
    }
}

fn fresh(next_group: &mut u32) -> u32 {
    let g = *next_group;
    *next_group += 1;
    g
}

/// Combine the groups of a pure instruction's operands: `ALWAYS` entries
/// are ignored, and if every remaining operand agrees on one non-ALWAYS
/// group, that group is inherited; otherwise a fresh group is allocated.
fn inherit(groups: &[u32], next_group: &mut u32) -> u32 {
    let mut distinct = None;
    for &g in groups {
        if g == ALWAYS {
            continue;
        }
        match distinct {
            None => distinct = Some(g),
            Some(d) if d == g => {}
            Some(_) => return fresh(next_group),
        }
    }
    distinct.unwrap_or(ALWAYS)
}

fn transfer(section: &Section, table: &Constness, kind: &InstKind, next_group: &mut u32) -> u32 {
    use InstKind::*;
    let g = |v: Value| group_of(section, table, v);

    match kind {
        Freeze(_) | AssumeConst(_) => ALWAYS,
        Add(b) | Sub(b) | Mul(b) | DivU(b) | DivS(b) | ModU(b) | ModS(b) | Xor(b) | Shl(b)
        | ShrU(b) | ShrS(b) | Eq(b) | LtU(b) | LtS(b) => inherit(&[g(b.lhs), g(b.rhs)], next_group),
        And(b) | Or(b) => {
            let (gl, gr) = (g(b.lhs), g(b.rhs));
            if gl == ALWAYS && gr == ALWAYS {
                ALWAYS
            } else {
                fresh(next_group)
            }
        }
        Select(s) => {
            let (gc, gt, gf) = (g(s.cond), g(s.if_true), g(s.if_false));
            if gc == ALWAYS && gt == ALWAYS && gf == ALWAYS {
                ALWAYS
            } else {
                fresh(next_group)
            }
        }
        ResizeU(x) | ResizeS(x) | ResizeX(x) => inherit(&[g(*x)], next_group),
        Load(l) => g(l.ptr),
        AddPtr(a) => g(a.ptr),
        Store(_) | Jump(_) | Branch(_) | Exit | Comment(_) | Input(_) | Output(_) => {
            fresh(next_group)
        }
    }
}
