//! Line-oriented textual form: `section { ... }` with `b<n>(args):` block
//! headers and two-space-indented typed instruction statements.

use super::highlight::{Plain, PrettyWrite};
use crate::entity::EntityRef;
use crate::ir::{Inst, InstKind, Section, Value};
use std::io::{self, Write};

/// Called once per instruction after its statement is written, so
/// callers can attach analysis output (e.g. known-bits ranges) as a
/// trailing comment.
pub trait InfoWriter {
    fn comment_for(&self, inst: Inst) -> Option<String>;
}

pub struct NoInfo;

impl InfoWriter for NoInfo {
    fn comment_for(&self, _inst: Inst) -> Option<String> {
        None
    }
}

/// Write `section`'s textual form. Assigns fresh names via `autoname`
/// first, so any previously built `NameMap` against it is invalidated.
pub fn write(section: &mut Section, w: &mut dyn Write) -> io::Result<()> {
    write_with_info(section, &NoInfo, w)
}

pub fn write_with_info(section: &mut Section, info: &dyn InfoWriter, w: &mut dyn Write) -> io::Result<()> {
    write_pretty_with_info(section, info, &mut Plain, w)
}

/// Same output as `write_with_info`, with every run routed through
/// `pretty` first so a terminal front-end can colorize it.
pub fn write_pretty_with_info(
    section: &mut Section,
    info: &dyn InfoWriter,
    pretty: &mut dyn PrettyWrite,
    w: &mut dyn Write,
) -> io::Result<()> {
    section.autoname();
    pretty.plain(w, "section {\n")?;
    for block in section.blocks().collect::<Vec<_>>() {
        write_block_header(section, block, pretty, w)?;
        for inst in section.insts_forward(block).collect::<Vec<_>>() {
            write_inst(section, inst, pretty, w)?;
            if let Some(c) = info.comment_for(inst) {
                pretty.plain(w, "  ; ")?;
                pretty.comment(w, &c)?;
            }
            writeln!(w)?;
        }
    }
    pretty.plain(w, "}\n")?;
    Ok(())
}

fn write_block_header(
    section: &Section,
    block: crate::ir::Block,
    pretty: &mut dyn PrettyWrite,
    w: &mut dyn Write,
) -> io::Result<()> {
    pretty.plain(w, &format!("b{}(", block.index()))?;
    for index in 0..section.param_count(block) {
        if index > 0 {
            pretty.plain(w, ", ")?;
        }
        let arg = section.arg(block, index as u32);
        pretty.value(w, &value_str(section, arg))?;
        pretty.plain(w, ": ")?;
        pretty.keyword(w, section.arg_type(block, index as u32).name())?;
    }
    pretty.plain(w, "):\n")
}

fn write_inst(
    section: &Section,
    inst: Inst,
    pretty: &mut dyn PrettyWrite,
    w: &mut dyn Write,
) -> io::Result<()> {
    let data = section.inst(inst);
    let lhs = match data.name {
        Some(name) => format!("v{}", name.index()),
        None => "_".to_string(),
    };
    pretty.plain(w, "  ")?;
    pretty.value(w, &lhs)?;
    pretty.plain(w, " = ")?;
    pretty.keyword(w, data.kind.opcode().name())?;
    pretty.plain(w, ": ")?;
    pretty.keyword(w, data.ty.name())?;
    pretty.plain(w, " ")?;
    write_operands(section, &data.kind, pretty, w)
}

fn write_operands(
    section: &Section,
    kind: &InstKind,
    pretty: &mut dyn PrettyWrite,
    w: &mut dyn Write,
) -> io::Result<()> {
    match kind {
        InstKind::Jump(j) => {
            pretty.plain(w, &format!("b{}(", j.target.index()))?;
            for (i, &arg) in j.args.as_slice().iter().enumerate() {
                if i > 0 {
                    pretty.plain(w, ", ")?;
                }
                write_value(section, arg, pretty, w)?;
            }
            pretty.plain(w, ")")
        }
        InstKind::Branch(b) => {
            write_value(section, b.cond, pretty, w)?;
            pretty.plain(w, &format!(", b{}, b{}", b.if_true.index(), b.if_false.index()))
        }
        InstKind::Select(s) => {
            write_value(section, s.cond, pretty, w)?;
            pretty.plain(w, ", ")?;
            write_value(section, s.if_true, pretty, w)?;
            pretty.plain(w, ", ")?;
            write_value(section, s.if_false, pretty, w)
        }
        InstKind::Load(l) => {
            write_value(section, l.ptr, pretty, w)?;
            pretty.plain(w, &format!(" + {} (group {})", l.offset, l.group.0))
        }
        InstKind::Store(s) => {
            write_value(section, s.ptr, pretty, w)?;
            pretty.plain(w, &format!(" + {} (group {}), ", s.offset, s.group.0))?;
            write_value(section, s.value, pretty, w)
        }
        InstKind::AddPtr(a) => {
            write_value(section, a.ptr, pretty, w)?;
            pretty.plain(w, &format!(" + {}", a.offset))
        }
        InstKind::Exit => pretty.plain(w, ""),
        InstKind::Comment(s) => pretty.comment(w, &format!("{:?}", s)),
        InstKind::Input(i) => pretty.constant(w, &i.to_string()),
        InstKind::ResizeU(v) | InstKind::ResizeS(v) | InstKind::ResizeX(v) | InstKind::Freeze(v)
        | InstKind::AssumeConst(v) | InstKind::Output(v) => write_value(section, *v, pretty, w),
        _ => {
            let mut first = true;
            let mut out = Ok(());
            kind.for_each_arg(|v| {
                if out.is_err() {
                    return;
                }
                out = (|| {
                    if !first {
                        pretty.plain(w, ", ")?;
                    }
                    first = false;
                    write_value(section, v, pretty, w)
                })();
            });
            out
        }
    }
}

fn write_value(section: &Section, v: Value, pretty: &mut dyn PrettyWrite, w: &mut dyn Write) -> io::Result<()> {
    match v {
        Value::Const(_) => pretty.constant(w, &value_str(section, v)),
        _ => pretty.value(w, &value_str(section, v)),
    }
}

fn value_str(section: &Section, v: Value) -> String {
    match v {
        Value::Const(c) => format!("{}:{}", c.bits, c.ty.name()),
        _ => match section.name_of(v) {
            Some(name) => format!("v{}", name.index()),
            None => "v?".to_string(),
        },
    }
}
