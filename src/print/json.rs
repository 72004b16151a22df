//! JSON document form, gated behind `enable-serde`. Same information as
//! the textual printer; stable field names per value/instruction kind
//! rather than the line-oriented syntax, for tooling that wants to
//! parse a Section rather than read it.

use crate::entity::EntityRef;
use crate::ir::{Inst, InstKind, Section, Value};
use serde_json::{json, Value as Json};

pub fn to_json(section: &mut Section) -> Json {
    section.autoname();
    let blocks: Vec<Json> = section
        .blocks()
        .collect::<Vec<_>>()
        .into_iter()
        .map(|block| block_json(section, block))
        .collect();
    json!({ "blocks": blocks })
}

fn block_json(section: &Section, block: crate::ir::Block) -> Json {
    let params: Vec<Json> = (0..section.param_count(block))
        .map(|i| {
            let arg = section.arg(block, i as u32);
            json!({
                "name": value_json(section, arg),
                "type": section.arg_type(block, i as u32).name(),
            })
        })
        .collect();
    let insts: Vec<Json> = section.insts_forward(block).map(|inst| inst_json(section, inst)).collect();
    json!({ "index": block.index(), "params": params, "insts": insts })
}

fn inst_json(section: &Section, inst: Inst) -> Json {
    let data = section.inst(inst);
    let mut obj = serde_json::Map::new();
    obj.insert("name".into(), value_json(section, Value::Inst(inst)));
    obj.insert("op".into(), json!(data.kind.opcode().name()));
    obj.insert("type".into(), json!(data.ty.name()));
    obj.insert("args".into(), args_json(section, &data.kind));
    Json::Object(obj)
}

fn args_json(section: &Section, kind: &InstKind) -> Json {
    match kind {
        InstKind::Jump(j) => json!({
            "target": j.target.index(),
            "args": j.args.as_slice().iter().map(|&v| value_json(section, v)).collect::<Vec<_>>(),
        }),
        InstKind::Branch(b) => json!({
            "cond": value_json(section, b.cond),
            "if_true": b.if_true.index(),
            "if_false": b.if_false.index(),
        }),
        InstKind::Select(s) => json!({
            "cond": value_json(section, s.cond),
            "if_true": value_json(section, s.if_true),
            "if_false": value_json(section, s.if_false),
        }),
        InstKind::Load(l) => json!({
            "ptr": value_json(section, l.ptr),
            "group": l.group.0,
            "offset": l.offset,
        }),
        InstKind::Store(s) => json!({
            "ptr": value_json(section, s.ptr),
            "group": s.group.0,
            "offset": s.offset,
            "value": value_json(section, s.value),
        }),
        InstKind::AddPtr(a) => json!({ "ptr": value_json(section, a.ptr), "offset": a.offset }),
        InstKind::Exit => json!({}),
        InstKind::Comment(s) => json!({ "text": s }),
        InstKind::Input(i) => json!({ "index": i }),
        InstKind::ResizeU(v) | InstKind::ResizeS(v) | InstKind::ResizeX(v) | InstKind::Freeze(v)
        | InstKind::AssumeConst(v) | InstKind::Output(v) => json!({ "src": value_json(section, *v) }),
        _ => {
            let mut args = Vec::new();
            kind.for_each_arg(|v| args.push(value_json(section, v)));
            json!({ "operands": args })
        }
    }
}

fn value_json(section: &Section, v: Value) -> Json {
    match v {
        Value::Const(c) => json!({ "const": c.bits, "type": c.ty.name() }),
        _ => match section.name_of(v) {
            Some(name) => json!(name.index()),
            None => Json::Null,
        },
    }
}
