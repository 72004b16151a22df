//! `TraceCapabilities`: a reverse dataflow marking, per named value,
//! whether tracing it as a constant or as an instruction is legal given
//! its consumers' constness and type groups.
//!
//! A value can be traced as a constant only if every consumer that
//! needs a concrete value for specialization purposes sees it in the
//! `ALWAYS` constness group; otherwise it must be materialized as an
//! instruction on the trace (even if `KnownBits` happens to know its
//! exact bits at compile time, a non-`ALWAYS` group means its bits are
//! only known once a staging input is fixed).

use super::constness::{self, Constness, ALWAYS};
use crate::entity::NameMap;
use crate::ir::{Name, Section, Value};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Capability {
    /// Legal to bake this value into the trace as a literal constant.
    pub as_const: bool,
    /// Legal to materialize this value as a live instruction on the
    /// trace (always true for values with any non-`ALWAYS` consumer).
    pub as_inst: bool,
}

pub type TraceCapabilities = NameMap<Name, Capability>;

pub fn analyze(section: &Section) -> TraceCapabilities {
    let constness = constness::analyze(section);
    analyze_with(section, &constness)
}

pub fn analyze_with(section: &Section, constness: &Constness) -> TraceCapabilities {
    let mut table: TraceCapabilities = NameMap::with_capacity(section.name_count());
    let blocks: Vec<_> = section.blocks().collect();

    for &block in blocks.iter().rev() {
        for inst in section.insts_reverse(block) {
            let data = section.inst(inst);
            data.kind.for_each_arg(|v| mark(section, &mut table, constness, v));
        }
    }
    table
}

fn mark(section: &Section, table: &mut TraceCapabilities, constness: &Constness, v: Value) {
    let name = match section.name_of(v) {
        Some(name) => name,
        None => return,
    };
    let group = constness.get(name);
    let mut cap = table.get(name);
    if group == ALWAYS {
        cap.as_const = true;
    } else {
        cap.as_inst = true;
    }
    table.set(name, cap);
}
