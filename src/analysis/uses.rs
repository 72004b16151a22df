//! `Uses`: the inverse-edge table mapping each instruction to the list
//! of `(user_instruction, operand_index)` pairs that reference it.

use crate::ir::{Inst, Section};
use rustc_hash::FxHashMap;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Use {
    pub user: Inst,
    pub operand_index: u32,
}

pub struct Uses {
    by_inst: FxHashMap<Inst, Vec<Use>>,
}

impl Uses {
    pub fn of(&self, inst: Inst) -> &[Use] {
        self.by_inst.get(&inst).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_uses(&self, inst: Inst) -> bool {
        !self.of(inst).is_empty()
    }
}

pub fn analyze(section: &Section) -> Uses {
    let mut by_inst: FxHashMap<Inst, Vec<Use>> = FxHashMap::default();

    for block in section.blocks() {
        for user in section.insts_forward(block) {
            let data = section.inst(user);
            let mut index = 0u32;
            data.kind.for_each_arg(|v| {
                if let crate::ir::Value::Inst(def) = v {
                    by_inst.entry(def).or_default().push(Use { user, operand_index: index });
                }
                index += 1;
            });
        }
    }

    Uses { by_inst }
}
