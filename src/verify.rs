//! A single-pass verifier: collects diagnostics rather than panicking,
//! so a caller can report a malformed section instead of crashing on it.

use crate::entity::EntityRef;
use crate::ir::{Block, Inst, Section, Value};
use rustc_hash::FxHashSet;
use std::fmt;

#[derive(Clone, Debug)]
pub struct VerifierError {
    pub block: Block,
    pub inst: Option<Inst>,
    pub message: String,
}

impl fmt::Display for VerifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inst {
            Some(inst) => write!(f, "b{}/{:?}: {}", self.block.index(), inst, self.message),
            None => write!(f, "b{}: {}", self.block.index(), self.message),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct VerifierReport {
    pub errors: Vec<VerifierError>,
}

impl VerifierReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl fmt::Display for VerifierReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for err in &self.errors {
            writeln!(f, "{}", err)?;
        }
        Ok(())
    }
}

/// Verify `section` against the data-model invariants: typed operands,
/// single terminator per block, jump arity/type agreement, definitions
/// preceding uses in a linear sweep.
pub fn verify(section: &Section) -> VerifierReport {
    let mut report = VerifierReport::default();
    let mut defined: FxHashSet<Inst> = FxHashSet::default();

    for block in section.blocks() {
        let mut saw_terminator = false;
        let mut last_inst = None;
        for inst in section.insts_forward(block) {
            last_inst = Some(inst);
            let data = section.inst(inst);
            let opcode = data.kind.opcode();

            if saw_terminator {
                report.errors.push(VerifierError {
                    block,
                    inst: Some(inst),
                    message: format!("instruction after terminator ({:?})", opcode),
                });
            }

            data.kind.for_each_arg(|arg| {
                check_operand(section, &mut report, block, inst, arg, &defined);
            });

            match &data.kind {
                crate::ir::InstKind::Jump(j) => {
                    check_jump(section, &mut report, block, inst, j);
                }
                crate::ir::InstKind::Branch(b) => {
                    check_zero_params(section, &mut report, block, inst, b.if_true);
                    check_zero_params(section, &mut report, block, inst, b.if_false);
                }
                crate::ir::InstKind::Exit => {}
                _ => {}
            }

            if opcode.is_terminator() {
                saw_terminator = true;
            }

            defined.insert(inst);
        }

        if !section.block_data(block).is_empty() && !saw_terminator {
            report.errors.push(VerifierError {
                block,
                inst: last_inst,
                message: "block does not end in a terminator".to_string(),
            });
        }
        if section.block_data(block).is_empty() {
            report.errors.push(VerifierError {
                block,
                inst: None,
                message: "block is empty (no terminator)".to_string(),
            });
        }
    }

    report
}

fn check_operand(
    section: &Section,
    report: &mut VerifierReport,
    block: Block,
    inst: Inst,
    arg: Value,
    defined: &FxHashSet<Inst>,
) {
    if let Value::Inst(used) = arg {
        if !defined.contains(&used) {
            report.errors.push(VerifierError {
                block,
                inst: Some(inst),
                message: format!("operand {:?} used before definition", used),
            });
        }
    }
    let _ = section.type_of(arg);
}

fn check_jump(
    section: &Section,
    report: &mut VerifierReport,
    block: Block,
    inst: Inst,
    j: &crate::ir::JumpData,
) {
    let params = section.params(j.target);
    let args = j.args.as_slice();
    if args.len() != params.len() {
        report.errors.push(VerifierError {
            block,
            inst: Some(inst),
            message: format!(
                "jump supplies {} args, target expects {}",
                args.len(),
                params.len()
            ),
        });
        return;
    }
    for (i, (arg, param)) in args.iter().zip(params.iter()).enumerate() {
        let ty = section.type_of(*arg);
        if ty != param.ty {
            report.errors.push(VerifierError {
                block,
                inst: Some(inst),
                message: format!("jump arg {} has type {} but target expects {}", i, ty, param.ty),
            });
        }
    }
}

fn check_zero_params(
    section: &Section,
    report: &mut VerifierReport,
    block: Block,
    inst: Inst,
    target: Block,
) {
    if section.param_count(target) != 0 {
        report.errors.push(VerifierError {
            block,
            inst: Some(inst),
            message: format!("branch/exit successor b{} has non-zero parameters", target.index()),
        });
    }
}
