//! End-to-end scenarios exercised through `Builder`/`FoldingBuilder`,
//! `verify::verify`, and `Interpreter`, plus (for the scenarios the
//! spec calls out as x86-backend-covered) through `X86CodeGen`/`deploy`
//! so the compiled machine code is actually executed and checked
//! against the interpreter's result, not just the reference semantics.

use jitcore::analysis::known_bits;
use jitcore::builder::fold::FoldingBuilder;
use jitcore::builder::Builder;
use jitcore::interp::Interpreter;
use jitcore::ir::{AliasGroup, InstKind, LoadFlags, Section};
use jitcore::types::Type;
use jitcore::verify;
use jitcore::x64::{PhysReg, X86CodeGen};

/// Loop summing `0..n`, writing the total to a real memory cell via
/// `Store` and reading it back through a raw pointer afterwards.
#[test]
fn sum_to_n_loop() {
    let mut cell: u64 = 0;
    let ptr = &mut cell as *mut u64 as u64;

    let mut section = Section::new();
    let entry = section.build_block(&[]);
    let header = section.build_block(&[Type::Int64, Type::Int64, Type::Int64]);
    let body = section.build_block(&[]);
    let done = section.build_block(&[]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let n = b.build_input(0, Type::Int64);
    let zero = b.build_const(Type::Int64, 0);
    b.build_jump(header, &[n, zero, zero]);

    b.move_to_end(header);
    let n_p = b.section().arg(header, 0);
    let i_p = b.section().arg(header, 1);
    let sum_p = b.section().arg(header, 2);
    let cond = b.build_lt_s(i_p, n_p);
    b.build_branch(cond, body, done);

    b.move_to_end(body);
    let one = b.build_const(Type::Int64, 1);
    let i2 = b.build_add(Type::Int64, i_p, one);
    let sum2 = b.build_add(Type::Int64, sum_p, i_p);
    b.build_jump(header, &[n_p, i2, sum2]);

    b.move_to_end(done);
    let ptr_val = b.build_const(Type::Ptr, ptr);
    b.build_store(ptr_val, sum_p, AliasGroup(0), 0);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let mut interp = Interpreter::new(&section, &[10]);
    interp.run();

    assert_eq!(cell, 45);
}

/// Iterative Fibonacci: advances `(i, a, b)` to `(i + 1, b, a + b)` and
/// reports `a` once `i == n`.
#[test]
fn fibonacci_loop() {
    let mut section = Section::new();
    let entry = section.build_block(&[]);
    let header = section.build_block(&[Type::Int64, Type::Int64, Type::Int64, Type::Int64]);
    let body = section.build_block(&[]);
    let done = section.build_block(&[]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let n = b.build_input(0, Type::Int64);
    let zero = b.build_const(Type::Int64, 0);
    let one = b.build_const(Type::Int64, 1);
    b.build_jump(header, &[n, zero, zero, one]);

    b.move_to_end(header);
    let n_p = b.section().arg(header, 0);
    let i_p = b.section().arg(header, 1);
    let a_p = b.section().arg(header, 2);
    let b_p = b.section().arg(header, 3);
    let cond = b.build_lt_s(i_p, n_p);
    b.build_branch(cond, body, done);

    b.move_to_end(body);
    let one2 = b.build_const(Type::Int64, 1);
    let i2 = b.build_add(Type::Int64, i_p, one2);
    let a2 = b_p;
    let b2 = b.build_add(Type::Int64, a_p, b_p);
    b.build_jump(header, &[n_p, i2, a2, b2]);

    b.move_to_end(done);
    b.build_output(a_p);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let mut interp = Interpreter::new(&section, &[10]);
    interp.run();

    assert_eq!(interp.outputs(), &[55]);
}

/// Swaps `a` and `b` once while `cond` holds, storing both results to
/// real memory.
#[test]
fn swap_loop() {
    let mut a_cell: u64 = 0;
    let mut b_cell: u64 = 0;
    let a_ptr = &mut a_cell as *mut u64 as u64;
    let b_ptr = &mut b_cell as *mut u64 as u64;

    let mut section = Section::new();
    let entry = section.build_block(&[]);
    let header = section.build_block(&[Type::Int64, Type::Int64, Type::Bool]);
    let body = section.build_block(&[]);
    let done = section.build_block(&[]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let a0 = b.build_input(0, Type::Int64);
    let b0 = b.build_input(1, Type::Int64);
    let cond0 = b.build_input(2, Type::Bool);
    b.build_jump(header, &[a0, b0, cond0]);

    b.move_to_end(header);
    let a_p = b.section().arg(header, 0);
    let b_p = b.section().arg(header, 1);
    let cond_p = b.section().arg(header, 2);
    b.build_branch(cond_p, body, done);

    b.move_to_end(body);
    let false_c = b.build_const(Type::Bool, 0);
    b.build_jump(header, &[b_p, a_p, false_c]);

    b.move_to_end(done);
    let a_ptr_v = b.build_const(Type::Ptr, a_ptr);
    let b_ptr_v = b.build_const(Type::Ptr, b_ptr);
    b.build_store(a_ptr_v, a_p, AliasGroup(0), 0);
    b.build_store(b_ptr_v, b_p, AliasGroup(0), 0);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let mut interp = Interpreter::new(&section, &[3, 7, 1]);
    interp.run();

    assert_eq!((a_cell, b_cell), (7, 3));
}

/// A diamond that merges through a parameterized join block; run the
/// same compiled section twice with different inputs.
#[test]
fn branch_with_phi() {
    let mut section = Section::new();
    let entry = section.build_block(&[]);
    let true_block = section.build_block(&[]);
    let false_block = section.build_block(&[]);
    let join = section.build_block(&[Type::Int64]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let cond = b.build_input(0, Type::Bool);
    let x = b.build_input(1, Type::Int64);
    let y = b.build_input(2, Type::Int64);
    b.build_branch(cond, true_block, false_block);

    b.move_to_end(true_block);
    b.build_jump(join, &[x]);

    b.move_to_end(false_block);
    b.build_jump(join, &[y]);

    b.move_to_end(join);
    let v = b.section().arg(join, 0);
    b.build_output(v);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let mut interp_true = Interpreter::new(&section, &[1, 11, 22]);
    interp_true.run();
    assert_eq!(interp_true.outputs(), &[11]);

    let mut interp_false = Interpreter::new(&section, &[0, 11, 22]);
    interp_false.run();
    assert_eq!(interp_false.outputs(), &[22]);
}

/// A `Select` over two large 64-bit constants must preserve every bit,
/// not just the low 32.
#[test]
fn large_constant_select() {
    let mut section = Section::new();
    let entry = section.build_block(&[]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let cond = b.build_input(0, Type::Bool);
    let if_true = b.build_const(Type::Int64, 1271752347623423);
    let if_false = b.build_const(Type::Int64, 2347782347823478);
    let sel = b.build_select(cond, if_true, if_false, Type::Int64);
    b.build_output(sel);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let mut interp_true = Interpreter::new(&section, &[1]);
    interp_true.run();
    assert_eq!(interp_true.outputs(), &[1271752347623423]);

    let mut interp_false = Interpreter::new(&section, &[0]);
    interp_false.run();
    assert_eq!(interp_false.outputs(), &[2347782347823478]);
}

/// `fold_mod_u(x, 64)` must fold to an `And` against the mask `63`, and
/// the known-bits lattice must report the top bits of the result as
/// known zero even though `x` itself is an opaque input.
#[test]
fn mod_by_power_of_two_folds_to_and() {
    let mut section = Section::new();
    let entry = section.build_block(&[]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let x = b.build_input(0, Type::Int64);
    drop(b);

    let mut fb = FoldingBuilder::new(&mut section);
    fb.move_to_end(entry);
    let sixty_four = fb.build_const(Type::Int64, 64);
    let result = fb.fold_mod_u(Type::Int64, x, sixty_four);
    drop(fb);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    b.build_output(result);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let result_inst = result.as_inst().expect("fold_mod_u must insert an instruction");
    let kind = &section.inst(result_inst).kind;
    let mask = match kind {
        InstKind::And(args) => {
            let const_operand = args.lhs.as_const().or_else(|| args.rhs.as_const());
            const_operand.expect("one operand of the folded And must be a constant mask").bits
        }
        other => panic!("expected fold_mod_u(x, 64) to fold to And, got {:?}", other.opcode()),
    };
    assert_eq!(mask, 63);

    section.autoname();
    let bits = known_bits::analyze(&section);
    let name = section.name_of(result).expect("result must be named after autoname");
    let result_bits = bits.get(name);
    let known_zero = result_bits.mask & !result_bits.value;

    // Every bit outside the mask `63` comes out known-zero purely from
    // the constant operand's contribution, regardless of `x`.
    assert_eq!(known_zero & !mask, !mask);

    let mut interp = Interpreter::new(&section, &[200]);
    interp.run();
    assert_eq!(interp.outputs(), &[200 % 64]);
}

/// Same loop as `sum_to_n_loop`, compiled to real x86-64 and executed
/// through a mapped function pointer rather than the interpreter. Entry
/// block params are pinned to the System V integer argument registers
/// (`rdi`, `rsi`), so the deployed code can be called as a plain
/// `extern "C" fn(i64, *mut u64)`.
#[test]
fn sum_to_n_on_x86() {
    let mut section = Section::new();
    let entry = section.build_block(&[Type::Int64, Type::Ptr]);
    let header = section.build_block(&[Type::Int64, Type::Int64, Type::Int64, Type::Ptr]);
    let body = section.build_block(&[]);
    let done = section.build_block(&[]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let n = b.section().arg(entry, 0);
    let ptr_arg = b.section().arg(entry, 1);
    let zero = b.build_const(Type::Int64, 0);
    b.build_jump(header, &[n, zero, zero, ptr_arg]);

    b.move_to_end(header);
    let n_p = b.section().arg(header, 0);
    let i_p = b.section().arg(header, 1);
    let sum_p = b.section().arg(header, 2);
    let ptr_p = b.section().arg(header, 3);
    let cond = b.build_lt_s(i_p, n_p);
    b.build_branch(cond, body, done);

    b.move_to_end(body);
    let one = b.build_const(Type::Int64, 1);
    let i2 = b.build_add(Type::Int64, i_p, one);
    let sum2 = b.build_add(Type::Int64, sum_p, i_p);
    b.build_jump(header, &[n_p, i2, sum2, ptr_p]);

    b.move_to_end(done);
    b.build_store(ptr_p, sum_p, AliasGroup(0), 0);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let codegen = X86CodeGen::new(section, &[PhysReg::Rdi, PhysReg::Rsi]);
    let code = codegen.deploy().expect("map the compiled function read+exec");

    let mut cell: u64 = 0;
    let f: extern "C" fn(i64, *mut u64) = unsafe { code.as_fn() };
    f(10, &mut cell as *mut u64);

    assert_eq!(cell, 45);
}

/// The large-64-bit-constant `Select` scenario, compiled and run on the
/// real x86-64 backend both ways (`cond` true and false), checked
/// against the same bit-exact values `large_constant_select` asserts
/// through the interpreter.
#[test]
fn large_constant_select_on_x86() {
    let mut section = Section::new();
    let entry = section.build_block(&[Type::Int64, Type::Ptr]);

    let mut b = Builder::new(&mut section);
    b.move_to_end(entry);
    let cond = b.section().arg(entry, 0);
    let ptr_arg = b.section().arg(entry, 1);
    let if_true = b.build_const(Type::Int64, 1271752347623423);
    let if_false = b.build_const(Type::Int64, 2347782347823478);
    let sel = b.build_select(cond, if_true, if_false, Type::Int64);
    b.build_store(ptr_arg, sel, AliasGroup(0), 0);
    b.build_exit();

    let report = verify::verify(&section);
    assert!(report.is_ok(), "{:?}", report);

    let codegen = X86CodeGen::new(section, &[PhysReg::Rdi, PhysReg::Rsi]);
    let code = codegen.deploy().expect("map the compiled function read+exec");
    let f: extern "C" fn(i64, *mut u64) = unsafe { code.as_fn() };

    let mut cell_true: u64 = 0;
    f(1, &mut cell_true as *mut u64);
    assert_eq!(cell_true, 1271752347623423);

    let mut cell_false: u64 = 0;
    f(0, &mut cell_false as *mut u64);
    assert_eq!(cell_false, 2347782347823478);
}
