//! Error types for the backend and deployment paths.
//!
//! Malformed IR is a distinct concern from a failing backend: building
//! IR that violates an invariant is a programming error in the caller
//! and is reported through [`verify`](crate::verify) as a collected,
//! non-panicking diagnostic list. `CodegenError` covers everything that
//! can go wrong turning already-verified IR into running machine code:
//! conditions that depend on the host (`mmap` failing, an unencodable
//! operand) rather than on the caller's IR being well-formed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodegenError {
    #[error("register allocation could not find a free register or spill slot for {0:?}")]
    OutOfRegisters(crate::ir::Inst),

    #[error("instruction has no x86-64 encoding: {0:?}")]
    Unencodable(crate::ir::Opcode),

    #[error("branch target offset {0} does not fit in a 32-bit displacement")]
    DisplacementOverflow(i64),

    #[error("failed to map executable memory: {0}")]
    MapFailed(#[source] std::io::Error),

    #[error("failed to change memory protection: {0}")]
    ProtectFailed(#[source] std::io::Error),
}

pub type CodegenResult<T> = Result<T, CodegenError>;
