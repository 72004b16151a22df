//! Classical IR optimization passes. Each consumes a `Section`, may
//! reorder/remove/insert instructions, and produces a semantically
//! equivalent `Section`. Every pass calls `autoname` first (directly,
//! or via an analysis it depends on) so `NameMap`-keyed analyses line
//! up with the instructions they were computed over.

pub mod cse;
pub mod dce;
pub mod dse;
pub mod licm;
pub mod loop_info;
pub mod mem2reg;
pub mod refine_aliasing;
pub mod simplify;
mod subst;

pub use loop_info::{Chain, Loop};
