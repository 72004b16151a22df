//! Analyses: pure functions from a [`Section`](crate::ir::Section) to a
//! side table keyed by named-value `Name`. Every analysis here requires
//! `section.autoname()` to have already been run.

pub mod constness;
pub mod known_bits;
pub mod trace_caps;
pub mod used_bits;
pub mod uses;

pub use constness::{Constness, ALWAYS};
pub use known_bits::{Bits, KnownBits};
pub use trace_caps::{Capability, TraceCapabilities};
pub use used_bits::UsedBits;
pub use uses::{Use, Uses};
