//! Section printers: a human-readable textual form and, behind
//! `enable-serde`, a JSON document with the same information.

pub mod highlight;
pub mod text;

#[cfg(feature = "enable-serde")]
pub mod json;

pub use highlight::{AnsiHighlight, Plain, PrettyWrite};
pub use text::{write, write_pretty_with_info, write_with_info, InfoWriter, NoInfo};
