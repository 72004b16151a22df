//! Entity references scoped to the IR: `Block`, `Inst`, and `Name`.
//!
//! `Block` and `Inst` are stable arena indices assigned once and never
//! reused. `Name` is the dense renumbering assigned by
//! [`Section::autoname`](super::Section::autoname); it is what every
//! analysis side table (`NameMap<Name, _>`) is keyed by, and it goes
//! stale the moment `autoname` runs again.

use crate::entity::entity_ref;

entity_ref!(
    /// A basic block in a [`Section`](super::Section).
    Block
);

entity_ref!(
    /// An instruction, referenced by its stable arena slot.
    Inst
);

entity_ref!(
    /// A dense name assigned to every live `Arg` and `Inst` by `autoname`.
    Name
);
