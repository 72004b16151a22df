//! Load flags: `Pure`, `InBounds`, `EntryFrozen`.

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
enum FlagBit {
    Pure,
    InBounds,
    EntryFrozen,
}

/// Flags attached to a `Load` instruction.
///
/// - `Pure`: the load is purely a function of the address (no other
///   observable state), enabling redundant-load elimination across
///   unrelated stores.
/// - `InBounds`: the load will not trap, so it may be hoisted or
///   speculated past control flow.
/// - `EntryFrozen`: the loaded value is fixed at section entry (used by
///   `ChainLoopMem2Reg` to promote it to a block parameter).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Debug)]
pub struct LoadFlags {
    bits: u8,
}

impl LoadFlags {
    pub fn new() -> Self {
        LoadFlags { bits: 0 }
    }

    fn with(mut self, bit: FlagBit) -> Self {
        self.bits |= 1 << (bit as u8);
        self
    }

    fn has(self, bit: FlagBit) -> bool {
        self.bits & (1 << (bit as u8)) != 0
    }

    pub fn pure_(self) -> bool {
        self.has(FlagBit::Pure)
    }

    pub fn in_bounds(self) -> bool {
        self.has(FlagBit::InBounds)
    }

    pub fn entry_frozen(self) -> bool {
        self.has(FlagBit::EntryFrozen)
    }

    pub fn set_pure(self) -> Self {
        self.with(FlagBit::Pure)
    }

    pub fn set_in_bounds(self) -> Self {
        self.with(FlagBit::InBounds)
    }

    pub fn set_entry_frozen(self) -> Self {
        self.with(FlagBit::EntryFrozen)
    }
}

impl std::fmt::Display for LoadFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (bit, name) in [
            (FlagBit::Pure, "pure"),
            (FlagBit::InBounds, "inbounds"),
            (FlagBit::EntryFrozen, "entry_frozen"),
        ] {
            if self.has(bit) {
                if !first {
                    write!(f, " ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
