//! `Loop`/`Chain` descriptors and their discovery.
//!
//! Discovery is structural rather than a general dominance computation:
//! it relies on blocks being laid out in program order and loops being
//! single-backedge, which holds for every loop `TraceBuilder`/the
//! builder API can produce (a header followed by a straight-line body
//! chain, an extent block whose `Jump` targets the header again, and an
//! optional preheader that jumps forward into the header once).

use crate::ir::{InstKind, Section};
use crate::entity::EntityRef;
pub use crate::ir::Block;

/// A sequence of blocks each dominating the next: a straight-line
/// extended basic block.
#[derive(Clone, Debug, Default)]
pub struct Chain {
    pub blocks: Vec<Block>,
}

impl Chain {
    pub fn contains(&self, block: Block) -> bool {
        self.blocks.contains(&block)
    }
}

#[derive(Clone, Debug)]
pub struct Loop {
    pub header: Block,
    /// The block that jumps forward into `header` once, if one exists
    /// (absent for a header that is also the section's entry block).
    pub preheader: Option<Block>,
    /// The block whose `Jump` closes the backedge to `header`.
    pub extent: Block,
    /// The body, from `header` up to and including `extent`.
    pub chain: Chain,
}

/// Find every single-backedge loop in `section`.
pub fn find_loops(section: &Section) -> Vec<Loop> {
    let blocks: Vec<_> = section.blocks().collect();
    let mut loops = Vec::new();

    for &block in &blocks {
        let Some(term) = section.terminator(block) else { continue };
        if let InstKind::Jump(j) = &section.inst(term).kind {
            if j.target.index() <= block.index() {
                let header = j.target;
                let extent = block;
                let chain = build_chain(section, &blocks, header, extent);
                let preheader = find_preheader(section, &blocks, header, extent);
                loops.push(Loop { header, preheader, extent, chain });
            }
        }
    }
    loops
}

fn build_chain(section: &Section, blocks: &[Block], header: Block, extent: Block) -> Chain {
    let mut chain = Vec::new();
    for &b in blocks {
        if b.index() >= header.index() && b.index() <= extent.index() {
            chain.push(b);
        }
    }
    let _ = section;
    Chain { blocks: chain }
}

fn find_preheader(section: &Section, blocks: &[Block], header: Block, extent: Block) -> Option<Block> {
    for &b in blocks {
        if b == header || b == extent {
            continue;
        }
        let Some(term) = section.terminator(b) else { continue };
        if let InstKind::Jump(j) = &section.inst(term).kind {
            if j.target == header && b.index() < header.index() {
                return Some(b);
            }
        }
    }
    None
}
