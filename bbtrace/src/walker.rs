//! The compile-time half of the tool: turning a freshly compiled unit into hooks.

use log::trace;

/// A basic block as exposed by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BasicBlock {
    address: u64,
}

impl BasicBlock {
    /// A block starting at `address`
    #[must_use]
    pub const fn new(address: u64) -> Self {
        Self { address }
    }

    /// The start address of this block
    #[must_use]
    #[inline]
    pub const fn address(&self) -> u64 {
        self.address
    }
}

/// A unit of code compiled by the host (a Pin trace, a Stalker block, ...).
///
/// Blocks are kept in the order the host exposes them, which is not
/// necessarily ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeUnit {
    blocks: Vec<BasicBlock>,
}

impl CodeUnit {
    /// A unit made of `blocks`
    #[must_use]
    pub fn new(blocks: Vec<BasicBlock>) -> Self {
        Self { blocks }
    }

    /// A unit from block start addresses
    #[must_use]
    pub fn from_addresses<I>(addresses: I) -> Self
    where
        I: IntoIterator<Item = u64>,
    {
        Self::new(addresses.into_iter().map(BasicBlock::new).collect())
    }

    /// The blocks of this unit, in host order
    #[must_use]
    #[inline]
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    /// The address control enters the unit at
    #[must_use]
    pub fn entry(&self) -> Option<u64> {
        self.blocks.first().map(BasicBlock::address)
    }

    /// Has this unit no blocks at all?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Where, relative to its block, a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPoint {
    /// Right before the first instruction of the block
    Before,
}

/// A request to the host: call the reporter with `address` at `point` of block `block`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookInsertion {
    block: usize,
    address: u64,
    point: InsertPoint,
}

impl HookInsertion {
    /// Index of the block within its unit
    #[must_use]
    #[inline]
    pub const fn block(&self) -> usize {
        self.block
    }

    /// The address passed to the reporter when the hook fires
    #[must_use]
    #[inline]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// The insertion point
    #[must_use]
    #[inline]
    pub const fn point(&self) -> InsertPoint {
        self.point
    }
}

/// Visits every block of a compiled unit
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockWalker;

impl BlockWalker {
    /// Create a new [`BlockWalker`]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// One hook per block, bound to the block's start address, in host order.
    #[must_use]
    pub fn on_unit_compiled(&self, unit: &CodeUnit) -> Vec<HookInsertion> {
        let hooks: Vec<HookInsertion> = unit
            .blocks()
            .iter()
            .enumerate()
            .map(|(block, bb)| HookInsertion {
                block,
                address: bb.address(),
                point: InsertPoint::Before,
            })
            .collect();
        if let Some(entry) = unit.entry() {
            trace!("unit @ {entry:#x}: {} hook(s) inserted", hooks.len());
        }
        hooks
    }
}
