//! Basic blocks.

use std::collections::BTreeSet;

use crate::graph::NodeId;

arena_handle! {
    /// Handle of a basic block.
    BlockId, "b"
}

arena_handle! {
    /// Handle of a method registered with a [`Program`](crate::compiler::Program).
    MethodId, "m"
}

/// A basic block: an entry node, the nodes hanging off it, and at most one terminator.
///
/// The successor list is ordered and terminators refer to successors by index
/// (`Branch` takes successor 0 when its condition holds). The stack-depth bookkeeping in
/// `consumed` and `produced` is written by stack elimination and lets later passes translate
/// a successor's `Stack(j)` port into the matching port of this block's entry.
#[derive(Debug, Clone)]
pub struct Block {
    pub(crate) entry: NodeId,
    pub(crate) terminator: Option<NodeId>,
    pub(crate) successors: Vec<BlockId>,
    pub(crate) predecessors: BTreeSet<BlockId>,
    pub(crate) offset: Option<usize>,
    pub(crate) nodes: BTreeSet<NodeId>,
    pub(crate) consumed: u32,
    pub(crate) produced: u32,
}

impl Block {
    pub(crate) fn new(entry: NodeId, offset: Option<usize>) -> Self {
        Block {
            entry,
            terminator: None,
            successors: Vec::new(),
            predecessors: BTreeSet::new(),
            offset,
            nodes: BTreeSet::from([entry]),
            consumed: 0,
            produced: 0,
        }
    }

    /// The entry node.
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// The terminator, once the block is complete.
    #[must_use]
    pub fn terminator(&self) -> Option<NodeId> {
        self.terminator
    }

    /// Successor blocks, indexed by the terminator.
    #[must_use]
    pub fn successors(&self) -> &[BlockId] {
        &self.successors
    }

    /// Blocks whose terminator may transfer control here.
    #[must_use]
    pub fn predecessors(&self) -> &BTreeSet<BlockId> {
        &self.predecessors
    }

    /// Bytecode offset of the first instruction, `None` for a method's init block.
    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Every live node owned by the block, entry and terminator included.
    #[must_use]
    pub fn nodes(&self) -> &BTreeSet<NodeId> {
        &self.nodes
    }

    /// Number of stack slots the block pops from below its own pushes.
    #[must_use]
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Number of stack slots the block leaves for its successors.
    #[must_use]
    pub fn produced(&self) -> u32 {
        self.produced
    }
}
