//! Graph nodes.

use std::collections::BTreeMap;

use crate::graph::{BlockId, InputId, Operation, OutputId, PortId};

arena_handle! {
    /// A strongly-typed handle of a node in the [`Graph`](crate::graph::Graph) arena.
    ///
    /// Handles are assigned sequentially and never reused within one graph, so a stale
    /// handle of a removed node can be detected instead of aliasing a newer node.
    NodeId, "n"
}

/// One operation together with its named ports.
///
/// Ports are keyed by [`PortId`] and kept ordered, so iterating a node's inputs visits `Env`
/// first and then the operands in position order. The link state of each port lives in the
/// graph; a node only records which port handles it owns.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) op: Operation,
    pub(crate) inputs: BTreeMap<PortId, InputId>,
    pub(crate) outputs: BTreeMap<PortId, OutputId>,
    pub(crate) block: Option<BlockId>,
}

impl Node {
    pub(crate) fn new(op: Operation, block: Option<BlockId>) -> Self {
        Node {
            op,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            block,
        }
    }

    /// The operation performed by this node.
    #[must_use]
    pub fn op(&self) -> &Operation {
        &self.op
    }

    /// Input ports by port id.
    #[must_use]
    pub fn inputs(&self) -> &BTreeMap<PortId, InputId> {
        &self.inputs
    }

    /// Output ports by port id.
    #[must_use]
    pub fn outputs(&self) -> &BTreeMap<PortId, OutputId> {
        &self.outputs
    }

    /// The input port with id `port`, if present.
    #[must_use]
    pub fn input(&self, port: PortId) -> Option<InputId> {
        self.inputs.get(&port).copied()
    }

    /// The output port with id `port`, if present.
    #[must_use]
    pub fn output(&self, port: PortId) -> Option<OutputId> {
        self.outputs.get(&port).copied()
    }

    /// The block owning this node.
    #[must_use]
    pub fn block(&self) -> Option<BlockId> {
        self.block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_formatting() {
        let id = NodeId::new(12);
        assert_eq!(id.index(), 12);
        assert_eq!(format!("{id}"), "n12");
        assert_eq!(format!("{id:?}"), "NodeId(12)");
        assert_eq!(usize::from(id), 12);
        assert_eq!(NodeId::from(3), NodeId::new(3));
    }

    #[test]
    fn test_port_lookup() {
        let mut node = Node::new(Operation::Jump, None);
        node.inputs.insert(PortId::Env, InputId::new(0));
        assert_eq!(node.input(PortId::Env), Some(InputId::new(0)));
        assert_eq!(node.input(PortId::Arg(0)), None);
        assert!(node.outputs().is_empty());
    }
}
