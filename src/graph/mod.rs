//! Port graph model.
//!
//! Every method is translated into a dataflow graph whose nodes are [`Operation`]s with named
//! ports. Values flow from an output port to the input ports linked to it; the side-effect
//! environment flows through `Env` ports the same way, so ordering between effects is just
//! another dataflow edge.
//!
//! # Architecture
//!
//! All nodes, ports and blocks of a compilation run live in one [`Graph`] arena and are
//! addressed by handles ([`NodeId`], [`InputId`], [`OutputId`], [`BlockId`]). Handles grow
//! monotonically and removed slots are tombstoned, so a handle never silently refers to a
//! different object and two runs over the same input produce identical handles.
//!
//! The graph is the only writer of link state. Each link is stored at both ends and the
//! primitives below keep the two ends symmetric:
//!
//! - [`Graph::link`] / [`Graph::unlink`] connect or disconnect one input
//! - [`Graph::replace_with`] moves every target of an output to another output
//! - [`Graph::merge_nodes`] splices a terminator onto the entry of the block it jumps to
//! - [`Graph::remove_node`] deletes a node whose outputs are no longer used
//!
//! Violating a primitive's contract (linking an input twice, removing an output that still
//! feeds something) is a bug in the calling pass and panics. [`Graph::verify_links`] checks
//! the whole arena and reports problems as [`crate::Error::Invariant`].
//!
//! # Blocks
//!
//! A [`Block`] owns an entry node, the nodes computed from it, and a terminator. Links never
//! cross block boundaries; a value live across a boundary is carried by a `Stack(n)` or
//! `Local(n)` input on the terminator and the matching output on each successor's entry.
//!
//! # Examples
//!
//! ```rust
//! use portflow::graph::{Graph, Operation, PortId};
//! use portflow::analysis::ConstValue;
//!
//! let mut graph = Graph::new();
//! let block = graph.new_block(Operation::BlockEntry, Some(0));
//! let constant = graph.create_node(Operation::Constant(ConstValue::Int(1)), Some(block));
//! let value = graph.add_output(constant, PortId::Arg(0));
//!
//! let ret = graph.create_node(Operation::Return(Some(portflow::metadata::PrimitiveType::Int)), Some(block));
//! let env = graph.output(graph.block(block).entry(), PortId::Env);
//! graph.add_input(ret, PortId::Env, env);
//! graph.add_input(ret, PortId::Arg(0), Some(value));
//! graph.set_terminator(block, ret, Vec::new());
//!
//! assert_eq!(graph.targets(value).len(), 1);
//! graph.verify_links()?;
//! # Ok::<(), portflow::Error>(())
//! ```

/// Defines a `usize` arena handle with the usual conversions and a compact `Display`.
macro_rules! arena_handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) usize);

        impl $name {
            /// Creates a handle from a raw arena index.
            #[must_use]
            #[inline]
            pub const fn new(index: usize) -> Self {
                $name(index)
            }

            /// The raw arena index.
            #[must_use]
            #[inline]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<usize> for $name {
            #[inline]
            fn from(index: usize) -> Self {
                $name(index)
            }
        }

        impl From<$name> for usize {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

mod block;
pub mod dot;
mod node;
mod operation;
mod port;

pub use block::{Block, BlockId, MethodId};
pub use node::{Node, NodeId};
pub use operation::{
    BinaryOp, BitwiseOp, CompareKind, CompareOp, InvokeKind, JumpTable, Operation,
    OperationClass, ShiftOp,
};
pub use port::{InputId, InputPort, OutputId, OutputPort, PortId};

use std::collections::{BTreeMap, BTreeSet};

use crate::Result;

/// The arena holding every node, port and block of a compilation run.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    inputs: Vec<Option<InputPort>>,
    outputs: Vec<Option<OutputPort>>,
    blocks: Vec<Option<Block>>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ---- nodes ----

    /// Creates a node without ports, owned by `block` if given.
    pub fn create_node(&mut self, op: Operation, block: Option<BlockId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(op, block)));
        if let Some(block) = block {
            self.block_mut(block).nodes.insert(id);
        }
        id
    }

    /// Returns `true` if `node` exists and has not been removed.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        matches!(self.nodes.get(node.0), Some(Some(_)))
    }

    /// The node behind `node`.
    ///
    /// # Panics
    /// Panics if the node was removed.
    #[must_use]
    pub fn node(&self, node: NodeId) -> &Node {
        let Some(Some(found)) = self.nodes.get(node.0) else {
            panic!("{node} does not exist");
        };
        found
    }

    fn node_mut(&mut self, node: NodeId) -> &mut Node {
        let Some(Some(found)) = self.nodes.get_mut(node.0) else {
            panic!("{node} does not exist");
        };
        found
    }

    /// Records `callee` as the resolved target of the call `node`.
    ///
    /// # Panics
    /// Panics if `node` is not an [`Operation::Invoke`].
    pub fn resolve_call(&mut self, node: NodeId, callee: MethodId) {
        match &mut self.node_mut(node).op {
            Operation::Invoke { target, .. } => *target = Some(callee),
            other => panic!("{node} ({other}) is not a call"),
        }
    }

    /// The operation of `node`.
    #[must_use]
    pub fn op(&self, node: NodeId) -> &Operation {
        &self.node(node).op
    }

    /// The block owning `node`.
    #[must_use]
    pub fn block_of(&self, node: NodeId) -> Option<BlockId> {
        self.node(node).block
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Every live node, in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_some())
            .map(|(index, _)| NodeId(index))
    }

    // ---- ports ----

    /// The input port behind `input`.
    ///
    /// # Panics
    /// Panics if the port was removed.
    #[must_use]
    pub fn input_port(&self, input: InputId) -> &InputPort {
        let Some(Some(port)) = self.inputs.get(input.0) else {
            panic!("{input} does not exist");
        };
        port
    }

    fn input_mut(&mut self, input: InputId) -> &mut InputPort {
        let Some(Some(port)) = self.inputs.get_mut(input.0) else {
            panic!("{input} does not exist");
        };
        port
    }

    /// The output port behind `output`.
    ///
    /// # Panics
    /// Panics if the port was removed.
    #[must_use]
    pub fn output_port(&self, output: OutputId) -> &OutputPort {
        let Some(Some(port)) = self.outputs.get(output.0) else {
            panic!("{output} does not exist");
        };
        port
    }

    fn output_mut(&mut self, output: OutputId) -> &mut OutputPort {
        let Some(Some(port)) = self.outputs.get_mut(output.0) else {
            panic!("{output} does not exist");
        };
        port
    }

    /// Input ports of `node`.
    #[must_use]
    pub fn inputs(&self, node: NodeId) -> &BTreeMap<PortId, InputId> {
        &self.node(node).inputs
    }

    /// Output ports of `node`.
    #[must_use]
    pub fn outputs(&self, node: NodeId) -> &BTreeMap<PortId, OutputId> {
        &self.node(node).outputs
    }

    /// The input `port` of `node`.
    #[must_use]
    pub fn input(&self, node: NodeId, port: PortId) -> Option<InputId> {
        self.node(node).input(port)
    }

    /// The output `port` of `node`.
    #[must_use]
    pub fn output(&self, node: NodeId, port: PortId) -> Option<OutputId> {
        self.node(node).output(port)
    }

    /// The output feeding `input`.
    #[must_use]
    pub fn source(&self, input: InputId) -> Option<OutputId> {
        self.input_port(input).source
    }

    /// The output feeding input `port` of `node`.
    #[must_use]
    pub fn source_of(&self, node: NodeId, port: PortId) -> Option<OutputId> {
        self.input(node, port).and_then(|input| self.source(input))
    }

    /// Every input fed by `output`.
    #[must_use]
    pub fn targets(&self, output: OutputId) -> &BTreeSet<InputId> {
        &self.output_port(output).targets
    }

    /// Adds input `port` to `node`, linked to `source` if given.
    ///
    /// # Panics
    /// Panics if the node already has an input with that id.
    pub fn add_input(&mut self, node: NodeId, port: PortId, source: Option<OutputId>) -> InputId {
        assert!(
            !self.node(node).inputs.contains_key(&port),
            "{node} already has input {port}"
        );
        let id = InputId(self.inputs.len());
        self.inputs.push(Some(InputPort {
            node,
            port,
            source: None,
        }));
        self.node_mut(node).inputs.insert(port, id);
        if let Some(source) = source {
            self.link(id, source);
        }
        id
    }

    /// Adds output `port` to `node`.
    ///
    /// # Panics
    /// Panics if the node already has an output with that id.
    pub fn add_output(&mut self, node: NodeId, port: PortId) -> OutputId {
        assert!(
            !self.node(node).outputs.contains_key(&port),
            "{node} already has output {port}"
        );
        let id = OutputId(self.outputs.len());
        self.outputs.push(Some(OutputPort {
            node,
            port,
            targets: BTreeSet::new(),
        }));
        self.node_mut(node).outputs.insert(port, id);
        id
    }

    /// Returns output `port` of `node`, creating it if needed.
    pub fn provide_output(&mut self, node: NodeId, port: PortId) -> OutputId {
        match self.output(node, port) {
            Some(existing) => existing,
            None => self.add_output(node, port),
        }
    }

    /// Links `input` to `output`.
    ///
    /// # Panics
    /// Panics if `input` is already linked or either port does not exist.
    pub fn link(&mut self, input: InputId, output: OutputId) {
        let _ = self.output_port(output);
        let port = self.input_mut(input);
        if let Some(existing) = port.source {
            panic!("{input} is already linked to {existing}");
        }
        port.source = Some(output);
        self.output_mut(output).targets.insert(input);
    }

    /// Disconnects `input` and returns the output it was linked to.
    ///
    /// # Panics
    /// Panics if `input` is not linked.
    pub fn unlink(&mut self, input: InputId) -> OutputId {
        let Some(source) = self.input_mut(input).source.take() else {
            panic!("{input} is not linked");
        };
        self.output_mut(source).targets.remove(&input);
        source
    }

    /// Re-links every target of `output` to `replacement`.
    pub fn replace_with(&mut self, output: OutputId, replacement: OutputId) {
        if output == replacement {
            return;
        }
        let _ = self.output_port(replacement);
        let targets = std::mem::take(&mut self.output_mut(output).targets);
        for target in &targets {
            self.input_mut(*target).source = Some(replacement);
        }
        self.output_mut(replacement).targets.extend(targets);
    }

    /// Removes an unused output port.
    ///
    /// # Panics
    /// Panics if the output still has targets.
    pub fn remove_output(&mut self, output: OutputId) {
        let port = self.output_port(output);
        assert!(
            port.targets.is_empty(),
            "{output} ({} of {}) still has {} targets",
            port.port,
            port.node,
            port.targets.len()
        );
        let (node, role) = (port.node, port.port);
        self.node_mut(node).outputs.remove(&role);
        self.outputs[output.0] = None;
    }

    /// Removes an input port, unlinking it first if needed.
    pub fn remove_input(&mut self, input: InputId) {
        if self.input_port(input).source.is_some() {
            self.unlink(input);
        }
        let port = self.input_port(input);
        let (node, role) = (port.node, port.port);
        self.node_mut(node).inputs.remove(&role);
        self.inputs[input.0] = None;
    }

    /// Removes a node together with its ports.
    ///
    /// The node's inputs are unlinked. If the node was its block's terminator the block
    /// becomes unterminated; the successor list is left for the caller to rewrite.
    ///
    /// # Panics
    /// Panics if any output of the node still has targets.
    pub fn remove_node(&mut self, node: NodeId) {
        let found = self.node(node);
        for (port, output) in &found.outputs {
            assert!(
                self.targets(*output).is_empty(),
                "cannot remove {node} ({}): output {port} still has targets",
                found.op
            );
        }
        let inputs: Vec<InputId> = found.inputs.values().copied().collect();
        let outputs: Vec<OutputId> = found.outputs.values().copied().collect();
        let block = found.block;

        for input in inputs {
            self.remove_input(input);
        }
        for output in outputs {
            self.remove_output(output);
        }
        if let Some(Some(owner)) = block.and_then(|b| self.blocks.get_mut(b.0)) {
            owner.nodes.remove(&node);
            if owner.terminator == Some(node) {
                owner.terminator = None;
            }
        }
        self.nodes[node.0] = None;
    }

    /// Splices `input_node` onto `output_node` and removes both.
    ///
    /// For every port id, the targets of `output_node`'s output are re-linked to the source
    /// of `input_node`'s input. This is how a jump is fused with the entry of its target:
    /// each value the entry hands out is replaced by the value the jump passed in.
    ///
    /// # Panics
    /// Panics if the two nodes do not have the same set of port ids, or if an input of
    /// `input_node` is unlinked.
    pub fn merge_nodes(&mut self, input_node: NodeId, output_node: NodeId) {
        let inputs = self.node(input_node).inputs.clone();
        let outputs = self.node(output_node).outputs.clone();
        assert!(
            inputs.keys().eq(outputs.keys()),
            "cannot merge {input_node} into {output_node}: inputs {:?} do not match outputs {:?}",
            inputs.keys().collect::<Vec<_>>(),
            outputs.keys().collect::<Vec<_>>()
        );

        for (port, input) in &inputs {
            let Some(source) = self.source(*input) else {
                panic!("cannot merge {input_node}: input {port} is not linked");
            };
            self.unlink(*input);
            self.replace_with(outputs[port], source);
        }
        self.remove_node(output_node);
        self.remove_node(input_node);
    }

    /// Every node reachable from `roots` by following links in either direction.
    #[must_use]
    pub fn connected_nodes(&self, roots: impl IntoIterator<Item = NodeId>) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut work: Vec<NodeId> = roots.into_iter().collect();

        while let Some(node) = work.pop() {
            if !seen.insert(node) {
                continue;
            }
            let found = self.node(node);
            for input in found.inputs.values() {
                if let Some(source) = self.source(*input) {
                    work.push(self.output_port(source).node);
                }
            }
            for output in found.outputs.values() {
                for target in self.targets(*output) {
                    work.push(self.input_port(*target).node);
                }
            }
        }
        seen
    }

    /// Checks that every link is recorded at both ends and every handle is live.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] describing the first inconsistency found.
    pub fn verify_links(&self) -> Result<()> {
        for (index, slot) in self.nodes.iter().enumerate() {
            let Some(node) = slot else { continue };
            let id = NodeId(index);
            for (port, input) in &node.inputs {
                match self.inputs.get(input.0) {
                    Some(Some(p)) if p.node == id && p.port == *port => {}
                    _ => return Err(invariant_error!("{id} input {port} points at stale {input}")),
                }
            }
            for (port, output) in &node.outputs {
                match self.outputs.get(output.0) {
                    Some(Some(p)) if p.node == id && p.port == *port => {}
                    _ => {
                        return Err(invariant_error!("{id} output {port} points at stale {output}"))
                    }
                }
            }
        }

        for (index, slot) in self.inputs.iter().enumerate() {
            let Some(port) = slot else { continue };
            let id = InputId(index);
            if !self.contains_node(port.node) {
                return Err(invariant_error!("{id} belongs to removed {}", port.node));
            }
            if let Some(source) = port.source {
                match self.outputs.get(source.0) {
                    Some(Some(output)) if output.targets.contains(&id) => {}
                    Some(Some(_)) => {
                        return Err(invariant_error!(
                            "{id} ({} of {}) is sourced from {source} which does not list it",
                            port.port,
                            port.node
                        ))
                    }
                    _ => return Err(invariant_error!("{id} is sourced from removed {source}")),
                }
            }
        }

        for (index, slot) in self.outputs.iter().enumerate() {
            let Some(port) = slot else { continue };
            let id = OutputId(index);
            if !self.contains_node(port.node) {
                return Err(invariant_error!("{id} belongs to removed {}", port.node));
            }
            for target in &port.targets {
                match self.inputs.get(target.0) {
                    Some(Some(input)) if input.source == Some(id) => {}
                    _ => {
                        return Err(invariant_error!(
                            "{id} ({} of {}) targets {target} which is not linked back",
                            port.port,
                            port.node
                        ))
                    }
                }
            }
        }

        for (index, slot) in self.blocks.iter().enumerate() {
            let Some(block) = slot else { continue };
            let id = BlockId(index);
            if !self.contains_node(block.entry) {
                return Err(invariant_error!("{id} has removed entry {}", block.entry));
            }
            if let Some(terminator) = block.terminator {
                if !self.contains_node(terminator) {
                    return Err(invariant_error!("{id} has removed terminator {terminator}"));
                }
            }
            for node in &block.nodes {
                if !self.contains_node(*node) || self.node(*node).block != Some(id) {
                    return Err(invariant_error!("{id} lists {node} which it does not own"));
                }
            }
            for successor in &block.successors {
                match self.blocks.get(successor.0) {
                    Some(Some(s)) if s.predecessors.contains(&id) => {}
                    _ => {
                        return Err(invariant_error!(
                            "{id} jumps to {successor} which does not list it as predecessor"
                        ))
                    }
                }
            }
            for predecessor in &block.predecessors {
                match self.blocks.get(predecessor.0) {
                    Some(Some(p)) if p.successors.contains(&id) => {}
                    _ => {
                        return Err(invariant_error!(
                            "{id} lists {predecessor} as predecessor but is not its successor"
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    // ---- blocks ----

    /// Creates a block whose entry node performs `entry` and has an `Env` output.
    pub fn new_block(&mut self, entry: Operation, offset: Option<usize>) -> BlockId {
        debug_assert!(entry.is_entry(), "{entry} cannot start a block");
        let id = BlockId(self.blocks.len());
        let node = NodeId(self.nodes.len());
        self.nodes.push(Some(Node::new(entry, Some(id))));
        self.blocks.push(Some(Block::new(node, offset)));
        self.add_output(node, PortId::Env);
        id
    }

    /// Returns `true` if `block` exists and has not been removed.
    #[must_use]
    pub fn contains_block(&self, block: BlockId) -> bool {
        matches!(self.blocks.get(block.0), Some(Some(_)))
    }

    /// Handles of every live block in the arena, across all methods.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| BlockId(index))
    }

    /// The block behind `block`.
    ///
    /// # Panics
    /// Panics if the block was removed.
    #[must_use]
    pub fn block(&self, block: BlockId) -> &Block {
        let Some(Some(found)) = self.blocks.get(block.0) else {
            panic!("{block} does not exist");
        };
        found
    }

    pub(crate) fn block_mut(&mut self, block: BlockId) -> &mut Block {
        let Some(Some(found)) = self.blocks.get_mut(block.0) else {
            panic!("{block} does not exist");
        };
        found
    }

    /// Successors of `block`.
    #[must_use]
    pub fn successors(&self, block: BlockId) -> &[BlockId] {
        &self.block(block).successors
    }

    /// Predecessors of `block`.
    #[must_use]
    pub fn predecessors(&self, block: BlockId) -> &BTreeSet<BlockId> {
        &self.block(block).predecessors
    }

    /// Completes `block` with `terminator` and records the control-flow edges.
    ///
    /// # Panics
    /// Panics if the block is already terminated or `terminator` is not a terminator.
    pub fn set_terminator(&mut self, block: BlockId, terminator: NodeId, successors: Vec<BlockId>) {
        assert!(
            self.op(terminator).is_terminator(),
            "{terminator} ({}) cannot terminate a block",
            self.op(terminator)
        );
        let found = self.block_mut(block);
        if let Some(existing) = found.terminator {
            panic!("{block} is already terminated by {existing}");
        }
        found.terminator = Some(terminator);
        found.successors.clone_from(&successors);
        for successor in successors {
            self.block_mut(successor).predecessors.insert(block);
        }
    }

    /// Removes the control-flow edges of `block` and returns its terminator, which stays in
    /// the arena for the caller to reuse or remove.
    pub fn detach_terminator(&mut self, block: BlockId) -> Option<NodeId> {
        let found = self.block_mut(block);
        let terminator = found.terminator.take();
        let successors = std::mem::take(&mut found.successors);
        for successor in successors {
            if let Some(Some(s)) = self.blocks.get_mut(successor.0) {
                s.predecessors.remove(&block);
            }
        }
        terminator
    }

    /// Removes `block` and every node it owns.
    ///
    /// Inputs are unlinked before any node is removed, so the block's nodes may feed each
    /// other freely. The block must not feed nodes of other blocks. Predecessors drop their
    /// edge to the removed block, which shifts their successor indices; this is meant for
    /// removing whole unreachable regions, whose predecessors are unreachable too.
    ///
    /// # Panics
    /// Panics if an output of the block still feeds a node outside it.
    pub fn remove_block(&mut self, block: BlockId) {
        self.detach_terminator(block);
        let nodes: Vec<NodeId> = self.block(block).nodes.iter().copied().collect();
        for node in &nodes {
            let inputs: Vec<InputId> = self.node(*node).inputs.values().copied().collect();
            for input in inputs {
                if self.source(input).is_some() {
                    self.unlink(input);
                }
            }
        }
        for node in nodes {
            self.remove_node(node);
        }
        for predecessor in self.block(block).predecessors.clone() {
            if let Some(Some(p)) = self.blocks.get_mut(predecessor.0) {
                p.successors.retain(|s| *s != block);
            }
        }
        self.blocks[block.0] = None;
    }

    /// Appends `successor` to `block`: the jump ending `block` is merged with the entry of
    /// `successor`, and `block` takes over `successor`'s nodes, terminator and successors.
    ///
    /// # Panics
    /// Panics unless `successor` is the only successor of `block` and `block` the only
    /// predecessor of `successor`, or if the jump's ports do not match the entry's.
    pub fn fuse_blocks(&mut self, block: BlockId, successor: BlockId) {
        assert_ne!(block, successor, "cannot fuse {block} with itself");
        let found = self.block(block);
        assert_eq!(found.successors, [successor], "{block} has other successors");
        assert!(
            self.predecessors(successor).iter().eq([block].iter()),
            "{successor} has other predecessors"
        );
        let Some(jump) = found.terminator else {
            panic!("{block} is not terminated");
        };
        let entry = self.block(successor).entry;

        self.merge_nodes(jump, entry);

        let Some(absorbed) = self.blocks[successor.0].take() else {
            panic!("{successor} does not exist");
        };
        for node in &absorbed.nodes {
            self.node_mut(*node).block = Some(block);
        }
        for next in &absorbed.successors {
            let next = self.block_mut(*next);
            next.predecessors.remove(&successor);
            next.predecessors.insert(block);
        }

        let found = self.block_mut(block);
        found.nodes.extend(absorbed.nodes);
        found.terminator = absorbed.terminator;
        found.successors = absorbed.successors;
        found.consumed += absorbed.consumed.saturating_sub(found.produced);
        found.produced = absorbed.produced + found.produced.saturating_sub(absorbed.consumed);
    }

    /// Every block reachable from `entry`, depth-first in successor order.
    #[must_use]
    pub fn method_blocks(&self, entry: BlockId) -> Vec<BlockId> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut work = vec![entry];

        while let Some(block) = work.pop() {
            if !seen.insert(block) {
                continue;
            }
            order.push(block);
            for successor in self.successors(block).iter().rev() {
                if !seen.contains(successor) {
                    work.push(*successor);
                }
            }
        }
        order
    }

    /// Terminators of every block reachable from `entry`.
    #[must_use]
    pub fn terminators(&self, entry: BlockId) -> Vec<NodeId> {
        self.method_blocks(entry)
            .into_iter()
            .filter_map(|block| self.block(block).terminator)
            .collect()
    }

    /// Live nodes of every block reachable from `entry`.
    #[must_use]
    pub fn method_nodes(&self, entry: BlockId) -> Vec<NodeId> {
        self.method_blocks(entry)
            .into_iter()
            .flat_map(|block| self.block(block).nodes.iter().copied())
            .collect()
    }

    pub(crate) fn set_stack_effect(&mut self, block: BlockId, consumed: u32, produced: u32) {
        let found = self.block_mut(block);
        found.consumed = consumed;
        found.produced = produced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::ConstValue, metadata::PrimitiveType};

    fn constant(graph: &mut Graph, block: BlockId, value: i32) -> OutputId {
        let node = graph.create_node(Operation::Constant(ConstValue::Int(value)), Some(block));
        graph.add_output(node, PortId::Arg(0))
    }

    #[test]
    fn test_link_symmetry() -> crate::Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = constant(&mut graph, block, 1);
        let add = graph.create_node(
            Operation::Binary {
                ty: PrimitiveType::Int,
                op: BinaryOp::Add,
            },
            Some(block),
        );
        let lhs = graph.add_input(add, PortId::Arg(0), Some(one));
        let rhs = graph.add_input(add, PortId::Arg(1), Some(one));

        assert_eq!(graph.source(lhs), Some(one));
        assert_eq!(graph.targets(one).len(), 2);
        graph.verify_links()?;

        assert_eq!(graph.unlink(rhs), one);
        assert_eq!(graph.targets(one).len(), 1);
        graph.verify_links()?;
        Ok(())
    }

    #[test]
    fn test_replace_with() -> crate::Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = constant(&mut graph, block, 1);
        let two = constant(&mut graph, block, 2);
        let neg = graph.create_node(Operation::Negate(PrimitiveType::Int), Some(block));
        let input = graph.add_input(neg, PortId::Arg(0), Some(one));

        graph.replace_with(one, one);
        assert_eq!(graph.source(input), Some(one));

        graph.replace_with(one, two);
        assert_eq!(graph.source(input), Some(two));
        assert!(graph.targets(one).is_empty());
        graph.verify_links()?;
        Ok(())
    }

    #[test]
    #[should_panic(expected = "still has targets")]
    fn test_remove_used_node_panics() {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = constant(&mut graph, block, 1);
        let neg = graph.create_node(Operation::Negate(PrimitiveType::Int), Some(block));
        graph.add_input(neg, PortId::Arg(0), Some(one));
        let producer = graph.output_port(one).node();
        graph.remove_node(producer);
    }

    #[test]
    #[should_panic(expected = "already linked")]
    fn test_double_link_panics() {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = constant(&mut graph, block, 1);
        let neg = graph.create_node(Operation::Negate(PrimitiveType::Int), Some(block));
        let input = graph.add_input(neg, PortId::Arg(0), Some(one));
        graph.link(input, one);
    }

    #[test]
    #[should_panic(expected = "already terminated")]
    fn test_double_terminate_panics() {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let first = graph.create_node(Operation::Return(None), Some(block));
        let second = graph.create_node(Operation::Return(None), Some(block));
        graph.set_terminator(block, first, Vec::new());
        graph.set_terminator(block, second, Vec::new());
    }

    #[test]
    fn test_remove_node_unlinks_inputs() -> crate::Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = constant(&mut graph, block, 1);
        let neg = graph.create_node(Operation::Negate(PrimitiveType::Int), Some(block));
        graph.add_input(neg, PortId::Arg(0), Some(one));
        graph.add_output(neg, PortId::Arg(0));

        graph.remove_node(neg);
        assert!(!graph.contains_node(neg));
        assert!(graph.targets(one).is_empty());
        assert!(!graph.block(block).nodes().contains(&neg));
        graph.verify_links()?;
        Ok(())
    }

    #[test]
    fn test_fuse_blocks() -> crate::Result<()> {
        let mut graph = Graph::new();
        let first = graph.new_block(Operation::BlockEntry, Some(0));
        let second = graph.new_block(Operation::BlockEntry, Some(4));

        let one = constant(&mut graph, first, 1);
        let jump = graph.create_node(Operation::Jump, Some(first));
        let env = graph.output(graph.block(first).entry(), PortId::Env);
        graph.add_input(jump, PortId::Env, env);
        graph.add_input(jump, PortId::Stack(0), Some(one));
        graph.set_terminator(first, jump, vec![second]);

        let entry = graph.block(second).entry();
        let passed = graph.add_output(entry, PortId::Stack(0));
        let ret = graph.create_node(Operation::Return(Some(PrimitiveType::Int)), Some(second));
        let env = graph.output(entry, PortId::Env);
        graph.add_input(ret, PortId::Env, env);
        let value = graph.add_input(ret, PortId::Arg(0), Some(passed));
        graph.set_terminator(second, ret, Vec::new());

        graph.fuse_blocks(first, second);

        assert!(!graph.contains_block(second));
        assert_eq!(graph.block(first).terminator(), Some(ret));
        assert_eq!(graph.block_of(ret), Some(first));
        assert_eq!(graph.source(value), Some(one));
        assert_eq!(graph.method_blocks(first), vec![first]);
        graph.verify_links()?;
        Ok(())
    }

    #[test]
    #[should_panic(expected = "do not match")]
    fn test_merge_mismatched_panics() {
        let mut graph = Graph::new();
        let first = graph.new_block(Operation::BlockEntry, Some(0));
        let second = graph.new_block(Operation::BlockEntry, Some(4));
        let jump = graph.create_node(Operation::Jump, Some(first));
        let env = graph.output(graph.block(first).entry(), PortId::Env);
        graph.add_input(jump, PortId::Env, env);
        let entry = graph.block(second).entry();
        graph.add_output(entry, PortId::Local(0));
        graph.merge_nodes(jump, entry);
    }

    #[test]
    fn test_connected_nodes() {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = constant(&mut graph, block, 1);
        let neg = graph.create_node(Operation::Negate(PrimitiveType::Int), Some(block));
        graph.add_input(neg, PortId::Arg(0), Some(one));
        let lonely = graph.create_node(Operation::Constant(ConstValue::Null), Some(block));

        let connected = graph.connected_nodes([neg]);
        assert!(connected.contains(&graph.output_port(one).node()));
        assert!(!connected.contains(&lonely));
    }
}
