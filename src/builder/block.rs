//! Construction of a single block.

use crate::{
    analysis::ConstValue,
    graph::{BlockId, Graph, NodeId, Operation, OutputId, PortId},
};

/// One operand stack entry.
///
/// `wide` marks `long` and `double` values, which occupy two JVM stack slots but a single
/// entry here. The `pop2` and `dup2` families need the distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    /// The value
    pub value: OutputId,
    /// Occupies two JVM stack slots
    pub wide: bool,
}

/// Builds the nodes of one block from a symbolic operand stack.
///
/// Values produced inside the block are tracked by reference and never touch the graph
/// until an instruction consumes them. Crossing the block boundary is made explicit:
///
/// - popping more than the block pushed emits a `Pop` marker, whose value comes from the
///   predecessor's stack
/// - local variable accesses always emit `LoadLocal`/`StoreLocal` markers
/// - [`BlockBuilder::terminate`] flushes what is left on the symbolic stack as `Push`
///   markers before placing the terminator
///
/// Stack elimination later replaces every marker with direct links and boundary ports.
///
/// # Examples
///
/// ```rust
/// use portflow::analysis::ConstValue;
/// use portflow::builder::BlockBuilder;
/// use portflow::graph::{Graph, Operation};
/// use portflow::metadata::PrimitiveType;
///
/// let mut graph = Graph::new();
/// let block = graph.new_block(Operation::BlockEntry, Some(0));
/// let mut builder = BlockBuilder::new(&mut graph, block, Vec::new());
/// let one = builder.constant(ConstValue::Int(1));
/// builder.terminate(Operation::Return(Some(PrimitiveType::Int)), &[one], Vec::new());
/// assert!(graph.block(block).terminator().is_some());
/// ```
pub struct BlockBuilder<'g> {
    graph: &'g mut Graph,
    block: BlockId,
    environment: OutputId,
    stack: Vec<StackEntry>,
    /// Widths of the entries on the stack when control enters the block, bottom first
    incoming: Vec<bool>,
    consumed: usize,
    terminated: bool,
}

impl<'g> BlockBuilder<'g> {
    /// Starts building `block`. `incoming` lists the width of each stack entry on entry,
    /// bottom first.
    ///
    /// # Panics
    /// Panics if the block's entry node has no `Env` output.
    pub fn new(graph: &'g mut Graph, block: BlockId, incoming: Vec<bool>) -> Self {
        let entry = graph.block(block).entry();
        let Some(environment) = graph.output(entry, PortId::Env) else {
            panic!("{block} entry {entry} has no environment output");
        };
        BlockBuilder {
            graph,
            block,
            environment,
            stack: Vec::new(),
            incoming,
            consumed: 0,
            terminated: false,
        }
    }

    /// The block being built.
    #[must_use]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Returns `true` once a terminator has been placed.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The stack shape handed to successors: widths of every entry, bottom first.
    #[must_use]
    pub fn outgoing(&self) -> Vec<bool> {
        let kept = self.incoming.len().saturating_sub(self.consumed);
        self.incoming[..kept]
            .iter()
            .copied()
            .chain(self.stack.iter().map(|entry| entry.wide))
            .collect()
    }

    // ---- operand stack ----

    /// Pushes a value.
    pub fn push(&mut self, value: OutputId, wide: bool) {
        self.stack.push(StackEntry { value, wide });
    }

    /// Pops one entry, emitting a `Pop` marker when the block's own pushes are exhausted.
    pub fn pop_entry(&mut self) -> StackEntry {
        if let Some(entry) = self.stack.pop() {
            return entry;
        }
        let wide = self
            .incoming
            .len()
            .checked_sub(self.consumed + 1)
            .and_then(|index| self.incoming.get(index).copied())
            .unwrap_or(false);
        self.consumed += 1;

        let node = self.node(Operation::Pop);
        self.graph.add_input(node, PortId::Env, Some(self.environment));
        self.environment = self.graph.add_output(node, PortId::Env);
        let value = self.graph.add_output(node, PortId::Arg(0));
        StackEntry { value, wide }
    }

    /// Pops one value.
    pub fn pop(&mut self) -> OutputId {
        self.pop_entry().value
    }

    /// Pops `count` values and returns them in push order.
    pub fn pop_values(&mut self, count: usize) -> Vec<OutputId> {
        let mut values: Vec<OutputId> = (0..count).map(|_| self.pop()).collect();
        values.reverse();
        values
    }

    /// Pops entries covering `slots` JVM stack slots and returns them in push order.
    pub fn pop_slots(&mut self, slots: u32) -> Vec<StackEntry> {
        let mut taken = Vec::new();
        let mut covered = 0;
        while covered < slots {
            let entry = self.pop_entry();
            covered += if entry.wide { 2 } else { 1 };
            taken.push(entry);
        }
        taken.reverse();
        taken
    }

    /// Pushes entries in order.
    pub fn push_entries(&mut self, entries: &[StackEntry]) {
        self.stack.extend_from_slice(entries);
    }

    // ---- locals ----

    /// Reads local `slot`.
    pub fn load_local(&mut self, slot: u32) -> OutputId {
        self.reader(Operation::LoadLocal(slot), &[])
    }

    /// Writes local `slot`.
    pub fn store_local(&mut self, slot: u32, value: OutputId) {
        self.effect(Operation::StoreLocal(slot), &[value], false);
    }

    // ---- nodes ----

    /// A literal.
    pub fn constant(&mut self, value: ConstValue) -> OutputId {
        let node = self.node(Operation::Constant(value));
        self.graph.add_output(node, PortId::Arg(0))
    }

    /// An operation without environment ports, with `args` as `Arg(0..)`.
    pub fn pure(&mut self, op: Operation, args: &[OutputId]) -> OutputId {
        let node = self.node(op);
        self.wire_args(node, args);
        self.graph.add_output(node, PortId::Arg(0))
    }

    /// An operation that reads the current environment.
    pub fn reader(&mut self, op: Operation, args: &[OutputId]) -> OutputId {
        let node = self.node(op);
        self.graph.add_input(node, PortId::Env, Some(self.environment));
        self.wire_args(node, args);
        self.graph.add_output(node, PortId::Arg(0))
    }

    /// An operation that replaces the current environment, optionally producing a value.
    pub fn effect(&mut self, op: Operation, args: &[OutputId], result: bool) -> Option<OutputId> {
        let node = self.node(op);
        self.graph.add_input(node, PortId::Env, Some(self.environment));
        self.wire_args(node, args);
        self.environment = self.graph.add_output(node, PortId::Env);
        result.then(|| self.graph.add_output(node, PortId::Arg(0)))
    }

    /// Ends the block with `op`, consuming `args`, and records its successors.
    ///
    /// Entries left on the symbolic stack are flushed as `Push` markers first, bottom
    /// entry first.
    ///
    /// # Panics
    /// Panics if the block is already terminated.
    pub fn terminate(&mut self, op: Operation, args: &[OutputId], successors: Vec<BlockId>) {
        assert!(!self.terminated, "{} is already terminated", self.block);
        for entry in self.stack.clone() {
            self.effect(Operation::Push, &[entry.value], false);
        }

        let node = self.node(op);
        self.graph.add_input(node, PortId::Env, Some(self.environment));
        self.wire_args(node, args);
        self.graph.set_terminator(self.block, node, successors);
        self.terminated = true;
        log::trace!("terminated {} with {node}", self.block);
    }

    fn node(&mut self, op: Operation) -> NodeId {
        self.graph.create_node(op, Some(self.block))
    }

    fn wire_args(&mut self, node: NodeId, args: &[OutputId]) {
        for (index, arg) in (0u32..).zip(args) {
            self.graph.add_input(node, PortId::Arg(index), Some(*arg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PrimitiveType;

    fn markers(graph: &Graph, block: BlockId) -> Vec<String> {
        graph
            .block(block)
            .nodes()
            .iter()
            .filter(|node| graph.op(**node).is_marker())
            .map(|node| graph.op(*node).to_string())
            .collect()
    }

    #[test]
    fn test_inner_values_need_no_markers() -> crate::Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let mut builder = BlockBuilder::new(&mut graph, block, Vec::new());
        let two = builder.constant(ConstValue::Int(2));
        builder.push(two, false);
        let top = builder.pop();
        builder.terminate(Operation::Return(Some(PrimitiveType::Int)), &[top], Vec::new());

        assert!(markers(&graph, block).is_empty());
        graph.verify_links()
    }

    #[test]
    fn test_underflow_emits_pop_markers() -> crate::Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let mut builder = BlockBuilder::new(&mut graph, block, vec![false, true]);
        let top = builder.pop_entry();
        assert!(top.wide);
        let below = builder.pop_entry();
        assert!(!below.wide);
        builder.terminate(Operation::Throw, &[top.value], Vec::new());

        assert_eq!(markers(&graph, block), vec!["pop", "pop"]);
        graph.verify_links()
    }

    #[test]
    fn test_terminate_flushes_stack() -> crate::Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let next = graph.new_block(Operation::BlockEntry, Some(4));
        let mut builder = BlockBuilder::new(&mut graph, block, vec![false]);
        let long = builder.constant(ConstValue::Long(1));
        builder.push(long, true);
        builder.terminate(Operation::Jump, &[], vec![next]);
        assert_eq!(builder.outgoing(), vec![false, true]);

        assert_eq!(markers(&graph, block), vec!["push"]);
        assert_eq!(graph.predecessors(next).len(), 1);
        graph.verify_links()
    }

    #[test]
    fn test_pop_slots_respects_width() {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let mut builder = BlockBuilder::new(&mut graph, block, Vec::new());
        let a = builder.constant(ConstValue::Int(1));
        let b = builder.constant(ConstValue::Int(2));
        let c = builder.constant(ConstValue::Double(3.0));
        builder.push(a, false);
        builder.push(b, false);
        builder.push(c, true);

        let wide = builder.pop_slots(2);
        assert_eq!(wide.len(), 1);
        let pair = builder.pop_slots(2);
        assert_eq!(pair.iter().map(|e| e.value).collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    #[should_panic(expected = "already terminated")]
    fn test_double_terminate_panics() {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let mut builder = BlockBuilder::new(&mut graph, block, Vec::new());
        builder.terminate(Operation::Return(None), &[], Vec::new());
        builder.terminate(Operation::Return(None), &[], Vec::new());
    }
}
