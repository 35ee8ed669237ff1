//! Block-level transformations of a method graph.
//!
//! The builder leaves a method with explicit stack and local bookkeeping: `Push`, `Pop`,
//! `LoadLocal` and `StoreLocal` markers on each block's environment chain. The passes here
//! turn that into direct dataflow and then simplify it.
//!
//! # Parsing
//!
//! [`prepare`] runs the passes every freshly built method goes through:
//!
//! 1. [`eliminate_stack`] replaces the markers with direct links and boundary ports
//! 2. [`add_missing_block_ports`] makes every predecessor pass what a successor reads
//! 3. [`remove_extra_block_ports`] drops boundary ports nothing reads
//! 4. [`prune_dead_nodes`] removes computations whose results are unused
//!
//! # Simplification
//!
//! [`simplify_method`] repeats constant propagation, dead block removal, cleanup and jump
//! fusion until the graph stops changing.
//!
//! # Boundary ports
//!
//! A block's `consumed` is how many entries it pops off the stack it was entered with and
//! `produced` how many entries its terminator passes on top of what is left. A successor's
//! `Stack(j)` therefore comes from the terminator's `Stack(j)` input when `j < produced`,
//! and otherwise passes straight through from the block's own entry as
//! `Stack(j - produced + consumed)`.

use std::collections::{BTreeSet, VecDeque};

use imbl::OrdMap;

use crate::{
    analysis::{Chain, GraphEvaluator, Value},
    compiler::{CompilerConfig, EventKind, EventLog},
    graph::{BlockId, Graph, InputId, NodeId, Operation, OperationClass, OutputId, PortId},
    Error, Result,
};

/// Runs the passes that turn a freshly built method into marker-free dataflow, then checks
/// the links.
///
/// # Errors
/// Returns [`Error::Format`] for a stack or local that is read without being defined, and
/// [`Error::Invariant`] if the graph is inconsistent.
pub fn prepare(graph: &mut Graph, entry: BlockId) -> Result<()> {
    eliminate_stack(graph, entry)?;
    add_missing_block_ports(graph, entry)?;
    remove_extra_block_ports(graph, entry);
    let nodes = graph.method_nodes(entry);
    prune_dead_nodes(graph, nodes);
    graph.verify_links()
}

/// Per-path state of the marker walk.
#[derive(Clone)]
struct Frame {
    stack: Chain<OutputId>,
    locals: OrdMap<u32, OutputId>,
    consumed: u32,
}

/// Replaces every stack and local marker of the method with direct links.
///
/// Each block is walked along its environment chain from the entry node, with the symbolic
/// stack and local bindings at that point:
///
/// - `Push` puts its operand on the stack
/// - `Pop` takes the top of the stack, or the entry's next `Stack(n)` port once the block's
///   own pushes are exhausted
/// - `StoreLocal` binds the slot, `LoadLocal` reads the binding or the entry's `Local(n)`
///
/// The markers are removed as they are visited. A jump, branch or switch receives a
/// `Stack(n)` input per remaining stack entry and a `Local(n)` input per bound slot.
///
/// # Errors
/// Returns [`Error::Invariant`] if a block has no environment or a marker is not on the
/// environment chain.
pub fn eliminate_stack(graph: &mut Graph, entry: BlockId) -> Result<()> {
    for block in graph.method_blocks(entry) {
        eliminate_block(graph, block)?;
    }
    Ok(())
}

fn eliminate_block(graph: &mut Graph, block: BlockId) -> Result<()> {
    let entry = graph.block(block).entry();
    let Some(environment) = graph.output(entry, PortId::Env) else {
        return Err(invariant_error!("{block} entry {entry} has no environment"));
    };

    let root = Frame {
        stack: Chain::new(),
        locals: OrdMap::new(),
        consumed: 0,
    };
    let mut work = Vec::new();
    let first = readers_of(graph, environment);
    schedule(graph, first, &root, &mut work);

    let (mut consumed, mut produced) = (0, 0);
    while let Some((node, mut frame)) = work.pop() {
        if !graph.contains_node(node) {
            continue;
        }
        let op = graph.op(node).clone();
        match op {
            Operation::Push => {
                let value = required_source(graph, node, PortId::Arg(0))?;
                frame.stack = frame.stack.push(value);
                let next = bypass(graph, node)?;
                schedule(graph, next, &frame, &mut work);
            }
            Operation::Pop => {
                let value = match frame.stack.head() {
                    Some(top) => {
                        let top = *top;
                        frame.stack = frame.stack.tail();
                        top
                    }
                    None => {
                        let port = graph.provide_output(entry, PortId::Stack(frame.consumed));
                        frame.consumed += 1;
                        port
                    }
                };
                if let Some(result) = graph.output(node, PortId::Arg(0)) {
                    graph.replace_with(result, value);
                }
                let next = bypass(graph, node)?;
                schedule(graph, next, &frame, &mut work);
            }
            Operation::StoreLocal(slot) => {
                let value = required_source(graph, node, PortId::Arg(0))?;
                frame.locals = frame.locals.update(slot, value);
                let next = bypass(graph, node)?;
                schedule(graph, next, &frame, &mut work);
            }
            Operation::LoadLocal(slot) => {
                let value = match frame.locals.get(&slot) {
                    Some(bound) => *bound,
                    None => graph.provide_output(entry, PortId::Local(slot)),
                };
                if let Some(result) = graph.output(node, PortId::Arg(0)) {
                    graph.replace_with(result, value);
                }
                graph.remove_node(node);
            }
            op if op.is_jump() => {
                for (depth, value) in (0u32..).zip(frame.stack.iter()) {
                    graph.add_input(node, PortId::Stack(depth), Some(*value));
                }
                for (slot, value) in frame.locals.iter() {
                    graph.add_input(node, PortId::Local(*slot), Some(*value));
                }
                produced = u32::try_from(frame.stack.len())
                    .map_err(|_| invariant_error!("{block} stack too deep"))?;
            }
            _ => {
                if let Some(environment) = graph.output(node, PortId::Env) {
                    let next = readers_of(graph, environment);
                    schedule(graph, next, &frame, &mut work);
                }
            }
        }
        consumed = consumed.max(frame.consumed);
    }

    if let Some(marker) = graph
        .block(block)
        .nodes()
        .iter()
        .find(|node| graph.op(**node).is_marker())
    {
        return Err(invariant_error!(
            "{marker} ({}) in {block} is not on the environment chain",
            graph.op(*marker)
        ));
    }
    graph.set_stack_effect(block, consumed, produced);
    log::trace!("{block}: consumed {consumed}, produced {produced}");
    Ok(())
}

/// Nodes whose environment input is `environment`.
fn readers_of(graph: &Graph, environment: OutputId) -> Vec<NodeId> {
    graph
        .targets(environment)
        .iter()
        .map(|input| graph.input_port(*input).node())
        .collect()
}

/// Queues `nodes` with `frame`. Readers are queued last so they are visited before the
/// next effect: a `LoadLocal` must be resolved before a later marker captures its result.
fn schedule(graph: &Graph, nodes: Vec<NodeId>, frame: &Frame, work: &mut Vec<(NodeId, Frame)>) {
    let (readers, others): (Vec<NodeId>, Vec<NodeId>) = nodes
        .into_iter()
        .partition(|node| graph.op(*node).class() == OperationClass::Reader);
    for node in others.into_iter().chain(readers) {
        work.push((node, frame.clone()));
    }
}

/// Removes an environment-threading marker, handing its environment on to the nodes that
/// read it. Returns those nodes.
fn bypass(graph: &mut Graph, node: NodeId) -> Result<Vec<NodeId>> {
    let incoming = required_source(graph, node, PortId::Env)?;
    let next = match graph.output(node, PortId::Env) {
        Some(outgoing) => {
            let next = readers_of(graph, outgoing);
            graph.replace_with(outgoing, incoming);
            next
        }
        None => Vec::new(),
    };
    graph.remove_node(node);
    Ok(next)
}

fn required_source(graph: &Graph, node: NodeId, port: PortId) -> Result<OutputId> {
    graph.source_of(node, port).ok_or_else(|| {
        invariant_error!("{node} ({}) has no linked input {port}", graph.op(node))
    })
}

/// Makes every predecessor pass each boundary port its successors read.
///
/// A missing port is passed through from the predecessor's own entry, which may in turn
/// create a port the predecessor's predecessors must supply; the pass runs to a fixed
/// point. At the method's init block only the argument locals exist.
///
/// # Errors
/// Returns [`Error::Format`] when a stack entry or local would have to come from before the
/// method started ("unbalanced stack" or "uninitialized local").
pub fn add_missing_block_ports(graph: &mut Graph, entry: BlockId) -> Result<()> {
    let mut work: VecDeque<BlockId> = graph.method_blocks(entry).into();
    let mut queued: BTreeSet<BlockId> = work.iter().copied().collect();

    while let Some(block) = work.pop_front() {
        queued.remove(&block);
        let needed: Vec<PortId> = graph
            .outputs(graph.block(block).entry())
            .keys()
            .copied()
            .filter(|port| port.is_boundary())
            .collect();
        if needed.is_empty() {
            continue;
        }

        let predecessors: Vec<BlockId> = graph.predecessors(block).iter().copied().collect();
        for predecessor in predecessors {
            let Some(terminator) = graph.block(predecessor).terminator() else {
                return Err(invariant_error!("{predecessor} is not terminated"));
            };
            let mut grown = false;
            for port in &needed {
                if graph.input(terminator, *port).is_some() {
                    continue;
                }
                let (source, created) = passthrough(graph, predecessor, block, *port)?;
                graph.add_input(terminator, *port, Some(source));
                grown |= created;
            }
            if grown && queued.insert(predecessor) {
                work.push_back(predecessor);
            }
        }
    }
    Ok(())
}

/// The port of `block`'s entry that carries `port` through the block unchanged, and whether
/// it had to be created.
fn passthrough(
    graph: &mut Graph,
    block: BlockId,
    successor: BlockId,
    port: PortId,
) -> Result<(OutputId, bool)> {
    let found = graph.block(block);
    let through = match port {
        PortId::Stack(depth) => {
            if depth < found.produced() {
                return Err(invariant_error!(
                    "{block} produces {port} for {successor} but does not pass it"
                ));
            }
            PortId::Stack(depth - found.produced() + found.consumed())
        }
        PortId::Local(_) => port,
        PortId::Env | PortId::Arg(_) => {
            return Err(invariant_error!("{port} is not a boundary port"));
        }
    };

    let entry = found.entry();
    if let Some(existing) = graph.output(entry, through) {
        return Ok((existing, false));
    }
    if matches!(graph.op(entry), Operation::MethodEntry { .. }) {
        let problem = match through {
            PortId::Local(slot) => format!("uninitialized local {slot}"),
            _ => format!("unbalanced stack: {through} read before anything was pushed"),
        };
        return Err(Error::Format {
            offset: graph.block(successor).offset().unwrap_or(0),
            bytes: Vec::new(),
            message: problem,
        });
    }
    Ok((graph.provide_output(entry, through), true))
}

/// Drops boundary ports nobody reads: terminator inputs no successor's entry declares, and
/// block entry outputs without targets. Runs to a fixed point and returns the number of
/// ports removed. The method entry keeps all of its outputs.
pub fn remove_extra_block_ports(graph: &mut Graph, entry: BlockId) -> usize {
    let mut removed = 0;
    loop {
        let before = removed;
        for block in graph.method_blocks(entry) {
            let node = graph.block(block).entry();
            if matches!(graph.op(node), Operation::BlockEntry) {
                let unused: Vec<OutputId> = graph
                    .outputs(node)
                    .iter()
                    .filter(|(port, output)| port.is_boundary() && graph.targets(**output).is_empty())
                    .map(|(_, output)| *output)
                    .collect();
                removed += unused.len();
                for output in unused {
                    graph.remove_output(output);
                }
            }

            let Some(terminator) = graph.block(block).terminator() else {
                continue;
            };
            let successors = graph.successors(block);
            let extra: Vec<InputId> = graph
                .inputs(terminator)
                .iter()
                .filter(|(port, _)| {
                    port.is_boundary()
                        && !successors.iter().any(|successor| {
                            graph.output(graph.block(*successor).entry(), **port).is_some()
                        })
                })
                .map(|(_, input)| *input)
                .collect();
            removed += extra.len();
            for input in extra {
                graph.remove_input(input);
            }
        }
        if removed == before {
            return removed;
        }
    }
}

/// Removes dead nodes among `roots`, cascading to the nodes feeding them. Returns the
/// number of nodes removed.
///
/// A node is dead when it is neither an entry nor a terminator and none of its outputs has
/// a target. Effects stay alive as long as their environment output is threaded on.
pub fn prune_dead_nodes(graph: &mut Graph, roots: impl IntoIterator<Item = NodeId>) -> usize {
    let mut work: Vec<NodeId> = roots.into_iter().collect();
    let mut removed = 0;
    while let Some(node) = work.pop() {
        if !graph.contains_node(node) || !is_dead(graph, node) {
            continue;
        }
        let feeding: Vec<NodeId> = graph
            .inputs(node)
            .values()
            .filter_map(|input| graph.source(*input))
            .map(|output| graph.output_port(output).node())
            .collect();
        graph.remove_node(node);
        removed += 1;
        work.extend(feeding);
    }
    removed
}

fn is_dead(graph: &Graph, node: NodeId) -> bool {
    let op = graph.op(node);
    !op.is_entry()
        && !op.is_terminator()
        && graph
            .outputs(node)
            .values()
            .all(|output| graph.targets(*output).is_empty())
}

/// Fuses each block ending in a jump with its successor when that successor has no other
/// predecessor. Returns the number of fusions.
///
/// # Errors
/// Returns [`Error::Invariant`] if a successor's entry declares a port the jump does not
/// pass.
pub fn fuse_jumps(graph: &mut Graph, entry: BlockId) -> Result<usize> {
    let mut fused = 0;
    let mut visited = BTreeSet::new();
    let mut work = vec![entry];

    while let Some(block) = work.pop() {
        if !graph.contains_block(block) || !visited.insert(block) {
            continue;
        }
        while let Some(successor) = fusable(graph, block) {
            match_ports(graph, block, successor)?;
            graph.fuse_blocks(block, successor);
            fused += 1;
            log::trace!("fused {successor} into {block}");
        }
        for successor in graph.successors(block).iter().rev() {
            if !visited.contains(successor) {
                work.push(*successor);
            }
        }
    }
    Ok(fused)
}

fn fusable(graph: &Graph, block: BlockId) -> Option<BlockId> {
    let found = graph.block(block);
    let terminator = found.terminator()?;
    if !matches!(graph.op(terminator), Operation::Jump) {
        return None;
    }
    let [successor] = found.successors() else {
        return None;
    };
    let successor = *successor;
    let absorbable = successor != block
        && graph.predecessors(successor).len() == 1
        && matches!(
            graph.op(graph.block(successor).entry()),
            Operation::BlockEntry
        );
    absorbable.then_some(successor)
}

/// Aligns a jump's inputs with its successor's entry outputs before the two are merged.
fn match_ports(graph: &mut Graph, block: BlockId, successor: BlockId) -> Result<()> {
    let Some(jump) = graph.block(block).terminator() else {
        return Err(invariant_error!("{block} is not terminated"));
    };
    let entry = graph.block(successor).entry();

    let extra: Vec<InputId> = graph
        .inputs(jump)
        .iter()
        .filter(|(port, _)| graph.output(entry, **port).is_none())
        .map(|(_, input)| *input)
        .collect();
    for input in extra {
        graph.remove_input(input);
    }

    let missing: Vec<(PortId, OutputId)> = graph
        .outputs(entry)
        .iter()
        .filter(|(port, _)| graph.input(jump, **port).is_none())
        .map(|(port, output)| (*port, *output))
        .collect();
    for (port, output) in missing {
        if !graph.targets(output).is_empty() {
            return Err(invariant_error!(
                "{successor} reads {port} but {block} does not pass it"
            ));
        }
        graph.remove_output(output);
    }
    Ok(())
}

/// Evaluates the method and rewrites what the evaluation decided:
///
/// - every used output with a constant value is re-sourced from a new `Constant` node
/// - a branch or switch with a single possible successor becomes a jump
/// - a return whose environment is a known heap, and whose value is not a reference into
///   it, no longer waits for the effects of its block
///
/// The method is evaluated with unknown arguments and an empty heap. Returns `true` if the
/// graph changed; an evaluation that hits the round limit changes nothing.
///
/// # Errors
/// Propagates evaluation errors: [`Error::Invariant`] and [`Error::IndexOutOfBounds`].
pub fn propagate_constants(
    graph: &mut Graph,
    entry: BlockId,
    config: &CompilerConfig,
    events: &mut EventLog,
) -> Result<bool> {
    let evaluation = GraphEvaluator::new(graph, entry)
        .with_max_rounds(config.max_evaluation_rounds)
        .run()?;
    if !evaluation.converged() {
        log::debug!("{entry}: evaluation did not converge, nothing folded");
        return Ok(false);
    }
    let blocks: Vec<BlockId> = evaluation.executable_blocks().iter().copied().collect();
    let mut changed = false;

    for block in &blocks {
        let nodes: Vec<NodeId> = graph.block(*block).nodes().iter().copied().collect();
        for node in nodes {
            if matches!(graph.op(node), Operation::Constant(_)) {
                continue;
            }
            let outputs: Vec<(PortId, OutputId)> = graph
                .outputs(node)
                .iter()
                .map(|(port, output)| (*port, *output))
                .collect();
            for (port, output) in outputs {
                if port == PortId::Env || graph.targets(output).is_empty() {
                    continue;
                }
                let Value::Const(value) = evaluation.value(output) else {
                    continue;
                };
                let constant = graph.create_node(Operation::Constant(value.clone()), Some(*block));
                let replacement = graph.add_output(constant, PortId::Arg(0));
                graph.replace_with(output, replacement);
                events
                    .record(EventKind::ConstantFolded)
                    .block(*block)
                    .message(format!("{node} {port} is {value}"));
                changed = true;
            }
        }
    }

    for block in &blocks {
        let Some(terminator) = graph.block(*block).terminator() else {
            continue;
        };
        if !matches!(
            graph.op(terminator),
            Operation::Branch { .. } | Operation::Switch(_)
        ) {
            continue;
        }
        if let Some(index) = evaluation.decided_successor(*block) {
            let target = graph.successors(*block)[index];
            simplify_jump(graph, *block, index);
            events
                .record(EventKind::BranchSimplified)
                .block(*block)
                .message(format!("always continues at {target}"));
            changed = true;
        }
    }

    for block in &blocks {
        changed |= relink_return(graph, *block, &evaluation);
    }
    Ok(changed)
}

/// Points a side-effect-free return's environment at its block's entry, leaving the
/// block's effects without a consumer.
fn relink_return(graph: &mut Graph, block: BlockId, evaluation: &crate::analysis::Evaluation) -> bool {
    let found = graph.block(block);
    let Some(terminator) = found.terminator() else {
        return false;
    };
    if !matches!(graph.op(terminator), Operation::Return(_)) {
        return false;
    }
    let (Some(input), Some(block_env)) = (
        graph.input(terminator, PortId::Env),
        graph.output(found.entry(), PortId::Env),
    ) else {
        return false;
    };
    let Some(current) = graph.source(input) else {
        return false;
    };
    if current == block_env || !matches!(evaluation.value(current), Value::Env(_)) {
        return false;
    }
    if let Some(value) = graph.source_of(terminator, PortId::Arg(0)) {
        if matches!(evaluation.value(value), Value::Ref(_)) {
            return false;
        }
    }
    graph.unlink(input);
    graph.link(input, block_env);
    log::trace!("{block}: return no longer depends on the block's effects");
    true
}

/// Replaces the branch or switch ending `block` with a jump to successor `index`.
///
/// The jump keeps the environment and every boundary input of the old terminator; ports
/// the chosen successor does not read are left for [`remove_extra_block_ports`].
///
/// # Panics
/// Panics if `block` is not terminated or has no successor `index`.
pub fn simplify_jump(graph: &mut Graph, block: BlockId, index: usize) {
    let Some(terminator) = graph.block(block).terminator() else {
        panic!("{block} is not terminated");
    };
    let chosen = graph.successors(block)[index];
    let carried: Vec<(PortId, OutputId)> = graph
        .inputs(terminator)
        .iter()
        .filter(|(port, _)| **port == PortId::Env || port.is_boundary())
        .filter_map(|(port, input)| graph.source(*input).map(|source| (*port, source)))
        .collect();

    graph.detach_terminator(block);
    graph.remove_node(terminator);

    let jump = graph.create_node(Operation::Jump, Some(block));
    for (port, source) in carried {
        graph.add_input(jump, port, Some(source));
    }
    graph.set_terminator(block, jump, vec![chosen]);
}

/// Removes every block that no method entry reaches and returns how many were removed.
///
/// Blocks are swept across the whole arena rather than per method: once a branch is
/// simplified, the untaken side may no longer be connected to its method at all.
pub fn remove_dead_blocks(graph: &mut Graph) -> usize {
    let roots: Vec<BlockId> = graph
        .block_ids()
        .filter(|block| {
            matches!(
                graph.op(graph.block(*block).entry()),
                Operation::MethodEntry { .. }
            )
        })
        .collect();
    let mut live = BTreeSet::new();
    for root in roots {
        live.extend(graph.method_blocks(root));
    }

    let dead: Vec<BlockId> = graph
        .block_ids()
        .filter(|block| !live.contains(block))
        .collect();
    for block in &dead {
        graph.remove_block(*block);
        log::trace!("removed unreachable {block}");
    }
    dead.len()
}

/// Boundary-port and dead-node cleanup to a fixed point. Returns (ports, nodes) removed.
fn cleanup(graph: &mut Graph, entry: BlockId) -> (usize, usize) {
    let (mut ports, mut nodes) = (0, 0);
    loop {
        let method_nodes = graph.method_nodes(entry);
        let pruned = prune_dead_nodes(graph, method_nodes);
        let dropped = remove_extra_block_ports(graph, entry);
        nodes += pruned;
        ports += dropped;
        if pruned == 0 && dropped == 0 {
            return (ports, nodes);
        }
    }
}

/// Simplifies one method until nothing changes or `config.max_iterations` is reached.
/// Returns `true` if anything changed.
///
/// # Errors
/// Propagates [`Error::Invariant`] and [`Error::IndexOutOfBounds`] from the passes.
pub fn simplify_method(
    graph: &mut Graph,
    entry: BlockId,
    config: &CompilerConfig,
    events: &mut EventLog,
) -> Result<bool> {
    let mut any = false;
    for iteration in 1..=config.max_iterations {
        let mut changed = false;

        if config.enable_constant_propagation {
            changed |= propagate_constants(graph, entry, config, events)?;
            let removed = remove_dead_blocks(graph);
            if removed > 0 {
                events
                    .record(EventKind::BlockRemoved)
                    .block(entry)
                    .message(format!("{removed} unreachable blocks"));
                changed = true;
            }
        }

        let (ports, nodes) = cleanup(graph, entry);
        if nodes > 0 {
            events
                .record(EventKind::NodesPruned)
                .block(entry)
                .message(format!("{nodes} nodes, {ports} ports"));
        }
        changed |= ports > 0 || nodes > 0;

        if config.enable_jump_fusion {
            let fused = fuse_jumps(graph, entry)?;
            if fused > 0 {
                events
                    .record(EventKind::BlocksFused)
                    .block(entry)
                    .message(format!("{fused} jumps"));
                changed = true;
            }
        }

        if !changed {
            log::debug!("{entry}: simplified in {iteration} iterations");
            return Ok(any);
        }
        any = true;
    }
    log::debug!(
        "{entry}: still changing after {} iterations",
        config.max_iterations
    );
    Ok(any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::ConstValue,
        assembly::BytecodeAssembler,
        builder::MethodBuilder,
        graph::MethodId,
        metadata::{ConstantPool, MethodAccessFlags, MethodDescriptor, MethodInfo, PrimitiveType},
    };

    fn build(descriptor: &str, code: Vec<u8>) -> Result<(Graph, BlockId)> {
        let info = MethodInfo::new("test", descriptor, MethodAccessFlags::STATIC, code);
        let signature = MethodDescriptor::parse(descriptor)?;
        let pool = ConstantPool::new();
        let mut graph = Graph::new();
        let entry = MethodBuilder::build(&mut graph, MethodId::new(0), &info, &pool, &signature)?;
        Ok((graph, entry))
    }

    fn parse(descriptor: &str, code: Vec<u8>) -> Result<(Graph, BlockId)> {
        let (mut graph, entry) = build(descriptor, code)?;
        prepare(&mut graph, entry)?;
        Ok((graph, entry))
    }

    fn returned(graph: &Graph, entry: BlockId) -> Vec<Operation> {
        graph
            .terminators(entry)
            .into_iter()
            .filter(|node| matches!(graph.op(*node), Operation::Return(_)))
            .filter_map(|node| graph.source_of(node, PortId::Arg(0)))
            .map(|value| graph.op(graph.output_port(value).node()).clone())
            .collect()
    }

    /// `x != 0 ? 1 : 2`
    fn select() -> Result<Vec<u8>> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .ifeq("else")?
            .iconst(1)?
            .goto("end")?
            .label("else")?
            .iconst(2)?
            .label("end")?
            .ireturn()?;
        asm.finish()
    }

    #[test]
    fn test_eliminate_stack_links_across_blocks() -> Result<()> {
        let (graph, entry) = parse("(I)I", select()?)?;

        assert!(graph
            .method_nodes(entry)
            .iter()
            .all(|node| !graph.op(*node).is_marker()));

        let join = graph
            .method_blocks(entry)
            .into_iter()
            .find(|block| graph.block(*block).offset() == Some(9))
            .expect("join block");
        let join_entry = graph.block(join).entry();
        assert!(graph.output(join_entry, PortId::Stack(0)).is_some());
        for predecessor in graph.predecessors(join) {
            let jump = graph.block(*predecessor).terminator().expect("terminated");
            assert!(graph.input(jump, PortId::Stack(0)).is_some());
            assert_eq!(graph.block(*predecessor).produced(), 1);
        }
        Ok(())
    }

    #[test]
    fn test_locals_pass_through_blocks() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(0)?
            .ifeq("done")?
            .iinc(0, 1)?
            .label("done")?
            .iload(0)?
            .ireturn()?;
        let (graph, entry) = parse("(I)I", asm.finish()?)?;

        let init = graph.block(entry);
        let jump = init.terminator().expect("init jump");
        assert_eq!(
            graph.source_of(jump, PortId::Local(0)),
            graph.output(init.entry(), PortId::Local(0))
        );
        for block in graph.method_blocks(entry) {
            if let Some(terminator) = graph.block(block).terminator() {
                if graph.op(terminator).is_jump() {
                    assert!(graph.input(terminator, PortId::Local(0)).is_some());
                }
            }
        }
        Ok(())
    }

    #[test]
    fn test_uninitialized_local_is_format_error() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iload(1)?.ireturn()?;
        let err = parse("()I", asm.finish()?).unwrap_err();
        assert!(
            matches!(&err, Error::Format { message, .. } if message.contains("uninitialized local 1"))
        );
        Ok(())
    }

    #[test]
    fn test_unbalanced_stack_is_format_error() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.ireturn()?;
        let err = parse("()I", asm.finish()?).unwrap_err();
        assert!(matches!(&err, Error::Format { message, .. } if message.contains("unbalanced stack")));
        Ok(())
    }

    #[test]
    fn test_unread_ports_and_values_are_removed() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(5)?
            .istore(1)?
            .goto("next")?
            .label("next")?
            .iconst(0)?
            .ireturn()?;
        let (graph, entry) = parse("()I", asm.finish()?)?;

        let first = graph.successors(entry)[0];
        let found = graph.block(first);
        let jump = found.terminator().expect("jump");
        assert_eq!(graph.inputs(jump).keys().collect::<Vec<_>>(), vec![&PortId::Env]);
        assert_eq!(found.nodes().len(), 2);
        Ok(())
    }

    #[test]
    fn test_fuse_jumps_straight_line() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(1)?.goto("next")?.label("next")?.ireturn()?;
        let (mut graph, entry) = parse("()I", asm.finish()?)?;

        assert_eq!(fuse_jumps(&mut graph, entry)?, 2);
        assert_eq!(graph.method_blocks(entry), vec![entry]);
        assert_eq!(
            returned(&graph, entry),
            vec![Operation::Constant(ConstValue::Int(1))]
        );
        graph.verify_links()
    }

    #[test]
    fn test_fuse_keeps_loops() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.label("top")?.goto("top")?;
        let (mut graph, entry) = parse("()V", asm.finish()?)?;

        fuse_jumps(&mut graph, entry)?;
        let blocks = graph.method_blocks(entry);
        assert_eq!(blocks.len(), 2);
        assert_eq!(graph.successors(blocks[1]), &[blocks[1]]);
        graph.verify_links()
    }

    #[test]
    fn test_constant_branch_is_simplified() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(1)?
            .ifeq("zero")?
            .iconst(2)?
            .ireturn()?
            .label("zero")?
            .iconst(3)?
            .ireturn()?;
        let (mut graph, entry) = parse("()I", asm.finish()?)?;
        let mut events = EventLog::new();

        assert!(simplify_method(&mut graph, entry, &CompilerConfig::default(), &mut events)?);
        assert_eq!(graph.method_blocks(entry).len(), 1);
        assert_eq!(
            returned(&graph, entry),
            vec![Operation::Constant(ConstValue::Int(2))]
        );
        assert!(events.has(EventKind::BranchSimplified));
        assert!(events.has(EventKind::BlockRemoved));
        graph.verify_links()
    }

    #[test]
    fn test_array_effects_are_dropped() -> Result<()> {
        let mut asm = BytecodeAssembler::new();
        asm.iconst(1)?
            .newarray(PrimitiveType::Int)?
            .dup()?
            .iconst(0)?
            .iconst(7)?
            .iastore()?
            .iconst(0)?
            .iaload()?
            .ireturn()?;
        let (mut graph, entry) = parse("()I", asm.finish()?)?;

        simplify_method(&mut graph, entry, &CompilerConfig::default(), &mut EventLog::new())?;
        assert_eq!(
            returned(&graph, entry),
            vec![Operation::Constant(ConstValue::Int(7))]
        );
        assert!(graph.method_nodes(entry).iter().all(|node| !matches!(
            graph.op(*node),
            Operation::NewArray(_) | Operation::StoreElement(_) | Operation::LoadElement(_)
        )));
        graph.verify_links()
    }

    #[test]
    fn test_unknown_branch_is_kept() -> Result<()> {
        let (mut graph, entry) = parse("(I)I", select()?)?;
        simplify_method(&mut graph, entry, &CompilerConfig::default(), &mut EventLog::new())?;

        let mut values = returned(&graph, entry);
        assert_eq!(values.len(), 1);
        assert!(matches!(values.pop(), Some(Operation::BlockEntry)));
        assert_eq!(graph.method_blocks(entry).len(), 4);
        graph.verify_links()
    }

    #[test]
    fn test_simplify_jump_and_remove_dead_blocks() -> Result<()> {
        let (mut graph, entry) = parse("(I)I", select()?)?;
        let first = graph.successors(entry)[0];
        let untaken = graph.successors(first)[0];

        simplify_jump(&mut graph, first, 1);
        assert_eq!(graph.successors(first).len(), 1);
        assert!(graph.predecessors(untaken).is_empty());

        assert_eq!(remove_dead_blocks(&mut graph), 1);
        assert!(!graph.contains_block(untaken));
        remove_extra_block_ports(&mut graph, entry);
        graph.verify_links()
    }

    #[test]
    fn test_prune_cascades() -> Result<()> {
        let mut graph = Graph::new();
        let block = graph.new_block(Operation::BlockEntry, Some(0));
        let one = graph.create_node(Operation::Constant(ConstValue::Int(1)), Some(block));
        let one_out = graph.add_output(one, PortId::Arg(0));
        let neg = graph.create_node(Operation::Negate(PrimitiveType::Int), Some(block));
        graph.add_input(neg, PortId::Arg(0), Some(one_out));
        graph.add_output(neg, PortId::Arg(0));

        assert_eq!(prune_dead_nodes(&mut graph, [neg]), 2);
        assert!(!graph.contains_node(one));
        assert_eq!(graph.block(block).nodes().len(), 1);
        graph.verify_links()
    }
}
