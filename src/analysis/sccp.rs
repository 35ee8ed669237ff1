//! Compile-time evaluation of a method graph.
//!
//! [`GraphEvaluator`] interprets a method's graph over the [`Value`] lattice, in the spirit
//! of sparse conditional constant propagation (Wegman & Zadeck): control flow is only
//! followed along edges that are known to be executable, so a branch on a constant keeps
//! the values of the untaken side from polluting the join.
//!
//! # Algorithm
//!
//! Evaluation proceeds in rounds. Each round starts from an empty value cache and the
//! executable edges found so far, and works through a block worklist seeded with the entry
//! block, so every block becomes evaluated once control can reach it regardless of its
//! position in the graph. Output ports are evaluated on demand:
//!
//! - a method entry port yields the supplied argument, or an unknown of the slot's kind
//! - a block entry port yields the meet, over the executable edges into the block, of the
//!   value each predecessor's terminator passes for that port
//! - any other port is computed by folding its node over its input values
//!
//! Terminators then decide which successor edges are executable. A loop makes a block entry
//! port depend on itself; the cycle is cut by using the port's value from the previous round
//! (`Undefined` in the first), which is the optimistic assumption of SCCP. Rounds repeat
//! until neither the edge set nor any value changes. Values only move down the lattice and
//! edges are only added, so this terminates; a round limit still guards against graphs
//! that are too large to settle, and a run that hits it reports every value as unknown.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::{
        fold::{
            compare_branch, fold_binary, fold_bitwise, fold_compare, fold_convert, fold_negate,
            fold_shift,
        },
        heap::{HeapObject, ObjectRef},
        value::{ConstValue, Value, ValueType},
    },
    graph::{BlockId, Graph, NodeId, Operation, OutputId, PortId},
    Result,
};

/// Default bound on evaluation rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 1000;

/// Interprets one method graph from given entry values.
///
/// # Examples
///
/// ```rust,ignore
/// let evaluation = GraphEvaluator::new(&graph, entry)
///     .with_argument(0, Value::int(3))
///     .run()?;
/// assert_eq!(evaluation.return_value(&graph), Value::int(9));
/// ```
pub struct GraphEvaluator<'g> {
    graph: &'g Graph,
    entry: BlockId,
    arguments: FxHashMap<u32, Value>,
    environment: Value,
    max_rounds: usize,
}

impl<'g> GraphEvaluator<'g> {
    /// Prepares an evaluation of the method whose init block is `entry`.
    ///
    /// Arguments default to unknown and the environment to an empty heap.
    #[must_use]
    pub fn new(graph: &'g Graph, entry: BlockId) -> Self {
        GraphEvaluator {
            graph,
            entry,
            arguments: FxHashMap::default(),
            environment: Value::Env(crate::analysis::Heap::new()),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    /// Supplies the value of local variable `slot` on entry.
    #[must_use]
    pub fn with_argument(mut self, slot: u32, value: Value) -> Self {
        self.arguments.insert(slot, value);
        self
    }

    /// Supplies the environment on entry.
    #[must_use]
    pub fn with_environment(mut self, environment: Value) -> Self {
        self.environment = environment;
        self
    }

    /// Bounds the number of rounds.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    /// Runs the evaluation to a fixed point.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the graph still contains stack or local
    /// markers or a block boundary is missing a port, and
    /// [`crate::Error::IndexOutOfBounds`] for an array access that is out of bounds on
    /// every execution reaching it.
    pub fn run(&self) -> Result<Evaluation> {
        let blocks = self.graph.method_blocks(self.entry);
        let mut edges: FxHashSet<(BlockId, BlockId)> = FxHashSet::default();
        let mut previous: FxHashMap<OutputId, Value> = FxHashMap::default();

        for round in 1..=self.max_rounds {
            let mut state = Round {
                evaluator: self,
                previous: &previous,
                edges: edges.clone(),
                values: FxHashMap::default(),
                visiting: FxHashSet::default(),
            };
            let mut executable = BTreeSet::from([self.entry]);
            let mut taken = FxHashMap::default();
            let mut worklist = vec![self.entry];

            while let Some(block) = worklist.pop() {
                let found = self.graph.block(block);
                for node in found.nodes() {
                    for output in self.graph.outputs(*node).values() {
                        state.value(*output)?;
                    }
                }
                let Some(terminator) = found.terminator() else {
                    continue;
                };
                let indices = state.taken(terminator, found.successors().len())?;
                for index in &indices {
                    let successor = found.successors()[*index];
                    state.edges.insert((block, successor));
                    if executable.insert(successor) {
                        worklist.push(successor);
                    }
                }
                taken.insert(block, indices);
            }

            let Round {
                edges: next_edges,
                values,
                ..
            } = state;
            if next_edges == edges && values == previous {
                log::trace!(
                    "evaluation of {} settled after {round} rounds",
                    self.entry
                );
                let returns = executable
                    .iter()
                    .filter_map(|block| self.graph.block(*block).terminator())
                    .filter(|node| matches!(self.graph.op(*node), Operation::Return(_)))
                    .collect();
                return Ok(Evaluation {
                    values,
                    executable,
                    edges,
                    taken,
                    returns,
                    converged: true,
                    rounds: round,
                });
            }
            edges = next_edges;
            previous = values;
        }

        log::debug!(
            "evaluation of {} did not settle within {} rounds",
            self.entry,
            self.max_rounds
        );
        Ok(self.pessimistic(&blocks))
    }

    /// The result reported when the round limit is hit: everything reachable, nothing known.
    fn pessimistic(&self, blocks: &[BlockId]) -> Evaluation {
        let mut values = FxHashMap::default();
        let mut edges = FxHashSet::default();
        let mut returns = Vec::new();
        for block in blocks {
            let found = self.graph.block(*block);
            for node in found.nodes() {
                for (port, output) in self.graph.outputs(*node) {
                    let value = match port {
                        PortId::Env => Value::UNKNOWN_ENV,
                        _ => Value::Unknown(ValueType::Reference),
                    };
                    values.insert(*output, value);
                }
            }
            for successor in found.successors() {
                edges.insert((*block, *successor));
            }
            if let Some(terminator) = found.terminator() {
                if matches!(self.graph.op(terminator), Operation::Return(_)) {
                    returns.push(terminator);
                }
            }
        }
        Evaluation {
            values,
            executable: blocks.iter().copied().collect(),
            edges,
            taken: FxHashMap::default(),
            returns,
            converged: false,
            rounds: self.max_rounds,
        }
    }
}

/// State of one evaluation round.
struct Round<'e, 'g> {
    evaluator: &'e GraphEvaluator<'g>,
    previous: &'e FxHashMap<OutputId, Value>,
    edges: FxHashSet<(BlockId, BlockId)>,
    values: FxHashMap<OutputId, Value>,
    visiting: FxHashSet<OutputId>,
}

impl Round<'_, '_> {
    fn value(&mut self, output: OutputId) -> Result<Value> {
        if let Some(value) = self.values.get(&output) {
            return Ok(value.clone());
        }
        let graph = self.evaluator.graph;
        let port = graph.output_port(output);
        let node = port.node();

        match graph.op(node) {
            Operation::BlockEntry => self.entry_port(node, port.port(), output),
            Operation::MethodEntry { locals } => {
                let value = match port.port() {
                    PortId::Env => self.evaluator.environment.clone(),
                    PortId::Local(slot) => match self.evaluator.arguments.get(&slot) {
                        Some(value) => value.clone(),
                        None => Value::Unknown(
                            locals
                                .get(slot as usize)
                                .map_or(ValueType::Reference, |kind| ValueType::from(*kind)),
                        ),
                    },
                    other => {
                        return Err(invariant_error!("method entry {node} has output {other}"))
                    }
                };
                self.values.insert(output, value.clone());
                Ok(value)
            }
            _ => {
                self.evaluate_node(node)?;
                self.values.get(&output).cloned().ok_or_else(|| {
                    invariant_error!("{node} ({}) did not produce {output}", graph.op(node))
                })
            }
        }
    }

    fn entry_port(&mut self, node: NodeId, port: PortId, output: OutputId) -> Result<Value> {
        if !self.visiting.insert(output) {
            return Ok(self
                .previous
                .get(&output)
                .cloned()
                .unwrap_or(Value::Undefined));
        }
        let graph = self.evaluator.graph;
        let Some(block) = graph.block_of(node) else {
            return Err(invariant_error!("block entry {node} has no block"));
        };

        let mut result = Value::Undefined;
        for predecessor in graph.predecessors(block) {
            if !self.edges.contains(&(*predecessor, block)) {
                continue;
            }
            let Some(terminator) = graph.block(*predecessor).terminator() else {
                continue;
            };
            let Some(source) = graph.source_of(terminator, port) else {
                return Err(invariant_error!(
                    "{predecessor} does not pass {port} to {block}"
                ));
            };
            let incoming = self.value(source)?;
            result = result.meet(&incoming);
        }

        self.visiting.remove(&output);
        self.values.insert(output, result.clone());
        Ok(result)
    }

    fn input(&mut self, node: NodeId, port: PortId) -> Result<Value> {
        let graph = self.evaluator.graph;
        let Some(source) = graph.source_of(node, port) else {
            return Err(invariant_error!(
                "{node} ({}) has no linked input {port}",
                graph.op(node)
            ));
        };
        self.value(source)
    }

    fn arg(&mut self, node: NodeId, index: u32) -> Result<Value> {
        self.input(node, PortId::Arg(index))
    }

    fn evaluate_node(&mut self, node: NodeId) -> Result<()> {
        let graph = self.evaluator.graph;
        let site = ObjectRef::site(node);

        let results: Vec<(PortId, Value)> = match graph.op(node) {
            Operation::MethodEntry { .. } | Operation::BlockEntry => {
                return Err(invariant_error!("entry {node} evaluated as an operation"))
            }
            Operation::Push | Operation::Pop | Operation::StoreLocal(_) | Operation::LoadLocal(_) => {
                return Err(invariant_error!(
                    "marker {node} ({}) survived stack elimination",
                    graph.op(node)
                ))
            }

            Operation::Constant(constant) => vec![(PortId::Arg(0), Value::Const(constant.clone()))],
            Operation::Binary { ty, op } => {
                let (left, right) = (self.arg(node, 0)?, self.arg(node, 1)?);
                vec![(PortId::Arg(0), fold_binary(*ty, *op, &left, &right))]
            }
            Operation::Negate(ty) => {
                let operand = self.arg(node, 0)?;
                vec![(PortId::Arg(0), fold_negate(*ty, &operand))]
            }
            Operation::Shift { ty, op } => {
                let (value, count) = (self.arg(node, 0)?, self.arg(node, 1)?);
                vec![(PortId::Arg(0), fold_shift(*ty, *op, &value, &count))]
            }
            Operation::Bitwise { ty, op } => {
                let (left, right) = (self.arg(node, 0)?, self.arg(node, 1)?);
                vec![(PortId::Arg(0), fold_bitwise(*ty, *op, &left, &right))]
            }
            Operation::Convert { to, .. } => {
                let operand = self.arg(node, 0)?;
                vec![(PortId::Arg(0), fold_convert(*to, &operand))]
            }
            Operation::Compare(op) => {
                let (left, right) = (self.arg(node, 0)?, self.arg(node, 1)?);
                vec![(PortId::Arg(0), fold_compare(*op, &left, &right))]
            }
            Operation::CheckCast(_) => vec![(PortId::Arg(0), self.arg(node, 0)?)],
            Operation::InstanceOf(_) => {
                let value = match self.arg(node, 0)? {
                    Value::Undefined => Value::Undefined,
                    Value::Const(ConstValue::Null) => Value::int(0),
                    _ => Value::Unknown(ValueType::Int),
                };
                vec![(PortId::Arg(0), value)]
            }

            Operation::NewArray(element) => {
                let (env, length) = (self.input(node, PortId::Env)?, self.arg(node, 0)?);
                if env.is_undefined() || length.is_undefined() {
                    undefined(&[PortId::Arg(0), PortId::Env])
                } else {
                    match env
                        .heap()
                        .and_then(|heap| heap.allocate_array(site, element.kind(), &length))
                    {
                        Some(heap) => vec![
                            (PortId::Arg(0), Value::Ref(site)),
                            (PortId::Env, Value::Env(heap)),
                        ],
                        None => unknown_effect(Some(ValueType::Reference)),
                    }
                }
            }
            Operation::NewInstance(class) => {
                let env = self.input(node, PortId::Env)?;
                match env {
                    Value::Undefined => undefined(&[PortId::Arg(0), PortId::Env]),
                    Value::Env(heap) => vec![
                        (PortId::Arg(0), Value::Ref(site)),
                        (PortId::Env, Value::Env(heap.allocate_object(site, class))),
                    ],
                    _ => unknown_effect(Some(ValueType::Reference)),
                }
            }
            Operation::ArrayLength => {
                let (env, array) = (self.input(node, PortId::Env)?, self.arg(node, 0)?);
                let value = match (&env, &array) {
                    (Value::Undefined, _) | (_, Value::Undefined) => Value::Undefined,
                    (Value::Env(heap), Value::Ref(reference)) => heap
                        .array(*reference)
                        .map_or(Value::Unknown(ValueType::Int), |array| array.length.clone()),
                    _ => Value::Unknown(ValueType::Int),
                };
                vec![(PortId::Arg(0), value)]
            }
            Operation::LoadElement(kind) => {
                let env = self.input(node, PortId::Env)?;
                let (array, index) = (self.arg(node, 0)?, self.arg(node, 1)?);
                let value = if env.is_undefined() || array.is_undefined() || index.is_undefined()
                {
                    Value::Undefined
                } else {
                    match (env.heap(), &array) {
                        (Some(heap), Value::Ref(reference)) => match heap.array(*reference) {
                            Some(contents) => contents.extract_element(&index)?,
                            None => Value::Unknown(ValueType::from(*kind)),
                        },
                        _ => Value::Unknown(ValueType::from(*kind)),
                    }
                };
                vec![(PortId::Arg(0), value)]
            }
            Operation::StoreElement(_) => {
                let env = self.input(node, PortId::Env)?;
                let (array, index, value) =
                    (self.arg(node, 0)?, self.arg(node, 1)?, self.arg(node, 2)?);
                let env = if [&env, &array, &index, &value].iter().any(|v| v.is_undefined()) {
                    Value::Undefined
                } else {
                    match (env.heap(), &array) {
                        (Some(heap), Value::Ref(reference)) => match heap.array(*reference) {
                            Some(contents) => {
                                let updated = contents.insert_element(&index, value)?;
                                Value::Env(
                                    heap.with_object(*reference, HeapObject::Array(updated)),
                                )
                            }
                            None => Value::UNKNOWN_ENV,
                        },
                        _ => Value::UNKNOWN_ENV,
                    }
                };
                vec![(PortId::Env, env)]
            }
            Operation::LoadField { field, is_static } => {
                let env = self.input(node, PortId::Env)?;
                let kind = ValueType::from(field.field_type.kind());
                let value = if *is_static {
                    if env.is_undefined() {
                        Value::Undefined
                    } else {
                        Value::Unknown(kind)
                    }
                } else {
                    let object = self.arg(node, 0)?;
                    match (&env, &object) {
                        (Value::Undefined, _) | (_, Value::Undefined) => Value::Undefined,
                        (Value::Env(heap), Value::Ref(reference)) => heap
                            .object(*reference)
                            .map_or(Value::Unknown(kind), |contents| contents.field(field)),
                        _ => Value::Unknown(kind),
                    }
                };
                vec![(PortId::Arg(0), value)]
            }
            Operation::StoreField { field, is_static } => {
                let env = self.input(node, PortId::Env)?;
                let env = if *is_static {
                    if env.is_undefined() {
                        Value::Undefined
                    } else {
                        Value::UNKNOWN_ENV
                    }
                } else {
                    let (object, value) = (self.arg(node, 0)?, self.arg(node, 1)?);
                    if [&env, &object, &value].iter().any(|v| v.is_undefined()) {
                        Value::Undefined
                    } else {
                        match (env.heap(), &object) {
                            (Some(heap), Value::Ref(reference)) => {
                                match heap.object(*reference) {
                                    Some(contents) => Value::Env(heap.with_object(
                                        *reference,
                                        HeapObject::Object(
                                            contents.with_field(field.clone(), value),
                                        ),
                                    )),
                                    None => Value::UNKNOWN_ENV,
                                }
                            }
                            _ => Value::UNKNOWN_ENV,
                        }
                    }
                };
                vec![(PortId::Env, env)]
            }
            Operation::Invoke { method, .. } => {
                let env = self.input(node, PortId::Env)?;
                let result = method.signature.return_kind().map(ValueType::from);
                if env.is_undefined() {
                    undefined(&[PortId::Arg(0), PortId::Env])
                } else {
                    unknown_effect(result)
                }
            }
            Operation::MonitorEnter | Operation::MonitorExit => {
                let env = self.input(node, PortId::Env)?;
                if env.is_undefined() {
                    undefined(&[PortId::Env])
                } else {
                    unknown_effect(None)
                }
            }

            Operation::Jump
            | Operation::Branch { .. }
            | Operation::Switch(_)
            | Operation::Return(_)
            | Operation::Throw => Vec::new(),
        };

        for (port, value) in results {
            if let Some(output) = graph.output(node, port) {
                self.values.insert(output, value);
            }
        }
        for (port, output) in graph.outputs(node) {
            if !self.values.contains_key(output) {
                return Err(invariant_error!(
                    "{node} ({}) has unexpected output {port}",
                    graph.op(node)
                ));
            }
        }
        Ok(())
    }

    /// Successor indices `terminator` may transfer control to.
    fn taken(&mut self, terminator: NodeId, successors: usize) -> Result<Vec<usize>> {
        let graph = self.evaluator.graph;
        match graph.op(terminator) {
            Operation::Jump => Ok(vec![0]),
            Operation::Branch { kind, .. } => {
                let (left, right) = (self.arg(terminator, 0)?, self.arg(terminator, 1)?);
                if left.is_undefined() || right.is_undefined() {
                    return Ok(Vec::new());
                }
                Ok(match compare_branch(*kind, &left, &right) {
                    Some(true) => vec![0],
                    Some(false) => vec![1],
                    None => vec![0, 1],
                })
            }
            Operation::Switch(table) => {
                let key = self.arg(terminator, 0)?;
                Ok(match key {
                    Value::Undefined => Vec::new(),
                    _ => match key.as_int() {
                        Some(key) => vec![table.target(key)],
                        None => (0..successors).collect(),
                    },
                })
            }
            Operation::Return(_) | Operation::Throw => Ok(Vec::new()),
            other => Err(invariant_error!("{terminator} ({other}) is not a terminator")),
        }
    }
}

fn undefined(ports: &[PortId]) -> Vec<(PortId, Value)> {
    ports.iter().map(|port| (*port, Value::Undefined)).collect()
}

fn unknown_effect(result: Option<ValueType>) -> Vec<(PortId, Value)> {
    let mut values = vec![(PortId::Env, Value::UNKNOWN_ENV)];
    if let Some(kind) = result {
        values.push((PortId::Arg(0), Value::Unknown(kind)));
    }
    values
}

/// The outcome of a [`GraphEvaluator`] run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    values: FxHashMap<OutputId, Value>,
    executable: BTreeSet<BlockId>,
    edges: FxHashSet<(BlockId, BlockId)>,
    taken: FxHashMap<BlockId, Vec<usize>>,
    returns: Vec<NodeId>,
    converged: bool,
    rounds: usize,
}

impl Evaluation {
    /// The value of `output`. Ports in blocks that are never executed are `Undefined`.
    #[must_use]
    pub fn value(&self, output: OutputId) -> Value {
        self.values.get(&output).cloned().unwrap_or(Value::Undefined)
    }

    /// Returns `true` if control may reach `block`.
    #[must_use]
    pub fn is_executable(&self, block: BlockId) -> bool {
        self.executable.contains(&block)
    }

    /// Every block control may reach.
    #[must_use]
    pub fn executable_blocks(&self) -> &BTreeSet<BlockId> {
        &self.executable
    }

    /// Returns `true` if control may flow from `from` to `to`.
    #[must_use]
    pub fn is_edge_executable(&self, from: BlockId, to: BlockId) -> bool {
        self.edges.contains(&(from, to))
    }

    /// The only successor index `block` can take, when the evaluation decided it.
    #[must_use]
    pub fn decided_successor(&self, block: BlockId) -> Option<usize> {
        match self.taken.get(&block).map(Vec::as_slice) {
            Some([index]) => Some(*index),
            _ => None,
        }
    }

    /// Return terminators control may reach.
    #[must_use]
    pub fn returns(&self) -> &[NodeId] {
        &self.returns
    }

    /// Returns `false` if the round limit was hit and every value is reported unknown.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Number of rounds run.
    #[must_use]
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// The meet of `port` over every reachable return; `Undefined` if none is reachable.
    #[must_use]
    pub fn return_port(&self, graph: &Graph, port: PortId) -> Value {
        self.returns
            .iter()
            .map(|ret| match graph.source_of(*ret, port) {
                Some(source) => self.value(source),
                None => Value::Undefined,
            })
            .fold(Value::Undefined, |acc, value| acc.meet(&value))
    }

    /// The meet of the returned value over every reachable return.
    #[must_use]
    pub fn return_value(&self, graph: &Graph) -> Value {
        self.return_port(graph, PortId::Arg(0))
    }

    /// The meet of the environment over every reachable return.
    #[must_use]
    pub fn return_environment(&self, graph: &Graph) -> Value {
        self.return_port(graph, PortId::Env)
    }
}
