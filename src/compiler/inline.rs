//! Replacement of calls whose result does not depend on running the callee.
//!
//! A call can be dropped when evaluating the callee from the caller's state at the call
//! shows that it cannot throw and leaves the heap in a state the evaluator fully knows.
//! The callee sees the caller's constant arguments and, when the caller's heap is known
//! at the call, the objects the caller passes in. What replaces the call depends on the
//! result:
//!
//! - a `void` callee: nothing, the call is removed
//! - a constant result: a `Constant` node in the caller's block
//! - a result that is always one of the callee's arguments: the caller's value for that
//!   argument
//!
//! Constant field writes the callee makes to objects the caller passed in, such as a
//! constructor initializing `this`, are replayed in the caller as `StoreField` nodes.
//!
//! Calls are resolved statically through [`Program::load_reachable`]. A virtual or
//! interface call is only replaced when its target is `private` or `final`, since an
//! override could run instead.

use std::rc::Rc;

use crate::{
    analysis::{ConstValue, Evaluation, GraphEvaluator, Heap, HeapObject, ObjectRef, Value},
    compiler::{EventKind, Method, Program},
    graph::{BlockId, Graph, InvokeKind, MethodId, NodeId, Operation, PortId},
    metadata::{ClassProvider, FieldRef, MethodAccessFlags},
    Error, Result,
};

/// What replaces an inlined call's result.
#[derive(Debug, Clone, PartialEq)]
enum InlineAction {
    /// The callee returns nothing.
    Eliminate,
    /// The callee always returns this constant.
    Constant(ConstValue),
    /// The callee always returns the argument at this position.
    Forward(usize),
}

/// A field write the callee leaves on an object passed as argument `position`.
#[derive(Debug, Clone, PartialEq)]
struct FieldStore {
    position: usize,
    field: Rc<FieldRef>,
    value: ConstValue,
}

/// A call site the pass decided to rewrite.
#[derive(Debug, Clone)]
struct InlineCandidate {
    call: NodeId,
    callee: MethodId,
    action: InlineAction,
    stores: Vec<FieldStore>,
}

/// Replaces calls from `methods` whose callees are free of effects the caller cannot
/// replay and return a constant, an argument or nothing.
///
/// Returns the number of calls replaced.
///
/// # Errors
/// Returns [`Error::Invariant`] if a callee's return terminators disagree on their ports,
/// and any error evaluating a method other than an out-of-bounds array access.
pub fn inline_constant_calls<P: ClassProvider>(
    program: &mut Program<P>,
    methods: &[MethodId],
) -> Result<usize> {
    let mut candidates = Vec::new();
    for method in methods {
        let Some(entry) = program.method(*method).entry() else {
            continue;
        };
        let mut context = None;
        for call in program.graph.method_nodes(entry) {
            let Operation::Invoke {
                target: Some(callee),
                ..
            } = program.graph.op(call)
            else {
                continue;
            };
            if context.is_none() {
                context = Some(evaluate_caller(program, entry)?);
            }
            let caller = context.as_ref().and_then(Option::as_ref);
            if let Some(candidate) = analyze_call(program, caller, call, *callee)? {
                candidates.push(candidate);
            }
        }
    }

    let inlined = candidates.len();
    for candidate in candidates {
        let block = apply(&mut program.graph, &candidate);
        let callee = program.method(candidate.callee).to_string();
        program
            .events
            .record(EventKind::CallInlined)
            .block(block)
            .method(candidate.callee)
            .message(format!(
                "{} of {callee}: {:?}, {} field stores",
                candidate.call,
                candidate.action,
                candidate.stores.len()
            ));
    }
    Ok(inlined)
}

/// The caller's own evaluation, used for the state at each of its calls.
fn evaluate_caller<P: ClassProvider>(
    program: &Program<P>,
    entry: BlockId,
) -> Result<Option<Evaluation>> {
    let evaluator = GraphEvaluator::new(&program.graph, entry)
        .with_max_rounds(program.config.max_evaluation_rounds);
    match evaluator.run() {
        Ok(evaluation) if evaluation.converged() => Ok(Some(evaluation)),
        Ok(_) | Err(Error::IndexOutOfBounds { .. }) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Returns `true` if the call always runs `method` itself rather than an override.
fn dispatches_statically(kind: InvokeKind, method: &Method) -> bool {
    match kind {
        InvokeKind::Static | InvokeKind::Special => true,
        InvokeKind::Virtual | InvokeKind::Interface => method
            .info()
            .access
            .intersects(MethodAccessFlags::PRIVATE | MethodAccessFlags::FINAL),
    }
}

fn analyze_call<P: ClassProvider>(
    program: &Program<P>,
    caller: Option<&Evaluation>,
    call: NodeId,
    callee: MethodId,
) -> Result<Option<InlineCandidate>> {
    let method = program.method(callee);
    let Some(entry) = method.entry() else {
        return Ok(None);
    };
    let graph = &program.graph;
    if let Operation::Invoke { kind, .. } = graph.op(call) {
        if !dispatches_statically(*kind, method) {
            log::trace!("{call}: {method} may be overridden");
            return Ok(None);
        }
    }
    check_returns(graph, entry)?;

    let heap = caller
        .and_then(|evaluation| {
            graph
                .source_of(call, PortId::Env)
                .map(|env| evaluation.value(env))
        })
        .and_then(|env| env.heap().cloned());

    let slots = method.signature().argument_local_slots(method.is_static());
    let mut evaluator =
        GraphEvaluator::new(graph, entry).with_max_rounds(program.config.max_evaluation_rounds);
    if let Some(heap) = &heap {
        evaluator = evaluator.with_environment(Value::Env(heap.clone()));
    }
    let mut passed = Vec::new();
    for (position, slot) in slots.iter().enumerate() {
        let Some(source) = graph.source_of(call, PortId::Arg(position as u32)) else {
            continue;
        };
        let value = match graph.op(graph.output_port(source).node) {
            Operation::Constant(value) => Value::Const(value.clone()),
            _ => caller.map_or(Value::Undefined, |evaluation| evaluation.value(source)),
        };
        match value {
            Value::Const(_) => evaluator = evaluator.with_argument(*slot, value),
            Value::Ref(reference)
                if heap.as_ref().is_some_and(|heap| heap.get(reference).is_some()) =>
            {
                passed.push((position, reference));
                evaluator = evaluator.with_argument(*slot, value);
            }
            _ => {}
        }
    }

    let evaluation = match evaluator.run() {
        Ok(evaluation) => evaluation,
        Err(Error::IndexOutOfBounds { index, length }) => {
            log::debug!("{call}: callee {method} throws on index {index} of length {length}");
            return Ok(None);
        }
        Err(error) => return Err(error),
    };
    let Some(after) = settled_heap(graph, &evaluation) else {
        return Ok(None);
    };
    let Some(stores) = field_stores(&heap.unwrap_or_default(), &after, &passed) else {
        log::trace!("{call}: {method} changes objects the caller cannot update");
        return Ok(None);
    };

    let action = if graph.output(call, PortId::Arg(0)).is_none() {
        Some(InlineAction::Eliminate)
    } else if let Value::Const(value) = evaluation.return_value(graph) {
        Some(InlineAction::Constant(value))
    } else {
        forwarded_slot(graph, entry, &evaluation)
            .and_then(|slot| method.signature().argument_position(slot, method.is_static()))
            .filter(|position| graph.input(call, PortId::Arg(*position as u32)).is_some())
            .map(InlineAction::Forward)
    };
    Ok(action.map(|action| InlineCandidate {
        call,
        callee,
        action,
        stores,
    }))
}

fn check_returns(graph: &Graph, entry: BlockId) -> Result<()> {
    let mut returns = graph
        .terminators(entry)
        .into_iter()
        .filter(|node| matches!(graph.op(*node), Operation::Return(_)));
    let Some(first) = returns.next() else {
        return Ok(());
    };
    let ports: Vec<PortId> = graph.inputs(first).keys().copied().collect();
    for other in returns {
        if !graph.inputs(other).keys().copied().eq(ports.iter().copied()) {
            return Err(invariant_error!(
                "returns {first} and {other} of {entry} take different ports"
            ));
        }
    }
    Ok(())
}

/// The heap every reachable return leaves behind, if the callee converged, cannot throw
/// and the heap is fully known.
fn settled_heap(graph: &Graph, evaluation: &Evaluation) -> Option<Heap> {
    if !evaluation.converged() || evaluation.returns().is_empty() {
        return None;
    }
    let throws = evaluation.executable_blocks().iter().any(|block| {
        graph
            .block(*block)
            .terminator()
            .is_some_and(|node| matches!(graph.op(node), Operation::Throw))
    });
    if throws {
        return None;
    }
    match evaluation.return_environment(graph) {
        Value::Env(heap) => Some(heap),
        _ => None,
    }
}

/// Field writes that turn `before` into `after`.
///
/// Objects allocated by the callee are invisible to the caller unless stored into one of
/// its objects, which takes a reference value and is rejected. Returns `None` when an
/// existing object changed other than by constant field writes to an object the caller
/// passed in.
fn field_stores(
    before: &Heap,
    after: &Heap,
    passed: &[(usize, ObjectRef)],
) -> Option<Vec<FieldStore>> {
    let mut stores = Vec::new();
    for (reference, old) in before.iter() {
        let new = after.get(*reference)?;
        if new == old {
            continue;
        }
        let (HeapObject::Object(old), HeapObject::Object(new)) = (old, new) else {
            return None;
        };
        let position = passed
            .iter()
            .find(|(_, object)| object == reference)
            .map(|(position, _)| *position)?;
        for (field, value) in new.written_fields() {
            if old.field(field) == *value {
                continue;
            }
            let Value::Const(value) = value else {
                return None;
            };
            stores.push(FieldStore {
                position,
                field: field.clone(),
                value: value.clone(),
            });
        }
    }
    Some(stores)
}

/// The argument slot every reachable return hands back unchanged, if there is one.
fn forwarded_slot(graph: &Graph, entry: BlockId, evaluation: &Evaluation) -> Option<u32> {
    let method_entry = graph.block(entry).entry();
    let mut slots = evaluation.returns().iter().map(|ret| {
        let source = graph.source_of(*ret, PortId::Arg(0))?;
        let port = graph.output_port(source);
        match port.port {
            PortId::Local(slot) if port.node == method_entry => Some(slot),
            _ => None,
        }
    });
    let first = slots.next()??;
    slots.all(|slot| slot == Some(first)).then_some(first)
}

fn apply(graph: &mut Graph, candidate: &InlineCandidate) -> BlockId {
    let call = candidate.call;
    let block = graph
        .block_of(call)
        .unwrap_or_else(|| panic!("call {call} is not placed in a block"));

    if let Some(result) = graph.output(call, PortId::Arg(0)) {
        let replacement = match &candidate.action {
            InlineAction::Constant(value) => {
                let constant = graph.create_node(Operation::Constant(value.clone()), Some(block));
                Some(graph.add_output(constant, PortId::Arg(0)))
            }
            InlineAction::Forward(position) => graph.source_of(call, PortId::Arg(*position as u32)),
            InlineAction::Eliminate => None,
        };
        if let Some(replacement) = replacement {
            graph.replace_with(result, replacement);
        }
    }

    let mut env = graph.source_of(call, PortId::Env);
    for store in &candidate.stores {
        let object = graph.source_of(call, PortId::Arg(store.position as u32));
        let constant = graph.create_node(Operation::Constant(store.value.clone()), Some(block));
        let value = graph.add_output(constant, PortId::Arg(0));
        let node = graph.create_node(
            Operation::StoreField {
                field: store.field.clone(),
                is_static: false,
            },
            Some(block),
        );
        graph.add_input(node, PortId::Env, env);
        graph.add_input(node, PortId::Arg(0), object);
        graph.add_input(node, PortId::Arg(1), Some(value));
        env = Some(graph.add_output(node, PortId::Env));
    }
    if let (Some(env_in), Some(env_out)) = (env, graph.output(call, PortId::Env)) {
        graph.replace_with(env_out, env_in);
    }
    graph.remove_node(call);
    block
}
