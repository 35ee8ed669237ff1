//! Parsing bytecode into graphs, without optimization.

use portflow::{compiler::blocks, graph::dot::method_to_dot, prelude::*};

const STATIC: MethodAccessFlags = MethodAccessFlags::STATIC;

fn is_marker(op: &Operation) -> bool {
    matches!(
        op,
        Operation::Push | Operation::Pop | Operation::LoadLocal(_) | Operation::StoreLocal(_)
    )
}

/// `static int sum(int[] values)`: a loop whose stack and locals cross block boundaries.
fn sum() -> Result<Vec<u8>> {
    let mut asm = BytecodeAssembler::new();
    asm.iconst(0)?
        .istore(1)?
        .iconst(0)?
        .istore(2)?
        .label("head")?
        .iload(2)?
        .aload(0)?
        .arraylength()?
        .if_icmpge("done")?
        .iload(1)?
        .aload(0)?
        .iload(2)?
        .iaload()?
        .iadd()?
        .istore(1)?
        .iinc(2, 1)?
        .goto("head")?
        .label("done")?
        .iload(1)?
        .ireturn()?;
    asm.finish()
}

/// `static int choose(int x)`: both arms leave a value on the stack for the join.
fn choose() -> Result<Vec<u8>> {
    let mut asm = BytecodeAssembler::new();
    asm.iload(0)?
        .ifeq("zero")?
        .iconst(1)?
        .goto("join")?
        .label("zero")?
        .iconst(2)?
        .label("join")?
        .iconst(10)?
        .imul()?
        .ireturn()?;
    asm.finish()
}

#[test]
fn builder_then_prepare_leaves_no_markers() -> Result<()> {
    for (descriptor, code) in [("([I)I", sum()?), ("(I)I", choose()?)] {
        let info = MethodInfo::new("test", descriptor, STATIC, code);
        let signature = MethodDescriptor::parse(descriptor)?;
        let pool = ConstantPool::new();
        let mut graph = Graph::new();

        let entry = MethodBuilder::build(&mut graph, MethodId::new(0), &info, &pool, &signature)?;
        graph.verify_links()?;
        assert!(graph
            .method_nodes(entry)
            .iter()
            .any(|node| is_marker(graph.op(*node))));

        blocks::prepare(&mut graph, entry)?;
        graph.verify_links()?;
        assert!(!graph
            .method_nodes(entry)
            .iter()
            .any(|node| is_marker(graph.op(*node))));
    }
    Ok(())
}

#[test]
fn join_receives_stack_port() -> Result<()> {
    let mut class = ClassBuilder::new("Test");
    class.method("choose", "(I)I", STATIC, choose()?);
    let mut program = Program::with_config(
        ClassPath::new().with(class.build()),
        CompilerConfig::parse_only(),
    );
    let choose = program.method_id("Test", "choose", "(I)I")?;
    let entry = program
        .graph_of(choose)?
        .ok_or_else(|| Error::NotSupported("no code".to_string()))?;

    let graph = program.graph();
    let join = graph
        .method_blocks(entry)
        .into_iter()
        .find(|block| graph.predecessors(*block).len() == 2)
        .ok_or_else(|| Error::NotSupported("no join block".to_string()))?;
    let ports: Vec<PortId> = graph
        .outputs(graph.block(join).entry())
        .keys()
        .copied()
        .collect();
    assert_eq!(ports, vec![PortId::Env, PortId::Stack(0)]);

    for value in [0, 3] {
        let evaluation = program.evaluate(choose, &[Value::int(value)])?;
        let expected = if value == 0 { 20 } else { 10 };
        assert_eq!(evaluation.return_value(program.graph()), Value::int(expected));
    }
    Ok(())
}

#[test]
fn loop_carries_locals() -> Result<()> {
    let mut class = ClassBuilder::new("Test");
    class.method("sum", "([I)I", STATIC, sum()?);
    let mut program = Program::new(ClassPath::new().with(class.build()));
    let sum = program.method_id("Test", "sum", "([I)I")?;
    program.optimize(sum)?;

    let graph = program.graph();
    let entry = program
        .method(sum)
        .entry()
        .ok_or_else(|| Error::NotSupported("no code".to_string()))?;
    let head = graph
        .method_blocks(entry)
        .into_iter()
        .find(|block| graph.predecessors(*block).len() == 2)
        .ok_or_else(|| Error::NotSupported("no loop head".to_string()))?;
    let outputs = graph.outputs(graph.block(head).entry());
    assert!(outputs.contains_key(&PortId::Local(0)));
    assert!(outputs.contains_key(&PortId::Local(1)));
    assert!(outputs.contains_key(&PortId::Local(2)));
    graph.verify_links()
}

#[test]
fn dot_output_lists_nodes_and_links() -> Result<()> {
    let mut class = ClassBuilder::new("Test");
    class.method("choose", "(I)I", STATIC, choose()?);
    let mut program = Program::new(ClassPath::new().with(class.build()));
    let choose = program.method_id("Test", "choose", "(I)I")?;
    let entry = program
        .graph_of(choose)?
        .ok_or_else(|| Error::NotSupported("no code".to_string()))?;

    let dot = method_to_dot(program.graph(), entry);
    assert!(dot.starts_with("digraph"));
    assert!(dot.contains("method-entry"));
    assert!(dot.contains("->"));
    Ok(())
}

#[test]
fn unsupported_input_is_a_format_error() -> Result<()> {
    let info = MethodInfo::new("test", "()V", STATIC, vec![0xba, 0x00, 0x01, 0x00, 0x00]);
    let signature = MethodDescriptor::parse("()V")?;
    let mut graph = Graph::new();
    let error = MethodBuilder::build(
        &mut graph,
        MethodId::new(0),
        &info,
        &ConstantPool::new(),
        &signature,
    )
    .err()
    .ok_or_else(|| Error::NotSupported("invokedynamic was accepted".to_string()))?;
    assert!(error.is_format());
    Ok(())
}
