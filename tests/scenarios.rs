//! End-to-end scenarios for single methods: build, optimize and inspect what is left.

use portflow::{
    graph::{BitwiseOp, CompareKind, ShiftOp},
    prelude::*,
};

const STATIC: MethodAccessFlags = MethodAccessFlags::STATIC;

/// Optimizes `Test.main()I` and returns the program together with the method.
fn optimized(class: ClassBuilder) -> Result<(Program<ClassPath>, MethodId)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut program = Program::new(ClassPath::new().with(class.build()));
    let main = program.method_id("Test", "main", "()I")?;
    program.optimize(main)?;
    program.graph().verify_links()?;
    Ok((program, main))
}

fn entry_of(program: &Program<ClassPath>, method: MethodId) -> Result<BlockId> {
    program
        .method(method)
        .entry()
        .ok_or_else(|| Error::NotSupported(format!("{method} was not built")))
}

/// The operation producing the value of the single reachable return.
fn returned(program: &Program<ClassPath>, method: MethodId) -> Result<Operation> {
    let graph = program.graph();
    let entry = entry_of(program, method)?;
    let returns: Vec<NodeId> = graph
        .terminators(entry)
        .into_iter()
        .filter(|node| matches!(graph.op(*node), Operation::Return(_)))
        .collect();
    assert_eq!(returns.len(), 1, "expected one return, found {returns:?}");
    let source = graph
        .source_of(returns[0], PortId::Arg(0))
        .ok_or_else(|| Error::NotSupported("void return".to_string()))?;
    Ok(graph.op(graph.output_port(source).node()).clone())
}

fn assert_returns_constant(program: &Program<ClassPath>, method: MethodId, expected: i32) -> Result<()> {
    assert_eq!(
        returned(program, method)?,
        Operation::Constant(ConstValue::Int(expected))
    );
    Ok(())
}

fn main_with(build: impl FnOnce(&mut ClassBuilder, &mut BytecodeAssembler) -> Result<()>) -> Result<ClassBuilder> {
    let mut class = ClassBuilder::new("Test");
    let mut asm = BytecodeAssembler::new();
    build(&mut class, &mut asm)?;
    class.method("main", "()I", STATIC, asm.finish()?);
    Ok(class)
}

#[test]
fn return_zero() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(0)?.ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    assert_returns_constant(&program, main, 0)?;
    assert_eq!(program.graph().method_blocks(entry_of(&program, main)?).len(), 1);
    Ok(())
}

#[test]
fn mixed_arithmetic() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(6)?
            .iconst(7)?
            .imul()?
            .iconst(2)?
            .isub()?
            .iconst(5)?
            .idiv()?
            .iconst(3)?
            .shift(PrimitiveType::Int, ShiftOp::Shl)?
            .iconst(-1)?
            .bitwise(PrimitiveType::Int, BitwiseOp::Xor)?
            .ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    // ((6 * 7 - 2) / 5 << 3) ^ -1
    assert_returns_constant(&program, main, !64)?;
    Ok(())
}

#[test]
fn locals_and_increments() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(10)?
            .istore(0)?
            .iinc(0, 5)?
            .iload(0)?
            .iload(0)?
            .iadd()?
            .ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    assert_returns_constant(&program, main, 30)
}

#[test]
fn untouched_array_slot_is_zero() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(3)?
            .newarray(PrimitiveType::Int)?
            .iconst(0)?
            .iaload()?
            .ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    assert_returns_constant(&program, main, 0)?;

    let graph = program.graph();
    let leftover = graph
        .method_nodes(entry_of(&program, main)?)
        .into_iter()
        .filter(|node| matches!(graph.op(*node), Operation::NewArray(_) | Operation::LoadElement(_)))
        .count();
    assert_eq!(leftover, 0);
    Ok(())
}

#[test]
fn self_referential_array_identity() -> Result<()> {
    let class = main_with(|class, asm| {
        let object = class.pool().add_class("java/lang/Object");
        asm.iconst(1)?
            .anewarray(object)?
            .astore(0)?
            .aload(0)?
            .iconst(0)?
            .aload(0)?
            .aastore()?
            .aload(0)?
            .iconst(0)?
            .aaload()?
            .aload(0)?
            .if_acmp(CompareKind::Ne, "different")?
            .iconst(1)?
            .ireturn()?
            .label("different")?
            .iconst(0)?
            .ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    assert_returns_constant(&program, main, 1)?;
    assert_eq!(program.graph().method_blocks(entry_of(&program, main)?).len(), 1);
    Ok(())
}

#[test]
fn array_length_and_aliasing() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(2)?
            .newarray(PrimitiveType::Int)?
            .astore(0)?
            .aload(0)?
            .astore(1)?
            .aload(1)?
            .iconst(0)?
            .iconst(7)?
            .iastore()?
            .aload(0)?
            .iconst(0)?
            .iaload()?
            .aload(0)?
            .arraylength()?
            .iadd()?
            .ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    assert_returns_constant(&program, main, 9)
}

#[test]
fn constant_index_out_of_bounds_is_fatal() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(1)?
            .newarray(PrimitiveType::Int)?
            .iconst(4)?
            .iaload()?
            .ireturn()?;
        Ok(())
    })?;
    let mut program = Program::new(ClassPath::new().with(class.build()));
    let main = program.method_id("Test", "main", "()I")?;
    assert!(matches!(
        program.optimize(main),
        Err(Error::IndexOutOfBounds { index: 4, length: 1 })
    ));
    Ok(())
}

#[test]
fn object_field_default_and_write() -> Result<()> {
    let mut class = ClassBuilder::new("Test");
    let this = class.pool().add_class("Test");
    let init = class.pool().add_method_ref("Test", "<init>", "()V");
    let field = class.pool().add_field_ref("Test", "x", "I");

    let mut asm = BytecodeAssembler::new();
    asm.vreturn()?;
    class.method("<init>", "()V", MethodAccessFlags::PUBLIC, asm.finish()?);

    let mut asm = BytecodeAssembler::new();
    asm.new_instance(this)?
        .dup()?
        .invokespecial(init)?
        .getfield(field)?
        .ireturn()?;
    class.method("fresh", "()I", STATIC, asm.finish()?);

    let mut asm = BytecodeAssembler::new();
    asm.new_instance(this)?
        .dup()?
        .invokespecial(init)?
        .astore(0)?
        .aload(0)?
        .iconst(5)?
        .putfield(field)?
        .aload(0)?
        .getfield(field)?
        .ireturn()?;
    class.method("main", "()I", STATIC, asm.finish()?);

    let mut program = Program::new(ClassPath::new().with(class.build()));
    let main = program.method_id("Test", "main", "()I")?;
    let fresh = program.method_id("Test", "fresh", "()I")?;
    program.optimize(main)?;
    program.optimize(fresh)?;
    program.graph().verify_links()?;

    assert_returns_constant(&program, main, 5)?;
    assert_returns_constant(&program, fresh, 0)?;
    Ok(())
}

#[test]
fn constant_switch_removes_dead_cases() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(2)?
            .tableswitch(1, &["one", "two", "three"], "other")?
            .label("one")?
            .iconst(1000)?
            .ireturn()?
            .label("two")?
            .iconst(2000)?
            .ireturn()?
            .label("three")?
            .iconst(3000)?
            .ireturn()?
            .label("other")?
            .iconst(0)?
            .ireturn()?;
        Ok(())
    })?;
    let (program, main) = optimized(class)?;
    assert_returns_constant(&program, main, 2000)?;

    let graph = program.graph();
    let entry = entry_of(&program, main)?;
    assert_eq!(graph.method_blocks(entry).len(), 1);
    assert_eq!(graph.block_ids().count(), 1);
    assert!(program.events().has(EventKind::BranchSimplified));
    assert!(program.events().has(EventKind::BlockRemoved));
    Ok(())
}

#[test]
fn loops_stay_unknown() -> Result<()> {
    let class = main_with(|_, asm| {
        asm.iconst(0)?
            .istore(0)?
            .iconst(0)?
            .istore(1)?
            .label("head")?
            .iload(1)?
            .iconst(3)?
            .if_icmpge("done")?
            .iload(0)?
            .iload(1)?
            .iadd()?
            .istore(0)?
            .iinc(1, 1)?
            .goto("head")?
            .label("done")?
            .iload(0)?
            .ireturn()?;
        Ok(())
    })?;
    let (mut program, main) = optimized(class)?;
    let entry = entry_of(&program, main)?;
    assert!(program.graph().method_blocks(entry).len() > 1);

    let evaluation = program.evaluate(main, &[])?;
    assert!(evaluation.converged());
    assert!(!evaluation.return_value(program.graph()).is_constant());
    Ok(())
}

/// `java/lang/Object` with a constructor that does nothing.
fn object_class() -> Result<ClassFile> {
    let mut object = ClassBuilder::new("java/lang/Object").extends(None);
    let mut asm = BytecodeAssembler::new();
    asm.vreturn()?;
    object.method("<init>", "()V", MethodAccessFlags::PUBLIC, asm.finish()?);
    Ok(object.build())
}

/// Class `Test` whose constructor runs `super()` and then `value = 1`, with `main` built
/// from `body` given the class, constructor and field indices.
fn initialized_field(
    body: impl FnOnce(&mut BytecodeAssembler, u16, u16, u16) -> Result<()>,
) -> Result<(Program<ClassPath>, MethodId)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut class = ClassBuilder::new("Test");
    let this = class.pool().add_class("Test");
    let init = class.pool().add_method_ref("Test", "<init>", "()V");
    let object_init = class.pool().add_method_ref("java/lang/Object", "<init>", "()V");
    let field = class.pool().add_field_ref("Test", "value", "I");

    let mut asm = BytecodeAssembler::new();
    asm.aload(0)?
        .invokespecial(object_init)?
        .aload(0)?
        .iconst(1)?
        .putfield(field)?
        .vreturn()?;
    class.method("<init>", "()V", MethodAccessFlags::PUBLIC, asm.finish()?);

    let mut asm = BytecodeAssembler::new();
    body(&mut asm, this, init, field)?;
    class.method("main", "()I", STATIC, asm.finish()?);

    let mut program = Program::new(ClassPath::new().with(object_class()?).with(class.build()));
    let main = program.method_id("Test", "main", "()I")?;
    program.optimize(main)?;
    program.graph().verify_links()?;
    Ok((program, main))
}

fn remaining_calls(program: &Program<ClassPath>, method: MethodId) -> Result<usize> {
    let graph = program.graph();
    Ok(graph
        .method_nodes(entry_of(program, method)?)
        .into_iter()
        .filter(|node| matches!(graph.op(*node), Operation::Invoke { .. }))
        .count())
}

#[test]
fn constructor_initializes_field() -> Result<()> {
    let (program, main) = initialized_field(|asm, this, init, field| {
        asm.new_instance(this)?
            .dup()?
            .invokespecial(init)?
            .getfield(field)?
            .ireturn()?;
        Ok(())
    })?;
    assert_returns_constant(&program, main, 1)?;
    assert_eq!(remaining_calls(&program, main)?, 0);
    assert_eq!(program.events().count_kind(EventKind::CallInlined), 2);
    Ok(())
}

#[test]
fn write_after_constructor_wins() -> Result<()> {
    let (program, main) = initialized_field(|asm, this, init, field| {
        asm.new_instance(this)?
            .dup()?
            .invokespecial(init)?
            .astore(0)?
            .aload(0)?
            .iconst(2)?
            .putfield(field)?
            .aload(0)?
            .getfield(field)?
            .ireturn()?;
        Ok(())
    })?;
    assert_returns_constant(&program, main, 2)?;
    assert_eq!(remaining_calls(&program, main)?, 0);
    Ok(())
}
