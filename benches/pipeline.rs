//! Benchmarks for the graph pipeline.
//!
//! Measures the stages a method goes through:
//! - Decoding bytecode
//! - Building and preparing the graph
//! - Optimizing a small program with calls

extern crate portflow;

use criterion::{criterion_group, criterion_main, Criterion};
use portflow::prelude::*;
use std::hint::black_box;

/// `static int sum(int[] values)`: a counted loop over an array.
fn sum_loop() -> Result<Vec<u8>> {
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

/// A class whose `f0` adds one per level over `depth` nested constant calls.
fn call_chain(depth: usize) -> Result<ClassFile> {
    let mut class = ClassBuilder::new("Bench");
    for level in 0..depth {
        let mut asm = BytecodeAssembler::new();
        if level + 1 < depth {
            let next = class
                .pool()
                .add_method_ref("Bench", &format!("f{}", level + 1), "()I");
            asm.invokestatic(next)?.iconst(1)?.iadd()?.ireturn()?;
        } else {
            asm.iconst(0)?.ireturn()?;
        }
        class.method(&format!("f{level}"), "()I", MethodAccessFlags::STATIC, asm.finish()?);
    }
    Ok(class.build())
}

/// Benchmark decoding a loop body into instructions.
fn bench_decode(c: &mut Criterion) {
    let code = sum_loop().unwrap();

    c.bench_function("decode_sum_loop", |b| {
        b.iter(|| {
            let instructions = decode_method(black_box(&code)).unwrap();
            black_box(instructions)
        });
    });
}

/// Benchmark building and preparing one method's graph.
fn bench_build(c: &mut Criterion) {
    let info = MethodInfo::new("sum", "([I)I", MethodAccessFlags::STATIC, sum_loop().unwrap());
    let signature = MethodDescriptor::parse("([I)I").unwrap();
    let pool = ConstantPool::new();

    c.bench_function("build_sum_loop", |b| {
        b.iter(|| {
            let mut graph = Graph::new();
            let entry =
                MethodBuilder::build(&mut graph, MethodId::new(0), &info, &pool, &signature)
                    .unwrap();
            portflow::compiler::blocks::prepare(&mut graph, entry).unwrap();
            black_box(graph)
        });
    });
}

/// Benchmark optimizing a chain of calls that folds to a constant.
fn bench_optimize_chain(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();
    let class = call_chain(16).unwrap();

    c.bench_function("optimize_call_chain_16", |b| {
        b.iter(|| {
            let mut program = Program::with_config(
                ClassPath::new().with(class.clone()),
                CompilerConfig::aggressive(),
            );
            let main = program.method_id("Bench", "f0", "()I").unwrap();
            black_box(program.optimize(main).unwrap())
        });
    });
}

criterion_group!(benches, bench_decode, bench_build, bench_optimize_chain);
criterion_main!(benches);
