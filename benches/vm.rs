//! Benchmarks for the compile pipeline and the VM.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sable::ast::Program;
use sable::lexer::StringPool;
use sable::vm::{Machine, MachineConfig};
use std::fs;

/// Parse source into an AST.
fn parse(source: &str) -> (Program, StringPool) {
    sable::parse(source).expect("parse error")
}

/// Compile and execute without echoing output.
fn run_vm(source: &str) {
    let bytecode = sable::compile(source).expect("compile error");
    let config = MachineConfig {
        echo: false,
        ..MachineConfig::default()
    };
    Machine::new(bytecode, config)
        .run()
        .expect("vm runtime error");
}

fn load_program(name: &str) -> String {
    let path = format!("benches/programs/{}.sb", name);
    fs::read_to_string(&path).unwrap_or_else(|_| panic!("failed to read {}", path))
}

fn programs(c: &mut Criterion) {
    let mut group = c.benchmark_group("programs");

    for name in ["fib_recursive", "loop_sum", "list_churn"] {
        let source = load_program(name);
        group.bench_with_input(BenchmarkId::new("vm", name), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }

    group.finish();
}

fn fib_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("fib_scaling");

    for n in [10, 15, 20].iter() {
        let source = format!(
            r#"
func fib(n) {{
    if (n <= 1) {{
        return n;
    }}
    return fib(n - 1) + fib(n - 2);
}}
let result = fib({});
"#,
            n
        );

        group.bench_with_input(BenchmarkId::new("vm", n), &source, |b, src| {
            b.iter(|| run_vm(black_box(src)))
        });
    }

    group.finish();
}

/// Compilation alone, without execution.
fn compilation_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("compilation_overhead");

    for name in ["fib_recursive", "loop_sum"] {
        let source = load_program(name);
        let (program, pool) = parse(&source);
        group.bench_function(format!("compile_{}", name), |b| {
            b.iter(|| sable::compiler::compile(black_box(&program), pool.clone()).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, programs, fib_scaling, compilation_overhead);

criterion_main!(benches);
