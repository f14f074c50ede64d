//! Benchmarks for invalidation and lazy recomputation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use livedoc_core::{ComponentKind, DerivedSpec, DocumentBuilder, InputSpec, Runtime, VarRef};

/// `v0` is an input; every `vN` adds one to `v(N-1)`.
fn chain(len: usize) -> Runtime {
    let mut builder = DocumentBuilder::new().input("v0", InputSpec::number().prefill("0"));
    for i in 1..len {
        builder = builder.derived(
            format!("v{}", i),
            DerivedSpec::expression(ComponentKind::Number, "p+1")
                .input("p", VarRef::value(format!("v{}", i - 1))),
        );
    }
    builder.build().unwrap()
}

/// `v0` is an input read by `len` independent views.
fn fan_out(len: usize) -> Runtime {
    let mut builder = DocumentBuilder::new().input("v0", InputSpec::number().prefill("0"));
    for i in 1..len {
        builder = builder.derived(
            format!("v{}", i),
            DerivedSpec::expression(ComponentKind::Number, "p*2")
                .input("p", VarRef::value("v0")),
        );
    }
    builder.build().unwrap()
}

/// Commit to the head of a chain, then read its tail.
fn bench_chain_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_commit");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut runtime = chain(n);
            let tail = format!("v{}", n - 1);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                runtime.set_immediate_text("v0", &i.to_string()).unwrap();
                runtime.commit("v0").unwrap();
                black_box(runtime.value_of(&tail).unwrap());
            });
        });
    }

    group.finish();
}

/// Commit without reading anything: invalidation cost alone.
fn bench_invalidate_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("invalidate_only");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut runtime = fan_out(n);
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                runtime.set_immediate_text("v0", &i.to_string()).unwrap();
                black_box(runtime.commit("v0").unwrap());
            });
        });
    }

    group.finish();
}

/// Reads of an unchanged document hit the cache.
fn bench_steady_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("steady_reads");

    for n in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            let mut runtime = chain(n);
            let tail = format!("v{}", n - 1);
            runtime.value_of(&tail).unwrap();
            b.iter(|| black_box(runtime.value_of(&tail).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_chain_commit,
    bench_invalidate_only,
    bench_steady_reads
);
criterion_main!(benches);
