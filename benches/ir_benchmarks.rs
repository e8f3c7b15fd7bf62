//! Benchmarks for expression tree operations
//!
//! Measures performance of:
//! - Traversal with no observers (identity path)
//! - Traversal with a rewriting observer
//! - Flattening
//! - Structural equality and hashing of independent copies

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use expression_interceptor::ir::expr_node::{BinaryExpr, BinaryOp, Expr};
use expression_interceptor::ir::identity::ConstantValue;
use expression_interceptor::ir::operators::{query_source, where_call};
use expression_interceptor::{Interceptor, StructuralComparer};
use test_utils::ir::fixtures::{member_a, record_param, record_type, RECORDS};
use test_utils::ir::generator::deep_copy;

// ============================================================================
// Tree builders
// ============================================================================

/// `records.Where(x => x.A != 0).Where(x => x.A != 1)...` with `count` filters.
fn nested_filters(count: usize) -> Expr {
    let mut query = query_source(RECORDS, record_type());
    for i in 0..count {
        let x = record_param();
        let body = Expr::not_equal(
            Expr::property(Some(Expr::Parameter(x.clone())), member_a()),
            Expr::constant_of(ConstantValue::Int(i as i64)),
        );
        query = where_call(query, Expr::lambda(body, [x]));
    }
    query
}

/// `x => x.A == 0 || x.A == 1 || ...` with `count` comparisons.
fn wide_predicate(count: usize) -> Expr {
    let x = record_param();
    let compare = |i: usize| {
        Expr::equal(
            Expr::property(Some(Expr::Parameter(x.clone())), member_a()),
            Expr::constant_of(ConstantValue::Int(i as i64)),
        )
    };
    let body = (1..count).fold(compare(0), |acc, i| Expr::or_else(acc, compare(i)));
    Expr::Lambda(Expr::lambda(body, [x]))
}

const SIZES: [usize; 3] = [10, 50, 200];

// ============================================================================
// Benchmark: Traversal
// ============================================================================

fn bench_visit(c: &mut Criterion) {
    let mut group = c.benchmark_group("visit");

    for size in SIZES.iter() {
        let tree = nested_filters(*size);
        group.bench_with_input(BenchmarkId::new("no_observers", size), &tree, |b, tree| {
            let mut interceptor = Interceptor::new();
            b.iter(|| black_box(interceptor.visit(tree)))
        });

        group.bench_with_input(BenchmarkId::new("flip_comparisons", size), &tree, |b, tree| {
            let mut interceptor = Interceptor::new();
            b.iter(|| {
                black_box(interceptor.visit_with_hook(tree, |e: Arc<BinaryExpr>| {
                    Ok(Arc::new(BinaryExpr {
                        op: BinaryOp::Equal,
                        ..(*e).clone()
                    }))
                }))
            })
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Flatten
// ============================================================================

fn bench_flatten(c: &mut Criterion) {
    let mut group = c.benchmark_group("flatten");

    for size in SIZES.iter() {
        let tree = wide_predicate(*size);
        group.bench_with_input(BenchmarkId::new("wide_predicate", size), &tree, |b, tree| {
            let mut interceptor = Interceptor::new();
            b.iter(|| black_box(interceptor.flatten(tree)))
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Structural equality and hashing
// ============================================================================

fn bench_equality(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural_equality");
    let comparer = StructuralComparer::new();

    for size in SIZES.iter() {
        let tree = nested_filters(*size);
        let copy = deep_copy(&tree).expect("copy benchmark tree");

        group.bench_with_input(BenchmarkId::new("equals_copy", size), &(&tree, &copy), |b, (tree, copy)| {
            b.iter(|| black_box(comparer.equals(tree, copy)))
        });

        group.bench_with_input(BenchmarkId::new("hash", size), &tree, |b, tree| {
            b.iter(|| black_box(comparer.hash(tree)))
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group! {
    name = benches;
    config = Criterion::default()
        .sample_size(100)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets =
        bench_visit,
        bench_flatten,
        bench_equality
}

criterion_main!(benches);
