//! Benchmark for result set trimming
//!
//! Trimming runs every time a set outgrows `keep_size * trim_factor`, so its
//! cost bounds the throughput of pair analysis.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use couplingmap::results::{
    pareto_front, BoundedResultSet, CandidatePayload, FrontierExtractor, QuickHullFrontier,
    ScoredCandidate,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

fn random_candidates(count: usize, dimensions: usize, seed: u64) -> Vec<ScoredCandidate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let mut errors: Vec<f64> = (0..dimensions - 1).map(|_| rng.gen::<f64>()).collect();
            errors.push(-rng.gen::<f64>());
            ScoredCandidate::new(
                errors,
                CandidatePayload {
                    first: format!("src/A{}.java", i).into(),
                    second: "src/B.java".into(),
                    coupling: vec![0.0; dimensions - 1],
                    support: 1.0,
                },
            )
        })
        .collect()
}

fn bench_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("trim");
    group.sample_size(20);

    for &(count, dimensions) in &[(1_000, 3), (10_000, 3), (5_000, 4), (5_000, 5)] {
        let candidates = random_candidates(count, dimensions, 42);
        group.bench_with_input(
            BenchmarkId::new(format!("{}d", dimensions), count),
            &candidates,
            |b, candidates| {
                b.iter(|| {
                    let mut set = BoundedResultSet::new(dimensions, 50);
                    set.add_all(candidates.iter().cloned());
                    set.trim();
                    black_box(set.len())
                })
            },
        );
    }
    group.finish();
}

fn bench_frontier(c: &mut Criterion) {
    let mut group = c.benchmark_group("frontier");
    let points: Vec<Vec<f64>> = random_candidates(10_000, 3, 7)
        .into_iter()
        .map(|c| c.errors)
        .collect();

    group.bench_function("pareto_front", |b| {
        b.iter(|| black_box(pareto_front(black_box(&points)).len()))
    });
    group.bench_function("quickhull_frontier", |b| {
        let frontier = QuickHullFrontier::default();
        b.iter(|| black_box(frontier.lower_frontier_indices(black_box(&points))))
    });
    group.finish();
}

criterion_group!(benches, bench_trim, bench_frontier);
criterion_main!(benches);
