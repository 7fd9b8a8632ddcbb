//! Trimming must never lose the best candidate of any non-negative weighting.

use couplingmap::results::{
    generate_one_distributions, BoundedResultSet, CandidatePayload, ScoredCandidate,
    WeightingMode,
};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

fn candidate(index: usize, errors: Vec<f64>) -> ScoredCandidate {
    ScoredCandidate::new(
        errors,
        CandidatePayload {
            first: format!("src/A{}.java", index).into(),
            second: "src/B.java".into(),
            coupling: vec![0.0, 0.0],
            support: 1.0,
        },
    )
}

fn random_points(count: usize, seed: u64) -> Vec<ScoredCandidate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            // pattern errors in [0, 1], negated support in [-1, 0]
            let errors = vec![rng.gen::<f64>(), rng.gen::<f64>(), -rng.gen::<f64>()];
            candidate(i, errors)
        })
        .collect()
}

fn brute_force_best(points: &[ScoredCandidate], weights: &[f64]) -> f64 {
    points
        .iter()
        .map(|c| c.weighted_score(weights, WeightingMode::Linear))
        .fold(f64::INFINITY, f64::min)
}

fn kept_names(set: &BoundedResultSet) -> HashSet<String> {
    set.iter().map(|c| c.payload.first.to_string()).collect()
}

#[test]
fn test_trim_keeps_minimum_for_dense_weight_sample() {
    let points = random_points(10_000, 7);
    let mut set = BoundedResultSet::new(3, 5);
    set.add_all(points.clone());
    set.trim();

    assert!(set.len() < points.len(), "trim should discard interior points");
    assert_eq!(set.total_amount(), 10_000);

    let kept: Vec<ScoredCandidate> = set.iter().cloned().collect();
    let grid = generate_one_distributions(3, 20);
    assert_eq!(grid.len(), 231);
    for weights in &grid {
        let expected = brute_force_best(&points, weights);
        let actual = brute_force_best(&kept, weights);
        assert!(
            (expected - actual).abs() < 1e-12,
            "weights {:?}: best {} lost, kept best is {}",
            weights,
            expected,
            actual
        );
    }
}

#[test]
fn test_trim_keeps_top_k_for_every_weighting() {
    let points = random_points(2_000, 19);
    let mut set = BoundedResultSet::new(3, 4);
    set.add_all(points.clone());
    set.trim();

    let mut reference = BoundedResultSet::new(3, 4);
    reference.add_all(points);
    for weights in generate_one_distributions(3, 8) {
        let expected: Vec<f64> = reference
            .get_best_sorted(&weights, WeightingMode::Linear)
            .iter()
            .map(|c| c.weighted_score(&weights, WeightingMode::Linear))
            .collect();
        let actual: Vec<f64> = set
            .get_best_sorted(&weights, WeightingMode::Linear)
            .iter()
            .map(|c| c.weighted_score(&weights, WeightingMode::Linear))
            .collect();
        assert_eq!(expected.len(), actual.len());
        for (e, a) in expected.iter().zip(&actual) {
            assert!((e - a).abs() < 1e-12, "weights {:?}", weights);
        }
    }
}

#[test]
fn test_merge_order_does_not_change_retained_set() {
    let points = random_points(3_000, 23);
    let (x, y) = points.split_at(1_400);

    let mut forward = BoundedResultSet::new(3, 6);
    forward.add_all(x.to_vec());
    forward.add_all(y.to_vec());
    forward.trim();

    let mut swapped = BoundedResultSet::new(3, 6);
    swapped.add_all(y.to_vec());
    swapped.add_all(x.to_vec());
    swapped.trim();

    let mut merged = BoundedResultSet::new(3, 6);
    let mut other = BoundedResultSet::new(3, 6);
    other.add_all(y.to_vec());
    merged.add_all(x.to_vec());
    merged.merge(other);
    merged.trim();

    assert_eq!(kept_names(&forward), kept_names(&swapped));
    assert_eq!(kept_names(&forward), kept_names(&merged));
    assert_eq!(merged.total_amount(), 3_000);
}

#[test]
fn test_trimming_pieces_then_merging_keeps_global_best() {
    let points = random_points(4_000, 31);
    let mut total = BoundedResultSet::new(3, 5);
    for chunk in points.chunks(500) {
        let mut piece = BoundedResultSet::new(3, 5);
        piece.add_all(chunk.to_vec());
        piece.trim();
        total.merge(piece);
    }
    total.trim();
    assert_eq!(total.total_amount(), 4_000);

    let kept: Vec<ScoredCandidate> = total.iter().cloned().collect();
    for weights in generate_one_distributions(3, 10) {
        let expected = brute_force_best(&points, &weights);
        assert!((expected - brute_force_best(&kept, &weights)).abs() < 1e-12);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_trim_keeps_best_of_random_weighting(
        raw in prop::collection::vec((0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0), 20..200),
        w in (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0),
    ) {
        let points: Vec<ScoredCandidate> = raw
            .iter()
            .enumerate()
            .map(|(i, &(a, b, s))| candidate(i, vec![a, b, -s]))
            .collect();
        let weights = [w.0, w.1, w.2];
        let mut set = BoundedResultSet::new(3, 2);
        set.add_all(points.clone());
        set.trim();

        let kept: Vec<ScoredCandidate> = set.iter().cloned().collect();
        let expected = brute_force_best(&points, &weights);
        prop_assert!((expected - brute_force_best(&kept, &weights)).abs() < 1e-9);
    }
}
