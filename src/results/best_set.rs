//! Bounded, mergeable store of the best pattern matches.
//!
//! Candidates are appended without bound and reduced by [`BoundedResultSet::trim`],
//! which peels convex frontier layers off the error point cloud. Peeling
//! `keep_size` layers keeps, for every non-negative linear weighting of the
//! error dimensions, at least the `keep_size` best candidates, so trimming
//! never changes the linear answer of [`BoundedResultSet::get_best_sorted`].
//!
//! The Pareto front of the set is kept as well. Any score that grows with
//! every error, such as [`WeightingMode::Squared`], attains its minimum on
//! that front, so the best candidate survives trimming under those scores too.

use super::candidate::{ScoredCandidate, WeightingMode};
use super::frontier::{
    pareto_front, varying_dimensions, FrontierExtractor, HullError, QuickHullFrontier,
};
use crate::core::ElementId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_KEEP_SIZE: usize = 50;
pub const DEFAULT_TRIM_FACTOR: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedResultSet {
    dimensions: usize,
    keep_size: usize,
    trim_factor: usize,
    total_amount: u64,
    data: Vec<ScoredCandidate>,
}

/// Candidates shipped between processes, with the raw count they stand for
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultBatch {
    pub total_amount: u64,
    pub candidates: Vec<ScoredCandidate>,
}

impl BoundedResultSet {
    pub fn new(dimensions: usize, keep_size: usize) -> Self {
        Self {
            dimensions,
            keep_size,
            trim_factor: DEFAULT_TRIM_FACTOR,
            total_amount: 0,
            data: Vec::new(),
        }
    }

    pub fn with_trim_factor(mut self, trim_factor: usize) -> Self {
        self.trim_factor = trim_factor.max(1);
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn keep_size(&self) -> usize {
        self.keep_size
    }

    /// Every candidate ever added, including trimmed ones
    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.data.iter()
    }

    pub fn candidates(&self) -> &[ScoredCandidate] {
        &self.data
    }

    pub fn add(&mut self, candidate: ScoredCandidate) {
        self.data.push(candidate);
        self.total_amount += 1;
    }

    pub fn add_all(&mut self, candidates: impl IntoIterator<Item = ScoredCandidate>) {
        let before = self.data.len();
        self.data.extend(candidates);
        self.total_amount += (self.data.len() - before) as u64;
    }

    /// Live size above which accumulators should trim
    pub fn trim_threshold(&self) -> usize {
        self.keep_size * self.trim_factor * self.dimensions.max(1)
    }

    pub fn needs_trim(&self) -> bool {
        self.data.len() > self.trim_threshold()
    }

    pub fn add_all_and_trim(&mut self, candidates: impl IntoIterator<Item = ScoredCandidate>) {
        self.add_all(candidates);
        if self.needs_trim() {
            self.trim();
        }
    }

    /// Union with another set for the same pattern
    pub fn merge(&mut self, other: BoundedResultSet) {
        self.total_amount += other.total_amount;
        self.data.extend(other.data);
    }

    pub fn absorb(&mut self, batch: ResultBatch) {
        self.total_amount += batch.total_amount;
        self.data.extend(batch.candidates);
    }

    /// Move the live candidates out, e.g. to ship them to the master
    pub fn take_batch(&mut self) -> ResultBatch {
        let batch = ResultBatch {
            total_amount: self.total_amount,
            candidates: std::mem::take(&mut self.data),
        };
        self.total_amount = 0;
        batch
    }

    /// Apply `f` to every candidate, e.g. to reorder views
    pub fn map_candidates(&mut self, f: impl Fn(&ScoredCandidate) -> ScoredCandidate) {
        self.data = self.data.iter().map(f).collect();
    }

    /// Best `keep_size` candidates, best first
    pub fn get_best_sorted(&self, weights: &[f64], mode: WeightingMode) -> Vec<&ScoredCandidate> {
        let mut scored: Vec<(f64, &ScoredCandidate)> = self
            .data
            .iter()
            .map(|c| (c.weighted_score(weights, mode), c))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored
            .into_iter()
            .take(self.keep_size)
            .map(|(_, c)| c)
            .collect()
    }

    /// Best `keep_size * size_factor` candidates in no particular order
    pub fn get_best_unsorted(&self, weights: &[f64], size_factor: usize) -> Vec<&ScoredCandidate> {
        let size = self.keep_size * size_factor;
        let mut scored: Vec<(f64, &ScoredCandidate)> = self
            .data
            .iter()
            .map(|c| (c.weighted_score(weights, WeightingMode::Linear), c))
            .collect();
        if size == 0 {
            return Vec::new();
        }
        if size < scored.len() {
            scored.select_nth_unstable_by(size - 1, |a, b| a.0.total_cmp(&b.0));
            scored.truncate(size);
        }
        scored.into_iter().map(|(_, c)| c).collect()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn trim(&mut self) {
        self.trim_with(&QuickHullFrontier::default());
    }

    pub fn trim_with(&mut self, frontier: &dyn FrontierExtractor) {
        self.dedup();
        if self.data.len() <= self.keep_size {
            return;
        }
        let before = self.data.len();
        match peel_layers(&self.data, self.keep_size, frontier) {
            Ok(keep) => {
                let mut index = 0;
                self.data.retain(|_| {
                    let kept = keep[index];
                    index += 1;
                    kept
                });
                log::debug!(
                    "Trimmed {}-dimensional result set from {} to {} candidates",
                    self.dimensions,
                    before,
                    self.data.len()
                );
            }
            Err(e) => {
                log::warn!(
                    "Skipping trim of {} candidates ({} dimensions): {}",
                    before,
                    self.dimensions,
                    e
                );
            }
        }
    }

    /// Collapse candidates for the same ordered pair, keeping the first
    fn dedup(&mut self) {
        let mut seen: HashSet<(ElementId, ElementId)> = HashSet::with_capacity(self.data.len());
        self.data.retain(|c| {
            seen.insert((c.payload.first.clone(), c.payload.second.clone()))
        });
    }
}

/// Marks the candidates on the first `layers` frontier layers and on the
/// Pareto front
fn peel_layers(
    data: &[ScoredCandidate],
    layers: usize,
    frontier: &dyn FrontierExtractor,
) -> Result<Vec<bool>, HullError> {
    let points: Vec<Vec<f64>> = data.iter().map(|c| c.errors.clone()).collect();
    let mut keep = vec![false; data.len()];
    for i in pareto_front(&points) {
        keep[i] = true;
    }
    let mut working: Vec<usize> = (0..data.len()).collect();

    for _ in 0..layers {
        if working.is_empty() {
            break;
        }
        let active = varying_dimensions(&points, &working);
        if active.len() < 2 || working.len() < active.len() + 2 {
            for &i in &working {
                keep[i] = true;
            }
            working.clear();
            break;
        }
        let projected: Vec<Vec<f64>> = working
            .iter()
            .map(|&i| active.iter().map(|&d| points[i][d]).collect())
            .collect();
        let layer = frontier.lower_frontier_indices(&projected)?;
        if layer.is_empty() {
            return Err(HullError::Degenerate("empty frontier layer".to_string()));
        }
        let mut on_layer = vec![false; working.len()];
        for local in layer {
            on_layer[local] = true;
            keep[working[local]] = true;
        }
        let mut position = 0;
        working.retain(|_| {
            let peeled = on_layer[position];
            position += 1;
            !peeled
        });
    }
    Ok(keep)
}
