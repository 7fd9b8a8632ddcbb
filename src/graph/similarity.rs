//! Coordinate based coupling (e.g. topic distributions per element).

use super::support::{SupportCache, SupportScale};
use super::{unit, CouplingGraph};
use crate::core::ElementId;
use std::collections::{HashMap, HashSet};

/// Sharpens the similarity so that only close distributions score high
const SIMILARITY_EXPONENT: i32 = 8;

#[derive(Debug, Clone)]
pub struct SimilarityCouplingGraph {
    name: String,
    coordinates: HashMap<String, Vec<f64>>,
    supports: HashMap<String, f64>,
    support_scale: SupportCache,
}

impl SimilarityCouplingGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: HashMap::new(),
            supports: HashMap::new(),
            support_scale: SupportCache::default(),
        }
    }

    pub fn add_node(&mut self, node: &str, coordinates: Vec<f64>, support: f64) {
        self.coordinates.insert(node.to_string(), coordinates);
        self.supports.insert(node.to_string(), support);
        self.support_scale.invalidate();
    }

    pub fn node_count(&self) -> usize {
        self.coordinates.len()
    }

    pub fn coordinates(&self, node: &str) -> Option<&[f64]> {
        self.coordinates.get(node).map(Vec::as_slice)
    }

    pub fn raw_support(&self, node: &str) -> f64 {
        self.supports.get(node).copied().unwrap_or(0.0)
    }

    pub fn support_scale(&self) -> SupportScale {
        self.support_scale
            .get_or_init(|| SupportScale::from_raw(self.supports.values().copied()))
    }

    /// Per-dimension minimum and maximum over all nodes
    pub fn coordinate_bounds(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        let mut iter = self.coordinates.values();
        let first = iter.next()?;
        let mut lower = first.clone();
        let mut upper = first.clone();
        for coords in iter {
            for (d, value) in coords.iter().enumerate().take(lower.len()) {
                lower[d] = lower[d].min(*value);
                upper[d] = upper[d].max(*value);
            }
        }
        Some((lower, upper))
    }

    /// One `node,support,c0,c1,...` line per node, sorted by node
    pub fn plaintext(&self) -> String {
        let mut nodes: Vec<&String> = self.coordinates.keys().collect();
        nodes.sort();
        nodes
            .into_iter()
            .map(|node| {
                let mut fields = vec![node.clone(), self.raw_support(node).to_string()];
                fields.extend(self.coordinates[node].iter().map(f64::to_string));
                fields.join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Jensen-Shannon distance (base 2, so within `[0, 1]`) of two
/// non-negative vectors, each normalized to sum one first.
pub fn jensen_shannon_distance(p: &[f64], q: &[f64]) -> Option<f64> {
    if p.len() != q.len() || p.is_empty() {
        return None;
    }
    let p_sum: f64 = p.iter().sum();
    let q_sum: f64 = q.iter().sum();
    if p_sum <= 0.0 || q_sum <= 0.0 || !p_sum.is_finite() || !q_sum.is_finite() {
        return None;
    }
    let mut divergence = 0.0;
    for (&pi, &qi) in p.iter().zip(q) {
        let pi = pi / p_sum;
        let qi = qi / q_sum;
        let mi = 0.5 * (pi + qi);
        if pi > 0.0 {
            divergence += 0.5 * pi * (pi / mi).log2();
        }
        if qi > 0.0 {
            divergence += 0.5 * qi * (qi / mi).log2();
        }
    }
    let distance = divergence.max(0.0).sqrt();
    distance.is_finite().then_some(distance)
}

impl CouplingGraph for SimilarityCouplingGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_set(&self) -> Option<HashSet<ElementId>> {
        Some(self.coordinates.keys().map(|n| ElementId::new(n.clone())).collect())
    }

    fn support(&self, node: &str) -> f64 {
        if !self.coordinates.contains_key(node) {
            return 0.0;
        }
        self.support_scale().normalize(self.raw_support(node))
    }

    fn coupling(&self, a: &str, b: &str) -> f64 {
        let (Some(pa), Some(pb)) = (self.coordinates.get(a), self.coordinates.get(b)) else {
            return 0.0;
        };
        match jensen_shannon_distance(pa, pb) {
            Some(distance) => unit((1.0 - distance).powi(SIMILARITY_EXPONENT)),
            None => 0.0,
        }
    }
}
