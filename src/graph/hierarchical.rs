//! Edge-weighted coupling graph with containment-aware aggregation.
//!
//! Raw coupling is only stored on direct edges (a method referencing
//! another method, two files changed in the same commit). Coupling between
//! arbitrary elements is rolled up over their subtrees: the relative
//! coupling of `a` and `b` sums every edge between `self-and-descendants(a)`
//! and `self-and-descendants(b)`, and normalized coupling divides that by
//! the total coupling mass of `a`. The result is asymmetric on purpose.

use super::support::{SupportCache, SupportScale};
use super::{unit, CouplingGraph};
use crate::core::element::{is_ancestor, parent_path};
use crate::core::ElementId;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use petgraph::unionfind::UnionFind;
use std::collections::{BTreeSet, HashMap, HashSet};

type ChildIndex = HashMap<String, BTreeSet<String>>;

#[derive(Debug, Clone)]
pub struct HierarchicalCouplingGraph {
    name: String,
    /// Node universe with each node's own raw support
    nodes: HashMap<String, f64>,
    /// Symmetric adjacency, no self loops, no zero weights
    adjacency: HashMap<String, HashMap<String, f64>>,
    children: OnceCell<ChildIndex>,
    subtree_support: DashMap<String, f64>,
    total_mass: DashMap<String, f64>,
    support_scale: SupportCache,
}

/// Summary numbers for a graph, as printed by `couplingmap stats`
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GraphStatistics {
    pub nodes: usize,
    pub edges: usize,
    pub components: usize,
    pub largest_components: Vec<usize>,
    pub min_weight: f64,
    pub max_weight: f64,
    pub mean_weight: f64,
    pub min_support: f64,
    pub max_support: f64,
    pub mean_support: f64,
}

impl HierarchicalCouplingGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            adjacency: HashMap::new(),
            children: OnceCell::new(),
            subtree_support: DashMap::new(),
            total_mass: DashMap::new(),
            support_scale: SupportCache::default(),
        }
    }

    /// Add `delta` to the undirected edge `a - b`. Self edges are ignored.
    pub fn add(&mut self, a: &str, b: &str, delta: f64) {
        if a == b || !delta.is_finite() {
            return;
        }
        let weight = self.get(a, b) + delta;
        if weight <= 0.0 {
            self.remove_edge(a, b);
        } else {
            self.ensure_node(a);
            self.ensure_node(b);
            self.adjacency
                .entry(a.to_string())
                .or_default()
                .insert(b.to_string(), weight);
            self.adjacency
                .entry(b.to_string())
                .or_default()
                .insert(a.to_string(), weight);
        }
        self.invalidate();
    }

    pub fn add_support(&mut self, node: &str, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        *self.nodes.entry(node.to_string()).or_insert(0.0) += delta;
        self.invalidate();
    }

    pub fn add_and_support(&mut self, a: &str, b: &str, delta: f64) {
        self.add(a, b, delta);
        self.add_support(a, delta);
        self.add_support(b, delta);
    }

    /// Raw weight of the direct edge `a - b`
    pub fn get(&self, a: &str, b: &str) -> f64 {
        self.adjacency
            .get(a)
            .and_then(|n| n.get(b))
            .copied()
            .unwrap_or(0.0)
    }

    /// Raw support of the node itself, without descendants
    pub fn self_support(&self, node: &str) -> f64 {
        self.nodes.get(node).copied().unwrap_or(0.0)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(HashMap::len).sum::<usize>() / 2
    }

    /// Direct edge targets of `node`
    pub fn neighbors(&self, node: &str) -> impl Iterator<Item = (&str, f64)> {
        self.adjacency
            .get(node)
            .into_iter()
            .flat_map(|n| n.iter().map(|(k, w)| (k.as_str(), *w)))
    }

    /// Drop every edge lighter than `minimum_weight`
    pub fn cutoff_edges(&mut self, minimum_weight: f64) {
        for neighbors in self.adjacency.values_mut() {
            neighbors.retain(|_, w| *w >= minimum_weight);
        }
        self.adjacency.retain(|_, n| !n.is_empty());
        self.invalidate();
    }

    /// Copy each node's outside connections, scaled by `weight_factor`, to
    /// pairs of (own child, child of the connected node).
    pub fn propagate_down(&mut self, layers: usize, weight_factor: f64) {
        let children = self.direct_children_in_universe();
        let mut parents: Vec<&String> = children.keys().collect();
        parents.sort_by_key(|p| std::cmp::Reverse(p.matches('/').count()));

        for layer in 0..layers {
            let mut changes = Vec::new();
            for node in &parents {
                let connections: Vec<(&str, f64)> = self
                    .neighbors(node)
                    .filter(|(conn, _)| !is_ancestor(node, conn))
                    .map(|(conn, w)| (conn, w * weight_factor))
                    .collect();
                for child in &children[*node] {
                    for (conn, value) in &connections {
                        for conn_child in children.get(*conn).into_iter().flatten() {
                            changes.push((child.clone(), conn_child.clone(), *value));
                        }
                    }
                }
            }
            log::debug!(
                "{}: propagating down, layer {}/{}, {} changes",
                self.name,
                layer + 1,
                layers,
                changes.len()
            );
            for (a, b, delta) in changes {
                self.add(&a, &b, delta);
            }
        }
    }

    /// Connect every two neighbours of a node with the smaller of their
    /// scaled weights.
    pub fn dilate(&mut self, iterations: usize, weight_factor: f64) {
        let mut all_nodes: Vec<String> = self.nodes.keys().cloned().collect();
        all_nodes.sort();
        for iteration in 0..iterations {
            let mut changes = Vec::new();
            for node in &all_nodes {
                let connections: Vec<(&str, f64)> = self
                    .neighbors(node)
                    .filter(|(conn, _)| !is_ancestor(node, conn) && !is_ancestor(conn, node))
                    .map(|(conn, w)| (conn, w * weight_factor))
                    .collect();
                for i in 0..connections.len() {
                    for j in 0..i {
                        let (c1, w1) = connections[j];
                        let (c2, w2) = connections[i];
                        changes.push((c1.to_string(), c2.to_string(), w1.min(w2)));
                    }
                }
            }
            log::debug!(
                "{}: dilating, iteration {}/{}, {} changes",
                self.name,
                iteration + 1,
                iterations,
                changes.len()
            );
            for (a, b, delta) in changes {
                self.add(&a, &b, delta);
            }
        }
    }

    /// The node and all its descendants (including intermediate path
    /// prefixes that are not part of the universe themselves)
    pub fn self_and_descendants<'a>(&'a self, node: &'a str) -> Vec<&'a str> {
        let children = self.child_index();
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some((key, kids)) = children.get_key_value(current) {
                result.push(key.as_str());
                stack.extend(kids.iter().map(String::as_str));
            } else if current == node {
                result.push(current);
            }
        }
        result
    }

    /// Nodes `node` could have non-zero relative coupling with: the direct
    /// targets of its subtree, optionally with all their ancestors.
    pub fn coupling_candidates(&self, node: &str, include_ancestors: bool) -> HashSet<&str> {
        let mut result = HashSet::new();
        for member in self.self_and_descendants(node) {
            for (target, _) in self.neighbors(member) {
                let mut current = Some(target);
                while let Some(path) = current {
                    if !result.insert(path) || !include_ancestors {
                        break;
                    }
                    current = parent_path(path);
                }
            }
        }
        result
    }

    /// Sum of direct edge weights between the two subtrees
    pub fn relative_coupling(&self, a: &str, b: &str) -> f64 {
        let targets: HashSet<&str> = self.self_and_descendants(b).into_iter().collect();
        self.direct_coupling_into(a, &targets)
    }

    /// Sum of every direct edge weight leaving the subtree of `a`, memoized.
    ///
    /// Ancestors of edge targets never carry direct edges of their own unless
    /// they are targets already, so this equals the relative coupling of `a`
    /// to its full candidate set.
    pub fn total_mass(&self, a: &str) -> f64 {
        if let Some(mass) = self.total_mass.get(a) {
            return *mass;
        }
        let candidates = self.coupling_candidates(a, false);
        let mass = self.direct_coupling_into(a, &candidates);
        self.total_mass.insert(a.to_string(), mass);
        mass
    }

    /// Raw support of the node plus all its descendants, memoized
    pub fn subtree_support(&self, node: &str) -> f64 {
        if let Some(value) = self.subtree_support.get(node) {
            return *value;
        }
        let value = self
            .self_and_descendants(node)
            .into_iter()
            .map(|n| self.self_support(n))
            .sum();
        self.subtree_support.insert(node.to_string(), value);
        value
    }

    pub fn support_scale(&self) -> SupportScale {
        self.support_scale.get_or_init(|| {
            SupportScale::from_raw(self.nodes.keys().map(|n| self.subtree_support(n)))
        })
    }

    /// Known nodes and every path prefix above them
    /// Remove every node whose connected component has fewer than
    /// `min_component_size` members, together with its edges and support.
    /// Returns the number of removed nodes.
    pub fn cleanup(&mut self, min_component_size: usize) -> usize {
        let names: Vec<String> = self.nodes.keys().cloned().collect();
        let index: HashMap<&str, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        let mut components = UnionFind::<usize>::new(names.len());
        for (a, neighbors) in &self.adjacency {
            for b in neighbors.keys() {
                if let (Some(&x), Some(&y)) = (index.get(a.as_str()), index.get(b.as_str())) {
                    components.union(x, y);
                }
            }
        }
        let labels = components.into_labeling();
        let mut sizes: HashMap<usize, usize> = HashMap::new();
        for &label in &labels {
            *sizes.entry(label).or_insert(0) += 1;
        }
        let removed: HashSet<String> = names
            .iter()
            .zip(&labels)
            .filter(|(_, label)| sizes[*label] < min_component_size)
            .map(|(name, _)| name.clone())
            .collect();
        if removed.is_empty() {
            return 0;
        }

        // components are closed, so no kept node has an edge into `removed`
        self.nodes.retain(|node, _| !removed.contains(node));
        self.adjacency.retain(|node, _| !removed.contains(node));
        self.invalidate();
        log::debug!(
            "{}: removed {} nodes in components smaller than {}",
            self.name,
            removed.len(),
            min_component_size
        );
        removed.len()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.child_index().contains_key(node)
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(self.nodes.len());
        for (i, node) in self.nodes.keys().enumerate() {
            index.insert(node.as_str(), i);
        }
        let mut components = UnionFind::<usize>::new(self.nodes.len());
        let mut weights = Vec::new();
        for (a, neighbors) in &self.adjacency {
            for (b, w) in neighbors {
                if a < b {
                    components.union(index[a.as_str()], index[b.as_str()]);
                    weights.push(*w);
                }
            }
        }
        let mut sizes: HashMap<usize, usize> = HashMap::new();
        for label in components.into_labeling() {
            *sizes.entry(label).or_insert(0) += 1;
        }
        let mut sizes: Vec<usize> = sizes.into_values().collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        let component_count = sizes.len();
        sizes.truncate(20);

        let supports: Vec<f64> = self.nodes.values().copied().collect();
        let (min_weight, max_weight, mean_weight) = min_max_mean(&weights);
        let (min_support, max_support, mean_support) = min_max_mean(&supports);
        GraphStatistics {
            nodes: self.nodes.len(),
            edges: weights.len(),
            components: component_count,
            largest_components: sizes,
            min_weight,
            max_weight,
            mean_weight,
            min_support,
            max_support,
            mean_support,
        }
    }

    /// Two lines: `;`-joined node list, then `;`-joined `i,j,weight` edges
    pub fn plaintext(&self) -> String {
        let mut nodes: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        nodes.sort_unstable();
        let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, n)| (*n, i)).collect();
        let mut edges: Vec<(usize, usize, f64)> = self
            .adjacency
            .iter()
            .flat_map(|(a, n)| n.iter().map(move |(b, w)| (a, b, *w)))
            .filter(|(a, b, _)| a < b)
            .map(|(a, b, w)| (index[a.as_str()], index[b.as_str()], w))
            .collect();
        edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
        let edge_line = edges
            .iter()
            .map(|(a, b, w)| format!("{},{},{}", a, b, w))
            .collect::<Vec<_>>()
            .join(";");
        format!("{}\n{}", nodes.join(";"), edge_line)
    }

    fn direct_coupling_into(&self, a: &str, targets: &HashSet<&str>) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        self.self_and_descendants(a)
            .into_iter()
            .flat_map(|member| self.neighbors(member))
            .filter(|(target, _)| targets.contains(target))
            .map(|(_, w)| w)
            .sum()
    }

    fn ensure_node(&mut self, node: &str) {
        self.nodes.entry(node.to_string()).or_insert(0.0);
    }

    fn remove_edge(&mut self, a: &str, b: &str) {
        for (x, y) in [(a, b), (b, a)] {
            if let Some(neighbors) = self.adjacency.get_mut(x) {
                neighbors.remove(y);
                if neighbors.is_empty() {
                    self.adjacency.remove(x);
                }
            }
        }
    }

    fn invalidate(&mut self) {
        self.children = OnceCell::new();
        self.subtree_support.clear();
        self.total_mass.clear();
        self.support_scale.invalidate();
    }

    fn child_index(&self) -> &ChildIndex {
        self.children.get_or_init(|| {
            let mut index: ChildIndex = HashMap::new();
            for node in self.nodes.keys() {
                index.entry(node.clone()).or_default();
                let mut current = node.as_str();
                while let Some(parent) = parent_path(current) {
                    let registered = index
                        .entry(parent.to_string())
                        .or_default()
                        .insert(current.to_string());
                    if !registered {
                        break;
                    }
                    current = parent;
                }
            }
            index
        })
    }

    /// Children restricted to the node universe (used by propagation)
    fn direct_children_in_universe(&self) -> HashMap<String, Vec<String>> {
        let mut result: HashMap<String, Vec<String>> = HashMap::new();
        for node in self.nodes.keys() {
            if let Some(parent) = parent_path(node) {
                if self.nodes.contains_key(parent) {
                    result.entry(parent.to_string()).or_default().push(node.clone());
                }
            }
        }
        for kids in result.values_mut() {
            kids.sort();
        }
        result
    }
}

fn min_max_mean(values: &[f64]) -> (f64, f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (min, max, mean)
}

impl CouplingGraph for HierarchicalCouplingGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_set(&self) -> Option<HashSet<ElementId>> {
        Some(self.nodes.keys().map(|n| ElementId::new(n.clone())).collect())
    }

    fn support(&self, node: &str) -> f64 {
        if !self.contains(node) {
            return 0.0;
        }
        self.support_scale().normalize(self.subtree_support(node))
    }

    fn coupling(&self, a: &str, b: &str) -> f64 {
        if !self.contains(a) || !self.contains(b) {
            return 0.0;
        }
        let relative = self.relative_coupling(a, b);
        if relative <= 0.0 {
            return 0.0;
        }
        let mass = self.total_mass(a);
        if mass <= 0.0 {
            return 0.0;
        }
        unit(relative / mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> HierarchicalCouplingGraph {
        let mut g = HierarchicalCouplingGraph::new("references");
        g.add_and_support("p/A.java/A/m1", "p/B.java/B/m1", 2.0);
        g.add_and_support("p/A.java/A/m2", "p/B.java/B/m1", 1.0);
        g.add_and_support("p/A.java/A/m1", "p/C.java/C/m1", 1.0);
        g.add_and_support("p/B.java/B/m1", "p/C.java/C/m1", 4.0);
        g
    }

    #[test]
    fn test_self_edges_ignored() {
        let mut g = HierarchicalCouplingGraph::new("x");
        g.add("a", "a", 3.0);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.node_count(), 0);
    }

    #[test]
    fn test_zero_weight_edges_are_absent() {
        let mut g = HierarchicalCouplingGraph::new("x");
        g.add("a", "b", 1.0);
        g.add("a", "b", -1.0);
        assert_eq!(g.edge_count(), 0);
        assert_eq!(g.get("a", "b"), 0.0);
        assert_eq!(g.coupling("a", "b"), 0.0);
    }

    #[test]
    fn test_rolls_up_over_descendants() {
        let g = sample();
        assert_eq!(g.relative_coupling("p/A.java/A", "p/B.java/B"), 3.0);
        assert_eq!(g.relative_coupling("p/A.java", "p/B.java/B/m1"), 3.0);
        // subtree of A: m1 -> B.m1 (2) + C.m1 (1), m2 -> B.m1 (1)
        assert_eq!(g.total_mass("p/A.java/A"), 4.0);
        assert_eq!(g.coupling("p/A.java/A", "p/B.java/B"), 0.75);
    }

    #[test]
    fn test_asymmetry_and_exact_normalization() {
        let mut g = HierarchicalCouplingGraph::new("x");
        g.add("a", "b", 1.0);
        for i in 0..9 {
            g.add("a", &format!("other{}", i), 1.0);
        }
        let ab = g.coupling("a", "b");
        let ba = g.coupling("b", "a");
        assert_ne!(ab, ba);
        assert_eq!(ab, g.relative_coupling("a", "b") / g.total_mass("a"));
        assert_eq!(ab, 0.1);
        assert_eq!(ba, 1.0);
    }

    #[test]
    fn test_unknown_nodes_are_neutral() {
        let g = sample();
        assert_eq!(g.coupling("nope", "p/A.java/A/m1"), 0.0);
        assert_eq!(g.coupling("p/A.java/A/m1", "nope"), 0.0);
        assert_eq!(g.support("nope"), 0.0);
    }

    #[test]
    fn test_intermediate_paths_are_known() {
        let g = sample();
        assert!(g.contains("p/A.java"));
        assert!(g.contains("p"));
        assert!(g.support("p/A.java/A") > 0.0);
    }

    #[test]
    fn test_candidates_with_ancestors() {
        let g = sample();
        let direct = g.coupling_candidates("p/A.java/A/m2", false);
        assert_eq!(direct, HashSet::from(["p/B.java/B/m1"]));
        let full = g.coupling_candidates("p/A.java/A/m2", true);
        assert!(full.contains("p/B.java/B"));
        assert!(full.contains("p/B.java"));
        assert!(full.contains("p"));
    }

    #[test]
    fn test_caches_invalidate_on_mutation() {
        let mut g = sample();
        let before = g.total_mass("p/A.java/A");
        g.add("p/A.java/A/m2", "p/C.java/C/m1", 6.0);
        assert_eq!(g.total_mass("p/A.java/A"), before + 6.0);
    }

    #[test]
    fn test_cutoff_edges() {
        let mut g = sample();
        g.cutoff_edges(2.0);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.get("p/A.java/A/m2", "p/B.java/B/m1"), 0.0);
    }

    #[test]
    fn test_self_and_descendants() {
        let g = sample();
        let query = String::from("q/Unknown.java");
        assert_eq!(g.self_and_descendants(&query), vec!["q/Unknown.java"]);
        let mut members = g.self_and_descendants("p/A.java");
        members.sort_unstable();
        assert_eq!(
            members,
            vec!["p/A.java", "p/A.java/A", "p/A.java/A/m1", "p/A.java/A/m2"]
        );
    }

    #[test]
    fn test_cleanup_drops_small_components() {
        let mut g = sample();
        g.add("x/Y.java", "x/Z.java", 1.0);
        g.add_support("lonely/L.java", 3.0);
        assert_eq!(g.cleanup(3), 3);
        assert_eq!(g.node_count(), 4);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.self_support("lonely/L.java"), 0.0);
        assert_eq!(g.get("x/Y.java", "x/Z.java"), 0.0);
        assert!(!g.contains("x/Y.java"));
        assert_eq!(g.cleanup(3), 0);
    }

    #[test]
    fn test_propagate_down_connects_children() {
        let mut g = HierarchicalCouplingGraph::new("x");
        g.add_support("a", 1.0);
        g.add_support("a/x", 1.0);
        g.add_support("b/y", 1.0);
        g.add("a", "b", 1.0);
        g.add_support("b", 1.0);
        g.propagate_down(1, 0.5);
        // once from each side of the a - b edge
        assert_eq!(g.get("a/x", "b/y"), 1.0);
    }

    #[test]
    fn test_dilate_links_neighbours() {
        let mut g = HierarchicalCouplingGraph::new("x");
        g.add("hub", "left", 1.0);
        g.add("hub", "right", 0.5);
        g.dilate(1, 0.8);
        assert!((g.get("left", "right") - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_statistics_and_plaintext() {
        let mut g = sample();
        g.add("x/Y.java", "x/Z.java", 1.0);
        let stats = g.statistics();
        assert_eq!(stats.nodes, 6);
        assert_eq!(stats.edges, 5);
        assert_eq!(stats.components, 2);
        assert_eq!(stats.largest_components, vec![4, 2]);
        assert_eq!(stats.max_weight, 4.0);

        let text = g.plaintext();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap().split(';').count(), 6);
        assert_eq!(lines.next().unwrap().split(';').count(), 5);
    }

    proptest! {
        #[test]
        fn prop_values_in_unit_range(
            edges in prop::collection::vec((0usize..8, 0usize..8, 0.01f64..10.0), 1..40),
            a in 0usize..8,
            b in 0usize..8,
        ) {
            let name = |i: usize| format!("m/{}/f{}", i % 3, i);
            let mut g = HierarchicalCouplingGraph::new("p");
            for (x, y, w) in &edges {
                g.add_and_support(&name(*x), &name(*y), *w);
            }
            for node in [name(a), name(b), "m".to_string(), format!("m/{}", a % 3)] {
                let s = g.support(&node);
                prop_assert!((0.0..=1.0).contains(&s));
            }
            let c = g.coupling(&name(a), &name(b));
            prop_assert!((0.0..=1.0).contains(&c));
            let c = g.coupling(&format!("m/{}", a % 3), &name(b));
            prop_assert!((0.0..=1.0).contains(&c));
        }
    }
}
