//! Scoring one element pair against every pattern.

use super::filter::PairFilter;
use crate::core::{ElementId, Pattern};
use crate::graph::CouplingGraph;
use crate::results::{BoundedResultSet, CandidatePayload, ScoredCandidate};
use std::sync::Arc;

/// Score the pair `(a, b)` in both orders against every pattern.
///
/// Returns `None` for related pairs (equal, ancestor or descendant). Otherwise
/// the outer vector has one entry per pattern, holding zero to two
/// candidates. Patterns must already be truncated to `graphs.len()` slots.
pub fn analyze_pair(
    a: &ElementId,
    b: &ElementId,
    graphs: &[Arc<dyn CouplingGraph>],
    patterns: &[Pattern],
    min_support: f64,
) -> Option<Vec<Vec<ScoredCandidate>>> {
    if a.is_related_to(b) {
        return None;
    }

    let pair_support: Vec<f64> = graphs
        .iter()
        .map(|g| g.support(a.as_str()).min(g.support(b.as_str())))
        .collect();

    let mut results: Vec<Vec<ScoredCandidate>> = vec![Vec::new(); patterns.len()];
    for (first, second) in [(a, b), (b, a)] {
        let coupling: Vec<f64> = graphs
            .iter()
            .map(|g| g.coupling(first.as_str(), second.as_str()))
            .collect();

        for (pattern, out) in patterns.iter().zip(results.iter_mut()) {
            let mut errors = Vec::with_capacity(pattern.dimensions());
            let mut support: f64 = 1.0;
            for (view, target) in pattern.fixed_slots() {
                errors.push((target - coupling[view]).abs());
                support = support.min(pair_support[view]);
            }
            if support < min_support {
                continue;
            }
            errors.push(-support);
            out.push(ScoredCandidate::new(
                errors,
                CandidatePayload {
                    first: first.clone(),
                    second: second.clone(),
                    coupling: coupling.clone(),
                    support,
                },
            ));
        }
    }
    Some(results)
}

/// The graphs and patterns of one analysis, ready to score pairs
#[derive(Clone)]
pub struct PairAnalyzer {
    graphs: Vec<Arc<dyn CouplingGraph>>,
    patterns: Vec<Pattern>,
    min_support: f64,
    pair_filter: PairFilter,
}

impl PairAnalyzer {
    /// Patterns are cut down to one slot per graph
    pub fn new(graphs: Vec<Arc<dyn CouplingGraph>>, patterns: &[Pattern], min_support: f64) -> Self {
        let view_count = graphs.len();
        Self {
            patterns: patterns.iter().map(|p| p.truncated(view_count)).collect(),
            graphs,
            min_support,
            pair_filter: PairFilter::default(),
        }
    }

    pub fn with_pair_filter(mut self, pair_filter: PairFilter) -> Self {
        self.pair_filter = pair_filter;
        self
    }

    pub fn pair_filter(&self) -> &PairFilter {
        &self.pair_filter
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn graphs(&self) -> &[Arc<dyn CouplingGraph>] {
        &self.graphs
    }

    /// Empty result set per pattern
    pub fn empty_sets(&self, keep_size: usize, trim_factor: usize) -> Vec<BoundedResultSet> {
        self.patterns
            .iter()
            .map(|p| BoundedResultSet::new(p.dimensions(), keep_size).with_trim_factor(trim_factor))
            .collect()
    }

    /// Fill the support caches of every graph for `nodes`
    pub fn warm_up(&self, nodes: &[ElementId]) {
        for graph in &self.graphs {
            for node in nodes {
                graph.support(node.as_str());
            }
        }
    }

    /// Like [`analyze_pair`], also `None` for pairs the pair filter rejects
    pub fn analyze(&self, a: &ElementId, b: &ElementId) -> Option<Vec<Vec<ScoredCandidate>>> {
        if !self.pair_filter.admits(a, b) {
            return None;
        }
        analyze_pair(a, b, &self.graphs, &self.patterns, self.min_support)
    }

    /// Score the pair and append its candidates to `sets`
    pub fn analyze_into(&self, a: &ElementId, b: &ElementId, sets: &mut [BoundedResultSet]) {
        if let Some(results) = self.analyze(a, b) {
            for (set, candidates) in sets.iter_mut().zip(results) {
                set.add_all(candidates);
            }
        }
    }
}

impl std::fmt::Debug for PairAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairAnalyzer")
            .field(
                "graphs",
                &self.graphs.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field("patterns", &self.patterns)
            .field("min_support", &self.min_support)
            .field("pair_filter", &self.pair_filter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::HierarchicalCouplingGraph;

    fn graphs() -> Vec<Arc<dyn CouplingGraph>> {
        let mut references = HierarchicalCouplingGraph::new("references");
        references.add_and_support("p/A", "p/B", 1.0);
        references.add_support("p/C", 1.0);
        let mut evolutionary = HierarchicalCouplingGraph::new("evolutionary");
        evolutionary.add_and_support("p/B", "p/C", 1.0);
        evolutionary.add_support("p/A", 1.0);
        vec![Arc::new(references), Arc::new(evolutionary)]
    }

    #[test]
    fn test_related_pairs_are_skipped() {
        let patterns = vec!["1,0".parse::<Pattern>().unwrap()];
        let g = graphs();
        let parent = ElementId::from("p");
        let child = ElementId::from("p/A");
        assert!(analyze_pair(&parent, &child, &g, &patterns, 0.0).is_none());
        assert!(analyze_pair(&child, &parent, &g, &patterns, 0.0).is_none());
        assert!(analyze_pair(&child, &child, &g, &patterns, 0.0).is_none());
    }

    #[test]
    fn test_emits_both_orders() {
        let patterns = vec!["1,0".parse::<Pattern>().unwrap()];
        let results =
            analyze_pair(&"p/A".into(), &"p/B".into(), &graphs(), &patterns, 0.0).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].len(), 2);
        let forward = &results[0][0];
        assert_eq!(forward.payload.first.as_str(), "p/A");
        assert_eq!(forward.payload.coupling, vec![1.0, 0.0]);
        assert_eq!(forward.errors, vec![0.0, 0.0, -0.5]);
        assert_eq!(forward.payload.support, 0.5);
    }

    #[test]
    fn test_wildcards_skip_errors_and_support() {
        let patterns = vec!["1,*".parse::<Pattern>().unwrap()];
        let results =
            analyze_pair(&"p/A".into(), &"p/C".into(), &graphs(), &patterns, 0.0).unwrap();
        let candidate = &results[0][0];
        assert_eq!(candidate.errors.len(), 2);
        assert_eq!(candidate.errors[0], 1.0);
    }

    #[test]
    fn test_min_support_threshold() {
        let patterns = vec!["1,0".parse::<Pattern>().unwrap()];
        let results =
            analyze_pair(&"p/A".into(), &"p/B".into(), &graphs(), &patterns, 0.9).unwrap();
        assert!(results[0].is_empty());
    }

    #[test]
    fn test_analyzer_truncates_patterns() {
        let patterns = vec!["1,0,*,1".parse::<Pattern>().unwrap()];
        let analyzer = PairAnalyzer::new(graphs(), &patterns, 0.0);
        assert_eq!(analyzer.patterns()[0].len(), 2);
        let mut sets = analyzer.empty_sets(10, 10);
        analyzer.analyze_into(&"p/A".into(), &"p/B".into(), &mut sets);
        assert_eq!(sets[0].len(), 2);
        assert_eq!(sets[0].dimensions(), 3);
    }

    #[test]
    fn test_pair_filter_skips_close_pairs() {
        let patterns = vec!["1,0".parse::<Pattern>().unwrap()];
        let analyzer =
            PairAnalyzer::new(graphs(), &patterns, 0.0).with_pair_filter(PairFilter::min_module_distance(3));
        assert!(analyzer.analyze(&"p/A".into(), &"p/B".into()).is_none());
        let mut sets = analyzer.empty_sets(10, 10);
        analyzer.analyze_into(&"p/A".into(), &"p/B".into(), &mut sets);
        assert!(sets[0].is_empty());

        let open = analyzer.clone().with_pair_filter(PairFilter::min_module_distance(2));
        assert!(open.analyze(&"p/A".into(), &"p/B".into()).is_some());
    }
}
