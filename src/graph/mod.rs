//! Coupling graphs: one normalized source of coupling measurements per view.
//!
//! Every implementation answers two questions in `[0, 1]`:
//! how much evidence backs a node (`support`) and how strongly one node is
//! coupled to another (`coupling`). Unknown nodes answer `0`. Coupling is
//! allowed to be asymmetric.

mod combined;
mod document;
mod hierarchical;
mod module_distance;
mod similarity;
mod support;

pub use combined::CombinedCouplingGraph;
pub use document::{
    BuiltGraph, EdgeRecord, GraphDocument, PostProcessing, SimilarityRecord, SpreadStep,
    SupportRecord,
};
pub use hierarchical::{GraphStatistics, HierarchicalCouplingGraph};
pub use module_distance::{ModuleDistanceCouplingGraph, MODULE_DISTANCE_VIEW};
pub use similarity::{jensen_shannon_distance, SimilarityCouplingGraph};
pub use support::{SupportCache, SupportScale};

use crate::core::ElementId;
use std::collections::HashSet;

pub trait CouplingGraph: Send + Sync {
    /// View name this graph was built for
    fn name(&self) -> &str;

    /// Known node universe, `None` when the graph is defined everywhere
    fn node_set(&self) -> Option<HashSet<ElementId>> {
        None
    }

    /// Normalized evidence for `node`, in `[0, 1]`
    fn support(&self, node: &str) -> f64;

    /// Normalized coupling from `a` to `b`, in `[0, 1]`
    fn coupling(&self, a: &str, b: &str) -> f64;
}

/// Stand-in for a view without data: no universe, zero everywhere
#[derive(Debug, Clone)]
pub struct NeutralCouplingGraph {
    name: String,
}

impl NeutralCouplingGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl CouplingGraph for NeutralCouplingGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn support(&self, _node: &str) -> f64 {
        0.0
    }

    fn coupling(&self, _a: &str, _b: &str) -> f64 {
        0.0
    }
}

/// Clamp into `[0, 1]`, mapping NaN to the neutral `0`
pub(crate) fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_graph_is_zero() {
        let g = NeutralCouplingGraph::new("missing");
        assert_eq!(g.name(), "missing");
        assert_eq!(g.support("a"), 0.0);
        assert_eq!(g.coupling("a", "b"), 0.0);
        assert!(g.node_set().is_none());
    }

    #[test]
    fn test_unit_clamps() {
        assert_eq!(unit(f64::NAN), 0.0);
        assert_eq!(unit(-0.5), 0.0);
        assert_eq!(unit(1.5), 1.0);
        assert_eq!(unit(0.25), 0.25);
    }
}
