use super::{unit, CouplingGraph};
use crate::core::ElementId;
use crate::errors::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

/// Weighted average of several graphs, e.g. to blend two evolutionary views
/// computed over different time windows.
#[derive(Clone)]
pub struct CombinedCouplingGraph {
    name: String,
    graphs: Vec<Arc<dyn CouplingGraph>>,
    weights: Vec<f64>,
}

impl std::fmt::Debug for CombinedCouplingGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombinedCouplingGraph")
            .field("name", &self.name)
            .field(
                "graphs",
                &self.graphs.iter().map(|g| g.name()).collect::<Vec<_>>(),
            )
            .field("weights", &self.weights)
            .finish()
    }
}

impl CombinedCouplingGraph {
    /// Equal weights for every graph
    pub fn new(name: impl Into<String>, graphs: Vec<Arc<dyn CouplingGraph>>) -> Result<Self> {
        let weights = vec![1.0; graphs.len()];
        Self::with_weights(name, graphs, weights)
    }

    pub fn with_weights(
        name: impl Into<String>,
        graphs: Vec<Arc<dyn CouplingGraph>>,
        weights: Vec<f64>,
    ) -> Result<Self> {
        let mut combined = Self {
            name: name.into(),
            graphs,
            weights: Vec::new(),
        };
        combined.set_weights(weights)?;
        Ok(combined)
    }

    /// Weights are normalized to sum one
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<()> {
        if self.graphs.is_empty() {
            return Err(Error::Graph(format!(
                "combined graph '{}' needs at least one graph",
                self.name
            )));
        }
        if weights.len() != self.graphs.len() {
            return Err(Error::Graph(format!(
                "combined graph '{}' has {} graphs but {} weights",
                self.name,
                self.graphs.len(),
                weights.len()
            )));
        }
        let total: f64 = weights.iter().sum();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || total <= 0.0 {
            return Err(Error::Graph(format!(
                "combined graph '{}' has invalid weights {:?}",
                self.name, weights
            )));
        }
        self.weights = weights.into_iter().map(|w| w / total).collect();
        Ok(())
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn weighted(&self, value: impl Fn(&dyn CouplingGraph) -> f64) -> f64 {
        let sum = self
            .graphs
            .iter()
            .zip(&self.weights)
            .map(|(g, w)| w * value(g.as_ref()))
            .sum();
        unit(sum)
    }
}

impl CouplingGraph for CombinedCouplingGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn node_set(&self) -> Option<HashSet<ElementId>> {
        let mut universe: Option<HashSet<ElementId>> = None;
        for set in self.graphs.iter().filter_map(|g| g.node_set()) {
            universe.get_or_insert_with(HashSet::new).extend(set);
        }
        universe
    }

    fn support(&self, node: &str) -> f64 {
        self.weighted(|g| g.support(node))
    }

    fn coupling(&self, a: &str, b: &str) -> f64 {
        self.weighted(|g| g.coupling(a, b))
    }
}
