//! On-disk form of a view's graph, as produced by the view collaborators.
//!
//! ```json
//! { "kind": "explicit",
//!   "edges": [{ "a": "p/A.java/A/m", "b": "p/B.java/B/n", "weight": 2.0 }],
//!   "supports": [{ "node": "p/A.java/A/m", "support": 2.0 }] }
//! ```

use super::{CouplingGraph, HierarchicalCouplingGraph, SimilarityCouplingGraph};
use crate::errors::{Error, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub a: String,
    pub b: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportRecord {
    pub node: String,
    pub support: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityRecord {
    pub node: String,
    pub coordinates: Vec<f64>,
    #[serde(default)]
    pub support: f64,
}

/// Maintenance steps applied after loading an explicit graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessing {
    /// Edges lighter than this are dropped
    pub cutoff: Option<f64>,
    /// Nodes in smaller connected components are dropped
    pub min_component_size: Option<usize>,
    pub propagate_down: Option<SpreadStep>,
    pub dilate: Option<SpreadStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpreadStep {
    pub iterations: usize,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphDocument {
    Explicit {
        #[serde(default)]
        edges: Vec<EdgeRecord>,
        #[serde(default)]
        supports: Vec<SupportRecord>,
        #[serde(default)]
        post_processing: PostProcessing,
    },
    Similarity {
        nodes: Vec<SimilarityRecord>,
    },
}

/// A graph built from a document, keeping its concrete type
#[derive(Debug, Clone)]
pub enum BuiltGraph {
    Explicit(HierarchicalCouplingGraph),
    Similarity(SimilarityCouplingGraph),
}

impl BuiltGraph {
    pub fn into_shared(self) -> Arc<dyn CouplingGraph> {
        match self {
            BuiltGraph::Explicit(g) => Arc::new(g),
            BuiltGraph::Similarity(g) => Arc::new(g),
        }
    }

    pub fn plaintext(&self) -> String {
        match self {
            BuiltGraph::Explicit(g) => g.plaintext(),
            BuiltGraph::Similarity(g) => g.plaintext(),
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            BuiltGraph::Explicit(g) => g.node_count(),
            BuiltGraph::Similarity(g) => g.node_count(),
        }
    }
}

impl GraphDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(Error::from)
            .context(format!("Failed to read graph {}", path.display()))?;
        let document = serde_json::from_str(&content)
            .map_err(Error::from)
            .context(format!("Failed to parse graph {}", path.display()))?;
        Ok(document)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn build(&self, name: &str) -> Result<BuiltGraph> {
        match self {
            GraphDocument::Explicit {
                edges,
                supports,
                post_processing,
            } => {
                let mut graph = HierarchicalCouplingGraph::new(name);
                for edge in edges {
                    if !edge.weight.is_finite() {
                        return Err(Error::Graph(format!(
                            "{}: edge {} - {} has weight {}",
                            name, edge.a, edge.b, edge.weight
                        )));
                    }
                    graph.add(&edge.a, &edge.b, edge.weight);
                }
                for record in supports {
                    graph.add_support(&record.node, record.support);
                }
                if let Some(cutoff) = post_processing.cutoff {
                    graph.cutoff_edges(cutoff);
                }
                if let Some(size) = post_processing.min_component_size {
                    graph.cleanup(size);
                }
                if let Some(step) = post_processing.propagate_down {
                    graph.propagate_down(step.iterations, step.factor);
                }
                if let Some(step) = post_processing.dilate {
                    graph.dilate(step.iterations, step.factor);
                }
                Ok(BuiltGraph::Explicit(graph))
            }
            GraphDocument::Similarity { nodes } => {
                let dimensions = nodes.first().map_or(0, |n| n.coordinates.len());
                let mut graph = SimilarityCouplingGraph::new(name);
                for record in nodes {
                    if record.coordinates.len() != dimensions {
                        return Err(Error::Graph(format!(
                            "{}: node {} has {} coordinates, expected {}",
                            name,
                            record.node,
                            record.coordinates.len(),
                            dimensions
                        )));
                    }
                    graph.add_node(&record.node, record.coordinates.clone(), record.support);
                }
                Ok(BuiltGraph::Similarity(graph))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_explicit_document() {
        let json = r#"{
            "kind": "explicit",
            "edges": [{"a": "x/A", "b": "x/B", "weight": 2.0}],
            "supports": [{"node": "x/A", "support": 2.0}, {"node": "x/B", "support": 1.0}]
        }"#;
        let doc: GraphDocument = serde_json::from_str(json).unwrap();
        let graph = doc.build("references").unwrap();
        assert_eq!(graph.node_count(), 2);
        let shared = graph.into_shared();
        assert_eq!(shared.coupling("x/A", "x/B"), 1.0);
        assert_eq!(shared.name(), "references");
    }

    #[test]
    fn test_similarity_dimension_mismatch() {
        let doc = GraphDocument::Similarity {
            nodes: vec![
                SimilarityRecord {
                    node: "a".into(),
                    coordinates: vec![1.0, 0.0],
                    support: 1.0,
                },
                SimilarityRecord {
                    node: "b".into(),
                    coordinates: vec![1.0],
                    support: 1.0,
                },
            ],
        };
        assert!(matches!(doc.build("linguistic"), Err(Error::Graph(_))));
    }

    #[test]
    fn test_post_processing_applied() {
        let doc = GraphDocument::Explicit {
            edges: vec![
                EdgeRecord { a: "a".into(), b: "b".into(), weight: 0.5 },
                EdgeRecord { a: "a".into(), b: "c".into(), weight: 3.0 },
            ],
            supports: vec![],
            post_processing: PostProcessing {
                cutoff: Some(1.0),
                ..Default::default()
            },
        };
        match doc.build("evolutionary").unwrap() {
            BuiltGraph::Explicit(g) => assert_eq!(g.edge_count(), 1),
            other => panic!("unexpected graph {:?}", other),
        }
    }

    #[test]
    fn test_cleanup_applied_after_cutoff() {
        let doc = GraphDocument::Explicit {
            edges: vec![
                EdgeRecord { a: "a".into(), b: "b".into(), weight: 0.5 },
                EdgeRecord { a: "a".into(), b: "c".into(), weight: 3.0 },
                EdgeRecord { a: "c".into(), b: "d".into(), weight: 3.0 },
            ],
            supports: vec![],
            post_processing: PostProcessing {
                cutoff: Some(1.0),
                min_component_size: Some(2),
                ..Default::default()
            },
        };
        match doc.build("evolutionary").unwrap() {
            BuiltGraph::Explicit(g) => {
                assert_eq!(g.node_count(), 3);
                assert_eq!(g.self_support("b"), 0.0);
                assert!(!g.contains("b"));
            }
            other => panic!("unexpected graph {:?}", other),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("repo").join("references.json");
        let doc = GraphDocument::Explicit {
            edges: vec![EdgeRecord { a: "a".into(), b: "b".into(), weight: 1.0 }],
            supports: vec![SupportRecord { node: "a".into(), support: 1.0 }],
            post_processing: PostProcessing::default(),
        };
        doc.save(&path).unwrap();
        assert_eq!(GraphDocument::load(&path).unwrap(), doc);
    }
}
