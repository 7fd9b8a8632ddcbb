use crate::core::{module_distance, ElementId, ElementKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Granularity of the analyzed elements
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum NodeFilterMode {
    #[default]
    Methods,
    Classes,
    Files,
    Packages,
}

impl NodeFilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeFilterMode::Methods => "methods",
            NodeFilterMode::Classes => "classes",
            NodeFilterMode::Files => "files",
            NodeFilterMode::Packages => "packages",
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            NodeFilterMode::Methods => ElementKind::Method,
            NodeFilterMode::Classes => ElementKind::Class,
            NodeFilterMode::Files => ElementKind::File,
            NodeFilterMode::Packages => ElementKind::Package,
        }
    }
}

impl fmt::Display for NodeFilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Restricts the analyzed universe. Output must be deterministic for the
/// same input.
pub trait NodeFilter: Send + Sync {
    fn filter_nodes(&self, universe: &HashSet<ElementId>, mode: NodeFilterMode) -> Vec<ElementId>;
}

/// Keeps elements whose path classifies as the requested kind
#[derive(Debug, Clone, Copy, Default)]
pub struct PathKindFilter;

impl NodeFilter for PathKindFilter {
    fn filter_nodes(&self, universe: &HashSet<ElementId>, mode: NodeFilterMode) -> Vec<ElementId> {
        let wanted = mode.kind();
        let mut nodes: Vec<ElementId> = universe
            .iter()
            .filter(|node| ElementKind::classify(node.as_str()) == wanted)
            .cloned()
            .collect();
        nodes.sort();
        nodes
    }
}

/// Restricts which pairs of the universe are scored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairFilter {
    /// Pairs closer than this many tree edges are skipped
    #[serde(default)]
    pub min_module_distance: Option<usize>,
}

impl PairFilter {
    pub fn min_module_distance(distance: usize) -> Self {
        Self {
            min_module_distance: Some(distance),
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.min_module_distance.is_none()
    }

    pub fn admits(&self, a: &ElementId, b: &ElementId) -> bool {
        match self.min_module_distance {
            Some(min) => module_distance(a.as_str(), b.as_str()) >= min,
            None => true,
        }
    }

    /// Stable description for result keys, empty when unrestricted
    pub fn signature(&self) -> String {
        match self.min_module_distance {
            Some(min) => format!("module_distance>={}", min),
            None => String::new(),
        }
    }
}
