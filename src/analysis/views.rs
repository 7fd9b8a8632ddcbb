use crate::errors::{Result, ResultExt};
use crate::graph::{
    CouplingGraph, GraphDocument, ModuleDistanceCouplingGraph, NeutralCouplingGraph,
    MODULE_DISTANCE_VIEW,
};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const DATA_DIR_ENV: &str = "COUPLINGMAP_DATA_DIR";

/// Resolves a view name to its coupling graph. Repeated calls for the same
/// `(repo, view)` return the same graph.
pub trait ViewProvider: Send + Sync {
    fn get(&self, repo: &str, view: &str) -> Result<Arc<dyn CouplingGraph>>;
}

/// Loads `<data_dir>/<repo>/<view>.json` documents and caches the graphs
pub struct ViewRegistry {
    data_dir: PathBuf,
    graphs: DashMap<(String, String), Arc<dyn CouplingGraph>>,
}

impl ViewRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            graphs: DashMap::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn graph_path(&self, repo: &str, view: &str) -> PathBuf {
        self.data_dir.join(repo).join(format!("{}.json", view))
    }

    /// Use an already built graph for `(repo, view)`
    pub fn register(&self, repo: &str, view: &str, graph: Arc<dyn CouplingGraph>) {
        self.graphs
            .insert((repo.to_string(), view.to_string()), graph);
    }

    fn build(&self, repo: &str, view: &str) -> Result<Arc<dyn CouplingGraph>> {
        if view == MODULE_DISTANCE_VIEW {
            return Ok(Arc::new(ModuleDistanceCouplingGraph::new()));
        }
        let path = self.graph_path(repo, view);
        if !path.exists() {
            log::warn!(
                "No data for view '{}' of {} at {:?}, using neutral coupling",
                view,
                repo,
                path
            );
            return Ok(Arc::new(NeutralCouplingGraph::new(view)));
        }
        let graph = GraphDocument::load(&path)?
            .build(view)
            .context(format!("Failed to build view '{}'", view))?;
        log::info!(
            "Loaded view '{}' of {} ({} nodes)",
            view,
            repo,
            graph.node_count()
        );
        Ok(graph.into_shared())
    }
}

impl std::fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("data_dir", &self.data_dir)
            .field("cached", &self.graphs.len())
            .finish()
    }
}

impl ViewProvider for ViewRegistry {
    fn get(&self, repo: &str, view: &str) -> Result<Arc<dyn CouplingGraph>> {
        let key = (repo.to_string(), view.to_string());
        if let Some(graph) = self.graphs.get(&key) {
            return Ok(Arc::clone(graph.value()));
        }
        let graph = self.build(repo, view)?;
        Ok(Arc::clone(self.graphs.entry(key).or_insert(graph).value()))
    }
}
