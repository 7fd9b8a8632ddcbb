pub mod analyze;
pub mod export;
pub mod stats;
pub mod worker;

use crate::analysis::ViewRegistry;
use crate::graph::{BuiltGraph, GraphDocument, MODULE_DISTANCE_VIEW};
use crate::progress::ProgressManager;
use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use std::path::Path;

/// Build one stored view with its concrete graph type
pub(crate) fn load_view(data_dir: &Path, repo: &str, view: &str) -> Result<BuiltGraph> {
    if view == MODULE_DISTANCE_VIEW {
        bail!("'{}' is computed from element paths and has no stored graph", view);
    }
    let path = ViewRegistry::new(data_dir).graph_path(repo, view);
    let spinner = ProgressManager::global()
        .map(|m| m.create_spinner(&format!("Loading view '{}'", view)))
        .unwrap_or_else(ProgressBar::hidden);
    let document = GraphDocument::load(&path)
        .with_context(|| format!("Failed to load view '{}' from {}", view, path.display()))?;
    let graph = document.build(view)?;
    spinner.finish_and_clear();
    Ok(graph)
}
