use super::load_view;
use anyhow::{Context, Result};
use std::path::Path;

/// Write the plain text form of a view: the sorted node line, then one
/// `i,j,weight` record per edge
pub fn export_view(repo: &str, view: &str, data_dir: &Path, output: Option<&Path>) -> Result<()> {
    let graph = load_view(data_dir, repo, view)?;
    let text = graph.plaintext();
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            log::info!("Exported view '{}' of {} to {}", view, repo, path.display());
        }
        None => println!("{}", text),
    }
    Ok(())
}
