//! Configuration loaded from `.couplingmap.toml`.
//!
//! ```toml
//! [analysis]
//! keep_size = 50
//! min_support = 0.1
//! views = ["references", "evolutionary", "linguistic", "module_distance"]
//! filter = "classes"
//! min_module_distance = 6
//!
//! [parallel]
//! distributed = true
//! max_workers = 8
//!
//! [storage]
//! data_dir = "data"
//!
//! [[patterns]]
//! pattern = "1,0,*,*"
//! label = "Hidden dependency"
//! ```
//!
//! Command line flags override file values; `COUPLINGMAP_DATA_DIR` and
//! `COUPLINGMAP_CACHE_DIR` override the storage section.

mod loader;
mod parallel;

pub use loader::{directory_ancestors, load_config, load_config_from, parse_config, CONFIG_FILE_NAME};
pub use parallel::ParallelConfig;

use crate::analysis::{AnalysisSettings, NodeFilterMode, PairFilter, DATA_DIR_ENV};
use crate::core::{taxonomy, Pattern};
use crate::errors::{Error, Result};
use crate::results::{ResultStore, DEFAULT_KEEP_SIZE, DEFAULT_TRIM_FACTOR};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

fn default_keep_size() -> usize {
    DEFAULT_KEEP_SIZE
}

fn default_trim_factor() -> usize {
    DEFAULT_TRIM_FACTOR
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CouplingmapConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub parallel: ParallelConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Pattern catalogue, the built-in taxonomy when empty
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisConfig {
    #[serde(default = "default_keep_size")]
    pub keep_size: usize,
    #[serde(default)]
    pub min_support: f64,
    #[serde(default = "default_trim_factor")]
    pub trim_factor: usize,
    /// Views analyzed when none are given on the command line
    #[serde(default)]
    pub views: Vec<String>,
    #[serde(default)]
    pub filter: NodeFilterMode,
    /// Skip pairs fewer than this many tree edges apart
    #[serde(default)]
    pub min_module_distance: Option<usize>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            keep_size: default_keep_size(),
            min_support: 0.0,
            trim_factor: default_trim_factor(),
            views: Vec::new(),
            filter: NodeFilterMode::default(),
            min_module_distance: None,
        }
    }
}

impl AnalysisConfig {
    pub fn settings(&self) -> AnalysisSettings {
        AnalysisSettings {
            keep_size: self.keep_size,
            min_support: self.min_support,
            trim_factor: self.trim_factor,
            pair_filter: PairFilter {
                min_module_distance: self.min_module_distance,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Root of the `<repo>/<view>.json` graph documents
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Result cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Environment, then configuration, then `./data`
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("data"))
    }

    pub fn result_store(&self) -> ResultStore {
        ResultStore::resolve(self.cache_dir.as_deref())
    }
}

/// One `[[patterns]]` entry, slots written as `1,*,0.5`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternEntry {
    pub pattern: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl PatternEntry {
    pub fn to_pattern(&self) -> Result<Pattern> {
        let parsed: Pattern = self.pattern.parse()?;
        match &self.label {
            Some(label) => Pattern::new(parsed.slots().to_vec(), label.clone()),
            None => Ok(parsed),
        }
    }
}

impl CouplingmapConfig {
    pub fn validate(&self) -> Result<()> {
        self.analysis
            .settings()
            .validate()
            .map_err(|e| match e {
                Error::Configuration(message) => Error::Configuration(format!("analysis.{}", message)),
                other => other,
            })?;
        if self.parallel.max_job_attempts == 0 {
            return Err(Error::Configuration(
                "parallel.max_job_attempts must be positive".into(),
            ));
        }
        for entry in &self.patterns {
            entry
                .to_pattern()
                .map_err(|e| Error::Configuration(format!("pattern {:?}: {}", entry.pattern, e)))?;
        }
        Ok(())
    }

    /// Configured catalogue, or the built-in taxonomy
    pub fn patterns(&self) -> Result<Vec<Pattern>> {
        if self.patterns.is_empty() {
            return Ok(taxonomy());
        }
        self.patterns.iter().map(PatternEntry::to_pattern).collect()
    }
}
