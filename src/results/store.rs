//! Persistent result sets, so repeated analyses skip finished patterns.
//!
//! Layout: `<root>/<repo>/<sha256 of key>.bin`, postcard encoded. Writes go
//! through a unique temporary file followed by a rename.

use super::best_set::{BoundedResultSet, DEFAULT_KEEP_SIZE};
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CACHE_DIR_ENV: &str = "COUPLINGMAP_CACHE_DIR";
const FORMAT_VERSION: u32 = 2;

/// Identity of one analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultKey {
    pub repo: String,
    /// Sorted view names
    pub views: Vec<String>,
    pub filter: String,
    /// Pattern slots in sorted view order, e.g. `1,*,0`
    pub pattern: String,
    pub keep_size: usize,
    pub min_support: f64,
    /// Pair restriction, empty when every pair is admitted
    pub pair_filter: String,
}

impl ResultKey {
    pub fn new(
        repo: impl Into<String>,
        views: &[String],
        filter: impl Into<String>,
        pattern: impl Into<String>,
    ) -> Self {
        let mut views = views.to_vec();
        views.sort();
        Self {
            repo: repo.into(),
            views,
            filter: filter.into(),
            pattern: pattern.into(),
            keep_size: DEFAULT_KEEP_SIZE,
            min_support: 0.0,
            pair_filter: String::new(),
        }
    }

    /// Analysis parameters that change the stored set
    pub fn with_parameters(
        mut self,
        keep_size: usize,
        min_support: f64,
        pair_filter: impl Into<String>,
    ) -> Self {
        self.keep_size = keep_size;
        self.min_support = min_support;
        self.pair_filter = pair_filter.into();
        self
    }

    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.repo.as_bytes());
        hasher.update([0]);
        for view in &self.views {
            hasher.update(view.as_bytes());
            hasher.update([0]);
        }
        hasher.update(self.filter.as_bytes());
        hasher.update([0]);
        hasher.update(self.pattern.as_bytes());
        hasher.update([0]);
        hasher.update((self.keep_size as u64).to_le_bytes());
        hasher.update(self.min_support.to_bits().to_le_bytes());
        hasher.update(self.pair_filter.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredResultSet {
    format_version: u32,
    key: ResultKey,
    set: BoundedResultSet,
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    root: PathBuf,
}

impl ResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$COUPLINGMAP_CACHE_DIR`, then the configured directory, then the
    /// platform cache directory
    pub fn resolve(configured: Option<&Path>) -> Self {
        if let Ok(custom) = std::env::var(CACHE_DIR_ENV) {
            return Self::new(custom);
        }
        if let Some(dir) = configured {
            return Self::new(dir);
        }
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("couplingmap"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ResultKey) -> PathBuf {
        self.root
            .join(sanitize(&key.repo))
            .join(format!("{}.bin", key.digest()))
    }

    /// Stored set for `key`. Unreadable or foreign entries count as misses.
    pub fn load(&self, key: &ResultKey) -> Result<Option<BoundedResultSet>> {
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::cache(e.to_string(), path)),
        };
        match postcard::from_bytes::<StoredResultSet>(&bytes) {
            Ok(stored) if stored.format_version == FORMAT_VERSION && &stored.key == key => {
                log::debug!("Loaded cached results for {:?} from {:?}", key.pattern, path);
                Ok(Some(stored.set))
            }
            Ok(_) => {
                log::warn!("Ignoring stale result cache entry {:?}", path);
                Ok(None)
            }
            Err(e) => {
                log::warn!("Ignoring unreadable result cache entry {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    pub fn export(&self, key: &ResultKey, set: &BoundedResultSet) -> Result<PathBuf> {
        let path = self.path_for(key);
        let stored = StoredResultSet {
            format_version: FORMAT_VERSION,
            key: key.clone(),
            set: set.clone(),
        };
        let bytes = postcard::to_allocvec(&stored)?;
        write_atomically(&path, &bytes)?;
        log::debug!("Stored {} results at {:?}", set.len(), path);
        Ok(path)
    }
}

fn sanitize(repo: &str) -> String {
    repo.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

fn temp_path_for(target: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    let name = format!(
        "{}.tmp.{}.{}.{}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("results"),
        std::process::id(),
        timestamp,
        COUNTER.fetch_add(1, Ordering::SeqCst)
    );
    target.with_file_name(name)
}

fn write_atomically(target: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::cache(e.to_string(), parent))?;
    }
    let temp = temp_path_for(target);
    fs::write(&temp, data).map_err(|e| Error::cache(e.to_string(), &temp))?;
    if let Err(e) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(Error::cache(e.to_string(), target));
    }
    Ok(())
}
