//! Parallel and distributed execution settings.

use crate::distributed::{MasterSettings, DEFAULT_JOBS_PER_WORKER, DEFAULT_MAX_JOB_ATTEMPTS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_enabled() -> bool {
    true
}

fn default_jobs_per_worker() -> usize {
    DEFAULT_JOBS_PER_WORKER
}

fn default_max_job_attempts() -> usize {
    DEFAULT_MAX_JOB_ATTEMPTS
}

/// `[parallel]` section of `.couplingmap.toml`
///
/// ```toml
/// [parallel]
/// distributed = true
/// max_workers = 8
/// job_timeout_secs = 600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParallelConfig {
    /// Use the rayon pool for in-process analysis (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Run pairs on worker processes instead of in process
    #[serde(default)]
    pub distributed: bool,

    /// Threads in process, worker processes when distributed.
    /// Defaults to the number of CPU cores.
    #[serde(default)]
    pub max_workers: Option<usize>,

    #[serde(default = "default_jobs_per_worker")]
    pub jobs_per_worker: usize,

    /// Fixed shuffle seed for reproducible job orders
    #[serde(default)]
    pub seed: Option<u64>,

    /// Revoke a job lease after this many seconds
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,

    #[serde(default = "default_max_job_attempts")]
    pub max_job_attempts: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            distributed: false,
            max_workers: None,
            jobs_per_worker: default_jobs_per_worker(),
            seed: None,
            job_timeout_secs: None,
            max_job_attempts: default_max_job_attempts(),
        }
    }
}

impl ParallelConfig {
    pub fn sequential() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Configured worker count, or the number of CPU cores
    pub fn effective_workers(&self) -> usize {
        self.max_workers.filter(|&n| n > 0).unwrap_or_else(num_cpus)
    }

    /// Rayon thread count, `0` meaning rayon's default
    pub fn thread_count(&self) -> usize {
        if !self.enabled {
            1
        } else {
            self.max_workers.unwrap_or(0)
        }
    }

    pub fn master_settings(&self) -> MasterSettings {
        MasterSettings {
            max_workers: self.effective_workers(),
            jobs_per_worker: self.jobs_per_worker.max(1),
            seed: self.seed,
            job_timeout: self.job_timeout_secs.map(Duration::from_secs),
            max_job_attempts: self.max_job_attempts.max(1),
            ..MasterSettings::default()
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}
