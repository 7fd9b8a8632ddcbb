//! Master/worker execution of the pair analysis.
//!
//! The master owns the shuffled node ordering and hands out row ranges as
//! leased jobs; workers compute the pairs of their rows and stream trimmed
//! result batches back. See [`protocol`] for the line format.

pub mod jobs;
pub mod master;
pub mod protocol;
pub mod transport;
pub mod worker;

pub use jobs::{partition_jobs, JobQueue};
pub use master::{Master, MasterSettings, DEFAULT_JOBS_PER_WORKER, DEFAULT_MAX_JOB_ATTEMPTS};
pub use protocol::{JobRange, MasterCommand, WorkerMessage, FIELD_DELIMITER};
pub use transport::{
    line_pipe, LineSink, LineSource, ProcessLauncher, ReadSource, ThreadLauncher, WorkerConnection,
    WorkerControl, WorkerLauncher, WorkerSpec, WriteSink,
};
pub use worker::{analyzer_from_spec, run_worker, serve, thread_worker, WorkerState, WorkerStats};
