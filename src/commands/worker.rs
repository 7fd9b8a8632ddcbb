use crate::distributed::{serve, ReadSource, WorkerSpec, WriteSink};
use anyhow::{Context, Result};
use std::io::BufReader;

/// Serve the job protocol on stdin and stdout until the master drains us
pub fn run_worker(spec_json: &str) -> Result<()> {
    let spec: WorkerSpec =
        serde_json::from_str(spec_json).context("Invalid worker specification")?;
    let mut source = ReadSource::new(BufReader::new(std::io::stdin()));
    let mut sink = WriteSink::new(std::io::stdout());
    serve(&spec, &mut source, &mut sink)
        .with_context(|| format!("Worker for {} failed", spec.repo))?;
    Ok(())
}
