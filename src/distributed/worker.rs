//! Worker side of the job protocol.
//!
//! A worker receives the shuffled node ordering once, answers `R`, and then
//! computes one row range per `J` command. Local sets that outgrow their trim
//! threshold are trimmed and shipped immediately so memory stays bounded;
//! everything left is shipped on `D`, followed by `Q`.

use super::protocol::{JobRange, MasterCommand, WorkerMessage};
use super::transport::{LineSink, LineSource, WorkerSpec};
use crate::analysis::{PairAnalyzer, ViewProvider, ViewRegistry};
use crate::core::ElementId;
use crate::errors::{Error, Result};
use crate::results::BoundedResultSet;
use std::sync::Arc;
use tracing::{debug, debug_span, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for the node count and the node lines
    Starting,
    /// Nodes received, `R` sent
    Ready,
    Working,
    /// Job finished, `M` sent
    AwaitingJob,
    Draining,
    /// `Q` sent
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub jobs: usize,
    pub pairs: u64,
    pub batches: usize,
}

struct Worker<'a> {
    analyzer: &'a PairAnalyzer,
    sets: Vec<BoundedResultSet>,
    nodes: Vec<ElementId>,
    expected: Option<usize>,
    state: WorkerState,
    stats: WorkerStats,
}

impl<'a> Worker<'a> {
    fn new(analyzer: &'a PairAnalyzer, keep_size: usize, trim_factor: usize) -> Self {
        Self {
            analyzer,
            sets: analyzer.empty_sets(keep_size, trim_factor),
            nodes: Vec::new(),
            expected: None,
            state: WorkerState::Starting,
            stats: WorkerStats::default(),
        }
    }

    fn handle(&mut self, command: MasterCommand, sink: &mut dyn LineSink) -> Result<()> {
        match (self.state, command) {
            (WorkerState::Starting, MasterCommand::NodeCount(count)) if self.expected.is_none() => {
                self.expected = Some(count);
                self.nodes.reserve(count);
                self.ready_if_complete(sink)
            }
            (WorkerState::Starting, MasterCommand::Element(element)) if self.expected.is_some() => {
                self.nodes.push(element);
                self.ready_if_complete(sink)
            }
            (WorkerState::Ready | WorkerState::AwaitingJob, MasterCommand::Job(range)) => {
                self.run_job(range, sink)?;
                send(sink, &WorkerMessage::MoreWork)?;
                self.state = WorkerState::AwaitingJob;
                Ok(())
            }
            (WorkerState::Ready | WorkerState::AwaitingJob, MasterCommand::Drain) => self.drain(sink),
            (state, command) => Err(Error::protocol(format!(
                "unexpected command {:?} while {:?}",
                command, state
            ))),
        }
    }

    fn ready_if_complete(&mut self, sink: &mut dyn LineSink) -> Result<()> {
        if Some(self.nodes.len()) != self.expected {
            return Ok(());
        }
        self.analyzer.warm_up(&self.nodes);
        send(sink, &WorkerMessage::Ready)?;
        self.state = WorkerState::Ready;
        debug!(nodes = self.nodes.len(), "worker ready");
        Ok(())
    }

    fn run_job(&mut self, range: JobRange, sink: &mut dyn LineSink) -> Result<()> {
        if range.end > self.nodes.len() {
            return Err(Error::protocol(format!(
                "job {} exceeds the {} known nodes",
                range,
                self.nodes.len()
            )));
        }
        self.state = WorkerState::Working;
        let _span = debug_span!("job", range = %range).entered();
        for i in range.rows() {
            let (earlier, rest) = self.nodes.split_at(i);
            let a = &rest[0];
            for b in earlier {
                self.analyzer.analyze_into(a, b, &mut self.sets);
            }
            self.stats.pairs += i as u64;
            self.ship_full_sets(sink)?;
        }
        self.stats.jobs += 1;
        Ok(())
    }

    fn ship_full_sets(&mut self, sink: &mut dyn LineSink) -> Result<()> {
        for pattern in 0..self.sets.len() {
            if self.sets[pattern].needs_trim() {
                self.ship(pattern, sink)?;
            }
        }
        Ok(())
    }

    fn ship(&mut self, pattern: usize, sink: &mut dyn LineSink) -> Result<()> {
        let set = &mut self.sets[pattern];
        set.trim();
        let batch = set.take_batch();
        send(sink, &WorkerMessage::Transfer { pattern, batch })?;
        self.stats.batches += 1;
        Ok(())
    }

    fn drain(&mut self, sink: &mut dyn LineSink) -> Result<()> {
        self.state = WorkerState::Draining;
        for pattern in 0..self.sets.len() {
            self.ship(pattern, sink)?;
        }
        send(sink, &WorkerMessage::Quit)?;
        self.state = WorkerState::Done;
        Ok(())
    }
}

fn send(sink: &mut dyn LineSink, message: &WorkerMessage) -> Result<()> {
    sink.send_line(&message.encode()?)
}

/// Speak the worker protocol until the master sends `D`.
///
/// End of input before the drain command is a protocol error.
pub fn run_worker(
    analyzer: &PairAnalyzer,
    keep_size: usize,
    trim_factor: usize,
    source: &mut dyn LineSource,
    sink: &mut dyn LineSink,
) -> Result<WorkerStats> {
    let mut worker = Worker::new(analyzer, keep_size, trim_factor);
    while let Some(line) = source.next_line()? {
        worker.handle(MasterCommand::decode(&line)?, sink)?;
        if worker.state == WorkerState::Done {
            return Ok(worker.stats);
        }
    }
    Err(Error::protocol(format!(
        "master closed the channel while the worker was {:?}",
        worker.state
    )))
}

/// Rebuild the analysis described by `spec` from `provider`
pub fn analyzer_from_spec(spec: &WorkerSpec, provider: &dyn ViewProvider) -> Result<PairAnalyzer> {
    let graphs = spec
        .views
        .iter()
        .map(|view| provider.get(&spec.repo, view))
        .collect::<Result<Vec<_>>>()?;
    Ok(PairAnalyzer::new(graphs, &spec.patterns, spec.min_support)
        .with_pair_filter(spec.pair_filter))
}

/// Run a worker for `spec`, loading views from its data directory
pub fn serve(
    spec: &WorkerSpec,
    source: &mut dyn LineSource,
    sink: &mut dyn LineSink,
) -> Result<WorkerStats> {
    let registry = ViewRegistry::new(&spec.data_dir);
    serve_with(spec, &registry, source, sink)
}

fn serve_with(
    spec: &WorkerSpec,
    provider: &dyn ViewProvider,
    source: &mut dyn LineSource,
    sink: &mut dyn LineSink,
) -> Result<WorkerStats> {
    let analyzer = analyzer_from_spec(spec, provider)?;
    let stats = run_worker(&analyzer, spec.keep_size, spec.trim_factor, source, sink)?;
    info!(
        jobs = stats.jobs,
        pairs = stats.pairs,
        batches = stats.batches,
        "worker finished"
    );
    Ok(stats)
}

/// Worker body for [`ThreadLauncher`](super::ThreadLauncher) sharing the
/// views of `provider`
pub fn thread_worker(
    provider: Arc<dyn ViewProvider>,
) -> impl Fn(usize, WorkerSpec, Box<dyn LineSource>, Box<dyn LineSink>) -> Result<()> + Send + Sync + 'static
{
    move |index: usize,
          spec: WorkerSpec,
          mut source: Box<dyn LineSource>,
          mut sink: Box<dyn LineSink>| {
        let _span = debug_span!("worker", index).entered();
        serve_with(&spec, provider.as_ref(), source.as_mut(), sink.as_mut()).map(|_| ())
    }
}
