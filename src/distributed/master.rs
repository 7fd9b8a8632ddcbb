//! Master side of the job protocol.
//!
//! The dispatcher loop is single threaded. One reader thread per worker
//! decodes its output, merges result batches straight into the shared
//! per-pattern sets and forwards control messages as [`WorkerEvent`]s.

use super::jobs::{partition_jobs, JobQueue};
use super::protocol::{MasterCommand, WorkerMessage};
use super::transport::{LineSink, LineSource, WorkerControl, WorkerLauncher, WorkerSpec};
use crate::core::ElementId;
use crate::errors::{Error, Result};
use crate::progress::{global_bar, TEMPLATE_JOBS};
use crate::results::BoundedResultSet;
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use indicatif::ProgressBar;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn};

pub const DEFAULT_JOBS_PER_WORKER: usize = 10;
pub const DEFAULT_MAX_JOB_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct MasterSettings {
    pub max_workers: usize,
    pub jobs_per_worker: usize,
    /// Seed for the node and job shuffles, random when `None`
    pub seed: Option<u64>,
    /// Leases older than this are revoked
    pub job_timeout: Option<Duration>,
    pub max_job_attempts: usize,
    pub poll_interval: Duration,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            max_workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            jobs_per_worker: DEFAULT_JOBS_PER_WORKER,
            seed: None,
            job_timeout: None,
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            poll_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum WorkerEvent {
    Ready(usize),
    MoreWork(usize),
    Quit(usize),
    Violation(usize, String),
    Closed(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Starting,
    Leased,
    Idle,
    Draining,
    Done,
    Dead,
}

impl Status {
    fn is_finished(self) -> bool {
        matches!(self, Status::Done | Status::Dead)
    }
}

struct Slot {
    input: Option<Box<dyn LineSink>>,
    control: Box<dyn WorkerControl>,
    status: Status,
}

type SharedSets = Arc<Vec<Mutex<BoundedResultSet>>>;

/// Distributes the pairs of a node universe over workers
pub struct Master {
    settings: MasterSettings,
    launcher: Arc<dyn WorkerLauncher>,
}

impl Master {
    pub fn new(settings: MasterSettings, launcher: Arc<dyn WorkerLauncher>) -> Self {
        Self { settings, launcher }
    }

    pub fn settings(&self) -> &MasterSettings {
        &self.settings
    }

    /// Compute every unordered pair of `nodes` on workers and merge their
    /// results into `sets`, one per pattern of `spec`.
    pub fn run(
        &self,
        nodes: &[ElementId],
        spec: &WorkerSpec,
        sets: Vec<BoundedResultSet>,
    ) -> Result<Vec<BoundedResultSet>> {
        let span = info_span!("master", nodes = nodes.len(), patterns = sets.len());
        let _enter = span.enter();

        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order = nodes.to_vec();
        order.shuffle(&mut rng);

        let max_workers = self.settings.max_workers.max(1);
        let jobs = partition_jobs(
            order.len(),
            max_workers * self.settings.jobs_per_worker.max(1),
        );
        if jobs.is_empty() {
            debug!("fewer than two nodes, nothing to distribute");
            return Ok(sets);
        }
        let queue = JobQueue::new(jobs, self.settings.max_job_attempts, &mut rng);
        let worker_count = max_workers.min(queue.total());

        let mut node_lines = Vec::with_capacity(order.len() + 1);
        node_lines.push(MasterCommand::NodeCount(order.len()).encode()?);
        for node in order {
            node_lines.push(MasterCommand::Element(node).encode()?);
        }

        let shared: SharedSets = Arc::new(sets.into_iter().map(Mutex::new).collect());
        let bar = global_bar(queue.total() as u64, TEMPLATE_JOBS);
        bar.set_message("Distributing pairs");
        info!(
            workers = worker_count,
            jobs = queue.total(),
            "starting distributed analysis"
        );

        let mut dispatcher = Dispatcher {
            slots: Vec::with_capacity(worker_count),
            queue,
            bar,
        };
        let (events, receiver) = unbounded();
        let started = self.start_workers(
            &mut dispatcher,
            worker_count,
            spec,
            &node_lines,
            &shared,
            &events,
        );
        drop(events);

        let outcome = started.and_then(|()| dispatcher.run_loop(&receiver, &self.settings));
        if let Err(e) = outcome {
            dispatcher.terminate_all();
            dispatcher.bar.abandon();
            return Err(e);
        }
        dispatcher.bar.finish_and_clear();
        dispatcher.wait_done();

        Ok(shared
            .iter()
            .map(|set| {
                let mut guard = set.lock();
                let empty = BoundedResultSet::new(guard.dimensions(), guard.keep_size());
                std::mem::replace(&mut *guard, empty)
            })
            .collect())
    }

    fn start_workers(
        &self,
        dispatcher: &mut Dispatcher,
        worker_count: usize,
        spec: &WorkerSpec,
        node_lines: &[String],
        shared: &SharedSets,
        events: &Sender<WorkerEvent>,
    ) -> Result<()> {
        for index in 0..worker_count {
            let connection = self.launcher.launch(index, spec)?;
            let sets = Arc::clone(shared);
            let sender = events.clone();
            let output = connection.output;
            std::thread::Builder::new()
                .name(format!("couplingmap-reader-{}", index))
                .spawn(move || read_worker(index, output, sets, sender))?;

            dispatcher.slots.push(Slot {
                input: Some(connection.input),
                control: connection.control,
                status: Status::Starting,
            });
            for line in node_lines {
                if !dispatcher.send_line(index, line) {
                    dispatcher.fail(index, "could not send the node list")?;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Master {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Master")
            .field("settings", &self.settings)
            .finish()
    }
}

fn read_worker(
    index: usize,
    mut output: Box<dyn LineSource>,
    sets: SharedSets,
    events: Sender<WorkerEvent>,
) {
    let event = loop {
        let line = match output.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => break WorkerEvent::Closed(index),
            Err(e) => break WorkerEvent::Violation(index, e.to_string()),
        };
        match WorkerMessage::decode(&line) {
            Ok(WorkerMessage::Ready) => {
                let _ = events.send(WorkerEvent::Ready(index));
            }
            Ok(WorkerMessage::MoreWork) => {
                let _ = events.send(WorkerEvent::MoreWork(index));
            }
            Ok(WorkerMessage::Transfer { pattern, batch }) => match sets.get(pattern) {
                Some(set) => {
                    let mut set = set.lock();
                    set.absorb(batch);
                    if set.needs_trim() {
                        set.trim();
                    }
                }
                None => {
                    break WorkerEvent::Violation(
                        index,
                        format!("result batch for unknown pattern {}", pattern),
                    )
                }
            },
            Ok(WorkerMessage::Quit) => break WorkerEvent::Quit(index),
            Err(e) => break WorkerEvent::Violation(index, e.to_string()),
        }
    };
    let _ = events.send(event);
}

struct Dispatcher {
    slots: Vec<Slot>,
    queue: JobQueue,
    bar: ProgressBar,
}

impl Dispatcher {
    fn run_loop(&mut self, events: &Receiver<WorkerEvent>, settings: &MasterSettings) -> Result<()> {
        while !self.all_finished() {
            match events.recv_timeout(settings.poll_interval) {
                Ok(event) => self.handle(event)?,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if let Some(timeout) = settings.job_timeout {
                for index in self.queue.expired(timeout) {
                    self.fail(index, "job lease expired")?;
                }
            }
            self.wake_idle()?;
            if self.live_count() == 0 && !self.queue.is_exhausted() {
                break;
            }
        }
        if !self.queue.is_exhausted() {
            return Err(Error::Worker(format!(
                "all workers failed with {} jobs left",
                self.queue.pending()
            )));
        }
        Ok(())
    }

    fn handle(&mut self, event: WorkerEvent) -> Result<()> {
        match event {
            WorkerEvent::Ready(index) => {
                if self.slots[index].status == Status::Starting {
                    self.dispatch(index)
                } else {
                    self.fail(index, "unexpected ready message")
                }
            }
            WorkerEvent::MoreWork(index) => {
                if self.slots[index].status == Status::Leased {
                    if let Some(job) = self.queue.complete(index) {
                        debug!(worker = index, job = %job, "job finished");
                    }
                    self.bar.inc(1);
                    self.dispatch(index)
                } else {
                    self.fail(index, "more-work message without a job")
                }
            }
            WorkerEvent::Quit(index) => {
                if self.slots[index].status == Status::Draining {
                    self.queue.finish(index);
                    self.slots[index].status = Status::Done;
                    debug!(worker = index, "worker drained");
                    Ok(())
                } else {
                    self.fail(index, "quit before drain")
                }
            }
            WorkerEvent::Violation(index, reason) => self.fail(index, &reason),
            WorkerEvent::Closed(index) => self.fail(index, "output closed"),
        }
    }

    /// Lease the next job to `index`, park it, or tell it to drain
    fn dispatch(&mut self, index: usize) -> Result<()> {
        let (command, status) = match self.queue.lease(index) {
            Some(job) => (MasterCommand::Job(job), Status::Leased),
            None if self.queue.has_leases() => {
                self.slots[index].status = Status::Idle;
                return Ok(());
            }
            None => (MasterCommand::Drain, Status::Draining),
        };
        if self.send_line(index, &command.encode()?) {
            self.slots[index].status = status;
            Ok(())
        } else {
            self.fail(index, "could not send command")
        }
    }

    /// Give idle workers the jobs that became available
    fn wake_idle(&mut self) -> Result<()> {
        loop {
            let live = self.live_count();
            for index in 0..self.slots.len() {
                if self.slots[index].status == Status::Idle {
                    self.dispatch(index)?;
                }
            }
            if self.live_count() == live {
                return Ok(());
            }
        }
    }

    fn send_line(&mut self, index: usize, line: &str) -> bool {
        let Some(input) = self.slots[index].input.as_mut() else {
            return false;
        };
        match input.send_line(line) {
            Ok(()) => true,
            Err(e) => {
                warn!(worker = index, error = %e, "write to worker failed");
                false
            }
        }
    }

    /// Kill the worker and re-enqueue everything it has not delivered
    fn fail(&mut self, index: usize, reason: &str) -> Result<()> {
        let slot = &mut self.slots[index];
        if slot.status.is_finished() {
            return Ok(());
        }
        let was_leased = slot.status == Status::Leased;
        slot.status = Status::Dead;
        slot.input = None;
        slot.control.terminate();

        let lost = self.queue.fail(index)?;
        let counted = lost.len().saturating_sub(usize::from(was_leased));
        self.bar.inc_length(counted as u64);
        warn!(
            worker = index,
            reason,
            requeued = lost.len(),
            "worker lost"
        );
        Ok(())
    }

    fn all_finished(&self) -> bool {
        self.slots.iter().all(|slot| slot.status.is_finished())
    }

    fn live_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.status.is_finished())
            .count()
    }

    fn terminate_all(&mut self) {
        for slot in &mut self.slots {
            if !slot.status.is_finished() {
                slot.status = Status::Dead;
                slot.input = None;
                slot.control.terminate();
            }
        }
    }

    fn wait_done(&mut self) {
        for slot in &mut self.slots {
            if slot.status == Status::Done {
                slot.input = None;
                slot.control.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{PairAnalyzer, ViewProvider, ViewRegistry};
    use crate::core::Pattern;
    use crate::distributed::transport::ThreadLauncher;
    use crate::distributed::worker::{run_worker, thread_worker};
    use crate::graph::HierarchicalCouplingGraph;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry() -> Arc<ViewRegistry> {
        let registry = ViewRegistry::new(PathBuf::from("unused"));
        let mut graph = HierarchicalCouplingGraph::new("references");
        for i in 0..12 {
            graph.add_and_support(&format!("p/N{}", i), &format!("p/N{}", (i + 1) % 12), 1.0);
        }
        registry.register("repo", "references", Arc::new(graph));
        Arc::new(registry)
    }

    fn spec() -> WorkerSpec {
        WorkerSpec {
            repo: "repo".into(),
            views: vec!["references".into()],
            patterns: vec!["1".parse::<Pattern>().unwrap()],
            min_support: 0.0,
            pair_filter: Default::default(),
            keep_size: 5,
            trim_factor: 2,
            data_dir: PathBuf::from("unused"),
        }
    }

    fn nodes() -> Vec<ElementId> {
        (0..12).map(|i| ElementId::from(format!("p/N{}", i))).collect()
    }

    fn settings() -> MasterSettings {
        MasterSettings {
            max_workers: 3,
            jobs_per_worker: 3,
            seed: Some(11),
            job_timeout: None,
            max_job_attempts: 3,
            poll_interval: Duration::from_millis(20),
        }
    }

    fn empty_sets() -> Vec<BoundedResultSet> {
        vec![BoundedResultSet::new(2, 5).with_trim_factor(2)]
    }

    #[test]
    fn test_all_pairs_are_counted() {
        let launcher = Arc::new(ThreadLauncher::new(thread_worker(registry())));
        let master = Master::new(settings(), launcher);
        let sets = master.run(&nodes(), &spec(), empty_sets()).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].total_amount(), 12 * 11);
    }

    #[test]
    fn test_dead_worker_jobs_are_rerun() {
        let provider: Arc<dyn ViewProvider> = registry();
        let crashed = Arc::new(AtomicUsize::new(0));
        let crash_count = Arc::clone(&crashed);
        let launcher = Arc::new(ThreadLauncher::new(
            move |index, spec: WorkerSpec, mut source: Box<dyn LineSource>, mut sink: Box<dyn LineSink>| {
                if index == 0 {
                    // take the node list and one job, then vanish
                    let mut remaining = None;
                    while let Some(line) = source.next_line()? {
                        match MasterCommand::decode(&line)? {
                            MasterCommand::NodeCount(count) => remaining = Some(count),
                            MasterCommand::Element(_) => {
                                remaining = remaining.map(|n: usize| n - 1);
                                if remaining == Some(0) {
                                    sink.send_line("R")?;
                                }
                            }
                            _ => break,
                        }
                    }
                    crash_count.fetch_add(1, Ordering::SeqCst);
                    return Ok(());
                }
                let graphs = spec
                    .views
                    .iter()
                    .map(|v| provider.get(&spec.repo, v))
                    .collect::<Result<Vec<_>>>()?;
                let analyzer = PairAnalyzer::new(graphs, &spec.patterns, spec.min_support);
                run_worker(&analyzer, spec.keep_size, spec.trim_factor, source.as_mut(), sink.as_mut())
                    .map(|_| ())
            },
        ));
        let master = Master::new(settings(), launcher);
        let mut sets = master.run(&nodes(), &spec(), empty_sets()).unwrap();
        sets[0].trim();

        let expected = {
            let mut set = BoundedResultSet::new(2, 5);
            let analyzer = PairAnalyzer::new(
                vec![registry().get("repo", "references").unwrap()],
                &spec().patterns,
                0.0,
            );
            let nodes = nodes();
            for i in 0..nodes.len() {
                for j in 0..i {
                    analyzer.analyze_into(&nodes[i], &nodes[j], std::slice::from_mut(&mut set));
                }
            }
            set.trim();
            set
        };
        let best: Vec<f64> = sets[0]
            .get_best_sorted(&[0.5, 0.5], Default::default())
            .iter()
            .map(|c| c.match_score())
            .collect();
        let wanted: Vec<f64> = expected
            .get_best_sorted(&[0.5, 0.5], Default::default())
            .iter()
            .map(|c| c.match_score())
            .collect();
        assert_eq!(best, wanted);
        assert!(crashed.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn test_fails_when_every_worker_dies() {
        let launcher = Arc::new(ThreadLauncher::new(
            |_, _, _source: Box<dyn LineSource>, mut sink: Box<dyn LineSink>| {
                sink.send_line("garbage")?;
                Ok(())
            },
        ));
        let master = Master::new(settings(), launcher);
        let err = master.run(&nodes(), &spec(), empty_sets()).unwrap_err();
        assert!(matches!(err, Error::Worker(_)));
    }

    #[test]
    fn test_single_node_needs_no_workers() {
        let launcher = Arc::new(ThreadLauncher::new(|_, _, _, _| {
            Err(Error::Worker("must not be launched".into()))
        }));
        let master = Master::new(settings(), launcher);
        let sets = master
            .run(&nodes()[..1], &spec(), empty_sets())
            .unwrap();
        assert!(sets[0].is_empty());
    }
}
