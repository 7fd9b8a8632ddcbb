//! Job partitioning and leasing.

use super::protocol::JobRange;
use crate::errors::{Error, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Split rows `0..node_count` into at most `job_count` ranges with roughly
/// equal pair counts. Row `i` has `i` pairs, so the boundaries grow with the
/// square root.
pub fn partition_jobs(node_count: usize, job_count: usize) -> Vec<JobRange> {
    if node_count < 2 || job_count == 0 {
        return Vec::new();
    }
    let job_count = job_count.min(node_count);
    let mut ranges = Vec::with_capacity(job_count);
    let mut start = 0;
    for i in 1..=job_count {
        let end = if i == job_count {
            node_count
        } else {
            ((node_count as f64) * (i as f64 / job_count as f64).sqrt()).round() as usize
        };
        let end = end.min(node_count);
        if end > start {
            ranges.push(JobRange::new(start, end));
            start = end;
        }
    }
    ranges
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    job: JobRange,
    since: Instant,
}

/// Pending jobs, active leases and per-worker completed jobs
#[derive(Debug)]
pub struct JobQueue {
    pending: VecDeque<JobRange>,
    leases: HashMap<usize, Lease>,
    completed: HashMap<usize, Vec<JobRange>>,
    attempts: HashMap<JobRange, usize>,
    max_attempts: usize,
    total: usize,
}

impl JobQueue {
    /// Jobs are handed out in shuffled order
    pub fn new(mut jobs: Vec<JobRange>, max_attempts: usize, rng: &mut impl Rng) -> Self {
        jobs.shuffle(rng);
        Self {
            total: jobs.len(),
            pending: jobs.into(),
            leases: HashMap::new(),
            completed: HashMap::new(),
            attempts: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn has_leases(&self) -> bool {
        !self.leases.is_empty()
    }

    /// Nothing pending and nothing in flight
    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty() && self.leases.is_empty()
    }

    pub fn lease(&mut self, worker: usize) -> Option<JobRange> {
        let job = self.pending.pop_front()?;
        *self.attempts.entry(job).or_insert(0) += 1;
        self.leases.insert(
            worker,
            Lease {
                job,
                since: Instant::now(),
            },
        );
        Some(job)
    }

    /// The worker finished its leased job
    pub fn complete(&mut self, worker: usize) -> Option<JobRange> {
        let lease = self.leases.remove(&worker)?;
        self.completed.entry(worker).or_default().push(lease.job);
        Some(lease.job)
    }

    /// The worker delivered all its results
    pub fn finish(&mut self, worker: usize) {
        self.completed.remove(&worker);
    }

    /// Re-enqueue the worker's leased job and the jobs it completed without
    /// delivering the final results. Fails once a job ran out of attempts.
    pub fn fail(&mut self, worker: usize) -> Result<Vec<JobRange>> {
        let mut lost: Vec<JobRange> = self.completed.remove(&worker).unwrap_or_default();
        if let Some(lease) = self.leases.remove(&worker) {
            lost.push(lease.job);
        }
        for job in &lost {
            let attempts = self.attempts.get(job).copied().unwrap_or(0);
            if attempts >= self.max_attempts {
                return Err(Error::Worker(format!(
                    "job {} failed {} times, giving up",
                    job, attempts
                )));
            }
            self.pending.push_back(*job);
        }
        Ok(lost)
    }

    /// Workers whose lease is older than `timeout`
    pub fn expired(&self, timeout: Duration) -> Vec<usize> {
        let now = Instant::now();
        let mut workers: Vec<usize> = self
            .leases
            .iter()
            .filter(|(_, lease)| now.duration_since(lease.since) > timeout)
            .map(|(worker, _)| *worker)
            .collect();
        workers.sort_unstable();
        workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_partition_covers_all_rows() {
        let jobs = partition_jobs(100, 10);
        assert_eq!(jobs.first().map(|j| j.start), Some(0));
        assert_eq!(jobs.last().map(|j| j.end), Some(100));
        for pair in jobs.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        let total: u64 = jobs.iter().map(JobRange::pair_count).sum();
        assert_eq!(total, 100 * 99 / 2);
    }

    #[test]
    fn test_partition_balances_pairs() {
        let jobs = partition_jobs(1000, 8);
        assert_eq!(jobs.len(), 8);
        let counts: Vec<u64> = jobs.iter().map(JobRange::pair_count).collect();
        let max = *counts.iter().max().unwrap() as f64;
        let min = *counts.iter().min().unwrap() as f64;
        assert!(max / min < 1.1, "unbalanced: {:?}", counts);
    }

    #[test]
    fn test_partition_small_inputs() {
        assert!(partition_jobs(1, 4).is_empty());
        assert!(partition_jobs(10, 0).is_empty());
        let jobs = partition_jobs(3, 10);
        assert_eq!(jobs.last().map(|j| j.end), Some(3));
        assert!(jobs.iter().all(|j| j.end > j.start));
    }

    #[test]
    fn test_lease_complete_fail_cycle() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = JobQueue::new(partition_jobs(10, 2), 2, &mut rng);
        assert_eq!(queue.total(), 2);
        let first = queue.lease(0).unwrap();
        queue.lease(1).unwrap();
        assert!(queue.lease(2).is_none());
        assert_eq!(queue.complete(0), Some(first));

        // worker 0 dies after completing, worker 1 dies mid-job
        let mut lost = queue.fail(0).unwrap();
        lost.extend(queue.fail(1).unwrap());
        assert_eq!(lost.len(), 2);
        assert_eq!(queue.pending(), 2);
        assert!(!queue.has_leases());

        queue.lease(3).unwrap();
        queue.lease(4).unwrap();
        assert!(queue.fail(3).is_err());
    }

    #[test]
    fn test_finished_workers_keep_their_jobs() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut queue = JobQueue::new(partition_jobs(10, 1), 3, &mut rng);
        queue.lease(0).unwrap();
        queue.complete(0).unwrap();
        queue.finish(0);
        assert!(queue.fail(0).unwrap().is_empty());
        assert!(queue.is_exhausted());
    }

    #[test]
    fn test_expired_leases() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut queue = JobQueue::new(partition_jobs(10, 2), 3, &mut rng);
        queue.lease(5).unwrap();
        assert!(queue.expired(Duration::from_secs(60)).is_empty());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(queue.expired(Duration::from_millis(1)), vec![5]);
    }
}
