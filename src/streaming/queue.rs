use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet as HashSet;

use super::types::{BuildJob, TileKey};

/// Pending build jobs, at most one per key.
#[derive(Default)]
pub struct BuildQueue {
    jobs: VecDeque<BuildJob>,
    queued_set: HashSet<TileKey>,
}

impl BuildQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: TileKey) -> bool {
        self.queued_set.contains(&key)
    }

    pub fn push_back(&mut self, job: BuildJob) -> bool {
        if !self.queued_set.insert(job.key) {
            return false;
        }
        self.jobs.push_back(job);
        true
    }

    /// Puts `job` at the head. An existing job for the same key is moved.
    pub fn push_front(&mut self, job: BuildJob) {
        if !self.queued_set.insert(job.key) {
            if let Some(pos) = self.jobs.iter().position(|j| j.key == job.key) {
                self.jobs.remove(pos);
            }
        }
        self.jobs.push_front(job);
    }

    pub fn pop_front(&mut self) -> Option<BuildJob> {
        let job = self.jobs.pop_front()?;
        self.queued_set.remove(&job.key);
        Some(job)
    }

    /// Cancels a not-yet-dispatched job.
    pub fn remove(&mut self, key: TileKey) -> Option<BuildJob> {
        if !self.queued_set.remove(&key) {
            return None;
        }
        let pos = self.jobs.iter().position(|j| j.key == key)?;
        self.jobs.remove(pos)
    }

    pub fn clear(&mut self) {
        self.jobs.clear();
        self.queued_set.clear();
    }

    /// Stable sort by `rank` (lowest first).
    pub fn sort_by_rank<R, F>(&mut self, mut rank: F)
    where
        R: PartialOrd,
        F: FnMut(&BuildJob) -> R,
    {
        let mut ranked: Vec<(R, BuildJob)> = self.jobs.drain(..).map(|j| (rank(&j), j)).collect();
        ranked.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        self.jobs.extend(ranked.into_iter().map(|(_, j)| j));
    }

    pub fn iter(&self) -> impl Iterator<Item = &BuildJob> {
        self.jobs.iter()
    }
}

/// Per-tick dispatch budget. Wall-clock time plus an op cap. The first
/// op is always allowed, so a non-empty queue never starves; a running
/// build is never interrupted.
pub struct TickBudget {
    started: Instant,
    limit: Duration,
    max_ops: usize,
    ops: usize,
}

impl TickBudget {
    pub fn new(limit: Duration, max_ops: usize) -> Self {
        Self { started: Instant::now(), limit, max_ops: max_ops.max(1), ops: 0 }
    }

    pub fn from_ms(ms: f64, max_ops: usize) -> Self {
        Self::new(Duration::from_secs_f64(ms.max(0.0) / 1000.0), max_ops)
    }

    #[inline]
    pub fn allows_another(&self) -> bool {
        self.ops == 0 || (self.ops < self.max_ops && self.started.elapsed() < self.limit)
    }

    #[inline]
    pub fn record_op(&mut self) {
        self.ops += 1;
    }

    #[inline]
    pub fn ops(&self) -> usize {
        self.ops
    }
}
