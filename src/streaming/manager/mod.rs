// src/streaming/manager/mod.rs
pub mod build;
pub(crate) mod keep;
pub(crate) mod stats;

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec3;
use rustc_hash::FxHashMap as HashMap;

use crate::config::{ScheduleConfig, TerrainConfig};
use crate::world::terrain::{LatticeScratch, TerrainMesh};
use crate::world::{AnchorState, SharedSampler};

use crate::streaming::{
    cache::ChunkCache,
    pool::GeometryPool,
    queue::BuildQueue,
    tiles::TileGrid,
    types::*,
    window::WindowTracker,
    workers::WorkerChannel,
};

pub use stats::StreamTimingWindow;

pub type TerrainEvent = StreamEvent<Arc<TerrainMesh>>;

/// A dispatched worker job awaiting its reply.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PendingJob {
    pub ticket: u64,
    pub dispatched_at: Instant,
    pub enqueued_at: Instant,
}

/// Build-related state bucket.
pub(crate) struct BuildState {
    pub queue: BuildQueue,
    pub pending: HashMap<TileKey, PendingJob>,
    pub next_ticket: u64,

    pub workers: Option<Box<dyn WorkerChannel>>,
    /// Cleared for the rest of the session once the breaker trips.
    pub worker_path: bool,
    pub consecutive_errors: u32,

    pub scratch: LatticeScratch,
}

/// Lifetime counters, shared by both streamers.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Counters {
    pub builds_worker: u64,
    pub builds_sync: u64,
    pub cache_hits: u64,
    pub evictions: u64,
    pub destroyed: u64,
    pub stale_replies: u64,
    pub worker_errors: u64,
}

/// Terrain streaming manager: window, two-tier cache and build scheduler.
pub struct TerrainStreamer {
    pub(crate) schedule: ScheduleConfig,
    pub(crate) resolution: u32,

    pub(crate) window: WindowTracker,
    pub(crate) cache: ChunkCache<Arc<TerrainMesh>>,
    pub(crate) build: BuildState,
    pub(crate) pool: GeometryPool,
    pub(crate) sampler: SharedSampler,

    pub(crate) events: Vec<TerrainEvent>,
    pub(crate) counters: Counters,
    pub(crate) ticks: u64,

    // Build timing window (drained on stats() cadence)
    pub timing: StreamTimingWindow,
}

impl TerrainStreamer {
    /// `workers: None` runs every build on the calling thread.
    pub fn new(
        grid: TileGrid,
        terrain: &TerrainConfig,
        schedule: &ScheduleConfig,
        sampler: SharedSampler,
        workers: Option<Box<dyn WorkerChannel>>,
    ) -> Self {
        let worker_path = workers.is_some();
        Self {
            schedule: schedule.clone(),
            resolution: terrain.resolution.max(1),
            window: WindowTracker::new(grid, terrain.window.clone()),
            cache: ChunkCache::new(),
            build: BuildState {
                queue: BuildQueue::new(),
                pending: HashMap::default(),
                next_ticket: 1,
                workers,
                worker_path,
                consecutive_errors: 0,
                scratch: LatticeScratch::new(),
            },
            pool: GeometryPool::new(schedule.pool_max_per_shape),
            sampler,
            events: Vec::new(),
            counters: Counters::default(),
            ticks: 0,
            timing: StreamTimingWindow::default(),
        }
    }

    /// One scheduling tick. `now` drives retention and worker deadlines; the
    /// per-tick build budget always runs on the wall clock.
    pub fn tick(&mut self, position: DVec3, anchor: &AnchorState, now: Instant) {
        // 1) replies first, so finished tiles can satisfy this tick's window
        build::harvest_replies(self, anchor, now);
        build::expire_pending(self, now);

        // 2) window
        let update = self.window.observe(position, now);

        // 3) removals before creations
        let sweep_due = self.ticks % self.schedule.sweep_interval_ticks.max(1) == 0;
        if sweep_due || update.is_some() {
            let released = keep::sweep(
                &mut self.cache,
                &mut self.build.queue,
                &mut self.events,
                &mut self.counters,
                now,
                secs(self.schedule.cold_ttl_s),
            );
            for mesh in released {
                build::release_mesh(&mut self.pool, mesh);
            }
        }

        if let Some(update) = update {
            keep::apply_window(
                &mut self.cache,
                &mut self.build.queue,
                &mut self.events,
                &mut self.counters,
                self.window.grid(),
                &update,
                now,
                secs(self.schedule.evict_delay_s),
            );
        }

        // 4) drain queue within the budget
        build::dispatch_builds(self, anchor, now);

        self.ticks += 1;
    }

    /// Drops every cached tile. Used after an anchor switch: the same world
    /// keys now map to different sample-space content.
    pub fn invalidate(&mut self) {
        let (released, unmounted) = self.cache.invalidate_all();
        for key in unmounted {
            self.events.push(StreamEvent::TileEvicted { key });
        }
        self.counters.destroyed += released.len() as u64;
        for mesh in released {
            build::release_mesh(&mut self.pool, mesh);
        }
        self.build.queue.clear();
        self.window.invalidate();
    }

    pub fn take_events(&mut self) -> Vec<TerrainEvent> {
        std::mem::take(&mut self.events)
    }

    #[inline]
    pub fn state(&self, key: TileKey) -> Option<ChunkState> {
        self.cache.state(key)
    }

    #[inline]
    pub fn is_cold(&self, key: TileKey) -> bool {
        self.cache.is_cold(key)
    }

    pub fn mesh(&self, key: TileKey) -> Option<&Arc<TerrainMesh>> {
        self.cache.payload(key)
    }

    #[inline]
    pub fn worker_path_enabled(&self) -> bool {
        self.build.worker_path
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        self.window.grid()
    }

    #[inline]
    pub fn in_flight(&self) -> usize {
        self.build.pending.len()
    }

    #[inline]
    pub fn queue_len(&self) -> usize {
        self.build.queue.len()
    }

    pub fn pool(&self) -> &GeometryPool {
        &self.pool
    }

    pub fn stats(&mut self) -> StreamStats {
        stats::stats(self)
    }
}

#[inline]
pub(crate) fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}
