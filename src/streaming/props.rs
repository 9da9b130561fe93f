// src/streaming/props.rs
//
// Streaming manager for prop placements. Uses the predicted-ahead window and
// builds on the calling thread under the same per-tick budget as terrain.

use std::sync::Arc;
use std::time::Instant;

use glam::{DVec2, DVec3};
use rustc_hash::FxHashMap as HashMap;

use crate::config::{PropsConfig, ScheduleConfig};
use crate::world::placement::{build_chunk_placements, ChunkPlacements, PlacementParams};
use crate::world::{AnchorState, SharedSampler};

use super::cache::ChunkCache;
use super::manager::stats::{fill_common, StreamTimingWindow};
use super::manager::{keep, secs, Counters};
use super::pool::TransformPool;
use super::priority::{rank, TileRing};
use super::queue::{BuildQueue, TickBudget};
use super::tiles::TileGrid;
use super::types::*;
use super::window::WindowTracker;

pub type PropEvent = StreamEvent<Arc<ChunkPlacements>>;

pub struct PropStreamer {
    params: PlacementParams,
    schedule: ScheduleConfig,

    window: WindowTracker,
    cache: ChunkCache<Arc<ChunkPlacements>>,
    queue: BuildQueue,
    pool: TransformPool,
    sampler: SharedSampler,

    events: Vec<PropEvent>,
    counters: Counters,
    ticks: u64,
    timing: StreamTimingWindow,
}

impl PropStreamer {
    pub fn new(grid: TileGrid, props: &PropsConfig, schedule: &ScheduleConfig, sampler: SharedSampler) -> Self {
        Self {
            params: PlacementParams::from(props),
            schedule: schedule.clone(),
            window: WindowTracker::new(grid, props.window.clone()),
            cache: ChunkCache::new(),
            queue: BuildQueue::new(),
            pool: TransformPool::new(crate::config::TRANSFORM_POOL_MAX),
            sampler,
            events: Vec::new(),
            counters: Counters::default(),
            ticks: 0,
            timing: StreamTimingWindow::default(),
        }
    }

    pub fn tick(&mut self, position: DVec3, anchor: &AnchorState, now: Instant) {
        let update = self.window.observe(position, now);

        let sweep_due = self.ticks % self.schedule.sweep_interval_ticks.max(1) == 0;
        if sweep_due || update.is_some() {
            let released = keep::sweep(
                &mut self.cache,
                &mut self.queue,
                &mut self.events,
                &mut self.counters,
                now,
                secs(self.schedule.cold_ttl_s),
            );
            for p in released {
                self.release(p);
            }
        }

        if let Some(update) = update {
            keep::apply_window(
                &mut self.cache,
                &mut self.queue,
                &mut self.events,
                &mut self.counters,
                self.window.grid(),
                &update,
                now,
                secs(self.schedule.evict_delay_s),
            );
        }

        self.drain(anchor, now);
        self.ticks += 1;
    }

    fn drain(&mut self, anchor: &AnchorState, now: Instant) {
        if self.queue.is_empty() {
            return;
        }
        if let Some(center) = self.window.center() {
            let v = self.window.velocity();
            let fwd = DVec2::new(v.x, v.z);
            let window = &self.window;
            self.queue.sort_by_rank(|job| rank(window.ring_of(job.key), job.key, center, fwd));
        }

        let mut budget = TickBudget::from_ms(self.schedule.tick_budget_ms, self.schedule.max_builds_per_tick);
        while budget.allows_another() {
            let Some(job) = self.queue.pop_front() else { break };
            if !self.cache.mark_building(job.key) {
                continue;
            }

            let t_start = Instant::now();
            let placements = build_chunk_placements(
                &self.params,
                &*self.sampler,
                anchor,
                self.window.grid(),
                job.key,
                &mut self.pool,
            );
            let build_ms = t_start.elapsed().as_secs_f64() * 1000.0;
            let queue_ms = t_start.saturating_duration_since(job.enqueued_at).as_secs_f64() * 1000.0;

            self.counters.builds_sync += 1;
            self.timing.record_build(queue_ms, build_ms);
            budget.record_op();

            match self.cache.mount(job.key, Arc::new(placements), now) {
                Ok(()) => {
                    if let Some(payload) = self.cache.payload(job.key) {
                        self.events.push(StreamEvent::TileReady { key: job.key, payload: payload.clone() });
                    }
                }
                Err(p) => self.release(p),
            }
        }
    }

    fn release(&mut self, placements: Arc<ChunkPlacements>) {
        if let Ok(p) = Arc::try_unwrap(placements) {
            p.release_into(&mut self.pool);
        }
    }

    /// Drops every cached placement set; see `TerrainStreamer::invalidate`.
    pub fn invalidate(&mut self) {
        let (released, unmounted) = self.cache.invalidate_all();
        for key in unmounted {
            self.events.push(StreamEvent::TileEvicted { key });
        }
        self.counters.destroyed += released.len() as u64;
        for p in released {
            self.release(p);
        }
        self.queue.clear();
        self.window.invalidate();
    }

    /// Ready placements grouped by the ring their tile currently sits in.
    /// Consumers pick a level of detail per ring; nothing is rebuilt.
    pub fn placements_by_ring(&self) -> HashMap<TileRing, Vec<Arc<ChunkPlacements>>> {
        let mut out: HashMap<TileRing, Vec<Arc<ChunkPlacements>>> = HashMap::default();
        for rec in self.cache.records() {
            if let Some(p) = rec.payload.as_ref() {
                out.entry(self.window.ring_of(rec.key)).or_default().push(p.clone());
            }
        }
        for list in out.values_mut() {
            list.sort_by_key(|p| p.key);
        }
        out
    }

    pub fn placements(&self, key: TileKey) -> Option<&Arc<ChunkPlacements>> {
        self.cache.payload(key)
    }

    #[inline]
    pub fn state(&self, key: TileKey) -> Option<ChunkState> {
        self.cache.state(key)
    }

    pub fn take_events(&mut self) -> Vec<PropEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn stats(&mut self) -> StreamStats {
        let mut s = StreamStats::default();
        fill_common(&mut s, &self.cache, &self.queue, &self.counters, self.window.center(), &mut self.timing);
        s
    }
}
