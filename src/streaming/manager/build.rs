use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::DVec2;

use crate::error::BuildError;
use crate::streaming::pool::GeometryPool;
use crate::streaming::priority::rank;
use crate::streaming::queue::TickBudget;
use crate::streaming::types::*;
use crate::streaming::workers::{BuildRequest, WorkerReply};
use crate::world::terrain::{build_tile_geometry, validate_lengths, vertex_count, TerrainMesh, TileGeometry};
use crate::world::AnchorState;

use super::{PendingJob, TerrainStreamer};

#[inline]
fn ms_since(t: Instant) -> f64 {
    Instant::now().saturating_duration_since(t).as_secs_f64() * 1000.0
}

/// Returns a mesh's buffers to the pool, unless someone else still holds it.
pub(crate) fn release_mesh(pool: &mut GeometryPool, mesh: Arc<TerrainMesh>) {
    if let Ok(mesh) = Arc::try_unwrap(mesh) {
        pool.release(mesh.geometry.buffers);
    }
}

#[inline]
fn requeue_front(mgr: &mut TerrainStreamer, key: TileKey, now: Instant) {
    if mgr.cache.requeue(key) {
        let bounds = mgr.window.grid().tile_bounds(key);
        mgr.build.queue.push_front(BuildJob { key, bounds, enqueued_at: now, retry: true });
    }
}

/// Rank order, recomputed against the current window before each drain.
/// Retries stay at the front.
fn sort_queue(mgr: &mut TerrainStreamer) {
    let Some(center) = mgr.window.center() else { return };
    let v = mgr.window.velocity();
    let fwd = DVec2::new(v.x, v.z);
    let window = &mgr.window;
    mgr.build.queue.sort_by_rank(|job| (!job.retry, rank(window.ring_of(job.key), job.key, center, fwd)));
}

pub fn dispatch_builds(mgr: &mut TerrainStreamer, anchor: &AnchorState, now: Instant) {
    if mgr.build.queue.is_empty() {
        return;
    }
    sort_queue(mgr);

    let mut budget = TickBudget::from_ms(mgr.schedule.tick_budget_ms, mgr.schedule.max_builds_per_tick);
    let mut deferred = Vec::new();

    while budget.allows_another() {
        let use_worker = mgr.build.worker_path && mgr.build.workers.is_some();

        // backpressure: wait for replies rather than oversubscribe
        if use_worker && mgr.build.pending.len() >= mgr.schedule.max_in_flight {
            break;
        }

        let Some(job) = mgr.build.queue.pop_front() else { break };

        if mgr.cache.state(job.key) != Some(ChunkState::Queued) {
            continue;
        }
        // an older request for this key is still out; its reply must land first
        if mgr.build.pending.contains_key(&job.key) {
            deferred.push(job);
            continue;
        }

        if use_worker {
            if !dispatch_to_worker(mgr, job, anchor, now) {
                break;
            }
        } else {
            build_sync(mgr, job, anchor, now);
        }
        budget.record_op();
    }

    for job in deferred {
        mgr.build.queue.push_back(job);
    }
}

fn dispatch_to_worker(mgr: &mut TerrainStreamer, job: BuildJob, anchor: &AnchorState, now: Instant) -> bool {
    let Some(workers) = mgr.build.workers.as_mut() else { return false };

    let ticket = mgr.build.next_ticket;
    let req = BuildRequest {
        ticket,
        key: job.key,
        resolution: mgr.resolution,
        bounds: job.bounds,
        anchor: *anchor,
        buffers: mgr.pool.acquire(vertex_count(mgr.resolution)),
        enqueued_at: job.enqueued_at,
    };

    match workers.submit(req) {
        Ok(()) => {
            mgr.build.next_ticket += 1;
            mgr.cache.mark_building(job.key);
            mgr.build
                .pending
                .insert(job.key, PendingJob { ticket, dispatched_at: now, enqueued_at: job.enqueued_at });
            true
        }
        Err(req) => {
            // channel full: keep the job at the head and retry next tick
            mgr.pool.release(req.buffers);
            mgr.build.queue.push_front(job);
            false
        }
    }
}

/// Main-thread build. Never interrupted once started.
fn build_sync(mgr: &mut TerrainStreamer, job: BuildJob, anchor: &AnchorState, now: Instant) {
    mgr.cache.mark_building(job.key);

    let t_start = Instant::now();
    let queue_ms = ms_since(job.enqueued_at);
    let buffers = mgr.pool.acquire(vertex_count(mgr.resolution));
    let geometry =
        build_tile_geometry(&*mgr.sampler, anchor, job.bounds, mgr.resolution, buffers, &mut mgr.build.scratch);
    let build_ms = ms_since(t_start);

    mgr.counters.builds_sync += 1;
    mgr.timing.record_build(queue_ms, build_ms);
    mount(mgr, job.key, geometry, now);
}

fn mount(mgr: &mut TerrainStreamer, key: TileKey, geometry: TileGeometry, now: Instant) {
    let mesh = Arc::new(TerrainMesh {
        key,
        resolution: mgr.resolution,
        geometry,
        indices: mgr.pool.indices(mgr.resolution),
    });

    match mgr.cache.mount(key, mesh, now) {
        Ok(()) => {
            if let Some(payload) = mgr.cache.payload(key) {
                mgr.events.push(StreamEvent::TileReady { key, payload: payload.clone() });
            }
        }
        Err(mesh) => {
            // evicted or superseded while building
            mgr.counters.stale_replies += 1;
            log::trace!("terrain: discarding build for {:?}, no longer building", key);
            release_mesh(&mut mgr.pool, mesh);
        }
    }
}

pub fn harvest_replies(mgr: &mut TerrainStreamer, anchor: &AnchorState, now: Instant) {
    let Some(workers) = mgr.build.workers.as_mut() else { return };

    let max_done = (mgr.schedule.max_in_flight * 2).max(16);
    let replies: Vec<WorkerReply> = std::iter::from_fn(|| workers.poll()).take(max_done).collect();

    for reply in replies {
        let key = reply.key();

        // Drop stale completions (ticket no longer pending for this key)
        let current = mgr.build.pending.get(&key).map(|p| p.ticket);
        if current != Some(reply.ticket()) {
            mgr.counters.stale_replies += 1;
            log::trace!("terrain: stale reply for {:?} (ticket {})", key, reply.ticket());
            if let WorkerReply::BuildComplete { geometry, .. } = reply {
                mgr.pool.release(geometry.buffers);
            }
            continue;
        }
        mgr.build.pending.remove(&key);

        match reply {
            WorkerReply::BuildComplete { anchor_epoch, geometry, queue_ms, build_ms, .. } => {
                if anchor_epoch != anchor.epoch {
                    mgr.counters.stale_replies += 1;
                    log::trace!("terrain: reply for {:?} built under anchor epoch {}", key, anchor_epoch);
                    mgr.pool.release(geometry.buffers);
                    requeue_front(mgr, key, now);
                    continue;
                }

                let b = &geometry.buffers;
                if let Err(e) = validate_lengths(mgr.resolution, b.positions.len(), b.normals.len()) {
                    on_worker_error(mgr, key, e, now);
                    continue;
                }

                mgr.build.consecutive_errors = 0;
                mgr.counters.builds_worker += 1;
                mgr.timing.record_build(queue_ms, build_ms);
                mount(mgr, key, geometry, now);
            }
            WorkerReply::BuildError { reason, .. } => {
                on_worker_error(mgr, key, BuildError::Worker { key, reason }, now);
            }
        }
    }
}

/// Applies the optional per-job deadline.
pub fn expire_pending(mgr: &mut TerrainStreamer, now: Instant) {
    let Some(ms) = mgr.schedule.worker_timeout_ms else { return };
    let limit = Duration::from_millis(ms);

    let expired: Vec<TileKey> = mgr
        .build
        .pending
        .iter()
        .filter(|(_, p)| now.saturating_duration_since(p.dispatched_at) >= limit)
        .map(|(k, _)| *k)
        .collect();

    for key in expired {
        // a breaker trip earlier in this loop may have flushed it already
        if mgr.build.pending.remove(&key).is_none() {
            continue;
        }
        on_worker_error(mgr, key, BuildError::Timeout { key }, now);
    }
}

fn on_worker_error(mgr: &mut TerrainStreamer, key: TileKey, err: BuildError, now: Instant) {
    log::warn!("terrain: worker build failed: {}", err);

    mgr.counters.worker_errors += 1;
    mgr.build.consecutive_errors += 1;
    requeue_front(mgr, key, now);

    if mgr.build.worker_path && mgr.build.consecutive_errors >= mgr.schedule.max_consecutive_errors {
        trip_breaker(mgr, now);
    }
}

/// Disables the worker path for the session and pulls every in-flight job
/// back into the queue for the synchronous path.
fn trip_breaker(mgr: &mut TerrainStreamer, now: Instant) {
    mgr.build.worker_path = false;
    log::error!(
        "terrain: {} consecutive worker errors, falling back to main-thread builds for this session",
        mgr.build.consecutive_errors
    );

    let pending: Vec<(TileKey, PendingJob)> = mgr.build.pending.drain().collect();
    for (key, _) in pending {
        requeue_front(mgr, key, now);
    }
}
