// Retention bookkeeping shared by both streamers: window reconciliation and
// the throttled sweep. Neither touches buffers; released payloads go back to
// the caller, which owns the pool.

use std::time::{Duration, Instant};

use crate::streaming::cache::ChunkCache;
use crate::streaming::queue::BuildQueue;
use crate::streaming::tiles::TileGrid;
use crate::streaming::types::*;
use crate::streaming::window::WindowUpdate;

use super::Counters;

#[allow(clippy::too_many_arguments)]
pub(crate) fn apply_window<P: Clone>(
    cache: &mut ChunkCache<P>,
    queue: &mut BuildQueue,
    events: &mut Vec<StreamEvent<P>>,
    counters: &mut Counters,
    grid: &TileGrid,
    update: &WindowUpdate,
    now: Instant,
    evict_delay: Duration,
) {
    let diff = cache.apply_window(&update.required, &update.retained, now, evict_delay);

    for key in diff.restored {
        counters.cache_hits += 1;
        if let Some(payload) = cache.payload(key) {
            log::debug!("stream: {:?} restored from cold", key);
            events.push(StreamEvent::TileReady { key, payload: payload.clone() });
        }
    }

    for key in diff.to_build {
        queue.push_back(BuildJob { key, bounds: grid.tile_bounds(key), enqueued_at: now, retry: false });
    }
}

pub(crate) fn sweep<P>(
    cache: &mut ChunkCache<P>,
    queue: &mut BuildQueue,
    events: &mut Vec<StreamEvent<P>>,
    counters: &mut Counters,
    now: Instant,
    cold_ttl: Duration,
) -> Vec<P> {
    let swept = cache.sweep(now, cold_ttl);

    for key in swept.cancelled {
        // queued jobs die here for free; building ones are refused on reply
        queue.remove(key);
    }
    if !swept.evicted.is_empty() {
        log::debug!("stream: {} tiles moved to cold", swept.evicted.len());
    }
    for key in swept.evicted {
        counters.evictions += 1;
        events.push(StreamEvent::TileEvicted { key });
    }
    counters.destroyed += swept.released.len() as u64;
    swept.released
}
