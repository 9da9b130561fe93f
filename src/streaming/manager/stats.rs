// src/streaming/manager/stats.rs
use crate::streaming::cache::ChunkCache;
use crate::streaming::queue::BuildQueue;
use crate::streaming::types::*;

use super::{Counters, TerrainStreamer};

#[derive(Clone, Debug, Default)]
pub struct StreamTimingWindow {
    pub builds_done: u32,

    pub queue_ms_sum: f64,
    pub queue_ms_max: f64,

    pub build_ms_sum: f64,
    pub build_ms_max: f64,
}

impl StreamTimingWindow {
    #[inline]
    pub fn record_build(&mut self, queue_ms: f64, build_ms: f64) {
        self.builds_done += 1;

        self.queue_ms_sum += queue_ms;
        self.queue_ms_max = self.queue_ms_max.max(queue_ms);

        self.build_ms_sum += build_ms;
        self.build_ms_max = self.build_ms_max.max(build_ms);
    }

    #[inline]
    pub fn drain(&mut self) -> Self {
        std::mem::take(self)
    }
}

pub(crate) fn fill_common<P>(
    s: &mut StreamStats,
    cache: &ChunkCache<P>,
    queue: &BuildQueue,
    counters: &Counters,
    center: Option<TileKey>,
    timing: &mut StreamTimingWindow,
) {
    s.center = center.map(|c| (c.ix, c.iz));
    s.live = cache.live_len() as u32;
    s.cold = cache.cold_len() as u32;

    for r in cache.records() {
        match r.state {
            ChunkState::Queued => s.st_queued += 1,
            ChunkState::Building => s.st_building += 1,
            ChunkState::Ready => s.st_ready += 1,
        }
    }
    s.queue_len = queue.len() as u32;

    s.builds_worker = counters.builds_worker;
    s.builds_sync = counters.builds_sync;
    s.cache_hits = counters.cache_hits;
    s.evictions = counters.evictions;
    s.destroyed = counters.destroyed;
    s.stale_replies = counters.stale_replies;
    s.worker_errors = counters.worker_errors;

    // Drain timing window (only called on stats cadence)
    let w = timing.drain();
    s.builds_done = w.builds_done;
    if w.builds_done > 0 {
        let n = w.builds_done as f64;
        s.queue_ms_avg = w.queue_ms_sum / n;
        s.queue_ms_max = w.queue_ms_max;
        s.build_ms_avg = w.build_ms_sum / n;
        s.build_ms_max = w.build_ms_max;
    }
}

pub fn stats(mgr: &mut TerrainStreamer) -> StreamStats {
    let mut s = StreamStats::default();
    fill_common(&mut s, &mgr.cache, &mgr.build.queue, &mgr.counters, mgr.window.center(), &mut mgr.timing);

    s.in_flight = mgr.build.pending.len() as u32;
    s.worker_path = mgr.build.worker_path;
    s.consecutive_errors = mgr.build.consecutive_errors;
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_window_drains() {
        let mut w = StreamTimingWindow::default();
        w.record_build(1.0, 4.0);
        w.record_build(3.0, 2.0);

        let d = w.drain();
        assert_eq!(d.builds_done, 2);
        assert_eq!(d.queue_ms_sum, 4.0);
        assert_eq!(d.build_ms_max, 4.0);
        assert_eq!(w.builds_done, 0);
    }
}
