use std::time::{Duration, Instant};

use crate::streaming::StreamStats;

/// Rolling per-tick timing, reported through `log` every `print_every`.
pub struct TickProf {
    pub tick: u64,
    pub last_print: Instant,
    pub print_every: Duration,

    pub n_ticks: u64,
    pub t_stream: f64,
    pub t_events: f64,

    pub tiles_ready: u64,
    pub tiles_evicted: u64,
    pub props_ready: u64,

    pub max_tick_ms: f64,
}

impl TickProf {
    pub fn new(print_every: Duration) -> Self {
        Self {
            tick: 0,
            last_print: Instant::now(),
            print_every,

            n_ticks: 0,
            t_stream: 0.0,
            t_events: 0.0,

            tiles_ready: 0,
            tiles_evicted: 0,
            props_ready: 0,

            max_tick_ms: 0.0,
        }
    }

    #[inline]
    pub fn mark_ms(t0: Instant) -> f64 {
        t0.elapsed().as_secs_f64() * 1000.0
    }

    #[inline] pub fn stream(&mut self, ms: f64) { self.t_stream += ms; }
    #[inline] pub fn events(&mut self, ms: f64) { self.t_events += ms; }

    pub fn add_tile_events(&mut self, ready: usize, evicted: usize) {
        self.tiles_ready += ready as u64;
        self.tiles_evicted += evicted as u64;
    }

    pub fn add_prop_ready(&mut self, n: usize) {
        self.props_ready += n as u64;
    }

    /// Returns true when a report was emitted; the caller may then log stats.
    pub fn end_tick(&mut self, tick_ms: f64) -> bool {
        self.tick += 1;
        self.n_ticks += 1;
        self.max_tick_ms = self.max_tick_ms.max(tick_ms);

        if self.last_print.elapsed() < self.print_every {
            return false;
        }

        let nt = self.n_ticks.max(1) as f64;
        let avg = |x: f64| x / nt;

        log::info!(
            "[prof] ticks={} avg_tick={:.2}ms max_tick={:.2}ms stream={:.2} events={:.2} \
             ready/tick={:.2} evicted/tick={:.2} prop_chunks/tick={:.2}",
            self.tick,
            avg(self.t_stream + self.t_events),
            self.max_tick_ms,
            avg(self.t_stream),
            avg(self.t_events),
            self.tiles_ready as f64 / nt,
            self.tiles_evicted as f64 / nt,
            self.props_ready as f64 / nt,
        );

        // reset window counters, keep tick + print_every
        self.last_print = Instant::now();
        self.n_ticks = 0;
        self.t_stream = 0.0;
        self.t_events = 0.0;
        self.tiles_ready = 0;
        self.tiles_evicted = 0;
        self.props_ready = 0;
        self.max_tick_ms = 0.0;
        true
    }
}

pub fn log_stream_stats(label: &str, s: &StreamStats) {
    log::info!(
        "[{}] center={:?} live={} cold={} q/b/r={}/{}/{} queue={} in_flight={} worker_path={} \
         builds w/s={}/{} hits={} evict={} destroyed={} stale={} errors={} \
         queue_ms avg/max={:.2}/{:.2} build_ms avg/max={:.2}/{:.2}",
        label,
        s.center,
        s.live,
        s.cold,
        s.st_queued,
        s.st_building,
        s.st_ready,
        s.queue_len,
        s.in_flight,
        s.worker_path,
        s.builds_worker,
        s.builds_sync,
        s.cache_hits,
        s.evictions,
        s.destroyed,
        s.stale_replies,
        s.worker_errors,
        s.queue_ms_avg,
        s.queue_ms_max,
        s.build_ms_avg,
        s.build_ms_max,
    );
}
