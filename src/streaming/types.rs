// src/streaming/types.rs
use std::time::Instant;

/// Integer lattice position of a tile. Keys are always in world tile space;
/// the anchor never changes which key a world position maps to.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct TileKey {
    pub ix: i32,
    pub iz: i32,
}

impl TileKey {
    #[inline(always)]
    pub const fn new(ix: i32, iz: i32) -> Self {
        Self { ix, iz }
    }

    #[inline(always)]
    pub fn offset(self, dx: i32, dz: i32) -> Self {
        Self { ix: self.ix + dx, iz: self.iz + dz }
    }

    /// Chebyshev distance (square rings).
    #[inline(always)]
    pub fn ring_distance(self, other: TileKey) -> i32 {
        (self.ix - other.ix).abs().max((self.iz - other.iz).abs())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub min_x: f64,
    pub min_z: f64,
    pub max_x: f64,
    pub max_z: f64,
}

impl TileBounds {
    #[inline]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[inline]
    pub fn depth(&self) -> f64 {
        self.max_z - self.min_z
    }

    #[inline]
    pub fn contains(&self, x: f64, z: f64) -> bool {
        x >= self.min_x && x < self.max_x && z >= self.min_z && z < self.max_z
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    Queued,
    Building,
    Ready,
}

#[derive(Clone, Copy, Debug)]
pub struct BuildJob {
    pub key: TileKey,
    pub bounds: TileBounds,
    pub enqueued_at: Instant,
    /// Put back after a failed build; dispatched ahead of rank order.
    pub retry: bool,
}

/// Notifications for the renderer. Fire-and-forget.
#[derive(Clone, Debug)]
pub enum StreamEvent<P> {
    TileReady { key: TileKey, payload: P },
    TileEvicted { key: TileKey },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StreamStats {
    pub center: Option<(i32, i32)>,

    pub live: u32,
    pub cold: u32,
    pub st_queued: u32,
    pub st_building: u32,
    pub st_ready: u32,

    pub queue_len: u32,
    pub in_flight: u32,
    pub worker_path: bool,
    pub consecutive_errors: u32,

    pub builds_worker: u64,
    pub builds_sync: u64,
    pub cache_hits: u64,
    pub evictions: u64,
    pub destroyed: u64,
    pub stale_replies: u64,
    pub worker_errors: u64,

    // drained timing window
    pub builds_done: u32,
    pub queue_ms_avg: f64,
    pub queue_ms_max: f64,
    pub build_ms_avg: f64,
    pub build_ms_max: f64,
}
