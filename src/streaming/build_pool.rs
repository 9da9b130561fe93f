// src/streaming/build_pool.rs
use once_cell::sync::Lazy;
use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use std::cell::RefCell;

use crate::config;
use crate::streaming::pool::GeometryBuffers;
use crate::streaming::types::TileBounds;
use crate::world::terrain::{build_tile_geometry, LatticeScratch, TileGeometry};
use crate::world::{AnchorState, HeightSampler};

thread_local! {
    static TLS_SCRATCH: RefCell<Vec<LatticeScratch>> = RefCell::new(Vec::new());
}

pub static BUILD_POOL: Lazy<ThreadPool> = Lazy::new(|| {
    ThreadPoolBuilder::new()
        .num_threads(config::WORKER_THREADS)
        .thread_name(|i| format!("tile-build-{}", i))
        .build()
        .expect("failed to build tile build thread pool")
});

pub fn build_tile_geometry_tls(
    sampler: &dyn HeightSampler,
    anchor: &AnchorState,
    bounds: TileBounds,
    resolution: u32,
    buffers: GeometryBuffers,
) -> TileGeometry {
    // Take a scratch out of TLS WITHOUT holding the RefCell borrow during the build.
    let mut scratch = TLS_SCRATCH.with(|cell| cell.borrow_mut().pop().unwrap_or_default());

    let out = build_tile_geometry(sampler, anchor, bounds, resolution, buffers, &mut scratch);

    TLS_SCRATCH.with(|cell| {
        cell.borrow_mut().push(scratch);
    });

    out
}
