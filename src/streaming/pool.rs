// src/streaming/pool.rs
//
// Buffer arenas for streamed payloads. Only the controlling thread touches
// these; workers receive buffers by value inside a request and hand them back
// inside the reply.

use std::sync::Arc;

use rustc_hash::FxHashMap as HashMap;

use crate::world::placement::PropTransform;
use crate::world::terrain::grid_indices;

/// Per-vertex float buffers for one terrain tile (xyz per vertex).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeometryBuffers {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
}

impl GeometryBuffers {
    pub fn with_vertices(vertex_count: usize) -> Self {
        Self { positions: vec![0.0; vertex_count * 3], normals: vec![0.0; vertex_count * 3] }
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Resizes both buffers to exactly `vertex_count` vertices.
    pub fn reshape(&mut self, vertex_count: usize) {
        self.positions.resize(vertex_count * 3, 0.0);
        self.normals.resize(vertex_count * 3, 0.0);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub allocated: u64,
    pub reused: u64,
    pub returned: u64,
    pub dropped: u64,
}

/// Geometry arena keyed by vertex count, plus the shared index buffers.
pub struct GeometryPool {
    free: HashMap<usize, Vec<GeometryBuffers>>,
    indices: HashMap<u32, Arc<[u32]>>,
    max_per_shape: usize,
    stats: PoolStats,
}

impl GeometryPool {
    pub fn new(max_per_shape: usize) -> Self {
        Self { free: HashMap::default(), indices: HashMap::default(), max_per_shape, stats: PoolStats::default() }
    }

    pub fn acquire(&mut self, vertex_count: usize) -> GeometryBuffers {
        if let Some(buf) = self.free.get_mut(&vertex_count).and_then(Vec::pop) {
            self.stats.reused += 1;
            return buf;
        }
        self.stats.allocated += 1;
        GeometryBuffers::with_vertices(vertex_count)
    }

    /// Returns buffers to the free list for their shape. Buffers whose
    /// position/normal lengths disagree are dropped.
    pub fn release(&mut self, buffers: GeometryBuffers) {
        if buffers.positions.len() != buffers.normals.len() || buffers.positions.len() % 3 != 0 {
            self.stats.dropped += 1;
            return;
        }
        let list = self.free.entry(buffers.vertex_count()).or_default();
        if list.len() >= self.max_per_shape {
            self.stats.dropped += 1;
            return;
        }
        list.push(buffers);
        self.stats.returned += 1;
    }

    #[inline]
    pub fn free_count(&self, vertex_count: usize) -> usize {
        self.free.get(&vertex_count).map_or(0, Vec::len)
    }

    /// Triangle list for a `resolution`-segment grid, built once and shared.
    pub fn indices(&mut self, resolution: u32) -> Arc<[u32]> {
        self.indices.entry(resolution).or_insert_with(|| grid_indices(resolution).into()).clone()
    }

    #[inline]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }
}

/// Fixed-size free list of transform vectors.
pub struct TransformPool {
    free: Vec<Vec<PropTransform>>,
    max: usize,
}

impl TransformPool {
    pub fn new(max: usize) -> Self {
        Self { free: Vec::new(), max }
    }

    /// An empty vector with at least `capacity` reserved.
    pub fn acquire(&mut self, capacity: usize) -> Vec<PropTransform> {
        let mut v = self.free.pop().unwrap_or_default();
        v.reserve(capacity);
        v
    }

    pub fn release(&mut self, mut v: Vec<PropTransform>) {
        if self.free.len() >= self.max {
            return;
        }
        v.clear();
        self.free.push(v);
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
