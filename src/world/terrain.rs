// src/world/terrain.rs
//
// Terrain tile builder: samples the height function on a regular lattice and
// emits positions, lattice normals and exact bounds for one tile.

use std::sync::Arc;

use glam::Vec3;
use rayon::prelude::*;

use crate::error::BuildError;
use crate::streaming::pool::GeometryBuffers;
use crate::streaming::types::{TileBounds, TileKey};

use super::anchor::AnchorState;
use super::sampler::{sample_world, HeightSampler};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

/// Output of one tile build. Buffers hold `vertex_count(resolution)` xyz
/// triples each.
#[derive(Clone, Debug)]
pub struct TileGeometry {
    pub buffers: GeometryBuffers,
    pub bounding_box: Aabb,
    pub bounding_sphere: BoundingSphere,
    pub min_height: f64,
    pub max_height: f64,
}

/// Mounted terrain payload.
#[derive(Debug)]
pub struct TerrainMesh {
    pub key: TileKey,
    pub resolution: u32,
    pub geometry: TileGeometry,
    /// Shared by every tile of the same resolution.
    pub indices: Arc<[u32]>,
}

/// Reusable height lattice.
#[derive(Default)]
pub struct LatticeScratch {
    heights: Vec<f64>,
}

impl LatticeScratch {
    pub fn new() -> Self {
        Self::default()
    }
}

#[inline]
pub fn vertex_count(resolution: u32) -> usize {
    let n = resolution.max(1) as usize + 1;
    n * n
}

/// Float count of a position (or normal) buffer.
#[inline]
pub fn expected_len(resolution: u32) -> usize {
    vertex_count(resolution) * 3
}

/// Buffer lengths in a build reply must match the resolution exactly.
pub fn validate_lengths(resolution: u32, positions: usize, normals: usize) -> Result<(), BuildError> {
    let expected = expected_len(resolution);
    if positions != expected {
        return Err(BuildError::LengthMismatch { expected, actual: positions });
    }
    if normals != expected {
        return Err(BuildError::LengthMismatch { expected, actual: normals });
    }
    Ok(())
}

/// Two triangles per cell, counter-clockwise seen from +y.
pub fn grid_indices(resolution: u32) -> Vec<u32> {
    let r = resolution.max(1);
    let n = r + 1;
    let mut out = Vec::with_capacity((r * r * 6) as usize);
    for j in 0..r {
        for i in 0..r {
            let a = j * n + i;
            let b = a + 1;
            let c = a + n;
            let d = c + 1;
            out.extend_from_slice(&[a, c, b, b, c, d]);
        }
    }
    out
}

// Lattice coordinate `i` of `r` along [lo, hi]; the last one is `hi` exactly
// so neighbouring tiles share edge vertices bit-for-bit.
#[inline]
fn lattice_coord(lo: f64, hi: f64, i: usize, r: usize) -> f64 {
    if i == r {
        hi
    } else {
        lo + (hi - lo) * (i as f64 / r as f64)
    }
}

pub fn build_tile_geometry(
    sampler: &dyn HeightSampler,
    anchor: &AnchorState,
    bounds: TileBounds,
    resolution: u32,
    mut buffers: GeometryBuffers,
    scratch: &mut LatticeScratch,
) -> TileGeometry {
    let r = resolution.max(1) as usize;
    let n = r + 1;

    buffers.reshape(n * n);
    scratch.heights.resize(n * n, 0.0);

    // 1) heights, one lattice row per task
    scratch.heights.par_chunks_mut(n).enumerate().for_each(|(j, row)| {
        let z = lattice_coord(bounds.min_z, bounds.max_z, j, r);
        for (i, h) in row.iter_mut().enumerate() {
            let x = lattice_coord(bounds.min_x, bounds.max_x, i, r);
            *h = sample_world(sampler, anchor, x, z);
        }
    });
    let heights = &scratch.heights;

    let (min_h, max_h) =
        heights.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)));

    // 2) positions + central-difference normals
    let dx = bounds.width() / r as f64;
    let dz = bounds.depth() / r as f64;
    let at = |i: usize, j: usize| heights[j * n + i];

    for j in 0..n {
        let z = lattice_coord(bounds.min_z, bounds.max_z, j, r);
        for i in 0..n {
            let x = lattice_coord(bounds.min_x, bounds.max_x, i, r);
            let v = (j * n + i) * 3;

            buffers.positions[v] = x as f32;
            buffers.positions[v + 1] = at(i, j) as f32;
            buffers.positions[v + 2] = z as f32;

            let (i0, i1) = (i.saturating_sub(1), (i + 1).min(r));
            let (j0, j1) = (j.saturating_sub(1), (j + 1).min(r));
            let dhdx = (at(i1, j) - at(i0, j)) / ((i1 - i0) as f64 * dx);
            let dhdz = (at(i, j1) - at(i, j0)) / ((j1 - j0) as f64 * dz);

            let nrm = Vec3::new(-dhdx as f32, 1.0, -dhdz as f32).normalize_or_zero();
            buffers.normals[v] = nrm.x;
            buffers.normals[v + 1] = nrm.y;
            buffers.normals[v + 2] = nrm.z;
        }
    }

    // 3) bounds from the known extent, no second pass over the buffers
    let bounding_box = Aabb {
        min: Vec3::new(bounds.min_x as f32, min_h as f32, bounds.min_z as f32),
        max: Vec3::new(bounds.max_x as f32, max_h as f32, bounds.max_z as f32),
    };
    let bounding_sphere =
        BoundingSphere { center: bounding_box.center(), radius: bounding_box.half_extent().length() };

    TileGeometry { buffers, bounding_box, bounding_sphere, min_height: min_h, max_height: max_h }
}
