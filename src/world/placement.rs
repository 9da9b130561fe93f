// src/world/placement.rs
//
// Procedural placement builder.
//
// Placement for a chunk is a pure function of its sample-space chunk key, the
// global seed and the category parameters. Points are drawn in chunk-local
// coordinates inset by each category's radius, so two chunks can never place
// same-category props closer than the spacing across their shared edge.

use std::f32::consts::TAU;

use bytemuck::{Pod, Zeroable};
use glam::{DVec2, Mat4, Quat, Vec3};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rustc_hash::FxHashMap as HashMap;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::streaming::pool::TransformPool;
use crate::streaming::tiles::TileGrid;
use crate::streaming::types::TileKey;

use super::anchor::AnchorState;
use super::hash::{category_seed, chunk_seed};
use super::sampler::HeightSampler;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PropCategory {
    pub name: String,
    /// Props requested per chunk. A soft target.
    pub target_count: u32,
    /// Keep-out radius. Two props of this category end up at least
    /// `2 * min_radius` apart.
    pub min_radius: f64,
    pub scale_min: f32,
    pub scale_max: f32,
    /// Max tilt (radians) about x and z. Zero keeps the prop upright.
    pub max_tilt: f32,
    /// Lowest y of the prop's local bounding box at scale 1.
    pub local_min_y: f32,
}

impl Default for PropCategory {
    fn default() -> Self {
        Self {
            name: String::from("prop"),
            target_count: 8,
            min_radius: 1.0,
            scale_min: 1.0,
            scale_max: 1.0,
            max_tilt: 0.0,
            local_min_y: 0.0,
        }
    }
}

impl PropCategory {
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                name: "tree".into(),
                target_count: 12,
                min_radius: 3.0,
                scale_min: 0.8,
                scale_max: 1.3,
                max_tilt: 0.0,
                local_min_y: -0.2,
            },
            Self {
                name: "rock".into(),
                target_count: 20,
                min_radius: 1.0,
                scale_min: 0.5,
                scale_max: 1.5,
                max_tilt: 0.25,
                local_min_y: -0.4,
            },
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |reason| Err(ConfigError::InvalidCategory { name: self.name.clone(), reason });
        if self.name.is_empty() {
            return bad("empty name");
        }
        if !self.min_radius.is_finite() || self.min_radius <= 0.0 {
            return bad("min_radius must be > 0");
        }
        if !(self.scale_min > 0.0 && self.scale_min <= self.scale_max && self.scale_max.is_finite()) {
            return bad("scale range must satisfy 0 < scale_min <= scale_max");
        }
        if !(self.max_tilt >= 0.0 && self.max_tilt.is_finite()) {
            return bad("max_tilt must be >= 0");
        }
        Ok(())
    }

    #[inline]
    pub fn spacing(&self) -> f64 {
        2.0 * self.min_radius
    }
}

/// Keep-out area, in sample space.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ExclusionZone {
    Circle { x: f64, z: f64, radius: f64 },
    Rect { min_x: f64, min_z: f64, max_x: f64, max_z: f64 },
}

impl ExclusionZone {
    #[inline]
    pub fn contains(&self, x: f64, z: f64) -> bool {
        match *self {
            ExclusionZone::Circle { x: cx, z: cz, radius } => {
                let (dx, dz) = (x - cx, z - cz);
                dx * dx + dz * dz <= radius * radius
            }
            ExclusionZone::Rect { min_x, min_z, max_x, max_z } => {
                x >= min_x && x <= max_x && z >= min_z && z <= max_z
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct PlacementParams {
    pub seed: u64,
    /// Draws per requested prop.
    pub oversample: u32,
    pub categories: Vec<PropCategory>,
    pub exclusions: Vec<ExclusionZone>,
}

impl From<&crate::config::PropsConfig> for PlacementParams {
    fn from(c: &crate::config::PropsConfig) -> Self {
        Self {
            seed: c.seed,
            oversample: c.oversample,
            categories: c.categories.clone(),
            exclusions: c.exclusions.clone(),
        }
    }
}

/// One prop instance. Plain old data so lists can be compared or uploaded
/// byte-for-byte.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct PropTransform {
    pub translation: [f32; 3],
    pub yaw: f32,
    /// Tilt about x, then z (radians).
    pub tilt: [f32; 2],
    pub scale: f32,
    pub _pad: f32,
}

impl PropTransform {
    pub fn matrix(&self) -> Mat4 {
        let rot = Quat::from_rotation_y(self.yaw)
            * Quat::from_rotation_x(self.tilt[0])
            * Quat::from_rotation_z(self.tilt[1]);
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), rot, Vec3::from(self.translation))
    }
}

#[derive(Clone, Debug, Default)]
pub struct CategoryPlacements {
    pub name: String,
    pub requested: u32,
    pub attempts: u32,
    pub transforms: Vec<PropTransform>,
}

#[derive(Clone, Debug)]
pub struct ChunkPlacements {
    pub key: TileKey,
    /// Key the seed was derived from.
    pub sample_key: TileKey,
    pub categories: Vec<CategoryPlacements>,
}

impl ChunkPlacements {
    pub fn total(&self) -> usize {
        self.categories.iter().map(|c| c.transforms.len()).sum()
    }

    /// Hands every transform vector back to `pool`.
    pub fn release_into(self, pool: &mut TransformPool) {
        for c in self.categories {
            pool.release(c.transforms);
        }
    }
}

/// Uniform grid over accepted points, cell size = spacing.
struct SpatialHash {
    cell: f64,
    cells: HashMap<(i32, i32), Vec<DVec2>>,
}

impl SpatialHash {
    fn new(cell: f64) -> Self {
        Self { cell, cells: HashMap::default() }
    }

    #[inline]
    fn cell_of(&self, p: DVec2) -> (i32, i32) {
        ((p.x / self.cell).floor() as i32, (p.y / self.cell).floor() as i32)
    }

    /// True if no stored point lies strictly closer than `min_dist`.
    fn is_clear(&self, p: DVec2, min_dist: f64) -> bool {
        let (cx, cz) = self.cell_of(p);
        let d2 = min_dist * min_dist;
        for dz in -1..=1 {
            for dx in -1..=1 {
                let Some(pts) = self.cells.get(&(cx + dx, cz + dz)) else { continue };
                if pts.iter().any(|q| q.distance_squared(p) < d2) {
                    return false;
                }
            }
        }
        true
    }

    fn insert(&mut self, p: DVec2) {
        let c = self.cell_of(p);
        self.cells.entry(c).or_default().push(p);
    }
}

/// Builds placements for world tile `key`.
pub fn build_chunk_placements(
    params: &PlacementParams,
    sampler: &dyn HeightSampler,
    anchor: &AnchorState,
    grid: &TileGrid,
    key: TileKey,
    pool: &mut TransformPool,
) -> ChunkPlacements {
    let bounds = grid.tile_bounds(key);
    let (smin_x, smin_z) = anchor.to_sample_space(bounds.min_x, bounds.min_z);
    let sample_key = grid.world_to_tile(smin_x, smin_z);
    let seed = chunk_seed(params.seed, sample_key.ix, sample_key.iz);

    let (w, d) = (bounds.width(), bounds.depth());
    let mut categories = Vec::with_capacity(params.categories.len());

    for (idx, cat) in params.categories.iter().enumerate() {
        let mut rng = SmallRng::seed_from_u64(category_seed(seed, idx));
        let mut out = CategoryPlacements {
            name: cat.name.clone(),
            requested: cat.target_count,
            attempts: 0,
            transforms: pool.acquire(cat.target_count as usize),
        };

        let inset = cat.min_radius;
        let (span_x, span_z) = (w - 2.0 * inset, d - 2.0 * inset);
        if cat.target_count == 0 || span_x <= 0.0 || span_z <= 0.0 {
            if cat.target_count > 0 {
                log::debug!("placement: {} does not fit in tile {:?} (radius {})", cat.name, key, cat.min_radius);
            }
            categories.push(out);
            continue;
        }

        let spacing = cat.spacing();
        let mut hash = SpatialHash::new(spacing);
        let budget = cat.target_count.saturating_mul(params.oversample.max(1));

        while out.attempts < budget && (out.transforms.len() as u32) < cat.target_count {
            out.attempts += 1;

            let lx = inset + rng.gen::<f64>() * span_x;
            let lz = inset + rng.gen::<f64>() * span_z;
            let local = DVec2::new(lx, lz);
            let (sx, sz) = (smin_x + lx, smin_z + lz);

            if params.exclusions.iter().any(|z| z.contains(sx, sz)) {
                continue;
            }
            if !hash.is_clear(local, spacing) {
                continue;
            }

            let (wx, wz) = (bounds.min_x + lx, bounds.min_z + lz);
            let h = sampler.height(sx, sz);

            let yaw = rng.gen_range(0.0..TAU);
            let tilt = if cat.max_tilt > 0.0 {
                [rng.gen_range(-cat.max_tilt..=cat.max_tilt), rng.gen_range(-cat.max_tilt..=cat.max_tilt)]
            } else {
                [0.0; 2]
            };
            let scale = rng.gen_range(cat.scale_min..=cat.scale_max);
            // sit the bottom of the local box on the surface
            let y = h as f32 - cat.local_min_y * scale;

            out.transforms.push(PropTransform {
                translation: [wx as f32, y, wz as f32],
                yaw,
                tilt,
                scale,
                _pad: 0.0,
            });
            hash.insert(local);
        }

        if (out.transforms.len() as u32) < cat.target_count {
            log::debug!(
                "placement: {} shortfall in tile {:?}: {}/{} after {} draws",
                cat.name,
                key,
                out.transforms.len(),
                cat.target_count,
                out.attempts
            );
        }
        categories.push(out);
    }

    ChunkPlacements { key, sample_key, categories }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    use crate::world::anchor::CoordinateAnchor;

    fn params() -> PlacementParams {
        PlacementParams {
            seed: 1234,
            oversample: 60,
            categories: PropCategory::defaults(),
            exclusions: Vec::new(),
        }
    }

    fn ground(x: f64, z: f64) -> f64 {
        (x * 0.05).sin() * 3.0 + (z * 0.07).cos() * 2.0
    }

    fn build(p: &PlacementParams, anchor: &AnchorState, key: TileKey) -> ChunkPlacements {
        let grid = TileGrid::new(64.0, 0.0, 0.0);
        build_chunk_placements(p, &ground, anchor, &grid, key, &mut TransformPool::new(4))
    }

    #[test]
    fn identical_inputs_give_identical_bytes() {
        let p = params();
        let a = build(&p, &AnchorState::default(), TileKey::new(3, -7));
        let b = build(&p, &AnchorState::default(), TileKey::new(3, -7));
        assert!(a.total() > 0);
        for (ca, cb) in a.categories.iter().zip(&b.categories) {
            assert_eq!(
                bytemuck::cast_slice::<PropTransform, u8>(&ca.transforms),
                bytemuck::cast_slice::<PropTransform, u8>(&cb.transforms)
            );
        }

        let other = build(&p, &AnchorState::default(), TileKey::new(4, -7));
        assert_ne!(a.categories[0].transforms, other.categories[0].transforms);
    }

    #[test]
    fn spacing_holds_across_neighbouring_chunks() {
        let p = params();
        let mut all: Vec<Vec<DVec2>> = vec![Vec::new(); p.categories.len()];
        for iz in -1..=1 {
            for ix in -1..=1 {
                let c = build(&p, &AnchorState::default(), TileKey::new(ix, iz));
                for (i, cat) in c.categories.iter().enumerate() {
                    all[i].extend(cat.transforms.iter().map(|t| DVec2::new(t.translation[0] as f64, t.translation[2] as f64)));
                }
            }
        }

        for (i, pts) in all.iter().enumerate() {
            // f32 output; allow rounding slack
            let min = p.categories[i].spacing() - 1e-3;
            for a in 0..pts.len() {
                for b in (a + 1)..pts.len() {
                    assert!(pts[a].distance(pts[b]) >= min, "{} too close", p.categories[i].name);
                }
            }
        }
    }

    #[test]
    fn props_sit_on_the_surface() {
        let p = params();
        let c = build(&p, &AnchorState::default(), TileKey::new(0, 0));
        for (cat, out) in p.categories.iter().zip(&c.categories) {
            for t in &out.transforms {
                let h = ground(t.translation[0] as f64, t.translation[2] as f64) as f32;
                let bottom = t.translation[1] + cat.local_min_y * t.scale;
                assert!((bottom - h).abs() < 1e-2);
                assert!(t.scale >= cat.scale_min && t.scale <= cat.scale_max);
                assert!(t.yaw >= 0.0 && t.yaw < TAU);
                if cat.max_tilt == 0.0 {
                    assert_eq!(t.tilt, [0.0, 0.0]);
                }
            }
        }
    }

    #[test]
    fn exclusion_zones_are_respected() {
        let mut p = params();
        p.exclusions = vec![
            ExclusionZone::Circle { x: 32.0, z: 32.0, radius: 20.0 },
            ExclusionZone::Rect { min_x: 0.0, min_z: 0.0, max_x: 64.0, max_z: 8.0 },
        ];
        let c = build(&p, &AnchorState::default(), TileKey::new(0, 0));
        for t in c.categories.iter().flat_map(|c| &c.transforms) {
            let (x, z) = (t.translation[0] as f64, t.translation[2] as f64);
            assert!(!p.exclusions.iter().any(|e| e.contains(x, z)));
        }
    }

    #[test]
    fn dense_request_is_a_soft_shortfall() {
        let mut p = params();
        p.categories = vec![PropCategory { name: "boulder".into(), target_count: 500, min_radius: 8.0, ..PropCategory::default() }];
        let c = build(&p, &AnchorState::default(), TileKey::new(0, 0));
        let cat = &c.categories[0];
        assert!(cat.transforms.len() < 500);
        assert!(!cat.transforms.is_empty());
        assert_eq!(cat.attempts, 500 * 60);
    }

    #[test]
    fn oversized_radius_places_nothing() {
        let mut p = params();
        p.categories = vec![PropCategory { name: "mesa".into(), target_count: 3, min_radius: 40.0, ..PropCategory::default() }];
        let c = build(&p, &AnchorState::default(), TileKey::new(0, 0));
        assert_eq!(c.total(), 0);
    }

    #[test]
    fn same_sample_chunk_gives_same_layout_under_freeflight() {
        let p = params();
        let authored = build(&p, &AnchorState::default(), TileKey::new(0, 0));

        // origin at a tile corner: world tile (5, 2) now samples like tile (0, 0)
        let mut anchor = CoordinateAnchor::new();
        anchor.activate_freeflight(DVec3::new(320.0, 0.0, 128.0));
        let shifted = build(&p, &anchor.state(), TileKey::new(5, 2));

        assert_eq!(shifted.sample_key, TileKey::new(0, 0));
        for (a, s) in authored.categories.iter().zip(&shifted.categories) {
            assert_eq!(a.transforms.len(), s.transforms.len());
            for (ta, ts) in a.transforms.iter().zip(&s.transforms) {
                assert!((ta.translation[0] + 320.0 - ts.translation[0]).abs() < 1e-3);
                assert_eq!(ta.translation[1], ts.translation[1]);
                assert!((ta.translation[2] + 128.0 - ts.translation[2]).abs() < 1e-3);
                assert_eq!((ta.yaw, ta.tilt, ta.scale), (ts.yaw, ts.tilt, ts.scale));
            }
        }
    }

    #[test]
    fn category_validation() {
        for c in PropCategory::defaults() {
            c.validate().unwrap();
        }
        let bad = PropCategory { scale_min: 2.0, scale_max: 1.0, ..PropCategory::default() };
        assert!(matches!(bad.validate(), Err(ConfigError::InvalidCategory { .. })));
        let bad = PropCategory { min_radius: 0.0, ..PropCategory::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn exclusion_zones_parse_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            zones: Vec<ExclusionZone>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[zones]]
            shape = "circle"
            x = 1.0
            z = 2.0
            radius = 3.0

            [[zones]]
            shape = "rect"
            min_x = 0.0
            min_z = 0.0
            max_x = 4.0
            max_z = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(doc.zones[0], ExclusionZone::Circle { x: 1.0, z: 2.0, radius: 3.0 });
        assert!(doc.zones[1].contains(4.0, 0.0));
    }

    #[test]
    fn matrix_applies_translation_and_scale() {
        let t = PropTransform { translation: [1.0, 2.0, 3.0], scale: 2.0, ..PropTransform::default() };
        let p = t.matrix().transform_point3(Vec3::new(1.0, 0.0, 0.0));
        assert!((p - Vec3::new(3.0, 2.0, 3.0)).length() < 1e-6);
    }
}
