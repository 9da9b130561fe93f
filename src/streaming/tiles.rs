// src/streaming/tiles.rs
//
// Tile lattice math. Everything here is pure.

use glam::DVec2;
use rustc_hash::FxHashSet as HashSet;

use crate::config::{GridConfig, PrefetchBand};

use super::types::{TileBounds, TileKey};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileGrid {
    pub tile_size: f64,
    pub anchor_min_x: f64,
    pub anchor_min_z: f64,
}

impl From<GridConfig> for TileGrid {
    fn from(c: GridConfig) -> Self {
        Self { tile_size: c.tile_size, anchor_min_x: c.anchor_min_x, anchor_min_z: c.anchor_min_z }
    }
}

impl TileGrid {
    pub fn new(tile_size: f64, anchor_min_x: f64, anchor_min_z: f64) -> Self {
        Self { tile_size, anchor_min_x, anchor_min_z }
    }

    #[inline]
    fn axis_min(anchor: f64, ts: f64, i: i32) -> f64 {
        anchor + i as f64 * ts
    }

    // floor((v - anchor) / ts), nudged so it agrees exactly with `axis_min`.
    #[inline]
    fn axis_index(anchor: f64, ts: f64, v: f64) -> i32 {
        let mut i = ((v - anchor) / ts).floor() as i32;
        if Self::axis_min(anchor, ts, i) > v {
            i -= 1;
        } else if Self::axis_min(anchor, ts, i + 1) <= v {
            i += 1;
        }
        i
    }

    #[inline]
    pub fn world_to_tile(&self, x: f64, z: f64) -> TileKey {
        TileKey {
            ix: Self::axis_index(self.anchor_min_x, self.tile_size, x),
            iz: Self::axis_index(self.anchor_min_z, self.tile_size, z),
        }
    }

    #[inline]
    pub fn tile_bounds(&self, key: TileKey) -> TileBounds {
        let ts = self.tile_size;
        TileBounds {
            min_x: Self::axis_min(self.anchor_min_x, ts, key.ix),
            min_z: Self::axis_min(self.anchor_min_z, ts, key.iz),
            max_x: Self::axis_min(self.anchor_min_x, ts, key.ix + 1),
            max_z: Self::axis_min(self.anchor_min_z, ts, key.iz + 1),
        }
    }
}

pub fn ring_set(center: TileKey, radius: i32) -> HashSet<TileKey> {
    let r = radius.max(0);
    let mut set = HashSet::default();
    set.reserve(((2 * r + 1) * (2 * r + 1)) as usize);
    for dz in -r..=r {
        for dx in -r..=r {
            set.insert(center.offset(dx, dz));
        }
    }
    set
}

/// Extends `set` past each band's radius along the dominant horizontal axis
/// of `forward`. Only one axis is ever extended.
pub fn prefetch_extend(
    set: &mut HashSet<TileKey>,
    center: TileKey,
    forward: DVec2,
    bands: &[PrefetchBand],
) {
    const EPS: f64 = 1e-9;
    if forward.x.abs() < EPS && forward.y.abs() < EPS {
        return;
    }

    let along_x = forward.x.abs() >= forward.y.abs();
    let sign = if along_x { forward.x.signum() } else { forward.y.signum() } as i32;

    for band in bands {
        let r = band.radius.max(0);
        for step in 1..=band.depth.max(0) {
            let ahead = sign * (r + step);
            for side in -r..=r {
                let k = if along_x { center.offset(ahead, side) } else { center.offset(side, ahead) };
                set.insert(k);
            }
        }
    }
}

/// Tiles along the straight path `pos -> pos + velocity * lookahead`, widened
/// by `spread` tiles on either side of the path. A path longer than
/// `max_tiles` tiles is a teleport, not motion, and predicts nothing.
pub fn predict_cone(
    grid: &TileGrid,
    pos: DVec2,
    velocity: DVec2,
    lookahead_s: f64,
    spread: i32,
    max_tiles: i32,
) -> HashSet<TileKey> {
    let mut out = HashSet::default();

    let reach = velocity.length() * lookahead_s.max(0.0);
    if !reach.is_finite() || reach < 1e-6 {
        return out;
    }

    let step = grid.tile_size;
    if reach > max_tiles.max(0) as f64 * step {
        return out;
    }

    let dir = velocity.normalize();
    let perp = dir.perp();
    let steps = (reach / step).ceil() as i32;

    for s in 1..=steps {
        let d = (s as f64 * step).min(reach);
        let p = pos + dir * d;
        for k in -spread.max(0)..=spread.max(0) {
            let q = p + perp * (k as f64 * step);
            out.insert(grid.world_to_tile(q.x, q.y));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_tile_min_corner() {
        for &(ts, ax, az) in &[(4.0, -10.0, -10.0), (0.1, 0.0, 0.0), (3.7, 1.3, -2.9), (64.0, 0.0, 0.0)] {
            let g = TileGrid::new(ts, ax, az);
            for iz in -60..=60 {
                for ix in -60..=60 {
                    let key = TileKey::new(ix, iz);
                    let b = g.tile_bounds(key);
                    assert_eq!(g.world_to_tile(b.min_x, b.min_z), key, "ts={ts} key={key:?}");
                }
            }
        }
    }

    #[test]
    fn round_trip_far_from_origin() {
        let g = TileGrid::new(0.3, 0.0, 0.0);
        for &i in &[1_000_000, -1_000_000, 12_345_678, -7_654_321] {
            let key = TileKey::new(i, -i);
            let b = g.tile_bounds(key);
            assert_eq!(g.world_to_tile(b.min_x, b.min_z), key);
        }
    }

    #[test]
    fn scenario_anchor_minus_ten() {
        let g = TileGrid::new(4.0, -10.0, -10.0);
        let key = g.world_to_tile(-8.0, -9.0);
        assert_eq!(key, TileKey::new(0, 0));
        assert_eq!(
            g.tile_bounds(key),
            TileBounds { min_x: -10.0, min_z: -10.0, max_x: -6.0, max_z: -6.0 }
        );
    }

    #[test]
    fn negative_positions_floor() {
        let g = TileGrid::new(4.0, 0.0, 0.0);
        assert_eq!(g.world_to_tile(-0.001, -4.0), TileKey::new(-1, -1));
        assert_eq!(g.world_to_tile(-4.001, 3.999), TileKey::new(-2, 0));
    }

    #[test]
    fn ring_has_expected_size_and_symmetry() {
        let c = TileKey::new(3, -2);
        for r in 0..6 {
            let set = ring_set(c, r);
            assert_eq!(set.len(), ((2 * r + 1) * (2 * r + 1)) as usize);
            for k in &set {
                let (dx, dz) = (k.ix - c.ix, k.iz - c.iz);
                assert!(set.contains(&c.offset(-dx, dz)));
                assert!(set.contains(&c.offset(dx, -dz)));
                assert!(set.contains(&c.offset(-dx, -dz)));
                assert!(k.ring_distance(c) <= r);
            }
        }
    }

    #[test]
    fn prefetch_extends_dominant_axis_only() {
        let c = TileKey::new(0, 0);
        let mut set = ring_set(c, 1);
        prefetch_extend(&mut set, c, DVec2::new(-1.0, 0.4), &[PrefetchBand { radius: 1, depth: 2 }]);

        assert_eq!(set.len(), 9 + 2 * 3);
        for side in -1..=1 {
            assert!(set.contains(&TileKey::new(-2, side)));
            assert!(set.contains(&TileKey::new(-3, side)));
        }
        assert!(!set.contains(&TileKey::new(2, 0)));
        assert!(!set.contains(&TileKey::new(0, 2)));
    }

    #[test]
    fn prefetch_without_horizontal_motion_is_noop() {
        let c = TileKey::new(5, 5);
        let mut set = ring_set(c, 2);
        prefetch_extend(&mut set, c, DVec2::ZERO, &[PrefetchBand { radius: 2, depth: 3 }]);
        assert_eq!(set, ring_set(c, 2));
    }

    #[test]
    fn predict_cone_follows_velocity() {
        let g = TileGrid::new(10.0, 0.0, 0.0);
        let cone = predict_cone(&g, DVec2::new(5.0, 5.0), DVec2::new(0.0, 20.0), 2.0, 0, 8);
        // 40 units ahead along +z, one tile per step
        assert_eq!(cone.len(), 4);
        for iz in 1..=4 {
            assert!(cone.contains(&TileKey::new(0, iz)));
        }

        let wide = predict_cone(&g, DVec2::new(5.0, 5.0), DVec2::new(0.0, 20.0), 2.0, 1, 8);
        assert!(wide.contains(&TileKey::new(-1, 2)) && wide.contains(&TileKey::new(1, 2)));

        assert!(predict_cone(&g, DVec2::ZERO, DVec2::ZERO, 2.0, 1, 8).is_empty());
    }

    #[test]
    fn predict_cone_ignores_teleports() {
        let g = TileGrid::new(64.0, 0.0, 0.0);
        // 10 km in one 16 ms tick
        let v = DVec2::new(10_000.0 / 0.016, 0.0);
        assert!(predict_cone(&g, DVec2::ZERO, v, 1.5, 1, 8).is_empty());

        // exactly at the cap still predicts, bounded by the cap
        let at_cap = predict_cone(&g, DVec2::new(32.0, 32.0), DVec2::new(8.0 * 64.0, 0.0), 1.0, 1, 8);
        assert!(!at_cap.is_empty());
        assert!(at_cap.len() <= 8 * 3);
    }
}
