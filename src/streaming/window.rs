// src/streaming/window.rs
//
// Viewpoint window.
//
// Watches the viewpoint each tick and recomputes the required/retained
// tile sets only when the viewpoint crosses into a different tile. It never
// touches the cache; the managers consume the emitted `WindowUpdate`.

use std::time::Instant;

use glam::{DVec2, DVec3};
use rustc_hash::FxHashSet as HashSet;

use crate::config::WindowConfig;

use super::priority::TileRing;
use super::tiles::{self, TileGrid};
use super::types::TileKey;

// Ticks closer together than this don't produce a usable derivative.
const MIN_VELOCITY_DT_S: f64 = 1.0 / 1000.0;

#[derive(Clone, Debug)]
pub struct WindowUpdate {
    pub center: TileKey,
    pub required: HashSet<TileKey>,
    pub retained: HashSet<TileKey>,
    pub predicted: HashSet<TileKey>,
}

pub struct WindowTracker {
    grid: TileGrid,
    cfg: WindowConfig,
    mid_radius: i32,

    center: Option<TileKey>,
    predicted: HashSet<TileKey>,

    last_pos: Option<DVec3>,
    last_time: Option<Instant>,
    velocity: DVec3,
}

impl WindowTracker {
    pub fn new(grid: TileGrid, cfg: WindowConfig) -> Self {
        let mid_radius = cfg.mid_radius();
        Self {
            grid,
            cfg,
            mid_radius,
            center: None,
            predicted: HashSet::default(),
            last_pos: None,
            last_time: None,
            velocity: DVec3::ZERO,
        }
    }

    #[inline]
    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    #[inline]
    pub fn config(&self) -> &WindowConfig {
        &self.cfg
    }

    #[inline]
    pub fn center(&self) -> Option<TileKey> {
        self.center
    }

    #[inline]
    pub fn velocity(&self) -> DVec3 {
        self.velocity
    }

    /// Forces the next `observe` to emit, even without a tile crossing.
    pub fn invalidate(&mut self) {
        self.center = None;
    }

    /// Feeds one viewpoint sample. Returns `Some` only on a tile crossing
    /// (or the first sample after construction / `invalidate`).
    pub fn observe(&mut self, position: DVec3, now: Instant) -> Option<WindowUpdate> {
        self.update_velocity(position, now);

        let tile = self.grid.world_to_tile(position.x, position.z);
        if self.center == Some(tile) {
            return None;
        }
        self.center = Some(tile);

        let mut required = tiles::ring_set(tile, self.cfg.load_radius);
        let forward = DVec2::new(self.velocity.x, self.velocity.z);
        tiles::prefetch_extend(&mut required, tile, forward, &self.cfg.prefetch);

        self.predicted = if self.cfg.predict_ahead {
            tiles::predict_cone(
                &self.grid,
                DVec2::new(position.x, position.z),
                forward,
                self.cfg.lookahead_s,
                self.cfg.predict_spread,
                self.cfg.max_predict_tiles,
            )
        } else {
            HashSet::default()
        };
        required.extend(self.predicted.iter().copied());

        let mut retained = tiles::ring_set(tile, self.cfg.drop_radius);
        retained.extend(required.iter().copied());

        Some(WindowUpdate { center: tile, required, retained, predicted: self.predicted.clone() })
    }

    fn update_velocity(&mut self, position: DVec3, now: Instant) {
        if let (Some(p0), Some(t0)) = (self.last_pos, self.last_time) {
            let raw_dt = now.saturating_duration_since(t0).as_secs_f64();
            if raw_dt >= MIN_VELOCITY_DT_S {
                // A long stall (pause, hitch) would otherwise turn a teleport
                // into a huge velocity or a tiny one; clamp it.
                let dt = raw_dt.min(self.cfg.max_velocity_dt_s.max(MIN_VELOCITY_DT_S));
                self.velocity = (position - p0) / dt;
            }
        }
        self.last_pos = Some(position);
        self.last_time = Some(now);
    }

    /// Classifies `key` against the current center. Used for dispatch
    /// ranking and for partitioning placement output.
    pub fn ring_of(&self, key: TileKey) -> TileRing {
        let Some(center) = self.center else {
            return TileRing::Far;
        };
        let d = key.ring_distance(center);
        if d <= self.cfg.immediate_radius {
            TileRing::Immediate
        } else if d <= self.cfg.load_radius {
            TileRing::Buffer
        } else if self.predicted.contains(&key) {
            TileRing::Predicted
        } else if d <= self.mid_radius {
            TileRing::Mid
        } else {
            TileRing::Far
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrefetchBand;
    use std::time::Duration;

    fn cfg(load: i32, drop: i32) -> WindowConfig {
        WindowConfig {
            immediate_radius: 0,
            load_radius: load,
            drop_radius: drop,
            prefetch: Vec::new(),
            predict_ahead: false,
            ..WindowConfig::default()
        }
    }

    #[test]
    fn emits_only_on_tile_crossing() {
        let mut w = WindowTracker::new(TileGrid::new(10.0, 0.0, 0.0), cfg(1, 2));
        let t0 = Instant::now();

        let first = w.observe(DVec3::new(1.0, 0.0, 1.0), t0).unwrap();
        assert_eq!(first.center, TileKey::new(0, 0));
        assert_eq!(first.required.len(), 9);
        assert_eq!(first.retained.len(), 25);

        for i in 1..8 {
            let t = t0 + Duration::from_millis(16 * i);
            assert!(w.observe(DVec3::new(1.0 + i as f64, 0.0, 1.0), t).is_none());
        }

        let crossed = w.observe(DVec3::new(10.5, 0.0, 1.0), t0 + Duration::from_millis(200));
        assert_eq!(crossed.unwrap().center, TileKey::new(1, 0));
    }

    #[test]
    fn retained_is_superset_of_required() {
        let mut c = cfg(2, 3);
        c.prefetch = vec![PrefetchBand { radius: 2, depth: 4 }];
        let mut w = WindowTracker::new(TileGrid::new(10.0, 0.0, 0.0), c);
        let t0 = Instant::now();
        w.observe(DVec3::new(5.0, 0.0, 5.0), t0);
        let up = w.observe(DVec3::new(15.0, 0.0, 5.0), t0 + Duration::from_millis(100)).unwrap();

        assert!(up.required.is_subset(&up.retained));
        assert!(up.retained.len() > up.required.len());
        // moving +x: prefetch reaches radius + depth ahead
        assert!(up.required.contains(&TileKey::new(1 + 6, 0)));
    }

    #[test]
    fn velocity_derivative_clamps_long_stalls() {
        let mut c = cfg(1, 2);
        c.max_velocity_dt_s = 0.25;
        let mut w = WindowTracker::new(TileGrid::new(10.0, 0.0, 0.0), c);
        let t0 = Instant::now();

        w.observe(DVec3::ZERO, t0);
        w.observe(DVec3::new(1.0, 0.0, 0.0), t0 + Duration::from_millis(100));
        assert!((w.velocity().x - 10.0).abs() < 1e-9);

        // 10 s pause, 5 units moved: derivative uses the clamped dt
        w.observe(DVec3::new(6.0, 0.0, 0.0), t0 + Duration::from_millis(10_100));
        assert!((w.velocity().x - 20.0).abs() < 1e-9);
    }

    #[test]
    fn predicted_tiles_join_required_set() {
        let mut c = cfg(1, 3);
        c.predict_ahead = true;
        c.lookahead_s = 1.0;
        c.predict_spread = 0;
        let mut w = WindowTracker::new(TileGrid::new(10.0, 0.0, 0.0), c);
        let t0 = Instant::now();

        w.observe(DVec3::new(5.0, 0.0, 5.0), t0);
        // 40 u/s along +z
        let up = w.observe(DVec3::new(5.0, 0.0, 13.0), t0 + Duration::from_millis(200)).unwrap();
        assert_eq!(up.center, TileKey::new(0, 1));
        assert!(up.predicted.contains(&TileKey::new(0, 5)));
        assert!(up.required.contains(&TileKey::new(0, 5)));
        assert_eq!(w.ring_of(TileKey::new(0, 5)), TileRing::Predicted);
    }

    #[test]
    fn ring_classification() {
        let mut c = cfg(2, 6);
        c.immediate_radius = 1;
        let mut w = WindowTracker::new(TileGrid::new(10.0, 0.0, 0.0), c);
        w.observe(DVec3::new(5.0, 0.0, 5.0), Instant::now());

        assert_eq!(w.ring_of(TileKey::new(0, 0)), TileRing::Immediate);
        assert_eq!(w.ring_of(TileKey::new(-1, 1)), TileRing::Immediate);
        assert_eq!(w.ring_of(TileKey::new(2, 0)), TileRing::Buffer);
        assert_eq!(w.ring_of(TileKey::new(4, 0)), TileRing::Mid);
        assert_eq!(w.ring_of(TileKey::new(0, 6)), TileRing::Far);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let mut w = WindowTracker::new(TileGrid::new(10.0, 0.0, 0.0), cfg(1, 2));
        let t0 = Instant::now();
        w.observe(DVec3::new(1.0, 0.0, 1.0), t0);
        w.invalidate();
        assert!(w.observe(DVec3::new(1.0, 0.0, 1.0), t0 + Duration::from_millis(16)).is_some());
    }
}
