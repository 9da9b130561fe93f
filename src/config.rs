// src/config.rs
// -------------
// Default knobs for tile streaming + placement, and the runtime config tree
// that can override them from TOML.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::world::placement::{ExclusionZone, PropCategory};

pub const TILE_SIZE: f64 = 64.0;
pub const RESOLUTION: u32 = 32;

pub const IMMEDIATE_RADIUS: i32 = 1;
pub const LOAD_RADIUS: i32 = 3;
pub const DROP_RADIUS: i32 = LOAD_RADIUS + 2;

pub const WORKER_THREADS: usize = 2;
pub const MAX_IN_FLIGHT: usize = 8;
pub const MAX_BUILDS_PER_TICK: usize = 16;
pub const TICK_BUDGET_MS: f64 = 4.0;

// Worker path is disabled for the session after this many errors in a row.
pub const MAX_CONSECUTIVE_WORKER_ERRORS: u32 = 3;

// Retention sweeps are throttled to every Nth tick.
pub const SWEEP_INTERVAL_TICKS: u64 = 10;
pub const EVICT_DELAY_S: f64 = 2.0;
pub const COLD_TTL_S: f64 = 30.0;

// Rejection-sampling draws per requested prop.
pub const PLACEMENT_OVERSAMPLE: u32 = 60;

pub const LOOKAHEAD_S: f64 = 1.5;
pub const PREDICT_SPREAD: i32 = 1;
// Predicted paths longer than this (in tiles) are treated as teleports.
pub const MAX_PREDICT_TILES: i32 = 8;
pub const MAX_VELOCITY_DT_S: f64 = 0.25;

pub const POOL_MAX_PER_SHAPE: usize = 64;
pub const TRANSFORM_POOL_MAX: usize = 256;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    pub schedule: ScheduleConfig,
    pub terrain: TerrainConfig,
    pub props: PropsConfig,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub tile_size: f64,
    pub anchor_min_x: f64,
    pub anchor_min_z: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { tile_size: TILE_SIZE, anchor_min_x: 0.0, anchor_min_z: 0.0 }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
pub struct PrefetchBand {
    pub radius: i32,
    pub depth: i32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub immediate_radius: i32,
    pub load_radius: i32,
    pub drop_radius: i32,
    pub prefetch: Vec<PrefetchBand>,

    /// Adds a velocity-predicted cone of tiles to the required set.
    pub predict_ahead: bool,
    pub lookahead_s: f64,
    pub predict_spread: i32,
    pub max_predict_tiles: i32,

    pub max_velocity_dt_s: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            immediate_radius: IMMEDIATE_RADIUS,
            load_radius: LOAD_RADIUS,
            drop_radius: DROP_RADIUS,
            prefetch: vec![PrefetchBand { radius: LOAD_RADIUS, depth: 1 }],
            predict_ahead: false,
            lookahead_s: LOOKAHEAD_S,
            predict_spread: PREDICT_SPREAD,
            max_predict_tiles: MAX_PREDICT_TILES,
            max_velocity_dt_s: MAX_VELOCITY_DT_S,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tick_budget_ms: f64,
    pub max_builds_per_tick: usize,
    pub max_in_flight: usize,
    pub worker_threads: usize,
    pub max_consecutive_errors: u32,

    /// Per-job deadline for worker replies. `None` keeps the error counter as
    /// the only hang detector.
    pub worker_timeout_ms: Option<u64>,

    pub evict_delay_s: f64,
    pub cold_ttl_s: f64,
    pub sweep_interval_ticks: u64,

    pub pool_max_per_shape: usize,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_budget_ms: TICK_BUDGET_MS,
            max_builds_per_tick: MAX_BUILDS_PER_TICK,
            max_in_flight: MAX_IN_FLIGHT,
            worker_threads: WORKER_THREADS,
            max_consecutive_errors: MAX_CONSECUTIVE_WORKER_ERRORS,
            worker_timeout_ms: None,
            evict_delay_s: EVICT_DELAY_S,
            cold_ttl_s: COLD_TTL_S,
            sweep_interval_ticks: SWEEP_INTERVAL_TICKS,
            pool_max_per_shape: POOL_MAX_PER_SHAPE,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Segments per tile edge.
    pub resolution: u32,
    pub window: WindowConfig,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self { resolution: RESOLUTION, window: WindowConfig::default() }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PropsConfig {
    pub enabled: bool,
    pub seed: u64,
    pub oversample: u32,
    pub window: WindowConfig,
    pub categories: Vec<PropCategory>,
    pub exclusions: Vec<ExclusionZone>,
}

impl Default for PropsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed: 0x5EED_0001,
            oversample: PLACEMENT_OVERSAMPLE,
            window: WindowConfig {
                load_radius: 2,
                drop_radius: 4,
                prefetch: Vec::new(),
                predict_ahead: true,
                ..WindowConfig::default()
            },
            categories: PropCategory::defaults(),
            exclusions: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        let cfg: EngineConfig = toml::from_str(src)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path)?;
        Self::from_toml_str(&src)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ts = self.grid.tile_size;
        if !ts.is_finite() || ts <= 0.0 {
            return Err(ConfigError::InvalidTileSize(ts));
        }
        if self.terrain.resolution == 0 {
            return Err(ConfigError::InvalidResolution(self.terrain.resolution));
        }

        self.terrain.window.validate()?;
        if self.props.enabled {
            self.props.window.validate()?;
            for cat in &self.props.categories {
                cat.validate()?;
            }
        }
        Ok(())
    }
}

impl WindowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.immediate_radius < 0 || self.load_radius < 0 {
            return Err(ConfigError::InvalidRadius(self.load_radius.min(self.immediate_radius)));
        }
        if self.drop_radius <= self.load_radius {
            return Err(ConfigError::RetainRadiusTooSmall {
                load: self.load_radius,
                drop: self.drop_radius,
            });
        }
        if self.predict_spread < 0 || self.max_predict_tiles < 0 {
            return Err(ConfigError::InvalidRadius(self.predict_spread.min(self.max_predict_tiles)));
        }
        if let Some(b) = self.prefetch.iter().find(|b| b.radius < 0 || b.depth < 0) {
            return Err(ConfigError::InvalidRadius(b.radius.min(b.depth)));
        }
        Ok(())
    }

    /// Rings beyond `load_radius` but inside this are ranked "mid".
    #[inline]
    pub fn mid_radius(&self) -> i32 {
        self.load_radius + ((self.drop_radius - self.load_radius) / 2).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [grid]
            tile_size = 4.0
            anchor_min_x = -10.0

            [terrain.window]
            load_radius = 1
            drop_radius = 3
            "#,
        )
        .unwrap();

        assert_eq!(cfg.grid.tile_size, 4.0);
        assert_eq!(cfg.grid.anchor_min_x, -10.0);
        assert_eq!(cfg.grid.anchor_min_z, 0.0);
        assert_eq!(cfg.terrain.window.load_radius, 1);
        assert_eq!(cfg.terrain.resolution, RESOLUTION);
        assert_eq!(cfg.schedule.max_consecutive_errors, 3);
        assert_eq!(cfg.props.oversample, 60);
    }

    #[test]
    fn drop_radius_must_exceed_load_radius() {
        let err = EngineConfig::from_toml_str(
            r#"
            [terrain.window]
            load_radius = 3
            drop_radius = 3
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::RetainRadiusTooSmall { load: 3, drop: 3 }));
    }

    #[test]
    fn rejects_bad_tile_size() {
        let err = EngineConfig::from_toml_str("[grid]\ntile_size = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTileSize(_)));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = EngineConfig::from_toml_str("[grid\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "[schedule]\nworker_threads = 0\ntick_budget_ms = 1.5").unwrap();

        let cfg = EngineConfig::load(f.path()).unwrap();
        assert_eq!(cfg.schedule.worker_threads, 0);
        assert_eq!(cfg.schedule.tick_budget_ms, 1.5);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
