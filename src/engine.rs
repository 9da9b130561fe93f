// src/engine.rs
//
// Top-level engine: one coordinate anchor shared by the terrain and prop
// streamers, ticked once per frame from the controlling thread.

use std::time::Instant;

use glam::DVec3;

use crate::config::EngineConfig;
use crate::error::ConfigError;
use crate::streaming::{
    PropEvent, PropStreamer, StreamStats, TerrainEvent, TerrainStreamer, ThreadWorkers, TileGrid, WorkerChannel,
};
use crate::world::{AnchorMode, AnchorState, CoordinateAnchor, SharedSampler};

pub struct EngineBuilder {
    config: EngineConfig,
    sampler: Option<SharedSampler>,
    workers: Option<Box<dyn WorkerChannel>>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self { config, sampler: None, workers: None }
    }

    pub fn height_sampler(mut self, sampler: SharedSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Replaces the default thread workers (e.g. with an in-process fake).
    pub fn workers(mut self, workers: Box<dyn WorkerChannel>) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn build(self) -> Result<StreamingEngine, ConfigError> {
        let sampler = self.sampler.ok_or(ConfigError::MissingHeightSampler)?;
        self.config.validate()?;

        let cfg = self.config;
        let grid = TileGrid::from(cfg.grid);

        let workers = match self.workers {
            Some(w) => Some(w),
            None if cfg.schedule.worker_threads > 0 => Some(Box::new(ThreadWorkers::spawn(
                sampler.clone(),
                cfg.schedule.worker_threads,
                cfg.schedule.max_in_flight,
            )) as Box<dyn WorkerChannel>),
            None => None,
        };

        let terrain = TerrainStreamer::new(grid, &cfg.terrain, &cfg.schedule, sampler.clone(), workers);
        let props = cfg.props.enabled.then(|| PropStreamer::new(grid, &cfg.props, &cfg.schedule, sampler.clone()));

        Ok(StreamingEngine { anchor: CoordinateAnchor::new(), terrain, props, sampler })
    }
}

pub struct StreamingEngine {
    anchor: CoordinateAnchor,
    terrain: TerrainStreamer,
    props: Option<PropStreamer>,
    sampler: SharedSampler,
}

impl StreamingEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// One scheduling tick at viewpoint `position`.
    pub fn tick(&mut self, position: DVec3, now: Instant) {
        let anchor = self.anchor.state();
        self.terrain.tick(position, &anchor, now);
        if let Some(props) = self.props.as_mut() {
            props.tick(position, &anchor, now);
        }
    }

    /// Returns false (and does nothing) if already in freeflight.
    pub fn activate_freeflight(&mut self, position: DVec3) -> bool {
        let changed = self.anchor.activate_freeflight(position);
        if changed {
            self.invalidate_all();
        }
        changed
    }

    pub fn return_to_authored(&mut self) -> bool {
        let changed = self.anchor.return_to_authored();
        if changed {
            self.invalidate_all();
        }
        changed
    }

    fn invalidate_all(&mut self) {
        self.terrain.invalidate();
        if let Some(props) = self.props.as_mut() {
            props.invalidate();
        }
    }

    /// Height at a world position, through the current anchor.
    pub fn height_at(&self, x: f64, z: f64) -> f64 {
        crate::world::sampler::sample_world(&*self.sampler, &self.anchor.state(), x, z)
    }

    #[inline]
    pub fn anchor(&self) -> AnchorState {
        self.anchor.state()
    }

    #[inline]
    pub fn anchor_mode(&self) -> AnchorMode {
        self.anchor.mode()
    }

    pub fn terrain(&self) -> &TerrainStreamer {
        &self.terrain
    }

    pub fn terrain_mut(&mut self) -> &mut TerrainStreamer {
        &mut self.terrain
    }

    pub fn props(&self) -> Option<&PropStreamer> {
        self.props.as_ref()
    }

    pub fn take_terrain_events(&mut self) -> Vec<TerrainEvent> {
        self.terrain.take_events()
    }

    pub fn take_prop_events(&mut self) -> Vec<PropEvent> {
        self.props.as_mut().map(PropStreamer::take_events).unwrap_or_default()
    }

    pub fn terrain_stats(&mut self) -> StreamStats {
        self.terrain.stats()
    }

    pub fn prop_stats(&mut self) -> Option<StreamStats> {
        self.props.as_mut().map(PropStreamer::stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn missing_sampler_is_fatal_at_build() {
        let err = EngineBuilder::new(EngineConfig::default()).build().err().unwrap();
        assert!(matches!(err, ConfigError::MissingHeightSampler));
    }

    #[test]
    fn invalid_config_is_rejected_at_build() {
        let mut cfg = EngineConfig::default();
        cfg.terrain.resolution = 0;
        let err = EngineBuilder::new(cfg).height_sampler(Arc::new(|_x: f64, _z: f64| 0.0)).build().err().unwrap();
        assert!(matches!(err, ConfigError::InvalidResolution(0)));
    }

    #[test]
    fn height_at_follows_the_anchor() {
        let mut cfg = EngineConfig::default();
        cfg.schedule.worker_threads = 0;
        cfg.props.enabled = false;
        let mut engine = StreamingEngine::builder(cfg)
            .height_sampler(Arc::new(|x: f64, z: f64| x * 2.0 + z))
            .build()
            .unwrap();

        let authored = engine.height_at(5.0, 5.0);
        assert!(engine.activate_freeflight(DVec3::new(100.0, 0.0, 200.0)));
        assert!(!engine.activate_freeflight(DVec3::new(7.0, 0.0, 7.0)));
        assert_eq!(engine.height_at(105.0, 205.0), authored);
        assert_eq!(engine.anchor_mode(), AnchorMode::Freeflight);
    }
}
