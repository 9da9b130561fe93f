// src/streaming/mod.rs
// Tile streaming: window, cache, scheduling, workers.

pub mod build_pool;
pub mod cache;
pub mod manager;
pub mod pool;
pub mod priority;
pub mod props;
pub mod queue;
pub mod tiles;
pub mod types;
pub mod window;
pub mod workers;

pub use manager::{TerrainEvent, TerrainStreamer};
pub use priority::TileRing;
pub use props::{PropEvent, PropStreamer};
pub use tiles::TileGrid;
pub use types::{ChunkState, StreamEvent, StreamStats, TileBounds, TileKey};
pub use window::{WindowTracker, WindowUpdate};
pub use workers::{BuildRequest, ThreadWorkers, WorkerChannel, WorkerReply};
