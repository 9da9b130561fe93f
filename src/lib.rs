pub mod config;
pub mod engine;
pub mod error;
pub mod profiler;
pub mod streaming;
pub mod world;

pub use config::EngineConfig;
pub use engine::{EngineBuilder, StreamingEngine};
pub use error::{BuildError, ConfigError};
pub use streaming::{StreamEvent, TileKey};
pub use world::{AnchorMode, HeightSampler, SharedSampler};
