
pub mod anchor;
pub mod generator;
pub mod hash;
pub mod placement;
pub mod sampler;
pub mod terrain;

pub use anchor::{AnchorMode, AnchorState, CoordinateAnchor};
pub use generator::WorldGen;
pub use sampler::{HeightSampler, SharedSampler};
