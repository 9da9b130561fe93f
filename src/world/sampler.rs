use std::sync::Arc;

use super::anchor::AnchorState;

/// Elevation source. Must be pure: the same `(x, z)` always yields the same
/// height, from any thread.
pub trait HeightSampler: Send + Sync {
    fn height(&self, x: f64, z: f64) -> f64;
}

impl<F> HeightSampler for F
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    #[inline]
    fn height(&self, x: f64, z: f64) -> f64 {
        self(x, z)
    }
}

pub type SharedSampler = Arc<dyn HeightSampler>;

/// Height at a world position, looked up through the anchor.
#[inline]
pub fn sample_world(sampler: &dyn HeightSampler, anchor: &AnchorState, wx: f64, wz: f64) -> f64 {
    let (sx, sz) = anchor.to_sample_space(wx, wz);
    sampler.height(sx, sz)
}
