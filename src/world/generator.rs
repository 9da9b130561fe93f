// src/world/generator.rs

use noise::{Fbm, MultiFractal, NoiseFn, Perlin};

use super::sampler::HeightSampler;

/// Rolling-hills height field used by the demo binary. The streaming core
/// only ever sees it through [`HeightSampler`].
#[derive(Clone)]
pub struct WorldGen {
    pub seed: u32,
    height: Fbm<Perlin>,
    detail: Fbm<Perlin>,
}

impl WorldGen {
    pub fn new(seed: u32) -> Self {
        let height = Fbm::<Perlin>::new(seed).set_octaves(6).set_frequency(0.0025);
        let detail = Fbm::<Perlin>::new(seed ^ 0xA5A5_A5A5).set_octaves(3).set_frequency(0.02);

        Self { seed, height, detail }
    }

    #[inline(always)]
    pub fn ground_height_m(&self, xm: f64, zm: f64) -> f64 {
        let h0 = self.height.get([xm, zm]);
        let h1 = self.detail.get([xm, zm]);

        let base_m = 10.0;
        let amp_m = 18.0;
        base_m + h0 * amp_m + h1 * 3.0
    }
}

impl HeightSampler for WorldGen {
    #[inline]
    fn height(&self, x: f64, z: f64) -> f64 {
        self.ground_height_m(x, z)
    }
}
