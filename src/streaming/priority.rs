// src/streaming/priority.rs
use glam::DVec2;

use super::types::TileKey;

/// Visual importance band of a tile relative to the viewpoint. Declaration
/// order is dispatch order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TileRing {
    Immediate,
    Buffer,
    Predicted,
    Mid,
    Far,
}

#[inline]
pub fn priority_score(k: TileKey, center: TileKey, fwd: DVec2) -> f32 {
    // 1) primary: squared distance in tiles
    let dx = (k.ix - center.ix) as f32;
    let dz = (k.iz - center.iz) as f32;
    let dist2 = dx * dx + dz * dz;

    // 2) tiny directional tie-break within the same shell
    let f = if fwd.length_squared() > 1e-12 { fwd.normalize().as_vec2() } else { glam::Vec2::ZERO };

    let dist = dist2.sqrt().max(1e-3);
    let dir = dx * f.x + dz * f.y;
    let dir_norm = (dir / dist).clamp(-1.0, 1.0);

    // keep < 0.5 so it can't jump shells
    let dir_bias = -0.49 * dir_norm;

    dist2 + dir_bias
}

/// Sort key for the build queue: ring first, then distance/heading.
#[inline]
pub fn rank(ring: TileRing, k: TileKey, center: TileKey, fwd: DVec2) -> (TileRing, f32) {
    (ring, priority_score(k, center, fwd))
}
